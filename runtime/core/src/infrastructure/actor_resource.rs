// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Actor-Backed Serialized Resource
//!
//! [`ActorResource`] moves the state into a dedicated tokio task. Callers talk
//! to it through an unbounded mailbox, so the order in which commands enter
//! the mailbox is the order in which they run, no matter which caller's task
//! is resumed first.
//!
//! ## Commands
//! | Command | Effect |
//! |---------|--------|
//! | `Apply` | Run one mutation to completion, reply with its output |
//! | `Read` | Reply with a clone of the state |
//! | `Shutdown` | Stop after everything queued before it; later work gets `Closed` |
//!
//! A mutation that panics loses its reply (the caller sees `Abandoned`), its
//! writes are rolled back to the state it started from, and the worker keeps
//! serving the queue.

use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::domain::error::ResourceError;
use crate::domain::events::ResourceEvent;
use crate::domain::mutation::{Mutation, SerializedResource};
use crate::infrastructure::event_bus::EventBus;

/// Type-erased queued mutation.
trait Envelope<S>: Send {
    fn run<'a>(self: Box<Self>, state: &'a mut S) -> BoxFuture<'a, ()>;

    fn reject(self: Box<Self>, error: ResourceError);
}

struct Pending<S, M>
where
    S: Send,
    M: Mutation<S>,
{
    mutation: M,
    reply: oneshot::Sender<Result<M::Output, ResourceError>>,
    _state: PhantomData<fn(&mut S)>,
}

impl<S, M> Envelope<S> for Pending<S, M>
where
    S: Send + 'static,
    M: Mutation<S>,
{
    fn run<'a>(self: Box<Self>, state: &'a mut S) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let Pending { mutation, reply, .. } = *self;
            let output = mutation.apply(state).await;
            // The caller may have stopped waiting; the mutation still counts.
            let _ = reply.send(Ok(output));
        })
    }

    fn reject(self: Box<Self>, error: ResourceError) {
        let _ = self.reply.send(Err(error));
    }
}

enum Command<S> {
    Apply(Box<dyn Envelope<S>>),
    Read(oneshot::Sender<S>),
    Shutdown,
}

pub struct ActorResource<S> {
    name: Arc<str>,
    mailbox: mpsc::UnboundedSender<Command<S>>,
    applied: Arc<AtomicU64>,
    worker: parking_lot::Mutex<Option<JoinHandle<S>>>,
}

impl<S> ActorResource<S>
where
    S: Clone + Send + 'static,
{
    /// Spawn the worker on the current tokio runtime.
    pub fn new(name: impl Into<String>, initial: S) -> Self {
        Self::spawn(name.into(), initial, None)
    }

    pub fn with_event_bus(name: impl Into<String>, initial: S, events: EventBus) -> Self {
        Self::spawn(name.into(), initial, Some(events))
    }

    fn spawn(name: String, initial: S, events: Option<EventBus>) -> Self {
        let name: Arc<str> = Arc::from(name);
        let applied = Arc::new(AtomicU64::new(0));
        let (mailbox, inbox) = mpsc::unbounded_channel();

        let worker = tokio::spawn(run_worker(
            name.clone(),
            initial,
            inbox,
            applied.clone(),
            events,
        ));
        debug!(resource = %name, "Spawned actor resource worker");

        Self {
            name,
            mailbox,
            applied,
            worker: parking_lot::Mutex::new(Some(worker)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mutations_applied(&self) -> u64 {
        self.applied.load(Ordering::Acquire)
    }
}

async fn run_worker<S>(
    name: Arc<str>,
    mut state: S,
    mut inbox: mpsc::UnboundedReceiver<Command<S>>,
    applied: Arc<AtomicU64>,
    events: Option<EventBus>,
) -> S
where
    S: Clone + Send + 'static,
{
    while let Some(command) = inbox.recv().await {
        match command {
            Command::Apply(envelope) => {
                let snapshot = state.clone();
                let outcome = AssertUnwindSafe(envelope.run(&mut state))
                    .catch_unwind()
                    .await;

                if outcome.is_err() {
                    state = snapshot;
                    warn!(resource = %name, "Mutation panicked; state rolled back");
                    continue;
                }

                let sequence = applied.fetch_add(1, Ordering::AcqRel) + 1;
                metrics::counter!("tandem_resource_mutations_total", "strategy" => "actor")
                    .increment(1);
                trace!(resource = %name, sequence, "Mutation applied");

                if let Some(events) = &events {
                    events.publish_resource_event(ResourceEvent::MutationApplied {
                        resource: name.to_string(),
                        sequence,
                        applied_at: Utc::now(),
                    });
                }
            }
            Command::Read(reply) => {
                let _ = reply.send(state.clone());
            }
            Command::Shutdown => break,
        }
    }

    // Anything queued behind Shutdown is answered, never silently dropped.
    inbox.close();
    while let Some(command) = inbox.recv().await {
        if let Command::Apply(envelope) = command {
            envelope.reject(ResourceError::Closed);
        }
    }

    let mutations_applied = applied.load(Ordering::Acquire);
    debug!(resource = %name, mutations_applied, "Actor resource worker stopped");
    if let Some(events) = &events {
        events.publish_resource_event(ResourceEvent::ResourceClosed {
            resource: name.to_string(),
            mutations_applied,
            closed_at: Utc::now(),
        });
    }

    state
}

#[async_trait]
impl<S> SerializedResource<S> for ActorResource<S>
where
    S: Clone + Send + 'static,
{
    async fn read(&self) -> Result<S, ResourceError> {
        let (reply, response) = oneshot::channel();
        self.mailbox
            .send(Command::Read(reply))
            .map_err(|_| ResourceError::Closed)?;
        response.await.map_err(|_| ResourceError::Closed)
    }

    async fn apply<M>(&self, mutation: M) -> Result<M::Output, ResourceError>
    where
        M: Mutation<S>,
    {
        let (reply, response) = oneshot::channel();
        let envelope: Box<dyn Envelope<S>> = Box::new(Pending {
            mutation,
            reply,
            _state: PhantomData,
        });

        self.mailbox
            .send(Command::Apply(envelope))
            .map_err(|_| ResourceError::Closed)?;

        response.await.map_err(|_| ResourceError::Abandoned)?
    }

    /// Stop the worker once every previously submitted command has run and
    /// return the final state. Work submitted afterwards fails with `Closed`.
    async fn shutdown(&self) -> Result<S, ResourceError> {
        let worker = self.worker.lock().take().ok_or(ResourceError::Closed)?;
        self.mailbox
            .send(Command::Shutdown)
            .map_err(|_| ResourceError::Closed)?;

        worker.await.map_err(|e| {
            warn!(resource = %self.name, "Actor resource worker failed: {}", e);
            ResourceError::Abandoned
        })
    }
}
