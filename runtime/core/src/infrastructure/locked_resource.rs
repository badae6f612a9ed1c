// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Lock-Backed Serialized Resource
//!
//! [`LockedResource`] keeps the state behind a `tokio::sync::Mutex`. Tokio's
//! mutex hands the lock out in the order waiters joined its queue, which gives
//! the same FIFO guarantee as the actor mailbox without a dedicated task.
//!
//! `apply` joins the queue before returning control to the runtime and runs
//! the mutation on its own task holding an owned guard. A caller that stops
//! waiting (timeout, aborted aggregation key) therefore never leaves a
//! mutation half-applied or drops one already queued. A mutation that panics
//! is rolled back to the state it started from and its caller receives
//! `Abandoned`.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::Poll;

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::domain::error::ResourceError;
use crate::domain::events::ResourceEvent;
use crate::domain::mutation::{Mutation, SerializedResource};
use crate::infrastructure::event_bus::EventBus;

pub struct LockedResource<S> {
    name: Arc<str>,
    state: Arc<Mutex<S>>,
    closed: AtomicBool,
    applied: Arc<AtomicU64>,
    events: Option<EventBus>,
}

impl<S> LockedResource<S>
where
    S: Clone + Send + 'static,
{
    pub fn new(name: impl Into<String>, initial: S) -> Self {
        Self {
            name: Arc::from(name.into()),
            state: Arc::new(Mutex::new(initial)),
            closed: AtomicBool::new(false),
            applied: Arc::new(AtomicU64::new(0)),
            events: None,
        }
    }

    pub fn with_event_bus(name: impl Into<String>, initial: S, events: EventBus) -> Self {
        Self {
            events: Some(events),
            ..Self::new(name, initial)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mutations_applied(&self) -> u64 {
        self.applied.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), ResourceError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ResourceError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl<S> SerializedResource<S> for LockedResource<S>
where
    S: Clone + Send + 'static,
{
    async fn read(&self) -> Result<S, ResourceError> {
        self.ensure_open()?;
        Ok(self.state.lock().await.clone())
    }

    async fn apply<M>(&self, mutation: M) -> Result<M::Output, ResourceError>
    where
        M: Mutation<S>,
    {
        self.ensure_open()?;

        // The first poll takes a place in the lock queue, so queue order is
        // call order and the mutation is committed from here on.
        let mut acquire = Box::pin(self.state.clone().lock_owned());
        let acquired = futures::poll!(acquire.as_mut());

        let name = self.name.clone();
        let applied = self.applied.clone();
        let events = self.events.clone();

        let worker = tokio::spawn(async move {
            let mut state = match acquired {
                Poll::Ready(guard) => guard,
                Poll::Pending => acquire.await,
            };

            let snapshot = state.clone();
            let outcome = AssertUnwindSafe(mutation.apply(&mut *state))
                .catch_unwind()
                .await;

            let Ok(output) = outcome else {
                *state = snapshot;
                warn!(resource = %name, "Mutation panicked; state rolled back");
                return None;
            };
            drop(state);

            let sequence = applied.fetch_add(1, Ordering::AcqRel) + 1;
            metrics::counter!("tandem_resource_mutations_total", "strategy" => "lock")
                .increment(1);
            trace!(resource = %name, sequence, "Mutation applied");

            if let Some(events) = &events {
                events.publish_resource_event(ResourceEvent::MutationApplied {
                    resource: name.to_string(),
                    sequence,
                    applied_at: Utc::now(),
                });
            }

            Some(output)
        });

        match worker.await {
            Ok(Some(output)) => Ok(output),
            Ok(None) => Err(ResourceError::Abandoned),
            Err(e) => {
                warn!(resource = %self.name, "Mutation task failed: {}", e);
                Err(ResourceError::Abandoned)
            }
        }
    }

    /// Refuse new work, wait for every mutation already queued on the lock
    /// and return the final state.
    async fn shutdown(&self) -> Result<S, ResourceError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(ResourceError::Closed);
        }

        // Queued behind every earlier lock() call.
        let state = self.state.lock().await.clone();

        let mutations_applied = self.mutations_applied();
        debug!(resource = %self.name, mutations_applied, "Locked resource closed");
        if let Some(events) = &self.events {
            events.publish_resource_event(ResourceEvent::ResourceClosed {
                resource: self.name.to_string(),
                mutations_applied,
                closed_at: Utc::now(),
            });
        }

        Ok(state)
    }
}
