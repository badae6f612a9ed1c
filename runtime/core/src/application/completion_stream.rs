// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Completion Stream (collect-as-available)
//!
//! One tokio task per key lives in a `JoinSet` owned by the stream, so the
//! stream bounds the lifetime of its children: dropping it aborts whatever is
//! still running. Items come out in completion order, exactly once per key,
//! and the stream stays exhausted once it has returned `None`.
//!
//! ## Per-Key Task
//! 1. Wait for a concurrency permit (if capped), or for cancellation.
//! 2. Cancellation requested? Resolve as `Cancelled` without calling the
//!    factory (`NotStarted -> Cancelled`).
//! 3. Mark `Running`, call the factory and await it, catching panics and
//!    applying the per-key timeout.
//! 4. Under `AbortInFlight`, a cancellation observed while running drops the
//!    operation; the key is left unresolved and never yielded.

use std::any::Any;
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::Utc;
use futures::stream::{FusedStream, Stream};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::{Id as TaskId, JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::domain::aggregation::{JobId, KeyState, KeyTracker};
use crate::domain::cancellation::CancellationToken;
use crate::domain::error::{AggregationError, OperationError};
use crate::domain::events::AggregationEvent;
use crate::domain::runtime_config::CancelPolicy;
use crate::infrastructure::event_bus::EventBus;

/// What a per-key task hands back to the stream.
enum KeyOutcome<K, V> {
    Resolved {
        key: K,
        result: Result<V, OperationError>,
        started: bool,
    },
    Aborted {
        key: K,
    },
}

struct TaskContext<K, F> {
    factory: F,
    tracker: Arc<Mutex<KeyTracker<K>>>,
    token: CancellationToken,
    permits: Option<Arc<Semaphore>>,
    timeout: Option<Duration>,
    cancel_policy: CancelPolicy,
}

pub(crate) struct StreamSettings {
    pub job_id: JobId,
    pub max_concurrency: Option<usize>,
    pub timeout: Option<Duration>,
    pub cancel_policy: CancelPolicy,
    pub events: Option<EventBus>,
}

pub struct CompletionStream<K, V> {
    job_id: JobId,
    tasks: JoinSet<KeyOutcome<K, V>>,
    task_keys: HashMap<TaskId, K>,
    tracker: Arc<Mutex<KeyTracker<K>>>,
    skipped: Vec<K>,
    succeeded: usize,
    failed: usize,
    cancelled: usize,
    observed_cancel: bool,
    finished: bool,
    events: Option<EventBus>,
}

// Never pin-projected; the task set is polled through `&mut`.
impl<K, V> Unpin for CompletionStream<K, V> {}

impl<K, V> CompletionStream<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
    V: Send + 'static,
{
    /// Validate the batch, then spawn one task per key immediately.
    pub(crate) fn spawn<F, Fut>(
        keys: Vec<K>,
        factory: F,
        token: &CancellationToken,
        settings: StreamSettings,
    ) -> Result<Self, AggregationError>
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, OperationError>> + Send + 'static,
    {
        let tracker = Arc::new(Mutex::new(KeyTracker::new(&keys)?));

        let context = Arc::new(TaskContext {
            factory,
            tracker: tracker.clone(),
            token: token.clone(),
            permits: settings
                .max_concurrency
                .map(|limit| Arc::new(Semaphore::new(limit.max(1)))),
            timeout: settings.timeout,
            cancel_policy: settings.cancel_policy,
        });

        info!(
            job_id = %settings.job_id,
            key_count = keys.len(),
            max_concurrency = ?settings.max_concurrency,
            "Starting aggregation job"
        );
        if let Some(events) = &settings.events {
            events.publish_aggregation_event(AggregationEvent::JobStarted {
                job_id: settings.job_id,
                key_count: keys.len(),
                started_at: Utc::now(),
            });
        }

        let mut tasks = JoinSet::new();
        let mut task_keys = HashMap::with_capacity(keys.len());
        for key in keys {
            let handle = tasks.spawn(run_key(context.clone(), key.clone()));
            task_keys.insert(handle.id(), key);
        }

        Ok(Self {
            job_id: settings.job_id,
            tasks,
            task_keys,
            tracker,
            skipped: Vec::new(),
            succeeded: 0,
            failed: 0,
            cancelled: 0,
            observed_cancel: false,
            finished: false,
            events: settings.events,
        })
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Keys whose tasks have not been collected yet.
    pub fn remaining(&self) -> usize {
        self.tasks.len()
    }

    pub fn key_state(&self, key: &K) -> Option<KeyState> {
        self.tracker.lock().state(key)
    }

    /// Keys resolved as `Cancelled` without their operation being invoked.
    pub fn skipped(&self) -> &[K] {
        &self.skipped
    }

    /// Keys that have not reached a terminal state (aborted in flight, or
    /// not collected yet).
    pub fn unresolved(&self) -> Vec<K> {
        self.tracker.lock().unresolved()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn settle(&mut self, key: &K, result: &Result<V, OperationError>, started: bool) {
        let state = KeyState::for_result(result);
        if let Err(e) = self.tracker.lock().transition(key, state) {
            warn!(job_id = %self.job_id, "Ignoring key bookkeeping error: {}", e);
        }

        if !started {
            self.skipped.push(key.clone());
        }
        match state {
            KeyState::Succeeded => self.succeeded += 1,
            KeyState::Cancelled => {
                self.cancelled += 1;
                self.observed_cancel = true;
            }
            _ => self.failed += 1,
        }

        let error = result.as_ref().err().map(|e| e.to_string());
        let outcome = match result {
            Ok(_) => "succeeded",
            Err(e) => e.kind(),
        };
        metrics::counter!("tandem_aggregation_keys_total", "outcome" => outcome).increment(1);
        debug!(job_id = %self.job_id, key = ?key, ?state, "Key resolved");

        if let Some(events) = &self.events {
            events.publish_aggregation_event(AggregationEvent::KeyResolved {
                job_id: self.job_id,
                key: format!("{:?}", key),
                state,
                error,
                resolved_at: Utc::now(),
            });
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        let unresolved = self.tracker.lock().unresolved().len();
        let cancelled = self.observed_cancel || unresolved > 0;

        info!(
            job_id = %self.job_id,
            succeeded = self.succeeded,
            failed = self.failed,
            cancelled = self.cancelled,
            skipped = self.skipped.len(),
            unresolved,
            "Aggregation job finished"
        );
        if let Some(events) = &self.events {
            events.publish_aggregation_event(AggregationEvent::JobFinished {
                job_id: self.job_id,
                succeeded: self.succeeded,
                failed: self.failed,
                cancelled_keys: self.cancelled,
                cancelled,
                finished_at: Utc::now(),
            });
        }
    }

    /// A task that died outside the per-key panic guard (runtime shutdown or
    /// an external abort) still resolves its key, as a failure.
    fn lost(&mut self, join_error: JoinError) -> Option<(K, Result<V, OperationError>)> {
        let Some(key) = self.task_keys.remove(&join_error.id()) else {
            warn!(job_id = %self.job_id, "Unknown aggregation task lost: {}", join_error);
            return None;
        };
        warn!(job_id = %self.job_id, key = ?key, "Aggregation task lost: {}", join_error);

        let error = if join_error.is_panic() {
            OperationError::Panicked(panic_message(join_error.into_panic().as_ref()))
        } else {
            OperationError::failed(format!("task lost before resolving: {}", join_error))
        };

        // The task may have died before marking itself running.
        {
            let mut tracker = self.tracker.lock();
            if tracker.state(&key) == Some(KeyState::NotStarted) {
                let _ = tracker.transition(&key, KeyState::Running);
            }
        }
        let result = Err(error);
        self.settle(&key, &result, true);
        Some((key, result))
    }
}

impl<K, V> Stream for CompletionStream<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
    V: Send + 'static,
{
    type Item = (K, Result<V, OperationError>);

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        loop {
            match this.tasks.poll_join_next_with_id(cx) {
                Poll::Ready(Some(Ok((
                    id,
                    KeyOutcome::Resolved {
                        key,
                        result,
                        started,
                    },
                )))) => {
                    this.task_keys.remove(&id);
                    this.settle(&key, &result, started);
                    return Poll::Ready(Some((key, result)));
                }
                Poll::Ready(Some(Ok((id, KeyOutcome::Aborted { key })))) => {
                    this.task_keys.remove(&id);
                    debug!(job_id = %this.job_id, key = ?key, "Key aborted in flight");
                }
                Poll::Ready(Some(Err(join_error))) => {
                    if let Some(item) = this.lost(join_error) {
                        return Poll::Ready(Some(item));
                    }
                }
                Poll::Ready(None) => {
                    this.finish();
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.finished {
            (0, Some(0))
        } else {
            (0, Some(self.tasks.len()))
        }
    }
}

impl<K, V> FusedStream for CompletionStream<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
    V: Send + 'static,
{
    fn is_terminated(&self) -> bool {
        self.finished
    }
}

async fn run_key<K, V, F, Fut>(context: Arc<TaskContext<K, F>>, key: K) -> KeyOutcome<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
    V: Send + 'static,
    F: Fn(K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, OperationError>> + Send + 'static,
{
    let _permit = match &context.permits {
        Some(permits) => tokio::select! {
            permit = permits.clone().acquire_owned() => permit.ok(),
            _ = context.token.cancelled() => None,
        },
        None => None,
    };

    if context.token.is_cancelled() {
        context.token.acknowledge();
        return KeyOutcome::Resolved {
            key,
            result: Err(OperationError::Cancelled),
            started: false,
        };
    }

    if let Err(e) = context.tracker.lock().transition(&key, KeyState::Running) {
        warn!("Ignoring key bookkeeping error: {}", e);
    }

    let factory: &F = &context.factory;
    let call_key = key.clone();
    let operation = AssertUnwindSafe(async move { factory(call_key).await }).catch_unwind();

    let limit = context.timeout;
    let guarded = async move {
        let outcome = match limit {
            Some(limit) => match tokio::time::timeout(limit, operation).await {
                Ok(outcome) => outcome,
                Err(_) => return Err(OperationError::TimedOut(limit)),
            },
            None => operation.await,
        };
        outcome.unwrap_or_else(|payload| Err(OperationError::Panicked(panic_message(payload.as_ref()))))
    };

    match context.cancel_policy {
        CancelPolicy::SkipUnstarted => KeyOutcome::Resolved {
            key,
            result: guarded.await,
            started: true,
        },
        CancelPolicy::AbortInFlight => tokio::select! {
            biased;
            _ = context.token.cancelled() => {
                context.token.acknowledge();
                KeyOutcome::Aborted { key }
            }
            result = guarded => KeyOutcome::Resolved {
                key,
                result,
                started: true,
            },
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn settings() -> StreamSettings {
        StreamSettings {
            job_id: JobId::new(),
            max_concurrency: None,
            timeout: None,
            cancel_policy: CancelPolicy::SkipUnstarted,
            events: None,
        }
    }

    #[tokio::test]
    async fn test_lost_task_still_resolves_its_key() {
        let mut stream = CompletionStream::spawn(
            vec![1u32, 2],
            |_k| futures::future::pending::<Result<u32, OperationError>>(),
            &CancellationToken::new(),
            settings(),
        )
        .unwrap();

        while stream.key_state(&1) != Some(KeyState::Running)
            || stream.key_state(&2) != Some(KeyState::Running)
        {
            tokio::task::yield_now().await;
        }
        stream.tasks.abort_all();

        let mut lost = Vec::new();
        while let Some((key, result)) = stream.next().await {
            assert!(matches!(result, Err(OperationError::Failed(_))));
            lost.push(key);
        }
        lost.sort_unstable();

        assert_eq!(lost, vec![1, 2]);
        assert!(stream.unresolved().is_empty());
        assert!(stream.skipped().is_empty());
        assert_eq!(stream.key_state(&2), Some(KeyState::Failed));
    }

    #[tokio::test]
    async fn test_finished_event_counts_cancellations_apart() {
        let bus = EventBus::new(16);
        let mut receiver = bus.subscribe();
        let token = CancellationToken::new();
        token.cancel();

        let mut stream = CompletionStream::spawn(
            vec!["a", "b"],
            |_k| async { Ok::<_, OperationError>(()) },
            &token,
            StreamSettings {
                events: Some(bus),
                ..settings()
            },
        )
        .unwrap();
        while stream.next().await.is_some() {}

        let mut finished = None;
        while let Ok(event) = receiver.try_recv() {
            if let crate::infrastructure::event_bus::DomainEvent::Aggregation(
                AggregationEvent::JobFinished {
                    failed,
                    cancelled_keys,
                    cancelled,
                    ..
                },
            ) = event
            {
                finished = Some((failed, cancelled_keys, cancelled));
            }
        }
        assert_eq!(finished, Some((0, 2, true)));
    }
}
