// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Aggregator
//!
//! Fans a batch of keys out to one async operation each and gathers the
//! outcomes, either all at once ([`Aggregator::run_all`]) or as they become
//! available ([`Aggregator::stream`]).
//!
//! ## Guarantees
//! - Every key resolves exactly once; one failure never cancels a sibling.
//! - Keys that have not started when cancellation is requested resolve as
//!   `Cancelled` without their operation being invoked.
//! - The job owns its children. Dropping the `run_all` future or the stream
//!   aborts every key still in flight.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Keyed fan-out with per-key failure isolation

use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

use futures::StreamExt;
use tracing::warn;

use crate::application::completion_stream::{CompletionStream, StreamSettings};
use crate::domain::aggregation::{AggregationJob, AggregationReport, JobId};
use crate::domain::cancellation::CancellationToken;
use crate::domain::error::{AggregationError, OperationError};
use crate::domain::runtime_config::{AggregatorSettings, CancelPolicy};
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// Upper bound on keys running at once. `None` starts every key.
    pub max_concurrency: Option<usize>,
    /// Per-key deadline. Expiry resolves the key as `TimedOut`.
    pub per_key_timeout: Option<Duration>,
    pub cancel_policy: CancelPolicy,
}

impl AggregatorConfig {
    pub fn from_settings(settings: &AggregatorSettings) -> Self {
        Self {
            max_concurrency: settings.max_concurrency,
            per_key_timeout: settings.per_key_timeout(),
            cancel_policy: settings.cancel_policy,
        }
    }

    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    pub fn with_per_key_timeout(mut self, timeout: Duration) -> Self {
        self.per_key_timeout = Some(timeout);
        self
    }

    pub fn with_cancel_policy(mut self, policy: CancelPolicy) -> Self {
        self.cancel_policy = policy;
        self
    }
}

#[derive(Clone, Default)]
pub struct Aggregator {
    config: AggregatorConfig,
    events: Option<EventBus>,
}

impl Aggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self {
            config,
            events: None,
        }
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Collect-as-available: yields `(key, result)` in completion order.
    ///
    /// Fails up front with [`AggregationError::DuplicateKey`] before anything
    /// is spawned.
    pub fn stream<K, V, F, Fut>(
        &self,
        keys: impl IntoIterator<Item = K>,
        factory: F,
        token: &CancellationToken,
    ) -> Result<CompletionStream<K, V>, AggregationError>
    where
        K: Eq + Hash + Clone + Debug + Send + 'static,
        V: Send + 'static,
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, OperationError>> + Send + 'static,
    {
        self.spawn(JobId::new(), keys.into_iter().collect(), factory, token)
    }

    /// Collect-all: waits for every key and partitions the outcomes.
    pub async fn run_all<K, V, F, Fut>(
        &self,
        keys: impl IntoIterator<Item = K>,
        factory: F,
        token: &CancellationToken,
    ) -> Result<AggregationReport<K, V>, AggregationError>
    where
        K: Eq + Hash + Clone + Debug + Send + 'static,
        V: Send + 'static,
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, OperationError>> + Send + 'static,
    {
        let keys: Vec<K> = keys.into_iter().collect();
        let mut job = AggregationJob::new(JobId::new(), &keys)?;
        let mut stream = self.spawn(job.id(), keys, factory, token)?;

        while let Some((key, result)) = stream.next().await {
            if let Err(e) = job.record(key, result) {
                warn!(job_id = %job.id(), "Dropping unexpected result: {}", e);
            }
        }

        Ok(job.finish(stream.skipped().to_vec()))
    }

    fn spawn<K, V, F, Fut>(
        &self,
        job_id: JobId,
        keys: Vec<K>,
        factory: F,
        token: &CancellationToken,
    ) -> Result<CompletionStream<K, V>, AggregationError>
    where
        K: Eq + Hash + Clone + Debug + Send + 'static,
        V: Send + 'static,
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, OperationError>> + Send + 'static,
    {
        CompletionStream::spawn(
            keys,
            factory,
            token,
            StreamSettings {
                job_id,
                max_concurrency: self.config.max_concurrency,
                timeout: self.config.per_key_timeout,
                cancel_policy: self.config.cancel_policy,
                events: self.events.clone(),
            },
        )
    }
}
