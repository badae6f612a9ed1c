// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Aggregation Job Bookkeeping
//!
//! - [`KeyState`] - per-key state machine.
//! - [`KeyTracker`] - state of every key in a batch, shared between the
//!   spawned tasks (which mark keys `Running`) and the single consumer (which
//!   resolves them).
//! - [`AggregationJob`] - the collect-all partition of results and failures.
//! - [`AggregationReport`] / [`JobOutcome`] - what `run_all` hands back.
//!
//! ## Key State Machine
//! | From | To |
//! |------|----|
//! | `NotStarted` | `Running`, `Cancelled` |
//! | `Running` | `Succeeded`, `Failed`, `Cancelled` |
//!
//! Terminal states are final. The aggregator never retries.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::{AggregationError, JobError, OperationError};

/// Unique identifier for one aggregation batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyState {
    NotStarted,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl KeyState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    pub fn can_transition_to(&self, next: KeyState) -> bool {
        matches!(
            (self, next),
            (Self::NotStarted, Self::Running)
                | (Self::NotStarted, Self::Cancelled)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Cancelled)
        )
    }

    /// Terminal state a finished operation maps to.
    pub fn for_result<V>(result: &Result<V, OperationError>) -> Self {
        match result {
            Ok(_) => Self::Succeeded,
            Err(OperationError::Cancelled) => Self::Cancelled,
            Err(_) => Self::Failed,
        }
    }
}

/// Rejects batches that name the same key twice.
pub fn ensure_unique_keys<K>(keys: &[K]) -> Result<(), AggregationError>
where
    K: Eq + Hash + Debug,
{
    let mut seen = HashSet::with_capacity(keys.len());
    for key in keys {
        if !seen.insert(key) {
            return Err(AggregationError::DuplicateKey(format!("{:?}", key)));
        }
    }
    Ok(())
}

/// Per-key states for one batch.
#[derive(Debug, Clone)]
pub struct KeyTracker<K> {
    states: HashMap<K, KeyState>,
}

impl<K> KeyTracker<K>
where
    K: Eq + Hash + Clone + Debug,
{
    pub fn new(keys: &[K]) -> Result<Self, AggregationError> {
        ensure_unique_keys(keys)?;
        let states = keys
            .iter()
            .map(|key| (key.clone(), KeyState::NotStarted))
            .collect();
        Ok(Self { states })
    }

    pub fn state(&self, key: &K) -> Option<KeyState> {
        self.states.get(key).copied()
    }

    pub fn transition(&mut self, key: &K, next: KeyState) -> Result<(), JobError> {
        let current = self
            .states
            .get_mut(key)
            .ok_or_else(|| JobError::UnknownKey(format!("{:?}", key)))?;

        if !current.can_transition_to(next) {
            return Err(JobError::IllegalTransition {
                key: format!("{:?}", key),
                from: *current,
                to: next,
            });
        }

        *current = next;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn count(&self, state: KeyState) -> usize {
        self.states.values().filter(|s| **s == state).count()
    }

    pub fn unresolved(&self) -> Vec<K> {
        self.states
            .iter()
            .filter(|(_, state)| !state.is_terminal())
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn is_finished(&self) -> bool {
        self.states.values().all(KeyState::is_terminal)
    }
}

/// Collect-all partition of a batch.
///
/// # Invariants
///
/// - A key is in at most one of `results` or `failures`.
/// - A key leaves `pending` exactly when it is recorded.
#[derive(Debug)]
pub struct AggregationJob<K, V> {
    id: JobId,
    pending: HashSet<K>,
    results: HashMap<K, V>,
    failures: HashMap<K, OperationError>,
    started_at: DateTime<Utc>,
}

impl<K, V> AggregationJob<K, V>
where
    K: Eq + Hash + Clone + Debug,
{
    pub fn new(id: JobId, keys: &[K]) -> Result<Self, AggregationError> {
        ensure_unique_keys(keys)?;
        Ok(Self {
            id,
            pending: keys.iter().cloned().collect(),
            results: HashMap::with_capacity(keys.len()),
            failures: HashMap::new(),
            started_at: Utc::now(),
        })
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn pending(&self) -> &HashSet<K> {
        &self.pending
    }

    pub fn is_settled(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn record(&mut self, key: K, result: Result<V, OperationError>) -> Result<(), JobError> {
        if !self.pending.remove(&key) {
            if self.results.contains_key(&key) || self.failures.contains_key(&key) {
                return Err(JobError::AlreadyResolved(format!("{:?}", key)));
            }
            return Err(JobError::UnknownKey(format!("{:?}", key)));
        }

        match result {
            Ok(value) => {
                self.results.insert(key, value);
            }
            Err(error) => {
                self.failures.insert(key, error);
            }
        }
        Ok(())
    }

    /// Close the job. Keys still pending are reported as unresolved. A
    /// `Cancelled` failure also marks the job as cancelled, since the
    /// operation observed the token itself.
    pub fn finish(self, skipped: Vec<K>) -> AggregationReport<K, V> {
        let unresolved: Vec<K> = self.pending.into_iter().collect();
        let observed_cancel = self.failures.values().any(OperationError::is_cancelled);
        let outcome = if skipped.is_empty() && unresolved.is_empty() && !observed_cancel {
            JobOutcome::Completed
        } else {
            JobOutcome::Cancelled { skipped, unresolved }
        };

        let elapsed = (Utc::now() - self.started_at)
            .to_std()
            .unwrap_or_default();

        AggregationReport {
            job_id: self.id,
            results: self.results,
            failures: self.failures,
            outcome,
            elapsed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome<K> {
    /// Every key ran to a terminal state.
    Completed,
    /// Cancellation was observed. `skipped` keys never started and are in
    /// `failures` as `Cancelled`; `unresolved` keys were aborted in flight and
    /// are in neither map.
    Cancelled { skipped: Vec<K>, unresolved: Vec<K> },
}

#[derive(Debug)]
pub struct AggregationReport<K, V> {
    pub job_id: JobId,
    pub results: HashMap<K, V>,
    pub failures: HashMap<K, OperationError>,
    pub outcome: JobOutcome<K>,
    pub elapsed: Duration,
}

impl<K, V> AggregationReport<K, V>
where
    K: Eq + Hash,
{
    pub fn is_cancelled(&self) -> bool {
        matches!(self.outcome, JobOutcome::Cancelled { .. })
    }

    /// Number of keys that reached `results` or `failures`.
    pub fn resolved(&self) -> usize {
        self.results.len() + self.failures.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_state_transitions() {
        assert!(KeyState::NotStarted.can_transition_to(KeyState::Running));
        assert!(KeyState::NotStarted.can_transition_to(KeyState::Cancelled));
        assert!(KeyState::Running.can_transition_to(KeyState::Failed));
        assert!(!KeyState::NotStarted.can_transition_to(KeyState::Succeeded));
        assert!(!KeyState::Succeeded.can_transition_to(KeyState::Running));
        assert!(!KeyState::Cancelled.can_transition_to(KeyState::Succeeded));
        assert!(KeyState::Failed.is_terminal());
        assert!(!KeyState::Running.is_terminal());
    }

    #[test]
    fn test_state_for_result() {
        assert_eq!(KeyState::for_result::<u8>(&Ok(1)), KeyState::Succeeded);
        assert_eq!(
            KeyState::for_result::<u8>(&Err(OperationError::Cancelled)),
            KeyState::Cancelled
        );
        assert_eq!(
            KeyState::for_result::<u8>(&Err(OperationError::Decode("x".into()))),
            KeyState::Failed
        );
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let err = KeyTracker::new(&[1, 2, 1]).unwrap_err();
        assert_eq!(err, AggregationError::DuplicateKey("1".to_string()));
        assert!(AggregationJob::<i32, f64>::new(JobId::new(), &[3, 3]).is_err());
    }

    #[test]
    fn test_tracker_rejects_illegal_transition() {
        let mut tracker = KeyTracker::new(&["a", "b"]).unwrap();
        tracker.transition(&"a", KeyState::Running).unwrap();
        tracker.transition(&"a", KeyState::Succeeded).unwrap();

        let err = tracker.transition(&"a", KeyState::Failed).unwrap_err();
        assert!(matches!(err, JobError::IllegalTransition { .. }));
        assert_eq!(tracker.state(&"a"), Some(KeyState::Succeeded));

        assert!(matches!(
            tracker.transition(&"zzz", KeyState::Running),
            Err(JobError::UnknownKey(_))
        ));
        assert_eq!(tracker.unresolved(), vec!["b"]);
        assert!(!tracker.is_finished());
    }

    #[test]
    fn test_job_partition_is_disjoint() {
        let mut job = AggregationJob::new(JobId::new(), &[1, 2, 3]).unwrap();
        job.record(1, Ok(4.5)).unwrap();
        job.record(2, Err(OperationError::failed("invalid id"))).unwrap();

        assert_eq!(
            job.record(2, Ok(1.0)),
            Err(JobError::AlreadyResolved("2".to_string()))
        );
        assert_eq!(job.record(9, Ok(1.0)), Err(JobError::UnknownKey("9".to_string())));
        assert!(!job.is_settled());

        job.record(3, Ok(6.0)).unwrap();
        assert!(job.is_settled());

        let report = job.finish(Vec::new());
        assert_eq!(report.outcome, JobOutcome::Completed);
        assert_eq!(report.resolved(), 3);
        assert_eq!(report.results.len(), 2);
        assert!(report.failures.contains_key(&2));
        assert!(!report.results.contains_key(&2));
    }

    #[test]
    fn test_operation_observed_cancel_marks_job() {
        let mut job = AggregationJob::<u8, u8>::new(JobId::new(), &[1]).unwrap();
        job.record(1, Err(OperationError::Cancelled)).unwrap();

        let report = job.finish(Vec::new());
        assert!(report.is_cancelled());
        assert!(report.failures[&1].is_cancelled());
    }

    #[test]
    fn test_unfinished_job_reports_unresolved() {
        let mut job = AggregationJob::<&str, u32>::new(JobId::new(), &["x", "y"]).unwrap();
        job.record("x", Ok(1)).unwrap();

        let report = job.finish(Vec::new());
        assert!(report.is_cancelled());
        assert_eq!(
            report.outcome,
            JobOutcome::Cancelled {
                skipped: vec![],
                unresolved: vec!["y"],
            }
        );
        assert!(!report.failures.contains_key("y"));
    }
}
