// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain events emitted by resources and aggregation jobs.
//!
//! Keys are carried as their `Debug` rendering so that one event type serves
//! every key type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::aggregation::{JobId, KeyState};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ResourceEvent {
    MutationApplied {
        resource: String,
        sequence: u64,
        applied_at: DateTime<Utc>,
    },
    ResourceClosed {
        resource: String,
        mutations_applied: u64,
        closed_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AggregationEvent {
    JobStarted {
        job_id: JobId,
        key_count: usize,
        started_at: DateTime<Utc>,
    },
    KeyResolved {
        job_id: JobId,
        key: String,
        state: KeyState,
        error: Option<String>,
        resolved_at: DateTime<Utc>,
    },
    JobFinished {
        job_id: JobId,
        succeeded: usize,
        /// Keys that ended `Failed`; cancellations are counted apart.
        failed: usize,
        /// Keys that ended `Cancelled`, skipped or observed.
        cancelled_keys: usize,
        /// Whether the job as a whole was cancelled (includes keys left
        /// unresolved by `AbortInFlight`).
        cancelled: bool,
        finished_at: DateTime<Utc>,
    },
}

impl AggregationEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            Self::JobStarted { job_id, .. }
            | Self::KeyResolved { job_id, .. }
            | Self::JobFinished { job_id, .. } => *job_id,
        }
    }
}
