// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Error taxonomy shared by resources and aggregation jobs.
//!
//! Every failure is attributable to a single mutation call or a single key;
//! there is no global error channel.

use std::time::Duration;
use thiserror::Error;

/// Outcome error of one keyed operation or one rejected mutation.
#[derive(Debug, Error)]
pub enum OperationError {
    /// Local business-rule rejection (e.g. insufficient funds).
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// The operation itself failed.
    #[error("Operation failed: {0:#}")]
    Failed(anyhow::Error),

    /// Cooperative cancellation observed before or during the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// Transport failure surfaced by a collaborator, passed through opaquely.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Decoding failure surfaced by a collaborator, passed through opaquely.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The caller stopped waiting; the underlying work may still be running.
    #[error("Operation timed out after {0:?}")]
    TimedOut(Duration),

    /// The operation panicked. Siblings are unaffected.
    #[error("Operation panicked: {0}")]
    Panicked(String),
}

impl OperationError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(anyhow::anyhow!(message.into()))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Short label used for metrics and events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PreconditionFailed(_) => "precondition_failed",
            Self::Failed(_) => "failed",
            Self::Cancelled => "cancelled",
            Self::Transport(_) => "transport",
            Self::Decode(_) => "decode",
            Self::TimedOut(_) => "timed_out",
            Self::Panicked(_) => "panicked",
        }
    }
}

/// Infrastructure-level failure of a serialized resource.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("Resource is closed")]
    Closed,

    #[error("Mutation was dropped before it completed")]
    Abandoned,
}

/// Caller contract violations reported before an aggregation spawns anything.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    #[error("Duplicate key in batch: {0}")]
    DuplicateKey(String),
}

/// Illegal bookkeeping step on an aggregation job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("Key {0} is not part of this job")]
    UnknownKey(String),

    #[error("Key {key} cannot move from {from:?} to {to:?}")]
    IllegalTransition {
        key: String,
        from: crate::domain::aggregation::KeyState,
        to: crate::domain::aggregation::KeyState,
    },

    #[error("Key {0} was already resolved")]
    AlreadyResolved(String),
}
