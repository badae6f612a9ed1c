// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Cooperative Cancellation
//!
//! [`CancellationToken`] is a tri-state signal:
//!
//! | State | Meaning |
//! |-------|---------|
//! | `Active` | No cancellation requested |
//! | `CancelRequested` | A caller asked for cancellation; operations stop at their next checkpoint |
//! | `Acknowledged` | An operation observed the request and reported `Cancelled` |
//!
//! Cancellation is advisory. An operation that never polls the token runs to
//! completion. Waiting is delegated to `tokio_util`'s token so that
//! `cancelled().await` and parent/child propagation come for free.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::error::OperationError;

const ACTIVE: u8 = 0;
const CANCEL_REQUESTED: u8 = 1;
const ACKNOWLEDGED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationState {
    Active,
    CancelRequested,
    Acknowledged,
}

/// Cloneable handle; all clones share one state.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    state: Arc<AtomicU8>,
    inner: tokio_util::sync::CancellationToken,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(ACTIVE)),
            inner: tokio_util::sync::CancellationToken::new(),
        }
    }

    /// Request cancellation. Idempotent, and never moves an acknowledged
    /// token back to `CancelRequested`.
    pub fn cancel(&self) {
        let _ = self.state.compare_exchange(
            ACTIVE,
            CANCEL_REQUESTED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        // A parent may have been cancelled without touching our own state.
        self.sync_from_parent();
        self.state.load(Ordering::Acquire) != ACTIVE
    }

    /// Record that an operation observed the request. Returns `true` only for
    /// the call that performed the `CancelRequested -> Acknowledged` step.
    pub fn acknowledge(&self) -> bool {
        self.sync_from_parent();
        self.state
            .compare_exchange(
                CANCEL_REQUESTED,
                ACKNOWLEDGED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn state(&self) -> CancellationState {
        self.sync_from_parent();
        match self.state.load(Ordering::Acquire) {
            ACTIVE => CancellationState::Active,
            CANCEL_REQUESTED => CancellationState::CancelRequested,
            _ => CancellationState::Acknowledged,
        }
    }

    /// Checkpoint helper for loop boundaries: acknowledges and returns
    /// `Err(Cancelled)` once cancellation was requested.
    pub fn check(&self) -> Result<(), OperationError> {
        if self.is_cancelled() {
            self.acknowledge();
            return Err(OperationError::Cancelled);
        }
        Ok(())
    }

    /// Resolves once cancellation has been requested on this token or any
    /// ancestor.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await;
        self.sync_from_parent();
    }

    /// A token that is cancelled whenever `self` is. Cancelling the child
    /// leaves the parent untouched.
    pub fn child_token(&self) -> Self {
        Self {
            state: Arc::new(AtomicU8::new(ACTIVE)),
            inner: self.inner.child_token(),
        }
    }

    fn sync_from_parent(&self) {
        if self.inner.is_cancelled() {
            let _ = self.state.compare_exchange(
                ACTIVE,
                CANCEL_REQUESTED,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_state_transitions() {
        let token = CancellationToken::new();
        assert_eq!(token.state(), CancellationState::Active);
        assert!(!token.is_cancelled());
        assert!(!token.acknowledge());

        token.cancel();
        assert_eq!(token.state(), CancellationState::CancelRequested);
        assert!(token.is_cancelled());

        assert!(token.acknowledge());
        assert!(!token.acknowledge());
        assert_eq!(token.state(), CancellationState::Acknowledged);

        // cancel() after acknowledgement keeps the terminal state
        token.cancel();
        assert_eq!(token.state(), CancellationState::Acknowledged);
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_clones_share_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_check_acknowledges() {
        let token = CancellationToken::new();
        assert!(token.check().is_ok());
        token.cancel();
        assert!(matches!(token.check(), Err(OperationError::Cancelled)));
        assert_eq!(token.state(), CancellationState::Acknowledged);
    }

    #[test]
    fn test_child_follows_parent_only() {
        let parent = CancellationToken::new();
        let child = parent.child_token();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        let other_child = parent.child_token();
        parent.cancel();
        assert_eq!(other_child.state(), CancellationState::CancelRequested);
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let token = CancellationToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
            waiter.state()
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();

        let state = handle.await.unwrap();
        assert_eq!(state, CancellationState::CancelRequested);
    }
}
