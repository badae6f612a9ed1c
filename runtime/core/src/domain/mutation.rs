// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Serialized Resource Contract
//!
//! A serialized resource owns a state `S` and applies [`Mutation`]s to it one
//! at a time, strictly in the order they were submitted. Nothing outside the
//! resource can touch `S`; callers only ever get cloned snapshots.
//!
//! The contract is implemented twice in `infrastructure`:
//!
//! - `ActorResource` - a dedicated worker task fed by an ordered mailbox.
//! - `LockedResource` - a FIFO-fair async mutex.
//!
//! Both are interchangeable from the caller's point of view.

use async_trait::async_trait;

use crate::domain::error::ResourceError;

/// A unit of work applied to a resource's state while holding exclusivity.
///
/// The mutation may await (e.g. to model processing latency); no other
/// mutation touches the state until `apply` returns. Business-rule failures
/// belong in `Output`, typically as a `Result`.
#[async_trait]
pub trait Mutation<S>: Send + 'static
where
    S: Send,
{
    type Output: Send + 'static;

    async fn apply(self, state: &mut S) -> Self::Output;
}

/// Adapts a synchronous closure into a [`Mutation`].
pub struct FnMutation<F>(pub F);

#[async_trait]
impl<S, F, T> Mutation<S> for FnMutation<F>
where
    S: Send + 'static,
    F: FnOnce(&mut S) -> T + Send + 'static,
    T: Send + 'static,
{
    type Output = T;

    async fn apply(self, state: &mut S) -> T {
        (self.0)(state)
    }
}

#[async_trait]
pub trait SerializedResource<S>: Send + Sync
where
    S: Clone + Send + 'static,
{
    /// Consistent snapshot, taken after every mutation submitted before it.
    async fn read(&self) -> Result<S, ResourceError>;

    /// Enqueue `mutation` and wait for its output.
    async fn apply<M>(&self, mutation: M) -> Result<M::Output, ResourceError>
    where
        M: Mutation<S>;

    /// Refuse new work, let everything already queued finish, and return the
    /// final state. A second call fails with `ResourceError::Closed`.
    async fn shutdown(&self) -> Result<S, ResourceError>;

    /// Closure form of [`apply`](Self::apply).
    async fn mutate<F, T>(&self, op: F) -> Result<T, ResourceError>
    where
        F: FnOnce(&mut S) -> T + Send + 'static,
        T: Send + 'static,
    {
        self.apply(FnMutation(op)).await
    }
}
