// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the serialized resource contract.
//!
//! Every scenario runs against both strategies (actor mailbox and FIFO lock)
//! through the shared `SerializedResource` trait:
//! - check-then-act mutations that await between the check and the write
//!   never interleave
//! - concurrent increments are never lost
//! - reads observe every mutation submitted before them
//! - a caller that stops waiting never tears or discards its mutation

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tandem_core::infrastructure::{ActorResource, LockedResource};
use tandem_core::{Mutation, OperationError, SerializedResource};

/// Withdraw that checks the balance, "thinks" for a while, then writes.
struct SlowWithdraw {
    amount: u64,
    think: Duration,
}

#[async_trait]
impl Mutation<u64> for SlowWithdraw {
    type Output = Result<u64, OperationError>;

    async fn apply(self, balance: &mut u64) -> Self::Output {
        if *balance < self.amount {
            return Err(OperationError::PreconditionFailed(format!(
                "cannot withdraw {} from {}",
                self.amount, balance
            )));
        }
        tokio::time::sleep(self.think).await;
        *balance -= self.amount;
        Ok(*balance)
    }
}

/// Writes twice with a pause in between, so a torn write is observable.
struct TwoStepIncrement {
    pause: Duration,
}

#[async_trait]
impl Mutation<u64> for TwoStepIncrement {
    type Output = u64;

    async fn apply(self, n: &mut u64) -> u64 {
        *n += 1;
        tokio::time::sleep(self.pause).await;
        *n += 1;
        *n
    }
}

async fn competing_withdrawals<R>(resource: Arc<R>)
where
    R: SerializedResource<u64> + 'static,
{
    let first = resource.apply(SlowWithdraw {
        amount: 300,
        think: Duration::from_millis(100),
    });
    let second = resource.apply(SlowWithdraw {
        amount: 500,
        think: Duration::from_millis(100),
    });
    let (first, second) = futures::join!(first, second);

    // Submitted first, so the 300 withdrawal wins and the 500 one sees 200.
    assert_eq!(first.unwrap().unwrap(), 200);
    assert!(matches!(
        second.unwrap(),
        Err(OperationError::PreconditionFailed(_))
    ));
    assert_eq!(resource.read().await.unwrap(), 200);
}

async fn concurrent_increments<R>(resource: Arc<R>)
where
    R: SerializedResource<u64> + 'static,
{
    let handles: Vec<_> = (0..100)
        .map(|_| {
            let resource = resource.clone();
            tokio::spawn(async move { resource.mutate(|n: &mut u64| *n += 1).await })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(resource.read().await.unwrap(), 100);
}

async fn abandoned_callers_keep_writes_whole<R>(resource: Arc<R>)
where
    R: SerializedResource<u64> + 'static,
{
    let pause = Duration::from_millis(100);

    // Gives up while its mutation is mid-way.
    let running = tokio::time::timeout(
        Duration::from_millis(10),
        resource.apply(TwoStepIncrement { pause }),
    )
    .await;
    assert!(running.is_err());

    // Gives up while its mutation is still queued behind the first.
    let queued = tokio::time::timeout(
        Duration::from_millis(10),
        resource.apply(TwoStepIncrement { pause }),
    )
    .await;
    assert!(queued.is_err());

    // The read queues behind both, which ran to completion.
    assert_eq!(resource.read().await.unwrap(), 4);
    assert_eq!(resource.mutate(|n: &mut u64| *n).await.unwrap(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_actor_abandoned_caller_keeps_write_whole() {
    abandoned_callers_keep_writes_whole(Arc::new(ActorResource::new("counter", 0u64))).await;
}

#[tokio::test(start_paused = true)]
async fn test_locked_abandoned_caller_keeps_write_whole() {
    abandoned_callers_keep_writes_whole(Arc::new(LockedResource::new("counter", 0u64))).await;
}

#[tokio::test(start_paused = true)]
async fn test_actor_withdrawals_never_overdraw() {
    competing_withdrawals(Arc::new(ActorResource::new("account", 500u64))).await;
}

#[tokio::test(start_paused = true)]
async fn test_locked_withdrawals_never_overdraw() {
    competing_withdrawals(Arc::new(LockedResource::new("account", 500u64))).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_actor_increments_not_lost() {
    concurrent_increments(Arc::new(ActorResource::new("counter", 0u64))).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_locked_increments_not_lost() {
    concurrent_increments(Arc::new(LockedResource::new("counter", 0u64))).await;
}

#[tokio::test]
async fn test_read_after_write_is_consistent() {
    let resource = ActorResource::new("log", Vec::<String>::new());

    // Fire-and-forget style submission followed by a read: the read is
    // queued behind the write.
    let write = resource.mutate(|log: &mut Vec<String>| log.push("opened".to_string()));
    let read = resource.read();
    let (write, read) = futures::join!(write, read);

    write.unwrap();
    assert_eq!(read.unwrap(), vec!["opened".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_precondition_leaves_state_untouched() {
    let resource = LockedResource::new("account", 100u64);

    let result = resource
        .apply(SlowWithdraw {
            amount: 250,
            think: Duration::from_millis(10),
        })
        .await
        .unwrap();

    assert!(result.is_err());
    assert_eq!(resource.read().await.unwrap(), 100);
    assert_eq!(resource.mutations_applied(), 1);
}
