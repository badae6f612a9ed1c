// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for `StandardAccountService`.
//!
//! Withdrawals hold their account for a processing window between the balance
//! check and the write. These tests verify that concurrent withdrawals on one
//! account are serialized (never overdrawing), while different accounts
//! proceed independently.

use std::sync::Arc;
use std::time::Duration;

use tandem_ledger::application::{AccountError, AccountService, StandardAccountService};
use tandem_ledger::{LedgerError, TransactionKind};

async fn concurrent_withdrawals_never_overdraw<S: AccountService>(service: S) {
    let id = service.open_account(500.0).await.unwrap();

    let (first, second) = futures::join!(service.withdraw(id, 300.0), service.withdraw(id, 500.0));

    let applied = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(applied, 1, "exactly one withdrawal may apply");

    let balance = service.balance(id).await.unwrap();
    assert!(balance == 200.0 || balance == 0.0, "unexpected balance {}", balance);
    assert!(balance >= 0.0);

    let rejected = if first.is_err() { first } else { second };
    assert!(matches!(
        rejected,
        Err(AccountError::Ledger(LedgerError::InsufficientFunds { .. }))
    ));

    let statement = service.statement(id).await.unwrap();
    assert_eq!(statement.len(), 1);
    assert_eq!(statement[0].kind, TransactionKind::Withdrawal);
}

#[tokio::test(start_paused = true)]
async fn test_actor_accounts_serialize_withdrawals() {
    let service = StandardAccountService::actor_backed().with_latency(|| Duration::from_secs(2));
    concurrent_withdrawals_never_overdraw(service).await;
}

#[tokio::test(start_paused = true)]
async fn test_locked_accounts_serialize_withdrawals() {
    let service = StandardAccountService::lock_backed().with_latency(|| Duration::from_secs(2));
    concurrent_withdrawals_never_overdraw(service).await;
}

#[tokio::test(start_paused = true)]
async fn test_accounts_are_independent() {
    let service = StandardAccountService::actor_backed().with_latency(|| Duration::from_secs(1));
    let alice = service.open_account(100.0).await.unwrap();
    let bob = service.open_account(100.0).await.unwrap();

    let started = tokio::time::Instant::now();
    let (a, b) = futures::join!(service.withdraw(alice, 40.0), service.withdraw(bob, 60.0));
    a.unwrap();
    b.unwrap();

    // Both windows overlapped instead of queueing behind each other.
    assert!(started.elapsed() < Duration::from_millis(1500));
    assert_eq!(service.balance(alice).await.unwrap(), 60.0);
    assert_eq!(service.balance(bob).await.unwrap(), 40.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_deposits_from_many_tasks() {
    let service = Arc::new(StandardAccountService::lock_backed());
    let id = service.open_account(0.0).await.unwrap();

    let handles: Vec<_> = (0..100)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move { service.deposit(id, 1.0).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let ledger = service.close_account(id).await.unwrap();
    assert_eq!(ledger.balance(), 100.0);

    let mut sequences: Vec<u64> = ledger.history().iter().map(|r| r.sequence).collect();
    sequences.dedup();
    assert_eq!(sequences, (1..=100).collect::<Vec<u64>>());
}
