// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Account use cases.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** One serialized resource per account behind the `AccountService` trait

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tandem_core::infrastructure::{ActorResource, LockedResource};
use tandem_core::{ResourceError, SerializedResource};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::{AccountId, Deposit, Ledger, LedgerError, Receipt, TransactionRecord, Withdraw};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AccountError {
    #[error("Account {0} not found")]
    NotFound(AccountId),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Account resource unavailable: {0}")]
    Resource(#[from] ResourceError),
}

#[async_trait]
pub trait AccountService: Send + Sync {
    async fn open_account(&self, opening_balance: f64) -> Result<AccountId, AccountError>;
    async fn deposit(&self, id: AccountId, amount: f64) -> Result<Receipt, AccountError>;
    async fn withdraw(&self, id: AccountId, amount: f64) -> Result<Receipt, AccountError>;
    async fn balance(&self, id: AccountId) -> Result<f64, AccountError>;
    async fn statement(&self, id: AccountId) -> Result<Vec<TransactionRecord>, AccountError>;
    /// Drain the account's queue and return its final ledger.
    async fn close_account(&self, id: AccountId) -> Result<Ledger, AccountError>;
}

type ResourceFactory<R> = Box<dyn Fn(&AccountId, Ledger) -> R + Send + Sync>;
type LatencySource = Box<dyn Fn() -> Duration + Send + Sync>;

/// [`AccountService`] keeping one serialized resource per account.
pub struct StandardAccountService<R> {
    accounts: RwLock<HashMap<AccountId, Arc<R>>>,
    make_resource: ResourceFactory<R>,
    latency: LatencySource,
}

impl StandardAccountService<ActorResource<Ledger>> {
    /// Each account gets its own worker task.
    pub fn actor_backed() -> Self {
        Self::new(|id, ledger| ActorResource::new(format!("account-{}", id), ledger))
    }
}

impl StandardAccountService<LockedResource<Ledger>> {
    pub fn lock_backed() -> Self {
        Self::new(|id, ledger| LockedResource::new(format!("account-{}", id), ledger))
    }
}

impl<R> StandardAccountService<R>
where
    R: SerializedResource<Ledger> + 'static,
{
    pub fn new(make_resource: impl Fn(&AccountId, Ledger) -> R + Send + Sync + 'static) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            make_resource: Box::new(make_resource),
            latency: Box::new(|| Duration::ZERO),
        }
    }

    /// Processing time each deposit and withdrawal holds its account for.
    pub fn with_latency(mut self, latency: impl Fn() -> Duration + Send + Sync + 'static) -> Self {
        self.latency = Box::new(latency);
        self
    }

    pub async fn account_count(&self) -> usize {
        self.accounts.read().await.len()
    }

    async fn account(&self, id: AccountId) -> Result<Arc<R>, AccountError> {
        self.accounts
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(AccountError::NotFound(id))
    }
}

#[async_trait]
impl<R> AccountService for StandardAccountService<R>
where
    R: SerializedResource<Ledger> + 'static,
{
    async fn open_account(&self, opening_balance: f64) -> Result<AccountId, AccountError> {
        let ledger = Ledger::new(opening_balance)?;
        let id = AccountId::new();
        let resource = Arc::new((self.make_resource)(&id, ledger));

        self.accounts.write().await.insert(id, resource);
        info!(account_id = %id, opening_balance, "Opened account");
        Ok(id)
    }

    async fn deposit(&self, id: AccountId, amount: f64) -> Result<Receipt, AccountError> {
        let account = self.account(id).await?;
        let deposit = Deposit::new(amount).with_processing((self.latency)());
        let receipt = account.apply(deposit).await??;

        debug!(account_id = %id, sequence = receipt.sequence, "Deposit recorded");
        Ok(receipt)
    }

    async fn withdraw(&self, id: AccountId, amount: f64) -> Result<Receipt, AccountError> {
        let account = self.account(id).await?;
        let withdraw = Withdraw::new(amount).with_processing((self.latency)());
        let receipt = account.apply(withdraw).await??;

        debug!(account_id = %id, sequence = receipt.sequence, "Withdrawal recorded");
        Ok(receipt)
    }

    async fn balance(&self, id: AccountId) -> Result<f64, AccountError> {
        let account = self.account(id).await?;
        Ok(account.read().await?.balance())
    }

    async fn statement(&self, id: AccountId) -> Result<Vec<TransactionRecord>, AccountError> {
        let account = self.account(id).await?;
        Ok(account.read().await?.history().to_vec())
    }

    async fn close_account(&self, id: AccountId) -> Result<Ledger, AccountError> {
        let account = self
            .accounts
            .write()
            .await
            .remove(&id)
            .ok_or(AccountError::NotFound(id))?;

        let ledger = account.shutdown().await?;
        info!(
            account_id = %id,
            balance = ledger.balance(),
            transactions = ledger.history().len(),
            "Closed account"
        );
        Ok(ledger)
    }
}
