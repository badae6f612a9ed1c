// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Ledger mutations.
//!
//! Both mutations may hold the ledger for a `processing` window between the
//! balance check and the write. The serialized resource guarantees nothing
//! else touches the ledger during that window.

use std::time::Duration;

use async_trait::async_trait;
use tandem_core::Mutation;
use tracing::{debug, info};

use crate::domain::ledger::{Ledger, LedgerError, Receipt};

#[derive(Debug, Clone)]
pub struct Deposit {
    pub amount: f64,
    pub processing: Duration,
    pub description: String,
}

impl Deposit {
    pub fn new(amount: f64) -> Self {
        Self {
            amount,
            processing: Duration::ZERO,
            description: "deposit".to_string(),
        }
    }

    pub fn with_processing(mut self, processing: Duration) -> Self {
        self.processing = processing;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[async_trait]
impl Mutation<Ledger> for Deposit {
    type Output = Result<Receipt, LedgerError>;

    async fn apply(self, ledger: &mut Ledger) -> Self::Output {
        if !self.processing.is_zero() {
            debug!(amount = self.amount, processing = ?self.processing, "Processing deposit");
            tokio::time::sleep(self.processing).await;
        }
        let result = ledger.credit(self.amount, self.description);
        record_metric("deposit", &result);
        result
    }
}

#[derive(Debug, Clone)]
pub struct Withdraw {
    pub amount: f64,
    pub processing: Duration,
    pub description: String,
}

impl Withdraw {
    pub fn new(amount: f64) -> Self {
        Self {
            amount,
            processing: Duration::ZERO,
            description: "withdrawal".to_string(),
        }
    }

    pub fn with_processing(mut self, processing: Duration) -> Self {
        self.processing = processing;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[async_trait]
impl Mutation<Ledger> for Withdraw {
    type Output = Result<Receipt, LedgerError>;

    async fn apply(self, ledger: &mut Ledger) -> Self::Output {
        // Check first, then hold the ledger while "processing".
        if let Err(e) = ledger.ensure_can_debit(self.amount) {
            debug!(amount = self.amount, "Withdrawal rejected: {}", e);
            record_metric("withdrawal", &Err(e.clone()));
            return Err(e);
        }

        if !self.processing.is_zero() {
            info!(
                amount = self.amount,
                processing = ?self.processing,
                "Processing withdrawal"
            );
            tokio::time::sleep(self.processing).await;
        }

        let balance_before = ledger.balance();
        let result = ledger.debit(self.amount, self.description);
        if let Ok(receipt) = &result {
            info!(
                amount = self.amount,
                balance_before,
                balance_after = receipt.balance_after,
                "Withdrawal applied"
            );
        }
        record_metric("withdrawal", &result);
        result
    }
}

fn record_metric(kind: &'static str, result: &Result<Receipt, LedgerError>) {
    let outcome = match result {
        Ok(_) => "applied",
        Err(LedgerError::InsufficientFunds { .. }) => "insufficient_funds",
        Err(LedgerError::InvalidAmount(_)) => "invalid_amount",
    };
    metrics::counter!("tandem_ledger_transactions_total", "kind" => kind, "outcome" => outcome)
        .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::TransactionKind;

    #[tokio::test(start_paused = true)]
    async fn test_withdraw_holds_ledger_while_processing() {
        let mut ledger = Ledger::new(500.0).unwrap();
        let started = tokio::time::Instant::now();

        let receipt = Withdraw::new(300.0)
            .with_processing(Duration::from_secs(2))
            .apply(&mut ledger)
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(receipt.balance_after, 200.0);
        assert_eq!(receipt.kind, TransactionKind::Withdrawal);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_withdraw_skips_processing() {
        let mut ledger = Ledger::new(200.0).unwrap();
        let started = tokio::time::Instant::now();

        let err = Withdraw::new(500.0)
            .with_processing(Duration::from_secs(3))
            .apply(&mut ledger)
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert!(started.elapsed() < Duration::from_millis(1));
    }

    #[tokio::test]
    async fn test_deposit_records_description() {
        let mut ledger = Ledger::default();
        Deposit::new(42.0)
            .with_description("salary")
            .apply(&mut ledger)
            .await
            .unwrap();

        assert_eq!(ledger.balance(), 42.0);
        assert_eq!(ledger.history()[0].description, "salary");
    }
}
