// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Ledger Aggregate
//!
//! - [`Ledger`] - balance plus append-only history.
//! - [`TransactionRecord`] - one applied deposit or withdrawal.
//! - [`Receipt`] - what a successful transaction hands back.
//! - [`AccountId`] - unique identifier (UUID newtype).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tandem_core::OperationError;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub Uuid);

impl AccountId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Monotonic per ledger, starting at 1.
    pub sequence: u64,
    pub kind: TransactionKind,
    pub amount: f64,
    pub description: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub sequence: u64,
    pub kind: TransactionKind,
    pub amount: f64,
    pub balance_after: f64,
}

/// Business-rule rejections. The ledger is left untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: f64, available: f64 },

    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),
}

impl From<LedgerError> for OperationError {
    fn from(err: LedgerError) -> Self {
        OperationError::PreconditionFailed(err.to_string())
    }
}

/// Balance and history of one account.
///
/// # Invariants
///
/// - `balance` never goes negative.
/// - `history` sequences are strictly increasing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    balance: f64,
    history: Vec<TransactionRecord>,
    next_sequence: u64,
}

impl Ledger {
    /// Opening balances may be zero but not negative.
    pub fn new(opening_balance: f64) -> Result<Self, LedgerError> {
        if !opening_balance.is_finite() || opening_balance < 0.0 {
            return Err(LedgerError::InvalidAmount(opening_balance));
        }
        Ok(Self {
            balance: opening_balance,
            history: Vec::new(),
            next_sequence: 1,
        })
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn history(&self) -> &[TransactionRecord] {
        &self.history
    }

    /// Checks a withdrawal without applying it.
    pub fn ensure_can_debit(&self, amount: f64) -> Result<(), LedgerError> {
        validate_amount(amount)?;
        if self.balance < amount {
            return Err(LedgerError::InsufficientFunds {
                requested: amount,
                available: self.balance,
            });
        }
        Ok(())
    }

    pub fn credit(
        &mut self,
        amount: f64,
        description: impl Into<String>,
    ) -> Result<Receipt, LedgerError> {
        validate_amount(amount)?;
        self.balance += amount;
        Ok(self.record(TransactionKind::Deposit, amount, description.into()))
    }

    pub fn debit(
        &mut self,
        amount: f64,
        description: impl Into<String>,
    ) -> Result<Receipt, LedgerError> {
        self.ensure_can_debit(amount)?;
        self.balance -= amount;
        Ok(self.record(TransactionKind::Withdrawal, amount, description.into()))
    }

    fn record(&mut self, kind: TransactionKind, amount: f64, description: String) -> Receipt {
        // Default-constructed ledgers start at 0.
        let sequence = self.next_sequence.max(1);
        self.next_sequence = sequence + 1;

        self.history.push(TransactionRecord {
            sequence,
            kind,
            amount,
            description,
            recorded_at: Utc::now(),
        });

        Receipt {
            sequence,
            kind,
            amount,
            balance_after: self.balance,
        }
    }
}

fn validate_amount(amount: f64) -> Result<(), LedgerError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(LedgerError::InvalidAmount(amount));
    }
    Ok(())
}
