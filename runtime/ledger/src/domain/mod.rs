// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Ledger Domain Layer
//!
//! Pure ledger types and the mutations applied to them. No I/O.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`ledger`] | `Ledger`, `TransactionRecord`, `Receipt`, `LedgerError`, `AccountId` |
//! | [`mutations`] | `Deposit`, `Withdraw` |

pub mod ledger;
pub mod mutations;

pub use ledger::*;
pub use mutations::*;
