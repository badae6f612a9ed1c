// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `tandem-ledger` - Account Ledgers on Serialized Resources
//!
//! Bank-style accounts whose balance checks and writes can never interleave,
//! even when a withdrawal spends time "processing" between the two.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `Ledger`, `TransactionRecord`, `Deposit` / `Withdraw` mutations, `AccountId` |
//! | [`application`] | Application | `AccountService` trait, `StandardAccountService` |
//!
//! ## Key Concepts
//!
//! - **Ledger**: balance plus an append-only transaction history. A withdrawal
//!   either fully applies or is fully rejected with `InsufficientFunds`.
//! - **Account**: one ledger behind one serialized resource. Accounts are
//!   independent; mutations on different accounts run concurrently.

pub mod domain;
pub mod application;

pub use domain::*;
