// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Tandem CLI

pub mod apr;
pub mod bank;
pub mod config;
pub mod counter;

pub use self::apr::AprCommand;
pub use self::bank::BankCommand;
pub use self::config::ConfigCommand;
pub use self::counter::CounterCommand;
