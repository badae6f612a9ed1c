// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application
//!
//! Orchestration built on the domain contracts.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Keyed fan-out and result collection

pub mod aggregator;
pub mod completion_stream;

pub use aggregator::{Aggregator, AggregatorConfig};
pub use completion_stream::CompletionStream;
