// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Layer
//!
//! Pure types and contracts. The only runtime dependency is the cancellation
//! primitive from `tokio-util`.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`cancellation`] | `CancellationToken`, `CancellationState` |
//! | [`error`] | `OperationError`, `ResourceError`, `AggregationError` |
//! | [`mutation`] | `Mutation`, `FnMutation`, `SerializedResource` |
//! | [`aggregation`] | `AggregationJob`, `KeyState`, `AggregationReport`, `JobOutcome` |
//! | [`events`] | `ResourceEvent`, `AggregationEvent` |
//! | [`runtime_config`] | `RuntimeConfigManifest` |

pub mod aggregation;
pub mod cancellation;
pub mod error;
pub mod events;
pub mod mutation;
pub mod runtime_config;

pub use aggregation::*;
pub use cancellation::*;
pub use error::*;
pub use mutation::*;
