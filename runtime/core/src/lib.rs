// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `tandem-core` - Serialized Resources and Fan-Out Aggregation
//!
//! Two concurrency mechanisms shared by every Tandem crate:
//!
//! - **Serialized resources**: mutable state reachable only through an ordered
//!   mutation queue, so check-then-act sequences can never interleave.
//! - **Aggregation**: a batch of independent keyed operations run concurrently,
//!   collected all at once or as they complete, with per-key failure isolation.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `Mutation`, `SerializedResource`, `CancellationToken`, `AggregationJob`, errors, events, config |
//! | [`application`] | Application | `Aggregator`, `CompletionStream` |
//! | [`infrastructure`] | Infrastructure | `ActorResource`, `LockedResource`, `EventBus`, `Continuation`, `BackgroundRegistry` |

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
