// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Infrastructure
//!
//! Concrete implementations of the domain contracts.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Resource workers, event streaming, callback bridging, detached work

pub mod actor_resource;
pub mod background;
pub mod continuation;
pub mod event_bus;
pub mod locked_resource;

pub use actor_resource::ActorResource;
pub use background::BackgroundRegistry;
pub use continuation::{with_continuation, Continuation, ContinuationError};
pub use event_bus::{DomainEvent, EventBus, EventBusError};
pub use locked_resource::LockedResource;
