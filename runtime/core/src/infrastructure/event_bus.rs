// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Domain Events
//
// In-memory event streaming over tokio broadcast channels. Lets CLIs and
// observers follow resources and aggregation jobs as they progress.
// Events are not persisted.

use crate::domain::aggregation::JobId;
use crate::domain::events::{AggregationEvent, ResourceEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Unified domain event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Resource(ResourceEvent),
    Aggregation(AggregationEvent),
}

/// Event bus for publishing and subscribing to domain events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<DomainEvent>>,
}

impl EventBus {
    /// Capacity is the number of events buffered before the oldest are
    /// dropped for slow receivers.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish_resource_event(&self, event: ResourceEvent) {
        self.publish(DomainEvent::Resource(event));
    }

    pub fn publish_aggregation_event(&self, event: AggregationEvent) {
        self.publish(DomainEvent::Aggregation(event));
    }

    fn publish(&self, event: DomainEvent) {
        debug!("Publishing event: {:?}", event);

        // send() only fails when nobody is subscribed
        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to the events of a single aggregation job
    pub fn subscribe_job(&self, job_id: JobId) -> JobEventReceiver {
        JobEventReceiver {
            receiver: self.sender.subscribe(),
            job_id,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all domain events
pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    pub fn try_recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver filtered to one aggregation job
pub struct JobEventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
    job_id: JobId,
}

impl JobEventReceiver {
    pub async fn recv(&mut self) -> Result<AggregationEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if let DomainEvent::Aggregation(event) = event {
                if event.job_id() == self.job_id {
                    return Ok(event);
                }
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        event_bus.publish_resource_event(ResourceEvent::MutationApplied {
            resource: "account".to_string(),
            sequence: 1,
            applied_at: Utc::now(),
        });

        match receiver.recv().await.unwrap() {
            DomainEvent::Resource(ResourceEvent::MutationApplied { sequence, .. }) => {
                assert_eq!(sequence, 1);
            }
            other => panic!("Wrong event type received: {:?}", other),
        }
        assert!(matches!(receiver.try_recv(), Err(EventBusError::Empty)));
    }

    #[tokio::test]
    async fn test_job_event_filtering() {
        let event_bus = EventBus::new(10);
        let job_id = JobId::new();
        let mut receiver = event_bus.subscribe_job(job_id);

        event_bus.publish_aggregation_event(AggregationEvent::JobStarted {
            job_id: JobId::new(),
            key_count: 3,
            started_at: Utc::now(),
        });
        event_bus.publish_aggregation_event(AggregationEvent::JobStarted {
            job_id,
            key_count: 5,
            started_at: Utc::now(),
        });

        match receiver.recv().await.unwrap() {
            AggregationEvent::JobStarted { key_count, .. } => assert_eq!(key_count, 5),
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();
        assert_eq!(event_bus.subscriber_count(), 2);

        event_bus.publish_resource_event(ResourceEvent::ResourceClosed {
            resource: "counter".to_string(),
            mutations_applied: 100,
            closed_at: Utc::now(),
        });

        let _ = receiver1.recv().await.unwrap();
        let _ = receiver2.recv().await.unwrap();
    }
}
