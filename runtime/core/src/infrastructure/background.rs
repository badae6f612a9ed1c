// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Background Work Registry - tracked detached tasks
//!
//! Aggregation jobs own their children: dropping a job aborts them. Work that
//! must outlive its spawner (cache writes, audit flushes) goes through a
//! [`BackgroundRegistry`] instead, which tracks every detached task so the
//! host can cancel and drain them on shutdown.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Tracks detached work independently of aggregation jobs

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::domain::cancellation::CancellationToken;

#[derive(Clone)]
pub struct BackgroundRegistry {
    tracker: TaskTracker,
    shutdown_token: CancellationToken,
}

impl BackgroundRegistry {
    pub fn new() -> Self {
        Self {
            tracker: TaskTracker::new(),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Token cancelled when the registry shuts down
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Spawn work that is not bound to the caller's lifetime. The closure
    /// receives a child of the shutdown token to poll at its checkpoints.
    pub fn spawn_detached<F, Fut>(&self, name: &str, work: F) -> JoinHandle<()>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.to_string();
        let future = work(self.shutdown_token.child_token());

        debug!(task = %name, "Spawning detached background task");
        self.tracker.spawn(async move {
            future.await;
            debug!(task = %name, "Detached background task finished");
        })
    }

    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_closed(&self) -> bool {
        self.tracker.is_closed()
    }

    /// Request cancellation, stop accepting new work, and wait up to `grace`
    /// for tracked tasks. Returns `true` when every task finished in time.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        info!(active = self.active(), "Shutting down background registry");
        self.shutdown_token.cancel();
        self.tracker.close();

        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => {
                info!("Background registry drained");
                true
            }
            Err(_) => {
                warn!(
                    remaining = self.active(),
                    "Background tasks still running after {:?}",
                    grace
                );
                false
            }
        }
    }
}

impl Default for BackgroundRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_detached_work_outlives_spawner() {
        let registry = BackgroundRegistry::new();
        let written = Arc::new(AtomicUsize::new(0));

        {
            let written = written.clone();
            // The spawning scope ends immediately; the work keeps going.
            registry.spawn_detached("write-cache", move |_token| async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                written.fetch_add(3, Ordering::SeqCst);
            });
        }

        assert!(registry.shutdown(Duration::from_secs(1)).await);
        assert_eq!(written.load(Ordering::SeqCst), 3);
        assert_eq!(registry.active(), 0);
        assert!(registry.is_closed());
    }

    #[tokio::test]
    async fn test_cooperative_task_stops_on_shutdown() {
        let registry = BackgroundRegistry::new();
        let ticks = Arc::new(AtomicUsize::new(0));

        let counter = ticks.clone();
        registry.spawn_detached("ticker", move |token| async move {
            while !token.is_cancelled() {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            token.acknowledge();
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(registry.shutdown(Duration::from_secs(1)).await);
        assert!(ticks.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_reports_stragglers() {
        let registry = BackgroundRegistry::new();
        registry.spawn_detached("ignores-token", |_token| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        assert!(!registry.shutdown(Duration::from_millis(100)).await);
        assert_eq!(registry.active(), 1);
    }
}
