// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Simulated credit bureaus.
//!
//! Each bureau answers a credit-score request after a random latency. Users
//! listed in `failing_users` are rejected as invalid ids. An APR lookup asks
//! two bureaus concurrently and averages their scores.
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** Stand-in async operations for the `apr` command

use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tandem_core::domain::runtime_config::SimulationSettings;
use tandem_core::{CancellationToken, OperationError};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditScore {
    pub score: u32,
}

#[derive(Debug, Clone)]
pub struct CreditBureau {
    name: &'static str,
    latency_ms: RangeInclusive<u64>,
    failing_users: Arc<HashSet<u32>>,
}

impl CreditBureau {
    pub fn new(name: &'static str, settings: &SimulationSettings) -> Self {
        Self {
            name,
            latency_ms: settings.min_latency_ms..=settings.max_latency_ms,
            failing_users: Arc::new(settings.failing_keys.iter().copied().collect()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn credit_score(&self, user_id: u32) -> Result<CreditScore, OperationError> {
        let (latency, score) = {
            let mut rng = rand::rng();
            (
                Duration::from_millis(rng.random_range(self.latency_ms.clone())),
                rng.random_range(300..=850),
            )
        };
        tokio::time::sleep(latency).await;

        if self.failing_users.contains(&user_id) {
            return Err(OperationError::Transport(format!(
                "{} rejected user {}: invalid id",
                self.name, user_id
            )));
        }

        debug!(bureau = self.name, user_id, score, ?latency, "Credit score received");
        Ok(CreditScore { score })
    }
}

/// The pair of bureaus every APR lookup consults.
#[derive(Debug, Clone)]
pub struct Bureaus {
    pub equifax: CreditBureau,
    pub experian: CreditBureau,
}

impl Bureaus {
    pub fn from_settings(settings: &SimulationSettings) -> Self {
        Self {
            equifax: CreditBureau::new("equifax", settings),
            experian: CreditBureau::new("experian", settings),
        }
    }

    /// Query both bureaus concurrently and derive the user's APR.
    pub async fn apr(&self, user_id: u32, token: &CancellationToken) -> Result<f64, OperationError> {
        token.check()?;

        let (equifax, experian) = tokio::join!(
            self.equifax.credit_score(user_id),
            self.experian.credit_score(user_id)
        );

        Ok(calculate_apr(&[equifax?, experian?]))
    }
}

/// Average score divided by 100, both steps in integer arithmetic.
pub fn calculate_apr(scores: &[CreditScore]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let sum: u32 = scores.iter().map(|s| s.score).sum();
    let average = sum / scores.len() as u32;
    (average / 100) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(failing: Vec<u32>) -> SimulationSettings {
        SimulationSettings {
            min_latency_ms: 10,
            max_latency_ms: 40,
            failing_keys: failing,
        }
    }

    #[test]
    fn test_calculate_apr_truncates() {
        let scores = [CreditScore { score: 720 }, CreditScore { score: 655 }];
        // (720 + 655) / 2 = 687, 687 / 100 = 6
        assert_eq!(calculate_apr(&scores), 6.0);
        assert_eq!(calculate_apr(&[]), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_apr_for_valid_user() {
        let bureaus = Bureaus::from_settings(&settings(vec![2]));
        let apr = bureaus.apr(1, &CancellationToken::new()).await.unwrap();
        assert!((3.0..=8.0).contains(&apr));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_user_is_rejected() {
        let bureaus = Bureaus::from_settings(&settings(vec![2]));
        let err = bureaus.apr(2, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, OperationError::Transport(ref m) if m.contains("invalid id")));
    }

    #[tokio::test]
    async fn test_cancelled_lookup_never_queries() {
        let bureaus = Bureaus::from_settings(&settings(vec![]));
        let token = CancellationToken::new();
        token.cancel();

        assert!(bureaus.apr(1, &token).await.unwrap_err().is_cancelled());
    }
}
