// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Credit-score (APR) aggregation
//!
//! Looks up the APR of every user id concurrently. Each lookup queries two
//! simulated bureaus; a failing user only fails its own entry.
//!
//! Modes:
//! - collect-all (default): wait for every id, then print the partition
//! - `--stream`: print each id as soon as it resolves

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use futures::StreamExt;
use tracing::info;

use tandem_core::application::{Aggregator, AggregatorConfig};
use tandem_core::domain::runtime_config::RuntimeConfigManifest;
use tandem_core::{AggregationReport, CancellationToken, JobOutcome, OperationError};

use crate::simulation::Bureaus;

#[derive(Args)]
pub struct AprCommand {
    /// User ids to look up
    #[arg(long, value_delimiter = ',', default_value = "1,2,3,4,5")]
    pub ids: Vec<u32>,

    /// Print results as they complete instead of all at once
    #[arg(long)]
    pub stream: bool,

    /// User ids whose lookups fail (overrides spec.simulation.failing_keys)
    #[arg(long = "fail", value_name = "ID", value_delimiter = ',')]
    pub failing: Vec<u32>,

    /// Cap on concurrent lookups (overrides spec.aggregator.max_concurrency)
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Per-lookup timeout in milliseconds (overrides spec.aggregator.per_key_timeout_ms)
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Cancel the whole batch after this many milliseconds
    #[arg(long)]
    pub cancel_after_ms: Option<u64>,
}

pub async fn execute(command: AprCommand, config_path: Option<PathBuf>) -> Result<()> {
    let mut config = RuntimeConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    if !command.failing.is_empty() {
        config.spec.simulation.failing_keys = command.failing.clone();
    }
    if command.max_concurrency.is_some() {
        config.spec.aggregator.max_concurrency = command.max_concurrency;
    }
    if command.timeout_ms.is_some() {
        config.spec.aggregator.per_key_timeout_ms = command.timeout_ms;
    }
    config.validate().context("Invalid configuration")?;

    let aggregator = Aggregator::new(AggregatorConfig::from_settings(&config.spec.aggregator));
    let bureaus = Bureaus::from_settings(&config.spec.simulation);
    let token = CancellationToken::new();

    if let Some(ms) = command.cancel_after_ms {
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            info!("Cancelling APR batch after {}ms", ms);
            canceller.cancel();
        });
    }

    info!(
        ids = command.ids.len(),
        stream = command.stream,
        "Starting APR lookups"
    );

    if command.stream {
        stream_aprs(&aggregator, bureaus, command.ids, &token).await
    } else {
        let report = collect_aprs(&aggregator, bureaus, command.ids, &token).await?;
        print_report(&report);
        Ok(())
    }
}

/// Collect-all lookup of every id.
pub async fn collect_aprs(
    aggregator: &Aggregator,
    bureaus: Bureaus,
    ids: Vec<u32>,
    token: &CancellationToken,
) -> Result<AggregationReport<u32, f64>> {
    let lookup_token = token.clone();
    let report = aggregator
        .run_all(
            ids,
            move |id| {
                let bureaus = bureaus.clone();
                let token = lookup_token.clone();
                async move { bureaus.apr(id, &token).await }
            },
            token,
        )
        .await
        .context("Invalid batch of user ids")?;
    Ok(report)
}

async fn stream_aprs(
    aggregator: &Aggregator,
    bureaus: Bureaus,
    ids: Vec<u32>,
    token: &CancellationToken,
) -> Result<()> {
    let started = Instant::now();
    let lookup_token = token.clone();
    let mut stream = aggregator
        .stream(
            ids,
            move |id| {
                let bureaus = bureaus.clone();
                let token = lookup_token.clone();
                async move { bureaus.apr(id, &token).await }
            },
            token,
        )
        .context("Invalid batch of user ids")?;

    while let Some((id, result)) = stream.next().await {
        let elapsed = started.elapsed().as_millis();
        match result {
            Ok(apr) => println!("{}", format!("[{:>5}ms] user {}: APR {}", elapsed, id, apr).green()),
            Err(e) => println!("{}", format!("[{:>5}ms] user {}: {}", elapsed, id, e).red()),
        }
    }

    let unresolved = stream.unresolved();
    if !stream.skipped().is_empty() || !unresolved.is_empty() {
        println!(
            "{}",
            format!(
                "Batch cancelled: {} skipped, {} aborted in flight",
                stream.skipped().len(),
                unresolved.len()
            )
            .yellow()
        );
    }
    Ok(())
}

fn print_report(report: &AggregationReport<u32, f64>) {
    println!("{}", format!("APR lookup {}", report.job_id).bold());

    let mut ids: Vec<u32> = report
        .results
        .keys()
        .chain(report.failures.keys())
        .copied()
        .collect();
    ids.sort_unstable();

    for id in ids {
        if let Some(apr) = report.results.get(&id) {
            println!("  {}", format!("user {}: APR {}", id, apr).green());
        } else if let Some(error) = report.failures.get(&id) {
            println!("  {}", format!("user {}: {}", id, error).red());
        }
    }

    println!();
    println!(
        "{} succeeded, {} failed in {:?}",
        report.results.len(),
        report.failures.len(),
        report.elapsed
    );
    if !report.failures.is_empty() {
        let mut kinds: Vec<String> = failure_breakdown(&report.failures)
            .into_iter()
            .map(|(kind, count)| format!("{}={}", kind, count))
            .collect();
        kinds.sort_unstable();
        println!("Failures by kind: {}", kinds.join(", "));
    }
    if let JobOutcome::Cancelled {
        skipped,
        unresolved,
    } = &report.outcome
    {
        println!(
            "{}",
            format!(
                "Batch cancelled: {} skipped, {} aborted in flight",
                skipped.len(),
                unresolved.len()
            )
            .yellow()
        );
    }
}

/// Failure counts per error kind, for summaries.
pub fn failure_breakdown(failures: &HashMap<u32, OperationError>) -> HashMap<&'static str, usize> {
    let mut breakdown = HashMap::new();
    for error in failures.values() {
        *breakdown.entry(error.kind()).or_insert(0) += 1;
    }
    breakdown
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::domain::runtime_config::SimulationSettings;

    fn bureaus() -> Bureaus {
        Bureaus::from_settings(&SimulationSettings {
            min_latency_ms: 50,
            max_latency_ms: 500,
            failing_keys: vec![2],
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_user_is_isolated() {
        let report = collect_aprs(
            &Aggregator::default(),
            bureaus(),
            vec![1, 2, 3, 4, 5],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(report.results.len(), 4);
        assert!(report.failures.contains_key(&2));
        assert_eq!(report.outcome, JobOutcome::Completed);
        assert_eq!(failure_breakdown(&report.failures).get("transport"), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_batch_reports_skipped_users() {
        let token = CancellationToken::new();
        token.cancel();

        let report = collect_aprs(&Aggregator::default(), bureaus(), vec![7, 8], &token)
            .await
            .unwrap();

        assert!(report.results.is_empty());
        assert!(report.is_cancelled());
        assert_eq!(failure_breakdown(&report.failures).get("cancelled"), Some(&2));
    }

    #[tokio::test]
    async fn test_duplicate_ids_rejected() {
        let result = collect_aprs(
            &Aggregator::default(),
            bureaus(),
            vec![1, 1],
            &CancellationToken::new(),
        )
        .await;
        assert!(result.is_err());
    }
}
