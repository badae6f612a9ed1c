// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Concurrent counter increments
//!
//! Spawns many tasks that each increment a shared counter once. Every task
//! observes a distinct value and the final count equals the task count.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tracing::info;

use tandem_core::domain::runtime_config::{ResourceStrategy, RuntimeConfigManifest};
use tandem_core::infrastructure::{ActorResource, LockedResource};
use tandem_core::SerializedResource;

use super::bank::parse_strategy;

#[derive(Args)]
pub struct CounterCommand {
    /// Number of concurrent increments
    #[arg(long, default_value_t = 100)]
    pub tasks: usize,

    /// Serialization strategy (overrides spec.resource.strategy)
    #[arg(long, value_parser = parse_strategy)]
    pub strategy: Option<ResourceStrategy>,

    /// Print every observed value, in completion order
    #[arg(long)]
    pub verbose: bool,
}

pub async fn execute(command: CounterCommand, config_path: Option<PathBuf>) -> Result<()> {
    let config = RuntimeConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;
    let strategy = command.strategy.unwrap_or(config.spec.resource.strategy);

    let observed = match strategy {
        ResourceStrategy::Actor => {
            increment_concurrently(Arc::new(ActorResource::new("counter", 0u64)), command.tasks).await?
        }
        ResourceStrategy::Lock => {
            increment_concurrently(Arc::new(LockedResource::new("counter", 0u64)), command.tasks).await?
        }
    };

    if command.verbose {
        let values: Vec<String> = observed.values.iter().map(u64::to_string).collect();
        println!("{}", values.join(" "));
    }

    let mut sorted = observed.values.clone();
    sorted.sort_unstable();
    sorted.dedup();

    println!("Strategy: {:?}", strategy);
    println!("Distinct values observed: {}", sorted.len());
    if observed.final_value == command.tasks as u64 && sorted.len() == command.tasks {
        println!(
            "{}",
            format!("✓ Final count is {} (no lost updates)", observed.final_value).green()
        );
    } else {
        println!(
            "{}",
            format!(
                "✗ Final count is {}, expected {}",
                observed.final_value, command.tasks
            )
            .red()
        );
    }

    Ok(())
}

pub struct CounterRun {
    /// Value each task saw right after its own increment, in completion order.
    pub values: Vec<u64>,
    pub final_value: u64,
}

pub async fn increment_concurrently<R>(counter: Arc<R>, tasks: usize) -> Result<CounterRun>
where
    R: SerializedResource<u64> + 'static,
{
    info!(tasks, "Spawning concurrent increments");

    let mut set = tokio::task::JoinSet::new();
    for _ in 0..tasks {
        let counter = counter.clone();
        set.spawn(async move {
            counter
                .mutate(|n: &mut u64| {
                    *n += 1;
                    *n
                })
                .await
        });
    }

    let mut values = Vec::with_capacity(tasks);
    while let Some(joined) = set.join_next().await {
        let value = joined
            .context("Increment task failed")?
            .context("Counter rejected an increment")?;
        values.push(value);
    }

    let final_value = counter.shutdown().await.context("Failed to close counter")?;
    Ok(CounterRun {
        values,
        final_value,
    })
}
