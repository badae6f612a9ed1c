// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Concurrent withdrawals against one account
//!
//! Every withdrawal checks the balance, holds the account for a random
//! processing time, then writes. With a serialized account the second
//! withdrawal sees the first one's result, so the balance never goes negative.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use rand::Rng;
use tracing::info;

use tandem_core::domain::runtime_config::{ResourceStrategy, RuntimeConfigManifest};
use tandem_ledger::application::{AccountService, StandardAccountService};

#[derive(Args)]
pub struct BankCommand {
    /// Opening balance
    #[arg(long, default_value_t = 500.0)]
    pub balance: f64,

    /// Amounts to withdraw concurrently (repeatable)
    #[arg(long = "withdraw", value_name = "AMOUNT", num_args = 1.., default_values_t = [300.0, 500.0])]
    pub withdrawals: Vec<f64>,

    /// Upper bound of the random processing time per withdrawal, in seconds
    #[arg(long, default_value_t = 3)]
    pub max_processing_secs: u64,

    /// Serialization strategy (overrides spec.resource.strategy)
    #[arg(long, value_parser = parse_strategy)]
    pub strategy: Option<ResourceStrategy>,
}

pub(crate) fn parse_strategy(value: &str) -> Result<ResourceStrategy> {
    value.parse()
}

pub async fn execute(command: BankCommand, config_path: Option<PathBuf>) -> Result<()> {
    let config = RuntimeConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;
    let strategy = command.strategy.unwrap_or(config.spec.resource.strategy);

    let max_secs = command.max_processing_secs;
    let latency = move || Duration::from_secs(rand::rng().random_range(0..=max_secs));

    match strategy {
        ResourceStrategy::Actor => {
            let service = StandardAccountService::actor_backed().with_latency(latency);
            run(service, &command, strategy).await
        }
        ResourceStrategy::Lock => {
            let service = StandardAccountService::lock_backed().with_latency(latency);
            run(service, &command, strategy).await
        }
    }
}

async fn run<S>(service: S, command: &BankCommand, strategy: ResourceStrategy) -> Result<()>
where
    S: AccountService + 'static,
{
    let service = Arc::new(service);
    let account = service
        .open_account(command.balance)
        .await
        .context("Failed to open account")?;

    info!(account_id = %account, ?strategy, "Starting concurrent withdrawals");
    println!(
        "Account {} opened with balance {} ({:?} strategy)",
        account.to_string().bold(),
        command.balance,
        strategy
    );

    let handles: Vec<_> = command
        .withdrawals
        .iter()
        .map(|&amount| {
            let service = service.clone();
            tokio::spawn(async move { (amount, service.withdraw(account, amount).await) })
        })
        .collect();

    for handle in handles {
        let (amount, outcome) = handle.await.context("Withdrawal task failed")?;
        match outcome {
            Ok(receipt) => println!(
                "{}",
                format!(
                    "✓ Withdrew {} (balance is now {})",
                    amount, receipt.balance_after
                )
                .green()
            ),
            Err(e) => println!("{}", format!("✗ Withdrawal of {} rejected: {}", amount, e).red()),
        }
    }

    let ledger = service
        .close_account(account)
        .await
        .context("Failed to close account")?;

    println!();
    println!("{}", "Statement:".bold());
    for record in ledger.history() {
        println!(
            "  #{} {} {} ({})",
            record.sequence,
            record.kind.as_str(),
            record.amount,
            record.recorded_at.format("%H:%M:%S%.3f")
        );
    }
    println!("Final balance: {}", ledger.balance().to_string().bold());

    Ok(())
}
