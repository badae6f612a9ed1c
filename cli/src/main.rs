// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Tandem CLI
//!
//! The `tandem` binary demonstrates serialized resources and fan-out
//! aggregation.
//!
//! ## Commands
//!
//! - `tandem bank` - concurrent withdrawals against one account
//! - `tandem counter` - many concurrent increments of one counter
//! - `tandem apr` - credit-score aggregation, collect-all or `--stream`
//! - `tandem config show|validate|generate` - Configuration management

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use tandem_cli::commands::{self, AprCommand, BankCommand, ConfigCommand, CounterCommand};
use tandem_cli::logging::{init_logging, LogFormat};
use tandem_core::domain::runtime_config::RuntimeConfigManifest;

/// Tandem - serialized resources and fan-out aggregation
#[derive(Parser)]
#[command(name = "tandem")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "TANDEM_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Defaults to spec.logging.level
    #[arg(long, global = true, env = "TANDEM_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (compact, json). Defaults to spec.logging.format
    #[arg(long, global = true, env = "TANDEM_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Concurrent withdrawals against a serialized account
    #[command(name = "bank")]
    Bank(BankCommand),

    /// Concurrent increments of a serialized counter
    #[command(name = "counter")]
    Counter(CounterCommand),

    /// Credit-score (APR) aggregation over simulated bureaus
    #[command(name = "apr")]
    Apr(AprCommand),

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging comes from the manifest unless overridden; a broken manifest
    // is reported by the command itself.
    let logging = RuntimeConfigManifest::load_or_default(cli.config.clone())
        .map(|manifest| manifest.spec.logging)
        .unwrap_or_default();
    let level = cli.log_level.unwrap_or(logging.level);
    let format = match cli.log_format {
        Some(format) => format,
        None => logging.format.parse().unwrap_or(LogFormat::Compact),
    };
    init_logging(&level, format)?;

    match cli.command {
        Some(Commands::Bank(command)) => commands::bank::execute(command, cli.config).await,
        Some(Commands::Counter(command)) => commands::counter::execute(command, cli.config).await,
        Some(Commands::Apr(command)) => commands::apr::execute(command, cli.config).await,
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            // No command provided - show help
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}
