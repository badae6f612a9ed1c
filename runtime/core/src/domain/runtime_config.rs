// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Runtime Configuration Types
//
// Defines the configuration manifest for Tandem hosts:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Aggregator limits (concurrency cap, per-key timeout, cancel policy)
// - Serialized resource strategy (actor worker or FIFO lock)
// - Logging settings
// - Simulation settings used by the demonstration commands

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "tandem.dev/v1";
pub const KIND: &str = "RuntimeConfig";

/// Top-level Kubernetes-style runtime configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfigManifest {
    /// API version (must be "tandem.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "RuntimeConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: RuntimeConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable host name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfigSpec {
    #[serde(default)]
    pub aggregator: AggregatorSettings,

    #[serde(default)]
    pub resource: ResourceSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub simulation: SimulationSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregatorSettings {
    /// Maximum operations in flight per batch (unbounded when absent)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,

    /// Stop waiting for a key after this many milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_key_timeout_ms: Option<u64>,

    #[serde(default)]
    pub cancel_policy: CancelPolicy,
}

impl AggregatorSettings {
    pub fn per_key_timeout(&self) -> Option<Duration> {
        self.per_key_timeout_ms.map(Duration::from_millis)
    }
}

/// What the aggregator does once its token is cancelled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelPolicy {
    /// Unstarted keys resolve as `Cancelled`; started ones run to completion.
    #[default]
    SkipUnstarted,
    /// Additionally abort in-flight operations, leaving their keys unresolved.
    AbortInFlight,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceSettings {
    #[serde(default)]
    pub strategy: ResourceStrategy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStrategy {
    /// Dedicated worker task with an ordered mailbox
    #[default]
    Actor,
    /// FIFO-fair async mutex
    Lock,
}

impl std::str::FromStr for ResourceStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "actor" => Ok(Self::Actor),
            "lock" => Ok(Self::Lock),
            other => anyhow::bail!("Unknown resource strategy '{}'. Expected actor or lock", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (compact or json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSettings {
    #[serde(default = "default_min_latency_ms")]
    pub min_latency_ms: u64,

    #[serde(default = "default_max_latency_ms")]
    pub max_latency_ms: u64,

    /// Keys whose simulated operations always fail
    #[serde(default = "default_failing_keys")]
    pub failing_keys: Vec<u32>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            min_latency_ms: default_min_latency_ms(),
            max_latency_ms: default_max_latency_ms(),
            failing_keys: default_failing_keys(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

fn default_min_latency_ms() -> u64 {
    50
}

fn default_max_latency_ms() -> u64 {
    500
}

fn default_failing_keys() -> Vec<u32> {
    vec![2]
}

impl Default for RuntimeConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "tandem-local".to_string(),
                version: None,
                labels: None,
            },
            spec: RuntimeConfigSpec::default(),
        }
    }
}

impl RuntimeConfigManifest {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let manifest: Self = serde_yaml::from_str(yaml)?;
        Ok(manifest)
    }

    /// Discover configuration file (Env -> Cwd -> Home -> System)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("TANDEM_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./tandem-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".tandem").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/tandem/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Tandem\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::debug!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("TANDEM_MAX_CONCURRENCY") {
            match val.parse::<usize>() {
                Ok(limit) => {
                    tracing::info!("Environment override: TANDEM_MAX_CONCURRENCY={}", limit);
                    self.spec.aggregator.max_concurrency = Some(limit);
                }
                Err(_) => tracing::warn!(
                    "Invalid value for TANDEM_MAX_CONCURRENCY: '{}'. Ignoring.",
                    val
                ),
            }
        }

        if let Some(val) = lookup("TANDEM_PER_KEY_TIMEOUT_MS") {
            match val.parse::<u64>() {
                Ok(ms) => {
                    tracing::info!("Environment override: TANDEM_PER_KEY_TIMEOUT_MS={}", ms);
                    self.spec.aggregator.per_key_timeout_ms = Some(ms);
                }
                Err(_) => tracing::warn!(
                    "Invalid value for TANDEM_PER_KEY_TIMEOUT_MS: '{}'. Ignoring.",
                    val
                ),
            }
        }

        if let Some(val) = lookup("TANDEM_LOG_LEVEL") {
            tracing::info!("Environment override: TANDEM_LOG_LEVEL={}", val);
            self.spec.logging.level = val;
        }

        if let Some(val) = lookup("TANDEM_RESOURCE_STRATEGY") {
            match val.parse::<ResourceStrategy>() {
                Ok(strategy) => {
                    tracing::info!("Environment override: TANDEM_RESOURCE_STRATEGY={:?}", strategy);
                    self.spec.resource.strategy = strategy;
                }
                Err(e) => tracing::warn!("{}. Ignoring.", e),
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.aggregator.max_concurrency == Some(0) {
            anyhow::bail!("spec.aggregator.max_concurrency must be at least 1");
        }

        if self.spec.aggregator.per_key_timeout_ms == Some(0) {
            anyhow::bail!("spec.aggregator.per_key_timeout_ms must be greater than 0");
        }

        if !matches!(self.spec.logging.format.as_str(), "compact" | "json") {
            anyhow::bail!(
                "Invalid spec.logging.format: '{}'. Must be 'compact' or 'json'",
                self.spec.logging.format
            );
        }

        let simulation = &self.spec.simulation;
        if simulation.min_latency_ms > simulation.max_latency_ms {
            anyhow::bail!(
                "spec.simulation.min_latency_ms ({}) exceeds max_latency_ms ({})",
                simulation.min_latency_ms,
                simulation.max_latency_ms
            );
        }

        Ok(())
    }
}
