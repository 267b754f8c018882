//! # Node Configuration
//!
//! One JSON document (optional, `BS_CONFIG_FILE`) layered under `BS_*`
//! environment overrides. Every section has defaults, so an empty file and no
//! environment yields a runnable single-process node.

use anyhow::{Context, Result};
use block_stream::{BlockStreamConfig, BoundaryConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use stream_telemetry::{LogFormat, TelemetryConfig};

/// Complete node configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// This node's id within the roster.
    pub node_id: u64,
    /// Block stream production.
    pub stream: BlockStreamConfig,
    /// Logging.
    pub telemetry: TelemetryConfig,
    /// Simulated signing roster.
    pub roster: RosterConfig,
    /// Synthetic round source.
    pub driver: DriverConfig,
    /// How long shutdown may wait for in-flight blocks, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: 0,
            stream: BlockStreamConfig::default(),
            telemetry: TelemetryConfig::default(),
            roster: RosterConfig::default(),
            driver: DriverConfig::default(),
            shutdown_timeout_ms: 10_000,
        }
    }
}

/// Roster the threshold and history collaborators are bootstrapped from.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RosterConfig {
    /// Number of nodes in the genesis roster.
    pub size: u64,
    /// Parties needed for the threshold construction.
    pub threshold: usize,
    /// Delay before the simulated bootstrap completes, in milliseconds.
    pub bootstrap_delay_ms: u64,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            size: 4,
            threshold: 3,
            bootstrap_delay_ms: 0,
        }
    }
}

/// Synthetic round generation.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DriverConfig {
    /// Wall-clock (and consensus-time) spacing of rounds, in milliseconds.
    pub round_interval_ms: u64,
    /// Events per round.
    pub events_per_round: u32,
    /// Transactions per event.
    pub transactions_per_event: u32,
    /// Round number of the first round in this process.
    pub first_round: u64,
    /// Stop after this many rounds; run until shutdown when absent.
    pub max_rounds: Option<u64>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            round_interval_ms: 200,
            events_per_round: 3,
            transactions_per_event: 2,
            first_round: 1,
            max_rounds: None,
        }
    }
}

impl NodeConfig {
    /// Load configuration from `BS_CONFIG_FILE` (if set) and the environment.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("BS_CONFIG_FILE") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Apply `BS_*` overrides, looking each key up through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| {
            lookup(key).map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        };

        if let Some(v) = lookup("BS_NODE_ID") {
            self.node_id = v.parse().context("BS_NODE_ID must be an integer")?;
            self.telemetry.node_id = self.node_id;
        }
        if let Some(v) = lookup("BS_DATA_DIR") {
            self.stream.writer.data_dir = PathBuf::from(v);
        }
        if let Some(v) = flag("BS_COMPRESS") {
            self.stream.writer.compress = v;
        }
        if let Some(v) = flag("BS_HINTS_ENABLED") {
            self.stream.tss.hints_enabled = v;
        }
        if let Some(v) = flag("BS_HISTORY_ENABLED") {
            self.stream.tss.history_enabled = v;
        }
        if let Some(v) = lookup("BS_ROUNDS_PER_BLOCK") {
            let rounds = v.parse().context("BS_ROUNDS_PER_BLOCK must be an integer")?;
            self.stream.boundary = BoundaryConfig::RoundsPerBlock { rounds };
        }
        if let Some(v) = lookup("BS_ROUND_INTERVAL_MS") {
            self.driver.round_interval_ms =
                v.parse().context("BS_ROUND_INTERVAL_MS must be an integer")?;
        }
        if let Some(v) = lookup("BS_MAX_ROUNDS") {
            self.driver.max_rounds = Some(v.parse().context("BS_MAX_ROUNDS must be an integer")?);
        }
        if let Some(v) = lookup("BS_LOG_LEVEL").or_else(|| lookup("RUST_LOG")) {
            self.telemetry.log_level = v;
        }
        if let Some(v) = flag("BS_JSON_LOGS") {
            self.telemetry.format = if v { LogFormat::Json } else { LogFormat::Pretty };
        }
        Ok(())
    }

    /// Reject configurations the node cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.stream
            .validate()
            .context("Invalid block stream configuration")?;
        if self.roster.size == 0 {
            anyhow::bail!("roster.size must be at least 1");
        }
        if self.stream.tss.hints_enabled
            && (self.roster.threshold == 0 || self.roster.threshold as u64 > self.roster.size)
        {
            anyhow::bail!(
                "roster.threshold must be between 1 and {} when hints are enabled",
                self.roster.size
            );
        }
        if self.driver.round_interval_ms == 0 {
            anyhow::bail!("driver.round_interval_ms must be positive");
        }
        Ok(())
    }

    /// Shutdown budget as a duration.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
