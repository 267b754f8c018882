//! Configuration types for the block stream

use crate::domain::SemanticVersion;
use crate::error::{BlockStreamError, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for block stream production
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BlockStreamConfig {
    /// When a round closes the open block
    pub boundary: BoundaryConfig,

    /// Software version stamped into every block header
    pub software_version: SemanticVersion,

    /// Upper bound on blocks being signed concurrently
    pub max_in_flight_signatures: usize,

    /// Number of trailing block hashes kept in `BlockStreamInfo`
    pub trailing_hashes_limit: usize,

    /// Items per `write_items` call when a block is handed to the writer
    pub serialization_batch_size: usize,

    /// Retry policy for signature production
    pub signing_retry: RetryConfig,

    /// Retry policy for block writes
    pub write_retry: RetryConfig,

    /// Signer readiness polling
    pub readiness: ReadinessConfig,

    /// Which signature schemes are enabled
    pub tss: TssConfig,

    /// File writer settings
    pub writer: WriterConfig,
}

impl Default for BlockStreamConfig {
    fn default() -> Self {
        Self {
            boundary: BoundaryConfig::default(),
            software_version: SemanticVersion::new(0, 1, 0),
            max_in_flight_signatures: crate::DEFAULT_MAX_IN_FLIGHT_SIGNATURES,
            trailing_hashes_limit: crate::DEFAULT_TRAILING_HASHES_LIMIT,
            serialization_batch_size: crate::DEFAULT_SERIALIZATION_BATCH_SIZE,
            signing_retry: RetryConfig::default(),
            write_retry: RetryConfig::default(),
            readiness: ReadinessConfig::default(),
            tss: TssConfig::default(),
            writer: WriterConfig::default(),
        }
    }
}

impl BlockStreamConfig {
    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_in_flight_signatures == 0 {
            return Err(BlockStreamError::InvalidConfig(
                "max_in_flight_signatures must be at least 1".into(),
            ));
        }
        if self.serialization_batch_size == 0 {
            return Err(BlockStreamError::InvalidConfig(
                "serialization_batch_size must be at least 1".into(),
            ));
        }
        if self.signing_retry.max_attempts == 0 || self.write_retry.max_attempts == 0 {
            return Err(BlockStreamError::InvalidConfig(
                "retry max_attempts must be at least 1".into(),
            ));
        }
        match self.boundary {
            BoundaryConfig::RoundsPerBlock { rounds: 0 } => Err(BlockStreamError::InvalidConfig(
                "rounds per block must be at least 1".into(),
            )),
            BoundaryConfig::ItemsPerBlock { items: 0 } => Err(BlockStreamError::InvalidConfig(
                "items per block must be at least 1".into(),
            )),
            BoundaryConfig::BlockPeriod { period_ms: 0 } => Err(BlockStreamError::InvalidConfig(
                "block period must be positive".into(),
            )),
            _ => Ok(()),
        }
    }
}

/// Block boundary rule
#[derive(Copy, Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum BoundaryConfig {
    /// Close after this many rounds
    RoundsPerBlock {
        /// Rounds per block
        rounds: u64,
    },
    /// Close once the block holds at least this many items
    ItemsPerBlock {
        /// Item threshold
        items: usize,
    },
    /// Close once consensus time has advanced this far since the block opened
    BlockPeriod {
        /// Period in milliseconds of consensus time
        period_ms: u64,
    },
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self::RoundsPerBlock { rounds: 1 }
    }
}

/// Exponential backoff retry settings
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts before the failure is fatal (first try included)
    pub max_attempts: u32,

    /// Delay after the first failure, in milliseconds
    pub initial_backoff_ms: u64,

    /// Ceiling for the doubling backoff, in milliseconds
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 50,
            max_backoff_ms: 2_000,
        }
    }
}

impl RetryConfig {
    /// Backoff before attempt `attempt + 1`, given `attempt` failures so far
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let delay = self.initial_backoff_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }
}

/// Signer readiness polling
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReadinessConfig {
    /// How often a not-ready signer is polled, in milliseconds
    pub poll_interval_ms: u64,

    /// Bootstrap wait before a warning is logged, in milliseconds
    pub grace_period_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            grace_period_ms: 30_000,
        }
    }
}

impl ReadinessConfig {
    /// Poll interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Grace period as a duration
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

/// Signature scheme selection
#[derive(Copy, Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TssConfig {
    /// Threshold (aggregated BLS) signatures
    pub hints_enabled: bool,

    /// History proofs anchored to the genesis address book
    pub history_enabled: bool,
}

/// File writer settings
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WriterConfig {
    /// Directory receiving one file per block
    pub data_dir: PathBuf,

    /// zstd-compress block files
    pub compress: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/blocks"),
            compress: false,
        }
    }
}
