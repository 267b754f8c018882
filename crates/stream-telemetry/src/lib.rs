//! # Stream Telemetry
//!
//! Logging setup for the block stream node.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stream_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_telemetry(TelemetryConfig::from_env())?;
//!     // Events from every crate now go through one subscriber
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `BS_SERVICE_NAME` | `block-stream` | Service name |
//! | `BS_NODE_ID` | `0` | Node identifier |
//! | `BS_LOG_LEVEL` / `RUST_LOG` | `info` | EnvFilter directive |
//! | `BS_JSON_LOGS` | `false` | JSON output |
//! | `BS_CONSOLE_OUTPUT` | `true` | Write to stdout |
//! | `BS_LOG_SOURCE` | `false` | Include file and line |

#![warn(missing_docs)]

mod config;
mod logging;
mod tracing_setup;

pub use config::{LogFormat, TelemetryConfig};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The global subscriber could not be installed
    #[error("Failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),

    /// The configuration is unusable
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Install logging for the process.
///
/// Returns a guard to be held for the lifetime of the application; dropping
/// it logs the shutdown.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    tracing_setup::init_tracing(&config)?;
    Ok(TelemetryGuard {
        service: config.full_service_name(),
    })
}

/// Guard that marks the telemetry lifetime.
#[derive(Debug)]
pub struct TelemetryGuard {
    service: String,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service, "Shutting down telemetry");
    }
}
