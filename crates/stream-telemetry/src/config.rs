//! Telemetry configuration from environment variables.

use serde::Deserialize;
use std::env;

/// Log output format
#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines for development
    Pretty,
    /// One JSON object per line for log shippers
    Json,
}

/// Configuration for logging.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Service name attached to every event
    pub service_name: String,

    /// Node identifier within the network
    pub node_id: u64,

    /// Log level filter (trace, debug, info, warn, error, or a full EnvFilter directive)
    pub log_level: String,

    /// Output format
    pub format: LogFormat,

    /// Whether to write to stdout at all
    pub console_output: bool,

    /// Include file and line in events
    pub with_source_location: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "block-stream".to_string(),
            node_id: 0,
            log_level: "info".to_string(),
            format: LogFormat::Pretty,
            console_output: true,
            with_source_location: false,
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `BS_SERVICE_NAME`: Service name (default: block-stream)
    /// - `BS_NODE_ID`: Node id (default: 0)
    /// - `BS_LOG_LEVEL` or `RUST_LOG`: Log filter (default: info)
    /// - `BS_JSON_LOGS`: JSON output (default: false, true in containers)
    /// - `BS_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `BS_LOG_SOURCE`: Include file/line (default: false)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();
        let defaults = Self::default();

        let json = env::var("BS_JSON_LOGS")
            .map(|v| parse_flag(&v))
            .unwrap_or(is_container);

        Self {
            service_name: env::var("BS_SERVICE_NAME").unwrap_or(defaults.service_name),

            node_id: env::var("BS_NODE_ID")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.node_id),

            log_level: env::var("BS_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or(defaults.log_level),

            format: if json { LogFormat::Json } else { LogFormat::Pretty },

            console_output: env::var("BS_CONSOLE_OUTPUT")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.console_output),

            with_source_location: env::var("BS_LOG_SOURCE")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.with_source_location),
        }
    }

    /// Service name qualified with the node id.
    pub fn full_service_name(&self) -> String {
        format!("{}-node{}", self.service_name, self.node_id)
    }
}
