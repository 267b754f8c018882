//! Tracing subscriber setup.
//!
//! One global subscriber: an `EnvFilter` plus either a pretty or a JSON fmt
//! layer. Initialization is `try_init`, so a second call reports an error
//! instead of panicking.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::{LogFormat, TelemetryConfig, TelemetryError};

fn env_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(&config.log_level).map_err(|e| TelemetryError::Config(e.to_string()))
}

/// Install the global subscriber described by `config`.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = env_filter(config)?;

    let fmt_layer = if !config.console_output {
        None
    } else {
        Some(match config.format {
            LogFormat::Json => tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(config.with_source_location)
                .with_line_number(config.with_source_location)
                .boxed(),
            LogFormat::Pretty => tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(config.with_source_location)
                .with_line_number(config.with_source_location)
                .with_ansi(true)
                .boxed(),
        })
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| TelemetryError::SubscriberInit(e.to_string()))?;

    tracing::info!(
        service = %config.full_service_name(),
        format = ?config.format,
        "Tracing initialized"
    );
    Ok(())
}
