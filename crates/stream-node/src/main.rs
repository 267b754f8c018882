//! # Block Stream Node
//!
//! Runs block stream production in a single process.
//!
//! ## Modular Structure
//!
//! - `config` - JSON file plus `BS_*` environment overrides
//! - `bootstrap` - simulated roster, threshold and history services, signer
//! - `driver` - synthetic consensus rounds
//!
//! ## Flow
//!
//! ```text
//! RoundDriver ──start_round / write_item / end_round──→ BlockStreamOrchestrator
//!                                                          │ closed blocks
//!                                                          ↓
//!                                             sign (TssBlockHashSigner)
//!                                                          │ in block order
//!                                                          ↓
//!                                             FileBlockItemWriter (data_dir)
//! ```
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (file, then environment)
//! 2. Initialize telemetry
//! 3. Build the signer and start the roster bootstrap in the background
//! 4. Recover the last finalized block from `data_dir` (warm start) or anchor
//!    a new chain at the zero hash (cold start)
//! 5. Drive rounds until the round budget is spent or Ctrl+C
//! 6. Drain in-flight blocks within the shutdown timeout

mod bootstrap;
mod config;
mod driver;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info, warn};

use block_stream::{
    recover_last_block, BlockHashSigner, BlockStreamManager, BlockStreamOrchestrator,
    BoundaryStateChangeAccumulator, FileBlockItemWriter, InMemoryLedgerState, InitialStateHash,
    LedgerState, StreamStatus, Timestamp, ZERO_BLOCK_HASH,
};
use stream_telemetry::{init_telemetry, log_block_event, log_event};

use crate::bootstrap::{build_collaborators, complete_bootstrap};
use crate::config::NodeConfig;
use crate::driver::{state_hash, RoundDriver};

/// The node runtime driving one block stream.
pub struct NodeRuntime {
    config: NodeConfig,
    /// Shutdown signal sender.
    shutdown_tx: watch::Sender<bool>,
    /// Shutdown signal receiver.
    shutdown_rx: watch::Receiver<bool>,
}

impl NodeRuntime {
    /// Create a new node runtime with configuration.
    pub fn new(config: NodeConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            config,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Handle that stops the round loop when sent `true`.
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }

    /// Run until the round budget is spent or shutdown is signalled.
    pub async fn run(&self) -> Result<()> {
        let config = &self.config;
        info!("===========================================");
        info!("  Block Stream Node {} starting", config.node_id);
        info!("===========================================");
        info!("  Boundary: {:?}", config.stream.boundary);
        info!(
            "  Signing: hints={} history={}",
            config.stream.tss.hints_enabled, config.stream.tss.history_enabled
        );
        info!("  Data dir: {}", config.stream.writer.data_dir.display());

        let collaborators = build_collaborators(config)?;
        let bootstrap = tokio::spawn(complete_bootstrap(
            collaborators.threshold.clone(),
            collaborators.history.clone(),
            config.roster.size,
            Duration::from_millis(config.roster.bootstrap_delay_ms),
        ));

        let writer = FileBlockItemWriter::new(&config.stream.writer)
            .context("Failed to open block directory")?;
        let state = InMemoryLedgerState::new();
        let recovered = recover_last_block(
            &config.stream.writer.data_dir,
            config.stream.software_version,
            config.stream.trailing_hashes_limit,
        )
        .context("Failed to recover block stream from disk")?;

        let mut start_time = Timestamp::now();
        if let Some(info) = &recovered {
            info!(
                "Warm start after block {:?} ({})",
                info.last_block_number,
                info.last_block_hash.short()
            );
            if let Some(end) = info.last_block_end_time {
                if end >= start_time {
                    start_time = end.plus_millis(config.driver.round_interval_ms);
                }
            }
            state.put_block_stream_info(info.clone());
        }

        let first_round = config.driver.first_round;
        let previous_round = first_round.saturating_sub(1);
        let signer: Arc<dyn BlockHashSigner> = collaborators.signer.clone();
        let mut stream = BlockStreamOrchestrator::new(
            config.stream.clone(),
            signer,
            Box::new(writer),
            BoundaryStateChangeAccumulator::shared(),
            InitialStateHash::known(state_hash(previous_round), previous_round),
        )?;
        if recovered.is_none() {
            info!("Cold start, anchoring chain at the zero hash");
            stream.init_last_block_hash(ZERO_BLOCK_HASH)?;
        }

        let boundary = stream.boundary();
        let mut driver = RoundDriver::new(config.driver.clone(), config.roster.size, start_time);
        let mut ticker =
            tokio::time::interval(Duration::from_millis(config.driver.round_interval_ms));
        let mut shutdown = self.shutdown_rx.clone();
        let mut failure = None;

        info!("Node is running. Press Ctrl+C to stop.");
        while !driver.finished() {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = driver.drive_round(&mut stream, &boundary, &state) {
                        error!(round = driver.next_round(), "Round intake failed: {}", e);
                        failure = Some(e);
                        break;
                    }
                }
                _ = shutdown.changed() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }
        info!(
            "Round loop stopped after {} rounds, {} blocks closed",
            driver.rounds_driven(),
            stream.metrics().get_blocks_closed()
        );

        if let StreamStatus::Halted { reason } = stream.status() {
            warn!("Block stream halted: {}", reason);
        }

        // Closed blocks can only drain once the signer is ready
        let timeout = config.shutdown_timeout();
        let drain = async {
            bootstrap.await.context("Signer bootstrap task panicked")??;
            let info = stream
                .shutdown()
                .await
                .context("Block stream did not shut down cleanly")?;
            Ok::<_, anyhow::Error>(info)
        };
        let info = match tokio::time::timeout(timeout, drain).await {
            Ok(result) => result?,
            Err(_) => anyhow::bail!("Block stream shutdown exceeded {:?}", timeout),
        };
        match info.last_block_number {
            Some(number) => log_block_event!(
                info,
                "node",
                "Shutdown complete",
                number,
                info.last_block_hash.short()
            ),
            None => log_event!(info, "node", "Shutdown complete, no blocks written"),
        }

        match failure {
            Some(e) => Err(e).context("Block stream stopped on an intake error"),
            None => Ok(()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = NodeConfig::load()?;
    let _telemetry = init_telemetry(config.telemetry.clone())?;

    let runtime = NodeRuntime::new(config);
    let shutdown = runtime.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = shutdown.send(true);
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    runtime.run().await
}
