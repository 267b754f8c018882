//! Block stream orchestrator
//!
//! Round intake runs on the caller's thread and never waits: it appends items
//! to the pending block, closes it when the boundary policy says so, and hands
//! the immutable snapshot to the finalization pipeline.
//!
//! ```text
//! AwaitingRound --start_round--> RoundOpen --end_round--> RoundClosing --> AwaitingRound
//!                                   |  ^
//!                                   write_item
//! ```

mod pipeline;

pub use pipeline::{PipelineProgress, SharedWriter};

use crate::config::BlockStreamConfig;
use crate::domain::{
    BlockBoundaryPolicy, BlockHash, BlockItem, BlockStreamInfo, Completer,
    ConfiguredBoundaryPolicy, Deferred, InitialStateHash, PendingBlock, SharedBoundary,
    StateHashedNotification, Timestamp, ZERO_BLOCK_HASH,
};
use crate::error::{BlockStreamError, Result};
use crate::metrics::Metrics;
use crate::ports::{BlockHashSigner, BlockItemWriter, BlockStreamManager, LedgerState, Round};
use parking_lot::{Mutex, RwLock};
use pipeline::{PipelineContext, PipelineTasks};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Whether the stream can still make progress
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamStatus {
    /// Accepting rounds
    Live,
    /// Stopped after a fatal signing or writing failure
    Halted {
        /// The failure that stopped production
        reason: String,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Phase {
    AwaitingRound,
    RoundOpen { round: u64, timestamp: Timestamp },
    RoundClosing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::AwaitingRound => write!(f, "awaiting round"),
            Phase::RoundOpen { round, .. } => write!(f, "round {} open", round),
            Phase::RoundClosing => write!(f, "round closing"),
        }
    }
}

enum StateHashSlot {
    Known(BlockHash),
    Awaiting(Completer<BlockHash>),
}

/// Default [`BlockStreamManager`]
pub struct BlockStreamOrchestrator {
    config: Arc<BlockStreamConfig>,
    policy: Box<dyn BlockBoundaryPolicy>,
    boundary: SharedBoundary,
    metrics: Arc<Metrics>,

    phase: Phase,
    pending: Option<PendingBlock>,
    anchor: Option<BlockHash>,
    session_started: bool,
    last_round: Option<u64>,
    last_closed_hash: BlockHash,
    next_block_number: u64,
    warm_start: bool,
    /// Chain through the last closed block; the only view written to state
    chain: BlockStreamInfo,

    initial_state_hash: Option<InitialStateHash>,
    state_hashes: BTreeMap<u64, StateHashSlot>,

    finalized: Arc<RwLock<BlockStreamInfo>>,
    progress: watch::Receiver<PipelineProgress>,
    sender: Option<mpsc::UnboundedSender<crate::domain::ClosedBlock>>,
    tasks: Option<PipelineTasks>,
}

impl BlockStreamOrchestrator {
    /// Build the orchestrator and start its pipeline on the current tokio runtime
    pub fn new(
        config: BlockStreamConfig,
        signer: Arc<dyn BlockHashSigner>,
        writer: Box<dyn BlockItemWriter>,
        boundary: SharedBoundary,
        initial_state_hash: InitialStateHash,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| {
            BlockStreamError::Internal(format!("block stream needs a tokio runtime: {}", e))
        })?;

        let config = Arc::new(config);
        let metrics = Arc::new(Metrics::new());
        let finalized = Arc::new(RwLock::new(BlockStreamInfo::anchored(
            ZERO_BLOCK_HASH,
            config.software_version,
        )));
        let (progress_tx, progress_rx) = watch::channel(PipelineProgress::default());

        let (sender, tasks) = pipeline::spawn(
            &runtime,
            PipelineContext {
                config: Arc::clone(&config),
                signer,
                writer: Arc::new(Mutex::new(writer)),
                finalized: Arc::clone(&finalized),
                metrics: Arc::clone(&metrics),
                progress: progress_tx,
            },
        );

        info!(
            "[block-stream] 🚀 Orchestrator started: boundary {:?}, {} signatures in flight",
            config.boundary, config.max_in_flight_signatures
        );

        let chain = BlockStreamInfo::anchored(ZERO_BLOCK_HASH, config.software_version);
        Ok(Self {
            config,
            policy: Box::new(ConfiguredBoundaryPolicy),
            boundary,
            metrics,
            phase: Phase::AwaitingRound,
            pending: None,
            anchor: None,
            session_started: false,
            last_round: None,
            last_closed_hash: ZERO_BLOCK_HASH,
            next_block_number: 0,
            warm_start: false,
            chain,
            initial_state_hash: Some(initial_state_hash),
            state_hashes: BTreeMap::new(),
            finalized,
            progress: progress_rx,
            sender: Some(sender),
            tasks: Some(tasks),
        })
    }

    /// Replace the boundary policy
    pub fn with_boundary_policy(mut self, policy: Box<dyn BlockBoundaryPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Accumulator the ledger captures post-round state changes into
    pub fn boundary(&self) -> SharedBoundary {
        Arc::clone(&self.boundary)
    }

    /// Shared counters
    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Configuration in use
    pub fn config(&self) -> &BlockStreamConfig {
        &self.config
    }

    /// False once the pipeline has halted
    pub fn is_live(&self) -> bool {
        self.progress.borrow().halted.is_none()
    }

    /// Number the next block to open will carry
    pub fn next_block_number(&self) -> u64 {
        self.next_block_number
    }

    /// Hash of the most recently closed (not necessarily finalized) block
    pub fn last_closed_hash(&self) -> BlockHash {
        self.last_closed_hash
    }

    /// Resolves once block `number` has been signed and written, or fails if
    /// the pipeline halts first
    pub fn await_finalized(&self, number: u64) -> impl Future<Output = Result<()>> + Send + 'static {
        let mut progress = self.progress.clone();
        async move {
            loop {
                {
                    let current = progress.borrow_and_update();
                    if current.last_finalized.map_or(false, |n| n >= number) {
                        return Ok(());
                    }
                    if let Some(reason) = &current.halted {
                        return Err(BlockStreamError::Halted {
                            reason: reason.clone(),
                        });
                    }
                }
                progress
                    .changed()
                    .await
                    .map_err(|_| BlockStreamError::PipelineClosed)?;
            }
        }
    }

    /// Stop intake and wait for every closed block to be finalized.
    ///
    /// An open block is discarded. Returns the final stream info, or the halt
    /// reason if the pipeline stopped on a failure.
    pub async fn shutdown(mut self) -> Result<BlockStreamInfo> {
        if let Some(block) = self.pending.take() {
            warn!(
                "[block-stream] Discarding open block {} ({} items) at shutdown",
                block.number(),
                block.item_count()
            );
        }
        // Unresolved state hashes will never arrive now
        self.state_hashes.clear();
        drop(self.sender.take());

        if let Some(tasks) = self.tasks.take() {
            tasks
                .dispatcher
                .await
                .map_err(|e| BlockStreamError::Internal(format!("dispatcher panicked: {}", e)))?;
            tasks
                .writer
                .await
                .map_err(|e| BlockStreamError::Internal(format!("writer panicked: {}", e)))?;
        }

        let info = self.finalized.read().clone();
        match self.status() {
            StreamStatus::Live => {
                info!(
                    "[block-stream] 🛑 Shut down after block {:?}",
                    info.last_block_number
                );
                Ok(info)
            }
            StreamStatus::Halted { reason } => Err(BlockStreamError::Halted { reason }),
        }
    }

    fn ensure_live(&self) -> Result<()> {
        match &self.progress.borrow().halted {
            Some(reason) => Err(BlockStreamError::Halted {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    fn ordering_violation(&self, operation: &'static str) -> BlockStreamError {
        BlockStreamError::OrderingViolation {
            operation,
            phase: self.phase.to_string(),
        }
    }

    /// Resume from persisted stream info, or start a new chain at the anchor
    fn bootstrap(&mut self, state: &dyn LedgerState) -> Result<()> {
        let persisted = state.block_stream_info();
        self.warm_start = persisted.is_some();
        let info = match persisted {
            Some(info) => {
                if self.anchor.is_some() {
                    warn!("[block-stream] Persisted stream info found, ignoring initial last block hash");
                }
                info!(
                    "[block-stream] Resuming after block {:?} ({})",
                    info.last_block_number,
                    info.last_block_hash.short()
                );
                info
            }
            None => {
                let anchor = self.anchor.ok_or(BlockStreamError::NotInitialized)?;
                info!("[block-stream] Cold start anchored at {}", anchor.short());
                BlockStreamInfo::anchored(anchor, self.config.software_version)
            }
        };
        self.last_closed_hash = info.last_block_hash;
        self.next_block_number = info.next_block_number();
        self.chain = info.clone();
        *self.finalized.write() = info;
        self.session_started = true;
        Ok(())
    }

    /// State hash at the start of the block opening at `round`.
    ///
    /// The initial state hash applies to the first block of the session on a
    /// cold start, and on a warm start only when it describes the round just
    /// before `round`. Otherwise the hash notified for `round - 1` is used.
    fn start_state_hash_for(&mut self, round: u64) -> Deferred<BlockHash> {
        if let Some(initial) = self.initial_state_hash.take() {
            let adjacent = initial.round_number + 1 == round;
            if adjacent || !self.warm_start {
                if !adjacent {
                    warn!(
                        round,
                        "[block-stream] Initial state hash is for round {}, first round is {}",
                        initial.round_number,
                        round
                    );
                }
                return initial.hash;
            }
            info!(
                round,
                "[block-stream] Initial state hash is for round {}, waiting for the state hash of round {}",
                initial.round_number,
                round.saturating_sub(1)
            );
        }
        let Some(previous) = round.checked_sub(1) else {
            return Deferred::resolved(ZERO_BLOCK_HASH);
        };
        match self.state_hashes.remove(&previous) {
            Some(StateHashSlot::Known(hash)) => Deferred::resolved(hash),
            _ => {
                let (completer, deferred) = Deferred::pending();
                self.state_hashes
                    .insert(previous, StateHashSlot::Awaiting(completer));
                deferred
            }
        }
    }

    fn prune_state_hashes(&mut self, round: u64) {
        self.state_hashes.retain(|r, slot| {
            *r + 1 >= round || matches!(slot, StateHashSlot::Awaiting(_))
        });
    }

    fn close_if_boundary(&mut self, state: &dyn LedgerState, timestamp: Timestamp) -> Result<()> {
        let closes = match &self.pending {
            Some(block) => self.policy.closes_block(block, &self.config),
            None => return Err(BlockStreamError::Internal("round open without a block".into())),
        };
        if !closes {
            return Ok(());
        }

        // The singleton hashed into this block describes the chain up to its
        // predecessor, independent of signing progress
        state.put_block_stream_info(self.chain.clone());
        let (ledger_changes, stream_info_change) = {
            let mut boundary = self.boundary.lock();
            boundary.begin_boundary(timestamp)?;
            let first = boundary.flush_changes(state)?;
            let second = boundary.flush_changes(state)?;
            (first, second)
        };

        let mut block = self
            .pending
            .take()
            .ok_or_else(|| BlockStreamError::Internal("pending block vanished".into()))?;
        block.append(&ledger_changes)?;
        block.append(&stream_info_change)?;
        self.metrics.record_item();
        self.metrics.record_item();

        let closed = block.close(timestamp);
        self.last_closed_hash = closed.block_hash;
        self.next_block_number = closed.number + 1;
        self.chain.record_block(
            closed.number,
            closed.block_hash,
            timestamp,
            self.config.trailing_hashes_limit,
        );
        state.put_block_stream_info(self.chain.clone());
        self.metrics.record_block_closed();
        info!(
            block_number = closed.number,
            "[block-stream] 📦 Block {} closed: rounds {}..={}, {} items, hash {}",
            closed.number,
            closed.first_round,
            closed.last_round,
            closed.items.len(),
            closed.block_hash.short()
        );

        self.sender
            .as_ref()
            .ok_or(BlockStreamError::PipelineClosed)?
            .send(closed)
            .map_err(|_| BlockStreamError::PipelineClosed)
    }
}

impl BlockStreamManager for BlockStreamOrchestrator {
    fn init_last_block_hash(&mut self, hash: BlockHash) -> Result<()> {
        if self.session_started || self.last_round.is_some() || self.anchor.is_some() {
            return Err(BlockStreamError::AlreadyInitialized);
        }
        self.anchor = Some(hash);
        Ok(())
    }

    fn start_round(&mut self, round: &dyn Round, state: &dyn LedgerState) -> Result<()> {
        self.ensure_live()?;
        if self.phase != Phase::AwaitingRound {
            return Err(self.ordering_violation("start_round"));
        }
        let number = round.round_number();
        let timestamp = round.consensus_timestamp();
        if let Some(previous) = self.last_round {
            if number != previous + 1 {
                return Err(BlockStreamError::NonSequentialRound {
                    previous,
                    actual: number,
                });
            }
        }
        if !self.session_started {
            self.bootstrap(state)?;
        }

        if let Some(block) = self.pending.as_mut() {
            block.begin_round(number, timestamp);
        } else {
            let start_state_hash = self.start_state_hash_for(number);
            let block = PendingBlock::open(
                self.next_block_number,
                self.last_closed_hash,
                number,
                timestamp,
                self.config.software_version,
                start_state_hash,
            )?;
            self.metrics.record_item();
            debug!(
                block_number = block.number(),
                round = number,
                "[block-stream] Opened block {} at round {}",
                block.number(),
                number
            );
            self.pending = Some(block);
        }

        self.last_round = Some(number);
        self.phase = Phase::RoundOpen {
            round: number,
            timestamp,
        };
        self.metrics.record_round();
        self.prune_state_hashes(number);
        Ok(())
    }

    fn write_item(&mut self, item: BlockItem) -> Result<()> {
        if !matches!(self.phase, Phase::RoundOpen { .. }) {
            return Err(self.ordering_violation("write_item"));
        }
        let block = self
            .pending
            .as_mut()
            .ok_or_else(|| BlockStreamError::Internal("round open without a block".into()))?;
        block.append(&item)?;
        self.metrics.record_item();
        Ok(())
    }

    fn notify(&mut self, notification: StateHashedNotification) -> Result<()> {
        match self.state_hashes.remove(&notification.round) {
            Some(StateHashSlot::Awaiting(completer)) => {
                if !completer.complete(notification.hash) {
                    warn!(
                        round = notification.round,
                        "[block-stream] State hash arrived after its block was dropped"
                    );
                }
            }
            _ => {
                self.state_hashes
                    .insert(notification.round, StateHashSlot::Known(notification.hash));
            }
        }
        Ok(())
    }

    fn end_round(&mut self, state: &dyn LedgerState, round_number: u64) -> Result<()> {
        let (round, timestamp) = match self.phase {
            Phase::RoundOpen { round, timestamp } => (round, timestamp),
            _ => return Err(self.ordering_violation("end_round")),
        };
        if round != round_number {
            return Err(BlockStreamError::RoundMismatch {
                expected: round,
                actual: round_number,
            });
        }
        self.phase = Phase::RoundClosing;
        let result = self.close_if_boundary(state, timestamp);
        self.phase = Phase::AwaitingRound;
        result
    }

    fn block_stream_info(&self) -> BlockStreamInfo {
        self.finalized.read().clone()
    }

    fn status(&self) -> StreamStatus {
        match &self.progress.borrow().halted {
            Some(reason) => StreamStatus::Halted {
                reason: reason.clone(),
            },
            None => StreamStatus::Live,
        }
    }
}
