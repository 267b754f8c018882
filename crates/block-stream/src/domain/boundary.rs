//! Boundary state changes
//!
//! At every block boundary two `StateChanges` items are appended to the
//! closing block, in this order:
//!
//! 1. the ledger's latest captured post-round batch;
//! 2. a synthesized batch carrying the `BlockStreamInfo` singleton, read live
//!    from state after the first batch has been applied.
//!
//! The protocol is an explicit phase machine so a missing or extra flush
//! fails loudly.
//!
//! ```text
//! Idle --begin_boundary--> AwaitingLedgerFlush --flush--> AwaitingSingletonFlush --flush--> Idle
//! ```

use crate::domain::{
    BlockItem, SingletonValue, StateChange, StateChangePayload, StateChanges, Timestamp,
    STATE_ID_BLOCK_STREAM_INFO,
};
use crate::error::{BlockStreamError, Result};
use crate::ports::LedgerState;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Where the accumulator is in the two-call flush protocol
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FlushPhase {
    /// No boundary in progress
    Idle,
    /// Next flush returns the ledger's captured batch
    AwaitingLedgerFlush,
    /// Next flush returns the stream-info singleton batch
    AwaitingSingletonFlush,
}

impl fmt::Display for FlushPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Capability the manager needs at a block boundary
pub trait BoundaryStateChanges: Send {
    /// Record the ledger's latest post-round state changes, replacing any
    /// batch not yet flushed
    fn capture(&mut self, consensus_time: Timestamp, changes: Vec<StateChange>);

    /// Arm a boundary at `timestamp`
    fn begin_boundary(&mut self, timestamp: Timestamp) -> Result<()>;

    /// Produce the next boundary item (exactly twice per boundary)
    fn flush_changes(&mut self, state: &dyn LedgerState) -> Result<BlockItem>;

    /// Consensus time of the most recent boundary
    fn boundary_timestamp(&self) -> Result<Timestamp>;

    /// Current protocol phase
    fn phase(&self) -> FlushPhase;
}

/// Boundary accumulator shared between the ledger (capture) and the manager (flush)
pub type SharedBoundary = Arc<Mutex<dyn BoundaryStateChanges>>;

/// Default accumulator
#[derive(Debug)]
pub struct BoundaryStateChangeAccumulator {
    phase: FlushPhase,
    captured: Option<StateChanges>,
    boundary_time: Option<Timestamp>,
}

impl Default for BoundaryStateChangeAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl BoundaryStateChangeAccumulator {
    /// Create an idle accumulator
    pub fn new() -> Self {
        Self {
            phase: FlushPhase::Idle,
            captured: None,
            boundary_time: None,
        }
    }

    /// Create one already wrapped for sharing
    pub fn shared() -> SharedBoundary {
        Arc::new(Mutex::new(Self::new()))
    }

    fn violation(&self) -> BlockStreamError {
        BlockStreamError::FlushProtocolViolation {
            phase: self.phase.to_string(),
        }
    }
}

impl BoundaryStateChanges for BoundaryStateChangeAccumulator {
    fn capture(&mut self, consensus_time: Timestamp, changes: Vec<StateChange>) {
        self.captured = Some(StateChanges {
            consensus_time,
            changes,
        });
    }

    fn begin_boundary(&mut self, timestamp: Timestamp) -> Result<()> {
        if self.phase != FlushPhase::Idle {
            return Err(self.violation());
        }
        self.boundary_time = Some(timestamp);
        self.phase = FlushPhase::AwaitingLedgerFlush;
        Ok(())
    }

    fn flush_changes(&mut self, state: &dyn LedgerState) -> Result<BlockItem> {
        match self.phase {
            FlushPhase::Idle => Err(self.violation()),
            FlushPhase::AwaitingLedgerFlush => {
                let boundary_time = self.boundary_timestamp()?;
                let batch = self.captured.take().unwrap_or(StateChanges {
                    consensus_time: boundary_time,
                    changes: Vec::new(),
                });
                self.phase = FlushPhase::AwaitingSingletonFlush;
                Ok(BlockItem::StateChanges(batch))
            }
            FlushPhase::AwaitingSingletonFlush => {
                let boundary_time = self.boundary_timestamp()?;
                let info = state.block_stream_info().ok_or_else(|| {
                    BlockStreamError::Internal(
                        "block stream info missing from state at boundary".into(),
                    )
                })?;
                self.phase = FlushPhase::Idle;
                Ok(BlockItem::StateChanges(StateChanges {
                    consensus_time: boundary_time,
                    changes: vec![StateChange {
                        state_id: STATE_ID_BLOCK_STREAM_INFO,
                        payload: StateChangePayload::Singleton(SingletonValue::BlockStreamInfo(
                            info,
                        )),
                    }],
                }))
            }
        }
    }

    fn boundary_timestamp(&self) -> Result<Timestamp> {
        self.boundary_time
            .ok_or(BlockStreamError::NoBoundaryReached)
    }

    fn phase(&self) -> FlushPhase {
        self.phase
    }
}
