//! Inbound ports (driving side - API)

use crate::domain::{BlockHash, BlockItem, BlockStreamInfo, StateHashedNotification, Timestamp};
use crate::error::Result;
use crate::ports::LedgerState;
use crate::service::StreamStatus;

/// A consensus round as seen by the stream: only its number and time matter
pub trait Round {
    /// Round number
    fn round_number(&self) -> u64;

    /// Consensus timestamp of the round
    fn consensus_timestamp(&self) -> Timestamp;
}

/// Plain round value
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ConsensusRound {
    /// Round number
    pub round_number: u64,
    /// Consensus timestamp
    pub consensus_timestamp: Timestamp,
}

impl ConsensusRound {
    /// Construct a round
    pub fn new(round_number: u64, consensus_timestamp: Timestamp) -> Self {
        Self {
            round_number,
            consensus_timestamp,
        }
    }
}

impl Round for ConsensusRound {
    fn round_number(&self) -> u64 {
        self.round_number
    }

    fn consensus_timestamp(&self) -> Timestamp {
        self.consensus_timestamp
    }
}

/// Primary port: round intake for the block stream.
///
/// Every method is called from a single consensus-handling thread and returns
/// without waiting on signing or I/O.
pub trait BlockStreamManager {
    /// Chain anchor for a cold start. Once, before any round.
    fn init_last_block_hash(&mut self, hash: BlockHash) -> Result<()>;

    /// Begin a round, opening a block if none is open
    fn start_round(&mut self, round: &dyn Round, state: &dyn LedgerState) -> Result<()>;

    /// Append an item to the open block
    fn write_item(&mut self, item: BlockItem) -> Result<()>;

    /// Record the post-round state hash of a round
    fn notify(&mut self, notification: StateHashedNotification) -> Result<()>;

    /// Finish a round, closing the block when the boundary policy says so
    fn end_round(&mut self, state: &dyn LedgerState, round_number: u64) -> Result<()>;

    /// Stream info as of the last finalized block
    fn block_stream_info(&self) -> BlockStreamInfo;

    /// Live or halted
    fn status(&self) -> StreamStatus;
}
