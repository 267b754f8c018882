//! Block lifecycle: pending (open, mutated by intake only), closed (immutable
//! snapshot handed to the pipeline), finalized (signed and written).

use crate::domain::{
    BlockHash, BlockHeader, BlockItem, BlockSignature, Deferred, SemanticVersion, Timestamp,
};
use crate::error::{BlockStreamError, Result};
use crate::utils::{combine, encode_item, ItemsHasher};

/// The one block currently accepting items
#[derive(Debug)]
pub struct PendingBlock {
    number: u64,
    previous_block_hash: BlockHash,
    first_round: u64,
    last_round: u64,
    round_count: u64,
    first_round_time: Timestamp,
    last_round_time: Timestamp,
    items: Vec<Vec<u8>>,
    hasher: ItemsHasher,
    start_state_hash: Deferred<BlockHash>,
}

impl PendingBlock {
    /// Open block `number` at round `first_round` and append its header
    pub fn open(
        number: u64,
        previous_block_hash: BlockHash,
        first_round: u64,
        first_round_time: Timestamp,
        software_version: SemanticVersion,
        start_state_hash: Deferred<BlockHash>,
    ) -> Result<Self> {
        let mut block = Self {
            number,
            previous_block_hash,
            first_round,
            last_round: first_round,
            round_count: 1,
            first_round_time,
            last_round_time: first_round_time,
            items: Vec::new(),
            hasher: ItemsHasher::new(),
            start_state_hash,
        };
        block.append(&BlockItem::BlockHeader(BlockHeader {
            number,
            software_version,
            first_round_no: first_round,
            block_timestamp: first_round_time,
        }))?;
        Ok(block)
    }

    /// Record that another round is being packaged into this block
    pub fn begin_round(&mut self, round: u64, time: Timestamp) {
        self.last_round = round;
        self.last_round_time = time;
        self.round_count += 1;
    }

    /// Append one item; encoding and hashing happen immediately
    pub fn append(&mut self, item: &BlockItem) -> Result<()> {
        if matches!(item, BlockItem::BlockProof(_)) {
            return Err(BlockStreamError::OrderingViolation {
                operation: "write_item(block_proof)",
                phase: format!("block {} open", self.number),
            });
        }
        let encoded = encode_item(item)?;
        self.hasher.absorb(&encoded)?;
        self.items.push(encoded);
        Ok(())
    }

    /// Block number
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Hash this block chains from
    pub fn previous_block_hash(&self) -> BlockHash {
        self.previous_block_hash
    }

    /// First round in the block
    pub fn first_round(&self) -> u64 {
        self.first_round
    }

    /// Most recent round in the block
    pub fn last_round(&self) -> u64 {
        self.last_round
    }

    /// Rounds packaged so far
    pub fn round_count(&self) -> u64 {
        self.round_count
    }

    /// Consensus time of the first round
    pub fn first_round_time(&self) -> Timestamp {
        self.first_round_time
    }

    /// Consensus time of the most recent round
    pub fn last_round_time(&self) -> Timestamp {
        self.last_round_time
    }

    /// Items appended so far, header included
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Encoded items in append order
    pub fn items(&self) -> &[Vec<u8>] {
        &self.items
    }

    /// Close the block. Consuming `self` makes later appends impossible.
    pub fn close(self, end_time: Timestamp) -> ClosedBlock {
        let items_hash = self.hasher.finish();
        let block_hash = combine(&self.previous_block_hash, &items_hash);
        ClosedBlock {
            number: self.number,
            previous_block_hash: self.previous_block_hash,
            items_hash,
            block_hash,
            first_round: self.first_round,
            last_round: self.last_round,
            end_time,
            items: self.items,
            start_state_hash: self.start_state_hash,
        }
    }
}

/// Immutable snapshot of a closed block, owned by the finalization pipeline
#[derive(Debug)]
pub struct ClosedBlock {
    /// Block number
    pub number: u64,
    /// Hash this block chains from
    pub previous_block_hash: BlockHash,
    /// SHA-384 over the framed items
    pub items_hash: BlockHash,
    /// `SHA384(previous_block_hash || items_hash)`
    pub block_hash: BlockHash,
    /// First round
    pub first_round: u64,
    /// Last round
    pub last_round: u64,
    /// Consensus time of the boundary
    pub end_time: Timestamp,
    /// Encoded items, proof excluded
    pub items: Vec<Vec<u8>>,
    /// State hash as of the first round, possibly still pending
    pub start_state_hash: Deferred<BlockHash>,
}

/// A block that has been signed and durably written
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinalizedBlock {
    /// Block number
    pub number: u64,
    /// Block hash
    pub hash: BlockHash,
    /// Hash it chains from
    pub previous_hash: BlockHash,
    /// Signature carried in its proof
    pub signature: BlockSignature,
    /// Items written, proof included
    pub item_count: usize,
    /// Consensus time of the boundary
    pub end_time: Timestamp,
}
