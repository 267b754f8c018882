//! Outbound ports (driven side - SPI)

use crate::domain::{BlockHash, BlockSignature, BlockStreamInfo, HistoryProof};
use crate::error::{Result, WriterError};
use async_trait::async_trait;

/// Port: produce attestations over block hashes
///
/// `is_ready` is a pure query; `sign` must never be called on the intake
/// thread's critical path and resolves independently of round processing.
#[async_trait]
pub trait BlockHashSigner: Send + Sync {
    /// Whether bootstrap has completed and `sign` can succeed
    fn is_ready(&self) -> bool;

    /// Sign a 48-byte block hash
    async fn sign(&self, block_hash: &BlockHash) -> Result<BlockSignature>;
}

/// Port: threshold key construction and partial-signature aggregation
#[async_trait]
pub trait ThresholdSigningService: Send + Sync {
    /// Consensus verification key, once the initial construction converged
    fn verification_key(&self) -> Option<Vec<u8>>;

    /// Aggregate the construction's partial signatures over `message`
    async fn aggregate_signature(&self, message: &[u8]) -> Result<Vec<u8>>;
}

/// Port: history proofs over the genesis address book
pub trait HistoryProofService: Send + Sync {
    /// Genesis proof over `metadata`, once a strong minority has endorsed it
    fn proof_for(&self, metadata: &[u8]) -> Option<HistoryProof>;
}

/// Port: durable sink for serialized blocks
///
/// Re-opening and re-writing a block number must never corrupt or duplicate
/// durable output; the writer, not the caller, enforces append-once.
pub trait BlockItemWriter: Send {
    /// Begin block `block_number`. Re-opening the block currently open
    /// discards what was buffered for it.
    fn open_block(&mut self, block_number: u64) -> std::result::Result<(), WriterError>;

    /// Append one encoded item (unframed)
    fn write_item(&mut self, bytes: &[u8]) -> std::result::Result<(), WriterError>;

    /// Append a buffer of already framed items
    fn write_items(&mut self, framed: &[u8]) -> std::result::Result<(), WriterError>;

    /// Make the open block durable
    fn close_block(&mut self) -> std::result::Result<(), WriterError>;
}

/// Port: the ledger state the stream reads and writes its singleton through
pub trait LedgerState: Send + Sync {
    /// Persisted stream info, absent on a true cold start
    fn block_stream_info(&self) -> Option<BlockStreamInfo>;

    /// Replace the persisted stream info
    fn put_block_stream_info(&self, info: BlockStreamInfo);
}
