//! # Test Fixtures
//!
//! Collaborators with test-only behavior, shared by every scenario:
//!
//! - [`ChainRecomputingWriter`] recomputes the hash chain from the bytes it
//!   receives, without the stream's own hashing helpers
//! - [`FlakySigner`] fails a fixed number of times before signing
//! - [`JitterSigner`] signs after a random delay so completions reorder
//! - [`drive_rounds`] feeds synthetic rounds into a stream

use async_trait::async_trait;
use block_stream::utils::{decode_item, split_frames, trivial_signature};
use block_stream::{
    BlockHash, BlockHashSigner, BlockItem, BlockItemWriter, BlockSignature, BlockStreamConfig,
    BlockStreamError, BlockStreamManager, ConsensusRound, LedgerState, RetryConfig,
    SignatureScheme, StateHashedNotification, Timestamp, WriterError,
};
use parking_lot::Mutex;
use rand::Rng;
use shared_crypto::{sha384_many, Sha384Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Default config with millisecond retry backoff
pub fn fast_config() -> BlockStreamConfig {
    let retry = RetryConfig {
        max_attempts: 3,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
    };
    let mut config = BlockStreamConfig::default();
    config.signing_retry = retry.clone();
    config.write_retry = retry;
    config.readiness.poll_interval_ms = 1;
    config
}

/// Consensus time of `round` in the synthetic schedule
pub fn round_time(round: u64) -> Timestamp {
    Timestamp::new(1_700_000_000, 0).plus_millis(round * 500)
}

/// Synthetic post-round state hash of `round`
pub fn state_hash(round: u64) -> BlockHash {
    BlockHash::new(sha384_many(&[b"state".as_slice(), &round.to_le_bytes()]))
}

/// Feed `rounds` rounds starting at `first_round`, each with `events` events
/// of `transactions` transactions (plus one result per transaction). Every
/// round's state hash is notified right after the round ends.
pub fn drive_rounds<M: BlockStreamManager>(
    stream: &mut M,
    state: &dyn LedgerState,
    first_round: u64,
    rounds: u64,
    events: u64,
    transactions: u64,
) -> block_stream::Result<()> {
    for round_no in first_round..first_round + rounds {
        stream.start_round(&ConsensusRound::new(round_no, round_time(round_no)), state)?;
        stream.write_item(BlockItem::RoundHeader { round_no })?;
        for event in 0..events {
            stream.write_item(BlockItem::EventHeader {
                creator_node_id: event,
            })?;
            for tx in 0..transactions {
                stream.write_item(BlockItem::EventTransaction {
                    payload: tx.to_le_bytes().to_vec(),
                })?;
                stream.write_item(BlockItem::TransactionResult {
                    payload: vec![1],
                })?;
            }
        }
        stream.end_round(state, round_no)?;
        stream.notify(StateHashedNotification {
            round: round_no,
            hash: state_hash(round_no),
        })?;
    }
    Ok(())
}

// =============================================================================
// CHAIN RECOMPUTING WRITER
// =============================================================================

/// What [`ChainRecomputingWriter`] observed
#[derive(Debug, Default)]
pub struct ChainLog {
    /// Every `open_block` argument, in call order
    pub opens: Vec<u64>,
    /// Closed block numbers, in close order
    pub closed: Vec<u64>,
    /// Recomputed hash of each closed block
    pub hashes: Vec<BlockHash>,
    /// Recomputed hash of the last closed block (the anchor before any)
    pub last_hash: BlockHash,
    /// Signatures carried by the proofs, in close order
    pub signatures: Vec<BlockSignature>,
    /// Items received per closed block, proof excluded
    pub item_counts: Vec<usize>,
}

struct OpenBlock {
    number: u64,
    hasher: Sha384Hasher,
    items: usize,
    proof: Option<Vec<u8>>,
}

/// Writer that keeps no block bytes, only the independently recomputed chain.
///
/// `items_hash` is SHA-384 over the framed buffers exactly as received and
/// `block_hash = SHA-384(previous || items_hash)`. A proof that disagrees with
/// the recomputed chain fails the close with a non-retryable error.
pub struct ChainRecomputingWriter {
    log: Arc<Mutex<ChainLog>>,
    open: Option<OpenBlock>,
}

impl ChainRecomputingWriter {
    /// Writer expecting a chain rooted at `anchor`, and a handle to its log
    pub fn new(anchor: BlockHash) -> (Self, Arc<Mutex<ChainLog>>) {
        let log = Arc::new(Mutex::new(ChainLog {
            last_hash: anchor,
            ..ChainLog::default()
        }));
        (
            Self {
                log: Arc::clone(&log),
                open: None,
            },
            log,
        )
    }
}

impl BlockItemWriter for ChainRecomputingWriter {
    fn open_block(&mut self, block_number: u64) -> Result<(), WriterError> {
        self.log.lock().opens.push(block_number);
        self.open = Some(OpenBlock {
            number: block_number,
            hasher: Sha384Hasher::new(),
            items: 0,
            proof: None,
        });
        Ok(())
    }

    fn write_item(&mut self, bytes: &[u8]) -> Result<(), WriterError> {
        let open = self.open.as_mut().ok_or(WriterError::NoOpenBlock)?;
        open.proof = Some(bytes.to_vec());
        Ok(())
    }

    fn write_items(&mut self, framed: &[u8]) -> Result<(), WriterError> {
        let open = self.open.as_mut().ok_or(WriterError::NoOpenBlock)?;
        let count = split_frames(framed)
            .map_err(|e| WriterError::Malformed(e.to_string()))?
            .len();
        open.hasher.update(framed);
        open.items += count;
        Ok(())
    }

    fn close_block(&mut self) -> Result<(), WriterError> {
        let open = self.open.take().ok_or(WriterError::NoOpenBlock)?;
        let proof_bytes = open
            .proof
            .ok_or_else(|| WriterError::Malformed("block closed without a proof".into()))?;
        let proof = match decode_item(&proof_bytes) {
            Ok(BlockItem::BlockProof(proof)) => proof,
            Ok(other) => {
                return Err(WriterError::Malformed(format!(
                    "last item is {}, not a proof",
                    other.kind()
                )))
            }
            Err(e) => return Err(WriterError::Malformed(e.to_string())),
        };

        let mut log = self.log.lock();
        let items_hash = open.hasher.finalize();
        let mut chain = Sha384Hasher::new();
        chain.update(log.last_hash.as_bytes()).update(&items_hash);
        let hash = BlockHash::new(chain.finalize());

        let expected_number = log.closed.last().map_or(open.number, |n| n + 1);
        if open.number != expected_number || proof.block_number != open.number {
            return Err(WriterError::Malformed(format!(
                "block {} out of order (expected {}, proof says {})",
                open.number, expected_number, proof.block_number
            )));
        }
        if proof.previous_block_hash != log.last_hash {
            return Err(WriterError::Malformed(format!(
                "block {} does not link to its predecessor",
                open.number
            )));
        }

        log.closed.push(open.number);
        log.hashes.push(hash);
        log.last_hash = hash;
        log.signatures.push(proof.signature);
        log.item_counts.push(open.items);
        Ok(())
    }
}

// =============================================================================
// SIGNERS
// =============================================================================

fn trivial(hash: &BlockHash) -> BlockSignature {
    BlockSignature {
        scheme: SignatureScheme::Trivial,
        bytes: trivial_signature(hash),
        history_proof: None,
    }
}

/// Always ready; fails the first `failures` sign calls
pub struct FlakySigner {
    failures: AtomicU32,
    calls: AtomicU32,
}

impl FlakySigner {
    /// Signer that fails `failures` times before succeeding
    pub fn new(failures: u32) -> Self {
        Self {
            failures: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
        }
    }

    /// Sign calls received so far
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlockHashSigner for FlakySigner {
    fn is_ready(&self) -> bool {
        true
    }

    async fn sign(&self, block_hash: &BlockHash) -> block_stream::Result<BlockSignature> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(BlockStreamError::Signing("transient signing failure".into()));
        }
        Ok(trivial(block_hash))
    }
}

/// Always ready; each signature resolves after a random delay up to `max_delay`
pub struct JitterSigner {
    max_delay_ms: u64,
}

impl JitterSigner {
    /// Signer with delays in `0..=max_delay`
    pub fn new(max_delay: Duration) -> Self {
        Self {
            max_delay_ms: max_delay.as_millis() as u64,
        }
    }
}

#[async_trait]
impl BlockHashSigner for JitterSigner {
    fn is_ready(&self) -> bool {
        true
    }

    async fn sign(&self, block_hash: &BlockHash) -> block_stream::Result<BlockSignature> {
        let delay = rand::thread_rng().gen_range(0..=self.max_delay_ms);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(trivial(block_hash))
    }
}
