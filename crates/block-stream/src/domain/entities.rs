//! Domain entities for the block stream

use crate::domain::Deferred;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use std::collections::VecDeque;
use std::fmt;

/// Length of every block hash (SHA-384)
pub const BLOCK_HASH_LEN: usize = shared_crypto::HASH_384_LEN;

/// State id of the "last produced block" singleton
pub const STATE_ID_BLOCK_STREAM_INFO: u32 = 1;

/// State id of the platform state singleton
pub const STATE_ID_PLATFORM_STATE: u32 = 2;

/// A 48-byte SHA-384 digest identifying a block, an items sequence or a state
#[serde_as]
#[derive(Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockHash(#[serde_as(as = "Bytes")] pub [u8; BLOCK_HASH_LEN]);

/// Previous hash of the very first block the network ever produces
pub const ZERO_BLOCK_HASH: BlockHash = BlockHash([0u8; BLOCK_HASH_LEN]);

impl BlockHash {
    /// Wrap raw digest bytes
    pub const fn new(bytes: [u8; BLOCK_HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Hash with every byte set to `byte`
    pub const fn repeat(byte: u8) -> Self {
        Self([byte; BLOCK_HASH_LEN])
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; BLOCK_HASH_LEN] {
        &self.0
    }

    /// Parse from a slice of exactly 48 bytes
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }

    /// Lowercase hex
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse lowercase or uppercase hex
    pub fn from_hex(s: &str) -> Option<Self> {
        hex::decode(s).ok().and_then(|b| Self::from_slice(&b))
    }

    /// First bytes in hex, for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({}..)", self.short())
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Consensus timestamp
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    /// Seconds since the Unix epoch
    pub seconds: i64,
    /// Nanoseconds within the second
    pub nanos: u32,
}

impl Timestamp {
    /// Construct from parts
    pub const fn new(seconds: i64, nanos: u32) -> Self {
        Self { seconds, nanos }
    }

    /// Current wall-clock time
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Convert from a chrono datetime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self {
            seconds: dt.timestamp(),
            nanos: dt.timestamp_subsec_nanos(),
        }
    }

    /// Convert to a chrono datetime
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.seconds, self.nanos).single()
    }

    /// Total milliseconds since the epoch
    pub fn as_millis(&self) -> i128 {
        self.seconds as i128 * 1_000 + (self.nanos / 1_000_000) as i128
    }

    /// Milliseconds elapsed since `earlier` (zero if `earlier` is later)
    pub fn millis_since(&self, earlier: &Timestamp) -> u64 {
        let diff = self.as_millis() - earlier.as_millis();
        if diff <= 0 {
            0
        } else {
            u64::try_from(diff).unwrap_or(u64::MAX)
        }
    }

    /// This timestamp shifted forward
    pub fn plus_millis(&self, millis: u64) -> Self {
        let total_nanos = self.nanos as u64 + (millis % 1_000) * 1_000_000;
        Self {
            seconds: self.seconds + (millis / 1_000) as i64 + (total_nanos / 1_000_000_000) as i64,
            nanos: (total_nanos % 1_000_000_000) as u32,
        }
    }
}

/// Software version stamped into block headers
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SemanticVersion {
    /// Major
    pub major: u32,
    /// Minor
    pub minor: u32,
    /// Patch
    pub patch: u32,
}

impl SemanticVersion {
    /// Construct a version
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Unit of the block stream
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockItem {
    /// First item of every block
    BlockHeader(BlockHeader),
    /// Marks the start of a consensus round
    RoundHeader {
        /// Round number
        round_no: u64,
    },
    /// Marks the start of a consensus event
    EventHeader {
        /// Node that created the event
        creator_node_id: u64,
    },
    /// Serialized transaction carried by an event
    EventTransaction {
        /// Opaque transaction bytes
        payload: Vec<u8>,
    },
    /// Serialized outcome of a transaction
    TransactionResult {
        /// Opaque result bytes
        payload: Vec<u8>,
    },
    /// Batch of state changes
    StateChanges(StateChanges),
    /// Signature attestation; always the last item of a written block
    BlockProof(BlockProof),
}

impl BlockItem {
    /// Short name of the variant, for logs and assertions
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BlockHeader(_) => "block_header",
            Self::RoundHeader { .. } => "round_header",
            Self::EventHeader { .. } => "event_header",
            Self::EventTransaction { .. } => "event_transaction",
            Self::TransactionResult { .. } => "transaction_result",
            Self::StateChanges(_) => "state_changes",
            Self::BlockProof(_) => "block_proof",
        }
    }
}

/// Block header item
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block number
    pub number: u64,
    /// Software that produced the block
    pub software_version: SemanticVersion,
    /// First round packaged into this block
    pub first_round_no: u64,
    /// Consensus time of that round
    pub block_timestamp: Timestamp,
}

/// Ordered batch of state changes at a consensus time
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChanges {
    /// Consensus time the changes apply at
    pub consensus_time: Timestamp,
    /// Changes in application order
    pub changes: Vec<StateChange>,
}

/// One change to one piece of ledger state
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    /// Which state
    pub state_id: u32,
    /// What changed
    pub payload: StateChangePayload,
}

/// State change kinds
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateChangePayload {
    /// Singleton replaced
    Singleton(SingletonValue),
    /// Key-value put
    KvPut {
        /// Key bytes
        key: Vec<u8>,
        /// Value bytes
        value: Vec<u8>,
    },
    /// Key-value delete
    KvDelete {
        /// Key bytes
        key: Vec<u8>,
    },
    /// Element pushed onto a queue
    QueuePush(Vec<u8>),
    /// Head of a queue removed
    QueuePop,
}

/// Singleton values known to the stream
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SingletonValue {
    /// Last produced block record
    BlockStreamInfo(BlockStreamInfo),
    /// Platform round bookkeeping
    PlatformState(PlatformState),
    /// Anything else, opaque
    Bytes(Vec<u8>),
}

/// Platform state singleton
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformState {
    /// Last handled round
    pub round: u64,
    /// Its consensus time
    pub consensus_time: Timestamp,
}

/// Position of the block stream: the newest block and its recent ancestors.
///
/// `last_block_hash` always names a closed block whose hash is final, never
/// the pending one. The copy kept in ledger state follows block closes so
/// that it is identical on every node; the orchestrator's own view follows
/// signed and written blocks.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStreamInfo {
    /// Number of the newest block, `None` before the first one
    pub last_block_number: Option<u64>,
    /// Hash of the newest block, or the chain anchor before the first one
    pub last_block_hash: BlockHash,
    /// Hashes of recent blocks, oldest first, bounded
    pub trailing_block_hashes: VecDeque<BlockHash>,
    /// Consensus time at which the last block closed
    pub last_block_end_time: Option<Timestamp>,
    /// Version that created this stream
    pub creation_software_version: SemanticVersion,
}

impl Default for BlockHash {
    fn default() -> Self {
        ZERO_BLOCK_HASH
    }
}

impl BlockStreamInfo {
    /// Info for a stream that has not finalized any block yet, anchored at `anchor`
    pub fn anchored(anchor: BlockHash, version: SemanticVersion) -> Self {
        Self {
            last_block_number: None,
            last_block_hash: anchor,
            trailing_block_hashes: VecDeque::new(),
            last_block_end_time: None,
            creation_software_version: version,
        }
    }

    /// Number the next block will carry
    pub fn next_block_number(&self) -> u64 {
        self.last_block_number.map_or(0, |n| n + 1)
    }

    /// Make block `number` the newest block of the chain
    pub fn record_block(
        &mut self,
        number: u64,
        hash: BlockHash,
        end_time: Timestamp,
        trailing_limit: usize,
    ) {
        self.last_block_number = Some(number);
        self.last_block_hash = hash;
        self.last_block_end_time = Some(end_time);
        if trailing_limit == 0 {
            self.trailing_block_hashes.clear();
            return;
        }
        self.trailing_block_hashes.push_back(hash);
        while self.trailing_block_hashes.len() > trailing_limit {
            self.trailing_block_hashes.pop_front();
        }
    }

    /// Hash of block `number` if it is still in the trailing window
    pub fn trailing_hash(&self, number: u64) -> Option<BlockHash> {
        let last = self.last_block_number?;
        let back = last.checked_sub(number)? as usize;
        let len = self.trailing_block_hashes.len();
        if back >= len {
            return None;
        }
        self.trailing_block_hashes.get(len - 1 - back).copied()
    }
}

/// Signature schemes a block proof can carry
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureScheme {
    /// SHA-384 of the block hash
    Trivial,
    /// Aggregated threshold signature
    Threshold,
    /// Trivial attestation wrapped with a history proof
    HistoryWrapped,
    /// Aggregated threshold signature bound to a history proof
    ThresholdWithHistory,
}

/// A signature over a block hash
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSignature {
    /// How `bytes` was produced
    pub scheme: SignatureScheme,
    /// Signature bytes
    pub bytes: Vec<u8>,
    /// History proof, for the history schemes
    pub history_proof: Option<HistoryProof>,
}

/// Proof that a strong minority of the genesis roster endorsed the address
/// book hash together with `metadata`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryProof {
    /// Hash of the genesis address book
    pub address_book_hash: BlockHash,
    /// Empty, or the threshold verification key it binds
    pub metadata: Vec<u8>,
    /// Contributing signatures, ascending by node id
    pub signatures: Vec<NodeSignature>,
}

/// One node's signature inside a history proof
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSignature {
    /// Signing node
    pub node_id: u64,
    /// Ed25519 signature bytes
    pub signature: Vec<u8>,
}

/// Final item of every written block
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockProof {
    /// Block this proof closes
    pub block_number: u64,
    /// Hash of the preceding block (or the chain anchor)
    pub previous_block_hash: BlockHash,
    /// State hash as of the block's first round
    pub start_of_block_state_hash: BlockHash,
    /// Signature over this block's hash
    pub signature: BlockSignature,
}

/// Post-round state hash emitted by the ledger
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StateHashedNotification {
    /// Round whose resulting state was hashed
    pub round: u64,
    /// The state hash
    pub hash: BlockHash,
}

/// State hash of the last round handled before process start, which may
/// only become known asynchronously
#[derive(Debug)]
pub struct InitialStateHash {
    /// The (possibly pending) hash
    pub hash: Deferred<BlockHash>,
    /// Round the hash belongs to
    pub round_number: u64,
}

impl InitialStateHash {
    /// Construct from a deferred hash
    pub fn new(hash: Deferred<BlockHash>, round_number: u64) -> Self {
        Self { hash, round_number }
    }

    /// Construct from a known hash
    pub fn known(hash: BlockHash, round_number: u64) -> Self {
        Self::new(Deferred::resolved(hash), round_number)
    }
}
