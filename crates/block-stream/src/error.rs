//! Error types for the block stream subsystem

use thiserror::Error;

/// Result type alias for block stream operations
pub type Result<T> = std::result::Result<T, BlockStreamError>;

/// Errors that can occur while producing the block stream
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlockStreamError {
    /// No chain anchor: neither persisted stream info nor an initial last block hash
    #[error("Block stream not initialized: no persisted stream info and no last block hash")]
    NotInitialized,

    /// `init_last_block_hash` called after rounds started, or twice
    #[error("Last block hash already initialized or rounds already started")]
    AlreadyInitialized,

    /// Operation invoked in the wrong lifecycle phase
    #[error("Ordering violation: {operation} not allowed while {phase}")]
    OrderingViolation {
        /// Operation attempted
        operation: &'static str,
        /// Phase the manager was in
        phase: String,
    },

    /// `end_round` called with a different round than the one open
    #[error("Round mismatch: open round is {expected}, got {actual}")]
    RoundMismatch {
        /// Round currently open
        expected: u64,
        /// Round supplied by the caller
        actual: u64,
    },

    /// Rounds must arrive gap-free
    #[error("Non-sequential round: previous {previous}, got {actual}")]
    NonSequentialRound {
        /// Last round processed
        previous: u64,
        /// Round supplied by the caller
        actual: u64,
    },

    /// Boundary timestamp requested before any boundary was reached
    #[error("No block boundary has been reached yet")]
    NoBoundaryReached,

    /// Boundary flush called outside the two-call protocol
    #[error("Boundary flush protocol violation: flush called while {phase}")]
    FlushProtocolViolation {
        /// Accumulator phase at the time of the call
        phase: String,
    },

    /// Signer asked to sign before its bootstrap completed
    #[error("Block hash signer is not ready")]
    SignerNotReady,

    /// A single signing attempt failed
    #[error("Signing error: {0}")]
    Signing(String),

    /// Signing failed after every retry
    #[error("Signature for block {block_number} failed after {attempts} attempts: {reason}")]
    SignatureFailed {
        /// Block whose hash could not be signed
        block_number: u64,
        /// Attempts made
        attempts: u32,
        /// Last failure
        reason: String,
    },

    /// Writing a block failed after every retry
    #[error("Write of block {block_number} failed after {attempts} attempts: {reason}")]
    WriterFailed {
        /// Block that could not be written
        block_number: u64,
        /// Attempts made
        attempts: u32,
        /// Last failure
        reason: String,
    },

    /// The pipeline stopped on a fatal failure and refuses further work
    #[error("Block stream halted: {reason}")]
    Halted {
        /// Why production halted
        reason: String,
    },

    /// The pipeline task is gone
    #[error("Block pipeline closed")]
    PipelineClosed,

    /// A deferred value was dropped before it was resolved
    #[error("Deferred value abandoned: {0}")]
    Abandoned(String),

    /// Item encoding/decoding error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Cryptographic collaborator error
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// A block read back from storage does not verify
    #[error("Chain verification failed at block {block_number}: {reason}")]
    ChainBroken {
        /// Offending block
        block_number: u64,
        /// What did not match
        reason: String,
    },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BlockStreamError {
    /// Check if error is recoverable (should retry)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SignerNotReady | Self::Signing(_) | Self::Crypto(_)
        )
    }

    /// Check if error is critical (block production must stop)
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::SignatureFailed { .. }
                | Self::WriterFailed { .. }
                | Self::Halted { .. }
                | Self::ChainBroken { .. }
                | Self::Internal(_)
        )
    }

    /// Check if error is a caller precondition violation (fail fast, never retried)
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::NotInitialized
                | Self::AlreadyInitialized
                | Self::OrderingViolation { .. }
                | Self::RoundMismatch { .. }
                | Self::NonSequentialRound { .. }
                | Self::NoBoundaryReached
                | Self::FlushProtocolViolation { .. }
        )
    }
}

/// Errors reported by a [`crate::ports::BlockItemWriter`]
#[derive(Debug, Error)]
pub enum WriterError {
    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Item written with no block open
    #[error("No block is open")]
    NoOpenBlock,

    /// A different block is still open
    #[error("Block {open} is still open, cannot open block {requested}")]
    BlockAlreadyOpen {
        /// Block currently open
        open: u64,
        /// Block requested
        requested: u64,
    },

    /// Block number already holds different durable content
    #[error("Block {block_number} already written with different content")]
    Conflict {
        /// Offending block
        block_number: u64,
    },

    /// Framed buffer did not parse
    #[error("Malformed item buffer: {0}")]
    Malformed(String),

    /// Writer configured with an unsupported option
    #[error("Unsupported writer option: {0}")]
    Unsupported(String),

    /// Failure injected by a test double
    #[error("Injected failure: {0}")]
    Injected(String),
}

impl WriterError {
    /// Whether retrying the same block can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Injected(_) | Self::BlockAlreadyOpen { .. })
    }
}

impl From<bincode::Error> for BlockStreamError {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<shared_crypto::CryptoError> for BlockStreamError {
    fn from(e: shared_crypto::CryptoError) -> Self {
        Self::Crypto(e.to_string())
    }
}
