//! # Block Stream - Block Production & Block-Hash Signing
//!
//! **Bounded Context:** Block Stream Production
//! **Architecture Compliance:** DDD + Hexagonal + TDD
//!
//! ## Purpose
//!
//! Turns consensus-ordered rounds into an append-only, hash-chained sequence
//! of immutable blocks, and attaches a verifiable signature to every block
//! hash before the block is written:
//! - Round intake packages items into one pending block at a time
//! - Every block ends with two boundary state-change items
//! - Block hashes chain with SHA-384
//! - Signing runs asynchronously; writes happen strictly in block order
//!
//! ## Key Design Principles
//!
//! 1. **Intake never waits**: signing and I/O run on the tokio runtime
//! 2. **Ordered writes**: block N+1 is never written before block N
//! 3. **No silent gaps**: persistent signing or write failure halts production
//! 4. **Pluggable signing**: trivial, threshold, history, or both, chosen once
//!
//! ## Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │  Adapters (Outer)                                   │
//! │  - File / in-memory block writers                   │
//! │  - BLS threshold service, Ed25519 history service   │
//! │  - In-memory ledger state                           │
//! └─────────────────────────────────────────────────────┘
//!                         │
//! ┌─────────────────────────────────────────────────────┐
//! │  Ports (Middle)                                     │
//! │  - Inbound: BlockStreamManager, Round               │
//! │  - Outbound: BlockHashSigner, BlockItemWriter,      │
//! │    LedgerState, ThresholdSigningService,            │
//! │    HistoryProofService                              │
//! └─────────────────────────────────────────────────────┘
//!                         │
//! ┌─────────────────────────────────────────────────────┐
//! │  Domain (Inner - Pure Logic)                        │
//! │  - BlockItem model, PendingBlock / ClosedBlock      │
//! │  - BoundaryStateChangeAccumulator                   │
//! │  - Boundary policies, chain verification            │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Critical Invariants
//!
//! 1. **Gap-free numbering**: block numbers increase by exactly one
//! 2. **Chain linkage**: `previous_block_hash(N) == hash(N - 1)`
//! 3. **Hash formula**: `SHA384(previous_block_hash || SHA384(framed items))`
//! 4. **Sign before write**: a block reaches the writer only with its proof
//! 5. **Finalized info**: `BlockStreamInfo::last_block_hash` names a written block
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! let mut stream = BlockStreamOrchestrator::new(
//!     BlockStreamConfig::default(),
//!     Arc::new(TssBlockHashSigner::trivial()),
//!     Box::new(InMemoryBlockItemWriter::new()),
//!     BoundaryStateChangeAccumulator::shared(),
//!     InitialStateHash::known(ZERO_BLOCK_HASH, 0),
//! )?;
//! stream.init_last_block_hash(ZERO_BLOCK_HASH)?;
//! stream.start_round(&ConsensusRound::new(1, Timestamp::now()), &state)?;
//! stream.write_item(BlockItem::RoundHeader { round_no: 1 })?;
//! stream.end_round(&state, 1)?;
//! stream.shutdown().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Port implementations
pub mod adapters;
/// Block model and pure logic
pub mod domain;
pub mod ports;
/// Orchestrator and finalization pipeline
pub mod service;
pub mod signer;
pub mod utils;

mod config;
mod error;
mod metrics;

pub use config::{
    BlockStreamConfig, BoundaryConfig, ReadinessConfig, RetryConfig, TssConfig, WriterConfig,
};
pub use error::{BlockStreamError, Result, WriterError};
pub use metrics::Metrics;

pub use domain::{
    BlockBoundaryPolicy, BlockHash, BlockHeader, BlockItem, BlockProof, BlockSignature,
    BlockStreamInfo, BoundaryStateChangeAccumulator, BoundaryStateChanges, ClosedBlock,
    ConfiguredBoundaryPolicy, Deferred, FinalizedBlock, HistoryProof, InitialStateHash,
    PendingBlock, SemanticVersion, SharedBoundary, SignatureScheme, StateChange,
    StateChangePayload, StateChanges, StateHashedNotification, Timestamp, ZERO_BLOCK_HASH,
};

pub use ports::{
    BlockHashSigner, BlockItemWriter, BlockStreamManager, ConsensusRound, HistoryProofService,
    LedgerState, Round, ThresholdSigningService,
};

pub use adapters::{
    recover_last_block, BlsThresholdService, Ed25519HistoryService, FileBlockItemWriter,
    InMemoryBlockItemWriter, InMemoryLedgerState, NoopBlockItemWriter, WriterCall,
};

pub use service::{BlockStreamOrchestrator, PipelineProgress, StreamStatus};
pub use signer::{SigningStrategy, TssBlockHashSigner};

/// Default bound on blocks being signed at once
pub const DEFAULT_MAX_IN_FLIGHT_SIGNATURES: usize = 64;

/// Default number of trailing block hashes kept in `BlockStreamInfo`
pub const DEFAULT_TRAILING_HASHES_LIMIT: usize = 256;

/// Default number of items per `write_items` call
pub const DEFAULT_SERIALIZATION_BATCH_SIZE: usize = 32;
