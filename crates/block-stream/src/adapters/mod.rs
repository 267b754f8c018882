//! # Adapters Module
//!
//! Implementations of the outbound ports.
//!
//! ## Modules
//!
//! - `memory`: in-memory ledger state and writers for tests and embedding
//! - `file_writer`: one-file-per-block writer and recovery helpers
//! - `threshold`: BLS threshold signing
//! - `history`: Ed25519 history proofs

pub mod file_writer;
pub mod history;
pub mod memory;
pub mod threshold;

pub use file_writer::{
    block_file_path, list_block_files, read_block_file, recover_last_block, FileBlockItemWriter,
};
pub use history::Ed25519HistoryService;
pub use memory::{InMemoryBlockItemWriter, InMemoryLedgerState, NoopBlockItemWriter, WriterCall};
pub use threshold::BlsThresholdService;
