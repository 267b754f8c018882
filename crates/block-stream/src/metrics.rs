//! Metrics collection for the block stream

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared between round intake and the finalization pipeline
#[derive(Debug, Default)]
pub struct Metrics {
    /// Rounds processed by intake
    pub rounds_processed: AtomicU64,

    /// Blocks closed and handed to the pipeline
    pub blocks_closed: AtomicU64,

    /// Blocks signed and durably written
    pub blocks_finalized: AtomicU64,

    /// Items appended (headers and boundary items included)
    pub items_written: AtomicU64,

    /// Failed signing attempts that were retried
    pub signature_retries: AtomicU64,

    /// Failed write attempts that were retried
    pub write_retries: AtomicU64,

    /// Total signing time (microseconds)
    pub signing_time_us: AtomicU64,

    /// Total time spent waiting for signer readiness (milliseconds)
    pub readiness_wait_ms: AtomicU64,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a processed round
    pub fn record_round(&self) {
        self.rounds_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an appended item
    pub fn record_item(&self) {
        self.items_written.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a closed block
    pub fn record_block_closed(&self) {
        self.blocks_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finalized block and the time its signature took
    pub fn record_block_finalized(&self, signing_us: u64) {
        self.blocks_finalized.fetch_add(1, Ordering::Relaxed);
        self.signing_time_us.fetch_add(signing_us, Ordering::Relaxed);
    }

    /// Record a retried signing attempt
    pub fn record_signature_retry(&self) {
        self.signature_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a retried write attempt
    pub fn record_write_retry(&self) {
        self.write_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Record time spent waiting on signer bootstrap
    pub fn record_readiness_wait(&self, waited_ms: u64) {
        self.readiness_wait_ms
            .fetch_add(waited_ms, Ordering::Relaxed);
    }

    /// Get rounds processed
    pub fn get_rounds_processed(&self) -> u64 {
        self.rounds_processed.load(Ordering::Relaxed)
    }

    /// Get blocks closed
    pub fn get_blocks_closed(&self) -> u64 {
        self.blocks_closed.load(Ordering::Relaxed)
    }

    /// Get blocks finalized
    pub fn get_blocks_finalized(&self) -> u64 {
        self.blocks_finalized.load(Ordering::Relaxed)
    }

    /// Get signature retries
    pub fn get_signature_retries(&self) -> u64 {
        self.signature_retries.load(Ordering::Relaxed)
    }

    /// Get write retries
    pub fn get_write_retries(&self) -> u64 {
        self.write_retries.load(Ordering::Relaxed)
    }

    /// Blocks closed but not yet finalized
    pub fn get_blocks_in_flight(&self) -> u64 {
        self.get_blocks_closed()
            .saturating_sub(self.get_blocks_finalized())
    }

    /// Get average items per closed block
    pub fn get_avg_items_per_block(&self) -> f64 {
        let blocks = self.blocks_closed.load(Ordering::Relaxed);
        if blocks == 0 {
            return 0.0;
        }
        let items = self.items_written.load(Ordering::Relaxed);
        items as f64 / blocks as f64
    }

    /// Get average signing time (microseconds)
    pub fn get_avg_signing_time(&self) -> f64 {
        let blocks = self.blocks_finalized.load(Ordering::Relaxed);
        if blocks == 0 {
            return 0.0;
        }
        let time = self.signing_time_us.load(Ordering::Relaxed);
        time as f64 / blocks as f64
    }
}
