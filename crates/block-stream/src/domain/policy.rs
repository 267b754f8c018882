//! Block boundary policies
//!
//! A policy is a pure function of the open block and configuration, evaluated
//! when a round ends. Closures of the right shape are policies too.

use crate::config::{BlockStreamConfig, BoundaryConfig};
use crate::domain::PendingBlock;

/// Decides whether the round that just ended closes the open block
pub trait BlockBoundaryPolicy: Send + Sync {
    /// True if `block` should be closed now
    fn closes_block(&self, block: &PendingBlock, config: &BlockStreamConfig) -> bool;
}

impl<F> BlockBoundaryPolicy for F
where
    F: Fn(&PendingBlock, &BlockStreamConfig) -> bool + Send + Sync,
{
    fn closes_block(&self, block: &PendingBlock, config: &BlockStreamConfig) -> bool {
        self(block, config)
    }
}

/// Policy driven by [`BlockStreamConfig::boundary`]
#[derive(Copy, Clone, Debug, Default)]
pub struct ConfiguredBoundaryPolicy;

impl BlockBoundaryPolicy for ConfiguredBoundaryPolicy {
    fn closes_block(&self, block: &PendingBlock, config: &BlockStreamConfig) -> bool {
        match config.boundary {
            BoundaryConfig::RoundsPerBlock { rounds } => block.round_count() >= rounds,
            BoundaryConfig::ItemsPerBlock { items } => block.item_count() >= items,
            BoundaryConfig::BlockPeriod { period_ms } => {
                block.last_round_time().millis_since(&block.first_round_time()) >= period_ms
            }
        }
    }
}
