//! Domain layer - block model and the pure logic around it
//!
//! Nothing here performs I/O. Async only appears through [`Deferred`], the
//! resolve-once handle used for state hashes that arrive after a block opens.
//!
//! ## Entities
//!
//! - [`BlockItem`]: the unit a block is made of
//! - [`BlockStreamInfo`]: persisted record of the last finalized block
//! - [`PendingBlock`] / [`ClosedBlock`] / [`FinalizedBlock`]: block lifecycle
//!
//! ## Services
//!
//! - [`BoundaryStateChangeAccumulator`]: the two state-change items every block ends with
//! - [`ConfiguredBoundaryPolicy`]: when a round closes the open block
//!
//! ## Invariants
//!
//! 1. Every block starts with a header and ends with exactly one proof
//! 2. `block_hash = SHA384(previous_block_hash || items_hash)`
//! 3. A block's proof carries the hash of the block before it

mod block;
pub mod boundary;
mod deferred;
mod entities;
pub mod invariants;
pub mod policy;

pub use block::{ClosedBlock, FinalizedBlock, PendingBlock};
pub use boundary::{
    BoundaryStateChangeAccumulator, BoundaryStateChanges, FlushPhase, SharedBoundary,
};
pub use deferred::{Completer, Deferred};
pub use entities::*;
pub use invariants::{verify_block_items, verify_chain};
pub use policy::{BlockBoundaryPolicy, ConfiguredBoundaryPolicy};
