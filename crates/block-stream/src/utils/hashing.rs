//! Hashing utilities for the block stream
//!
//! ```text
//! items_hash = SHA384(frame(item_0) || frame(item_1) || ... || frame(item_k))
//! block_hash = SHA384(previous_block_hash || items_hash)
//! ```
//!
//! `frame` is the length-prefixed encoding from [`super::codec`]; the block
//! proof item is never part of the hashed sequence.

use crate::domain::BlockHash;
use crate::error::Result;
use crate::utils::codec::frame_prefix;
use shared_crypto::{sha384, Sha384Hasher};

/// Running hash over a block's framed items
#[derive(Clone, Default)]
pub struct ItemsHasher {
    inner: Sha384Hasher,
    count: usize,
}

impl ItemsHasher {
    /// Create an empty hasher
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb one encoded item
    pub fn absorb(&mut self, encoded: &[u8]) -> Result<()> {
        let prefix = frame_prefix(encoded.len())?;
        self.inner.update(&prefix);
        self.inner.update(encoded);
        self.count += 1;
        Ok(())
    }

    /// Items absorbed so far
    pub fn count(&self) -> usize {
        self.count
    }

    /// Hash of everything absorbed so far
    pub fn finish(&self) -> BlockHash {
        BlockHash(self.inner.finalize())
    }
}

impl std::fmt::Debug for ItemsHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemsHasher")
            .field("count", &self.count)
            .finish()
    }
}

/// Hash a sequence of encoded items
pub fn items_hash<'a, I>(encoded: I) -> Result<BlockHash>
where
    I: IntoIterator<Item = &'a Vec<u8>>,
{
    let mut hasher = ItemsHasher::new();
    for item in encoded {
        hasher.absorb(item)?;
    }
    Ok(hasher.finish())
}

/// Chain an items hash onto the previous block hash
#[inline]
pub fn combine(previous: &BlockHash, items_hash: &BlockHash) -> BlockHash {
    let mut hasher = Sha384Hasher::new();
    hasher.update(previous.as_bytes());
    hasher.update(items_hash.as_bytes());
    BlockHash(hasher.finalize())
}

/// Full block hash from the previous hash and the encoded items
pub fn block_hash<'a, I>(previous: &BlockHash, encoded: I) -> Result<BlockHash>
where
    I: IntoIterator<Item = &'a Vec<u8>>,
{
    Ok(combine(previous, &items_hash(encoded)?))
}

/// Trivial attestation: SHA-384 of the block hash
#[inline]
pub fn trivial_signature(hash: &BlockHash) -> Vec<u8> {
    sha384(hash.as_bytes()).to_vec()
}
