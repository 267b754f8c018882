//! # SHA-384 Hashing
//!
//! Every block hash, items hash and trivial attestation in the stream is a
//! 48-byte SHA-384 digest.

use sha2::{Digest, Sha384};

/// Length of a SHA-384 digest in bytes.
pub const HASH_384_LEN: usize = 48;

/// SHA-384 hash output (384-bit).
pub type Hash384 = [u8; HASH_384_LEN];

/// Stateful SHA-384 hasher.
#[derive(Clone, Default)]
pub struct Sha384Hasher {
    inner: Sha384,
}

impl Sha384Hasher {
    /// Create new hasher.
    pub fn new() -> Self {
        Self {
            inner: Sha384::new(),
        }
    }

    /// Update with data.
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.inner.update(data);
        self
    }

    /// Finalize and return hash. The hasher can keep absorbing afterwards.
    pub fn finalize(&self) -> Hash384 {
        let digest = self.inner.clone().finalize();
        let mut out = [0u8; HASH_384_LEN];
        out.copy_from_slice(&digest);
        out
    }

    /// Reset hasher for reuse.
    pub fn reset(&mut self) {
        Digest::reset(&mut self.inner);
    }
}

/// Hash data with SHA-384 (one-shot).
pub fn sha384(data: &[u8]) -> Hash384 {
    let digest = Sha384::digest(data);
    let mut out = [0u8; HASH_384_LEN];
    out.copy_from_slice(&digest);
    out
}

/// Hash the concatenation of multiple inputs.
pub fn sha384_many(inputs: &[&[u8]]) -> Hash384 {
    let mut hasher = Sha384Hasher::new();
    for input in inputs {
        hasher.update(input);
    }
    hasher.finalize()
}
