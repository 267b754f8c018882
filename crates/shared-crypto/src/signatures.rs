//! # Ed25519 History Keys
//!
//! Long-lived per-node keys used to build history proofs. A node attests to
//! the genesis address book by signing `address_book_hash || metadata`, where
//! metadata is either empty or the threshold scheme's verification key.

use crate::CryptoError;
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};

/// Build the message a history key signs for an address book binding.
pub fn binding_message(address_book_hash: &[u8], metadata: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(address_book_hash.len() + metadata.len());
    message.extend_from_slice(address_book_hash);
    message.extend_from_slice(metadata);
    message
}

/// Ed25519 public half of a history key (32 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HistoryPublicKey([u8; 32]);

impl HistoryPublicKey {
    /// Create from bytes, rejecting points that are not valid keys.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        VerifyingKey::from_bytes(&bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self(bytes))
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Verify a binding of `metadata` to `address_book_hash`.
    pub fn verify_binding(
        &self,
        address_book_hash: &[u8],
        metadata: &[u8],
        signature: &HistorySignature,
    ) -> Result<(), CryptoError> {
        let verifying_key =
            VerifyingKey::from_bytes(&self.0).map_err(|_| CryptoError::InvalidPublicKey)?;
        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
        verifying_key
            .verify_strict(&binding_message(address_book_hash, metadata), &sig)
            .map_err(|_| CryptoError::SignatureVerificationFailed)
    }
}

/// Ed25519 signature produced by a history key (64 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HistorySignature([u8; 64]);

impl HistorySignature {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Create from an arbitrary slice.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; 64] = bytes.try_into().map_err(|_| CryptoError::InvalidLength {
            expected: 64,
            actual: bytes.len(),
        })?;
        Ok(Self(array))
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

/// A node's history signing key.
pub struct HistoryKeyPair {
    signing_key: SigningKey,
}

impl HistoryKeyPair {
    /// Generate a random key.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut rand::thread_rng()),
        }
    }

    /// Create from a 32-byte seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// Get public key.
    pub fn public_key(&self) -> HistoryPublicKey {
        HistoryPublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign a binding of `metadata` to `address_book_hash`.
    pub fn sign_binding(&self, address_book_hash: &[u8], metadata: &[u8]) -> HistorySignature {
        let sig = self
            .signing_key
            .sign(&binding_message(address_book_hash, metadata));
        HistorySignature(sig.to_bytes())
    }
}
