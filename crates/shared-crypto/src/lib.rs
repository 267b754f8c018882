//! # Shared Crypto - Block Stream Cryptographic Primitives
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `hashing` | SHA-384 | Block hash chaining, trivial attestations |
//! | `bls` | BLS12-381 (min_pk) | Threshold block signatures (partial aggregation) |
//! | `signatures` | Ed25519 | History proofs over the genesis address book |
//!
//! ## Security Properties
//!
//! - **SHA-384**: 48-byte digests, the native width of every block hash
//! - **BLS**: signatures over the same message aggregate into one 96-byte value
//! - **Ed25519**: deterministic nonces, no RNG dependency when signing

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bls;
pub mod errors;
pub mod hashing;
pub mod signatures;

// Re-exports
pub use bls::{BlsKeyPair, BlsPublicKey, BlsSignature, PartialSignature};
pub use errors::CryptoError;
pub use hashing::{sha384, sha384_many, Hash384, Sha384Hasher, HASH_384_LEN};
pub use signatures::{HistoryKeyPair, HistoryPublicKey, HistorySignature};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
