//! BLS12-381 Threshold Signatures
//!
//! Every party in a threshold construction signs the same block hash with its
//! own share key. Any `threshold` of those partial signatures aggregate into a
//! single 96-byte signature that verifies against the aggregate of the
//! contributing parties' public keys.
//!
//! Uses the `min_pk` variant: 48-byte public keys, 96-byte signatures.

use blst::min_pk::{AggregatePublicKey, AggregateSignature, PublicKey, SecretKey, Signature};
use blst::BLST_ERROR;
use rand::RngCore;
use zeroize::Zeroize;

use crate::CryptoError;

/// Domain separation tag for block-hash signatures
const DST: &[u8] = b"BLOCK_STREAM_BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_NUL_";

/// Compressed public key length
pub const PUBLIC_KEY_LEN: usize = 48;

/// Compressed signature length
pub const SIGNATURE_LEN: usize = 96;

/// BLS public key (48 bytes compressed)
#[derive(Clone, Debug)]
pub struct BlsPublicKey(PublicKey);

impl PartialEq for BlsPublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for BlsPublicKey {}

/// BLS signature (96 bytes)
#[derive(Clone, Debug)]
pub struct BlsSignature(Signature);

impl PartialEq for BlsSignature {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for BlsSignature {}

/// One party's contribution to a threshold signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartialSignature {
    /// Identifier of the signing party
    pub party_id: u64,
    /// The party's signature over the message
    pub signature: BlsSignature,
}

/// BLS key pair held by one party of a threshold construction
pub struct BlsKeyPair {
    secret: SecretKey,
    public: BlsPublicKey,
}

impl BlsKeyPair {
    /// Derive a key pair from 32 bytes of input keying material
    pub fn from_ikm(ikm: &[u8; 32]) -> Result<Self, CryptoError> {
        let secret = SecretKey::key_gen(ikm, &[])
            .map_err(|e| CryptoError::KeyGenerationFailed(format!("{:?}", e)))?;
        let public = BlsPublicKey(secret.sk_to_pk());
        Ok(Self { secret, public })
    }

    /// Generate a new random key pair
    pub fn generate() -> Result<Self, CryptoError> {
        let mut ikm = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut ikm);
        let result = Self::from_ikm(&ikm);
        ikm.zeroize();
        result
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> BlsSignature {
        BlsSignature(self.secret.sign(message, DST, &[]))
    }

    /// Sign a message as `party_id`
    pub fn sign_partial(&self, party_id: u64, message: &[u8]) -> PartialSignature {
        PartialSignature {
            party_id,
            signature: self.sign(message),
        }
    }

    /// Get the public key
    pub fn public_key(&self) -> BlsPublicKey {
        self.public.clone()
    }
}

impl BlsPublicKey {
    /// Verify a signature against this public key
    pub fn verify(&self, message: &[u8], signature: &BlsSignature) -> bool {
        signature.0.verify(true, message, DST, &[], &self.0, true) == BLST_ERROR::BLST_SUCCESS
    }

    /// Parse a 48-byte compressed key from an arbitrary slice
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != PUBLIC_KEY_LEN {
            return Err(CryptoError::InvalidLength {
                expected: PUBLIC_KEY_LEN,
                actual: bytes.len(),
            });
        }
        PublicKey::from_bytes(bytes)
            .map(BlsPublicKey)
            .map_err(|_| CryptoError::InvalidPublicKey)
    }

    /// Serialize to 48-byte compressed form
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.0.to_bytes()
    }

    /// Aggregate multiple public keys into one
    pub fn aggregate(keys: &[BlsPublicKey]) -> Result<Self, CryptoError> {
        if keys.is_empty() {
            return Err(CryptoError::InvalidInput("empty key list".into()));
        }
        let refs: Vec<&PublicKey> = keys.iter().map(|k| &k.0).collect();
        AggregatePublicKey::aggregate(&refs, true)
            .map(|apk| BlsPublicKey(apk.to_public_key()))
            .map_err(|_| CryptoError::AggregationFailed)
    }
}

impl BlsSignature {
    /// Parse a 96-byte signature from an arbitrary slice
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != SIGNATURE_LEN {
            return Err(CryptoError::InvalidLength {
                expected: SIGNATURE_LEN,
                actual: bytes.len(),
            });
        }
        Signature::from_bytes(bytes)
            .map(BlsSignature)
            .map_err(|_| CryptoError::InvalidSignature)
    }

    /// Serialize to 96-byte form
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LEN] {
        self.0.to_bytes()
    }

    /// Aggregate multiple signatures into one
    pub fn aggregate(sigs: &[BlsSignature]) -> Result<Self, CryptoError> {
        if sigs.is_empty() {
            return Err(CryptoError::InvalidInput("empty signature list".into()));
        }
        let refs: Vec<&Signature> = sigs.iter().map(|s| &s.0).collect();
        AggregateSignature::aggregate(&refs, true)
            .map(|asig| BlsSignature(asig.to_signature()))
            .map_err(|_| CryptoError::AggregationFailed)
    }
}

/// Aggregate at least `threshold` partial signatures.
///
/// Partials are taken in ascending party order and duplicates from the same
/// party count once, so the result is independent of arrival order.
pub fn aggregate_partials(
    partials: &[PartialSignature],
    threshold: usize,
) -> Result<BlsSignature, CryptoError> {
    let mut sorted: Vec<&PartialSignature> = partials.iter().collect();
    sorted.sort_by_key(|p| p.party_id);
    sorted.dedup_by_key(|p| p.party_id);

    if threshold == 0 || sorted.len() < threshold {
        return Err(CryptoError::NotEnoughPartials {
            have: sorted.len(),
            need: threshold,
        });
    }

    let sigs: Vec<BlsSignature> = sorted
        .iter()
        .take(threshold)
        .map(|p| p.signature.clone())
        .collect();
    BlsSignature::aggregate(&sigs)
}
