//! BLS threshold signing service.
//!
//! Parties register BLS keys; once `threshold` parties are known the
//! construction converges. The signing set is fixed at that point (the
//! `threshold` lowest party ids) and the verification key is the aggregate of
//! their public keys. Later registrations do not change it.

use crate::error::{BlockStreamError, Result};
use crate::ports::ThresholdSigningService;
use async_trait::async_trait;
use parking_lot::RwLock;
use shared_crypto::bls::aggregate_partials;
use shared_crypto::{BlsKeyPair, BlsPublicKey, BlsSignature, PartialSignature};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Default)]
struct Construction {
    parties: BTreeMap<u64, Arc<BlsKeyPair>>,
    signing_set: Vec<(u64, Arc<BlsKeyPair>)>,
    verification_key: Option<BlsPublicKey>,
}

/// In-process threshold signing over BLS12-381
pub struct BlsThresholdService {
    threshold: usize,
    construction: RwLock<Construction>,
}

impl BlsThresholdService {
    /// A construction that converges once `threshold` parties registered
    pub fn new(threshold: usize) -> Result<Self> {
        if threshold == 0 {
            return Err(BlockStreamError::InvalidConfig(
                "threshold must be at least 1".into(),
            ));
        }
        Ok(Self {
            threshold,
            construction: RwLock::new(Construction::default()),
        })
    }

    /// Parties needed for a signature
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Register a party's key. Returns true once the construction has converged.
    pub fn register_party(&self, party_id: u64, key: BlsKeyPair) -> Result<bool> {
        let mut c = self.construction.write();
        if c.verification_key.is_some() {
            debug!(
                "[block-stream] Party {} registered after threshold construction converged",
                party_id
            );
            return Ok(true);
        }
        if c.parties.contains_key(&party_id) {
            return Err(BlockStreamError::InvalidConfig(format!(
                "party {} already registered",
                party_id
            )));
        }
        c.parties.insert(party_id, Arc::new(key));
        if c.parties.len() < self.threshold {
            return Ok(false);
        }

        let signing_set: Vec<(u64, Arc<BlsKeyPair>)> = c
            .parties
            .iter()
            .take(self.threshold)
            .map(|(id, key)| (*id, Arc::clone(key)))
            .collect();
        let keys: Vec<BlsPublicKey> = signing_set.iter().map(|(_, k)| k.public_key()).collect();
        let vk = BlsPublicKey::aggregate(&keys)?;
        info!(
            "[block-stream] 🔑 Threshold construction converged with {} parties",
            signing_set.len()
        );
        c.signing_set = signing_set;
        c.verification_key = Some(vk);
        Ok(true)
    }

    /// Check an aggregate signature against the verification key
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<bool> {
        let vk = self
            .construction
            .read()
            .verification_key
            .clone()
            .ok_or(BlockStreamError::SignerNotReady)?;
        let sig = BlsSignature::from_slice(signature)?;
        Ok(vk.verify(message, &sig))
    }
}

#[async_trait]
impl ThresholdSigningService for BlsThresholdService {
    fn verification_key(&self) -> Option<Vec<u8>> {
        self.construction
            .read()
            .verification_key
            .as_ref()
            .map(|vk| vk.to_bytes().to_vec())
    }

    async fn aggregate_signature(&self, message: &[u8]) -> Result<Vec<u8>> {
        let signing_set = {
            let c = self.construction.read();
            if c.verification_key.is_none() {
                return Err(BlockStreamError::SignerNotReady);
            }
            c.signing_set.clone()
        };
        let threshold = self.threshold;
        let message = message.to_vec();

        let aggregate = tokio::task::spawn_blocking(move || {
            let partials: Vec<PartialSignature> = signing_set
                .iter()
                .map(|(id, key)| key.sign_partial(*id, &message))
                .collect();
            aggregate_partials(&partials, threshold)
        })
        .await
        .map_err(|e| BlockStreamError::Internal(format!("aggregation task failed: {}", e)))??;

        Ok(aggregate.to_bytes().to_vec())
    }
}
