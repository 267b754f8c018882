//! Block hash signer
//!
//! The signing strategy is chosen once at startup from [`TssConfig`]:
//!
//! | hints | history | strategy               | ready when                                 |
//! |-------|---------|------------------------|--------------------------------------------|
//! | off   | off     | `Trivial`              | always                                     |
//! | on    | off     | `ThresholdOnly`        | verification key exists                    |
//! | off   | on      | `HistoryOnly`          | genesis proof over empty metadata exists   |
//! | on    | on      | `ThresholdWithHistory` | key exists and a proof over the key exists |
//!
//! Readiness latches: once `is_ready` has returned true it never returns
//! false again.

use crate::config::TssConfig;
use crate::domain::{BlockHash, BlockSignature, HistoryProof, SignatureScheme};
use crate::error::{BlockStreamError, Result};
use crate::ports::{BlockHashSigner, HistoryProofService, ThresholdSigningService};
use crate::utils::trivial_signature;
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// How block hashes are signed
#[derive(Clone)]
pub enum SigningStrategy {
    /// SHA-384 of the hash
    Trivial,
    /// Aggregated threshold signature
    ThresholdOnly(Arc<dyn ThresholdSigningService>),
    /// Trivial bytes plus a genesis history proof
    HistoryOnly(Arc<dyn HistoryProofService>),
    /// Threshold signature plus a history proof binding its verification key
    ThresholdWithHistory {
        /// Threshold construction
        threshold: Arc<dyn ThresholdSigningService>,
        /// History proofs
        history: Arc<dyn HistoryProofService>,
    },
}

impl SigningStrategy {
    /// Scheme recorded in produced signatures
    pub fn scheme(&self) -> SignatureScheme {
        match self {
            Self::Trivial => SignatureScheme::Trivial,
            Self::ThresholdOnly(_) => SignatureScheme::Threshold,
            Self::HistoryOnly(_) => SignatureScheme::HistoryWrapped,
            Self::ThresholdWithHistory { .. } => SignatureScheme::ThresholdWithHistory,
        }
    }
}

impl fmt::Debug for SigningStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.scheme(), f)
    }
}

/// Signer selected from the TSS configuration
#[derive(Debug)]
pub struct TssBlockHashSigner {
    strategy: SigningStrategy,
    ready: AtomicBool,
}

impl TssBlockHashSigner {
    /// Wrap a strategy
    pub fn new(strategy: SigningStrategy) -> Self {
        let ready = matches!(strategy, SigningStrategy::Trivial);
        Self {
            strategy,
            ready: AtomicBool::new(ready),
        }
    }

    /// Trivial signer, ready immediately
    pub fn trivial() -> Self {
        Self::new(SigningStrategy::Trivial)
    }

    /// Select the strategy from configuration. The services a strategy needs
    /// must be supplied.
    pub fn from_config(
        config: &TssConfig,
        threshold: Option<Arc<dyn ThresholdSigningService>>,
        history: Option<Arc<dyn HistoryProofService>>,
    ) -> Result<Self> {
        let missing = |what: &str| {
            BlockStreamError::InvalidConfig(format!("{} enabled but no {} supplied", what, what))
        };
        let strategy = match (config.hints_enabled, config.history_enabled) {
            (false, false) => SigningStrategy::Trivial,
            (true, false) => SigningStrategy::ThresholdOnly(threshold.ok_or_else(|| missing("threshold service"))?),
            (false, true) => SigningStrategy::HistoryOnly(history.ok_or_else(|| missing("history service"))?),
            (true, true) => SigningStrategy::ThresholdWithHistory {
                threshold: threshold.ok_or_else(|| missing("threshold service"))?,
                history: history.ok_or_else(|| missing("history service"))?,
            },
        };
        info!("[block-stream] Block hash signer: {:?}", strategy);
        Ok(Self::new(strategy))
    }

    /// Selected strategy
    pub fn strategy(&self) -> &SigningStrategy {
        &self.strategy
    }

    /// Scheme recorded in produced signatures
    pub fn scheme(&self) -> SignatureScheme {
        self.strategy.scheme()
    }

    fn bootstrap_complete(&self) -> bool {
        match &self.strategy {
            SigningStrategy::Trivial => true,
            SigningStrategy::ThresholdOnly(threshold) => threshold.verification_key().is_some(),
            SigningStrategy::HistoryOnly(history) => history.proof_for(&[]).is_some(),
            SigningStrategy::ThresholdWithHistory { threshold, history } => threshold
                .verification_key()
                .map_or(false, |vk| history.proof_for(&vk).is_some()),
        }
    }

    fn history_proof(history: &dyn HistoryProofService, metadata: &[u8]) -> Result<HistoryProof> {
        history
            .proof_for(metadata)
            .ok_or(BlockStreamError::SignerNotReady)
    }
}

#[async_trait]
impl BlockHashSigner for TssBlockHashSigner {
    fn is_ready(&self) -> bool {
        if self.ready.load(Ordering::Acquire) {
            return true;
        }
        if self.bootstrap_complete() {
            if !self.ready.swap(true, Ordering::AcqRel) {
                info!("[block-stream] ✅ Block hash signer ready ({:?})", self.strategy);
            }
            return true;
        }
        false
    }

    async fn sign(&self, block_hash: &BlockHash) -> Result<BlockSignature> {
        if !self.is_ready() {
            return Err(BlockStreamError::SignerNotReady);
        }
        let scheme = self.scheme();
        let (bytes, history_proof) = match &self.strategy {
            SigningStrategy::Trivial => {
                let hash = *block_hash;
                let bytes = tokio::task::spawn_blocking(move || trivial_signature(&hash))
                    .await
                    .map_err(|e| BlockStreamError::Signing(e.to_string()))?;
                (bytes, None)
            }
            SigningStrategy::ThresholdOnly(threshold) => (
                threshold.aggregate_signature(block_hash.as_bytes()).await?,
                None,
            ),
            SigningStrategy::HistoryOnly(history) => (
                trivial_signature(block_hash),
                Some(Self::history_proof(history.as_ref(), &[])?),
            ),
            SigningStrategy::ThresholdWithHistory { threshold, history } => {
                let vk = threshold
                    .verification_key()
                    .ok_or(BlockStreamError::SignerNotReady)?;
                let proof = Self::history_proof(history.as_ref(), &vk)?;
                let bytes = threshold.aggregate_signature(block_hash.as_bytes()).await?;
                (bytes, Some(proof))
            }
        };
        Ok(BlockSignature {
            scheme,
            bytes,
            history_proof,
        })
    }
}
