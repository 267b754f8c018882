//! Signing collaborator bootstrap.
//!
//! There is no network here, so the roster is simulated: every member's keys
//! are derived deterministically from its node id, and the bootstrap that a
//! real network would run over gossip (BLS party registration, then history
//! signatures over the address book) runs in-process, optionally after a
//! delay so the signer's readiness wait is exercised.

use anyhow::{Context, Result};
use block_stream::{
    BlockHash, BlsThresholdService, Ed25519HistoryService, HistoryProofService,
    ThresholdSigningService, TssBlockHashSigner,
};
use shared_crypto::{sha384, sha384_many, BlsKeyPair, HistoryKeyPair};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::NodeConfig;

/// Deterministic key material for roster member `node_id`
fn member_seed(domain: &[u8], node_id: u64) -> [u8; 32] {
    let digest = sha384_many(&[domain, &node_id.to_le_bytes()]);
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&digest[..32]);
    seed
}

fn history_key(node_id: u64) -> HistoryKeyPair {
    HistoryKeyPair::from_seed(member_seed(b"block-stream/history", node_id))
}

fn bls_key(node_id: u64) -> Result<BlsKeyPair> {
    BlsKeyPair::from_ikm(&member_seed(b"block-stream/bls", node_id))
        .with_context(|| format!("Failed to derive BLS key for node {}", node_id))
}

/// Hash of the simulated genesis address book
pub fn address_book_hash(roster_size: u64) -> BlockHash {
    let mut book = Vec::new();
    for node_id in 0..roster_size {
        book.extend_from_slice(&node_id.to_le_bytes());
        book.extend_from_slice(history_key(node_id).public_key().as_bytes());
        book.extend_from_slice(&1u64.to_le_bytes());
    }
    BlockHash::new(sha384(&book))
}

/// The signer plus the concrete services behind it
pub struct Collaborators {
    /// Signer handed to the block stream
    pub signer: Arc<TssBlockHashSigner>,
    /// Threshold service, when hints are enabled
    pub threshold: Option<Arc<BlsThresholdService>>,
    /// History service, when history is enabled
    pub history: Option<Arc<Ed25519HistoryService>>,
}

/// Build the services the configuration enables and a signer over them.
pub fn build_collaborators(config: &NodeConfig) -> Result<Collaborators> {
    let tss = config.stream.tss;

    let threshold = if tss.hints_enabled {
        Some(Arc::new(BlsThresholdService::new(config.roster.threshold)?))
    } else {
        None
    };

    let history = if tss.history_enabled {
        let roster = (0..config.roster.size)
            .map(|id| (id, history_key(id).public_key(), 1))
            .collect();
        Some(Arc::new(Ed25519HistoryService::new(
            address_book_hash(config.roster.size),
            roster,
        )?))
    } else {
        None
    };

    let signer = TssBlockHashSigner::from_config(
        &tss,
        threshold
            .clone()
            .map(|t| t as Arc<dyn ThresholdSigningService>),
        history.clone().map(|h| h as Arc<dyn HistoryProofService>),
    )?;

    Ok(Collaborators {
        signer: Arc::new(signer),
        threshold,
        history,
    })
}

/// Run the simulated roster bootstrap to completion.
///
/// BLS parties register first; history signatures then endorse the address
/// book with the resulting verification key as metadata (or empty metadata
/// when hints are disabled).
pub async fn complete_bootstrap(
    threshold: Option<Arc<BlsThresholdService>>,
    history: Option<Arc<Ed25519HistoryService>>,
    roster_size: u64,
    delay: Duration,
) -> Result<()> {
    if !delay.is_zero() {
        info!("Delaying signer bootstrap by {:?}", delay);
        tokio::time::sleep(delay).await;
    }

    let mut metadata = Vec::new();
    if let Some(threshold) = &threshold {
        for node_id in 0..roster_size {
            if threshold.register_party(node_id, bls_key(node_id)?)? {
                break;
            }
        }
        metadata = threshold
            .verification_key()
            .context("Threshold construction did not converge")?;
        info!(
            "Threshold construction converged with {} parties",
            threshold.threshold()
        );
    }

    if let Some(history) = &history {
        let book = history.address_book_hash();
        for node_id in 0..roster_size {
            let signature = history_key(node_id).sign_binding(book.as_bytes(), &metadata);
            if history.submit_signature(node_id, &metadata, signature)? {
                break;
            }
        }
        anyhow::ensure!(
            history.proof_for(&metadata).is_some(),
            "History roster did not reach a strong minority"
        );
        info!("Genesis history proof formed");
    }

    Ok(())
}
