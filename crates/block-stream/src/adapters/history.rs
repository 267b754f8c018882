//! Ed25519 history proof service.
//!
//! Roster nodes sign `address_book_hash || metadata` with their history keys.
//! Signatures are grouped by metadata. A group whose signers hold at least
//! one third of the roster weight becomes the genesis proof for that
//! metadata, fixed for the life of the service. Endorsements of unrelated
//! metadata never shadow the proof a signer is waiting for.

use crate::domain::{BlockHash, HistoryProof, NodeSignature};
use crate::error::{BlockStreamError, Result};
use crate::ports::HistoryProofService;
use parking_lot::RwLock;
use shared_crypto::{HistoryPublicKey, HistorySignature};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

#[derive(Clone, Copy, Debug)]
struct RosterEntry {
    key: HistoryPublicKey,
    weight: u64,
}

#[derive(Default)]
struct Collected {
    by_metadata: HashMap<Vec<u8>, BTreeMap<u64, HistorySignature>>,
    proofs: HashMap<Vec<u8>, HistoryProof>,
}

/// Collects history signatures until a strong minority endorses one metadata value
pub struct Ed25519HistoryService {
    address_book_hash: BlockHash,
    roster: BTreeMap<u64, RosterEntry>,
    total_weight: u64,
    collected: RwLock<Collected>,
}

fn is_strong_minority(weight: u64, total: u64) -> bool {
    3 * u128::from(weight) >= u128::from(total)
}

impl Ed25519HistoryService {
    /// Roster entries are `(node_id, history_key, weight)`
    pub fn new(
        address_book_hash: BlockHash,
        roster: Vec<(u64, HistoryPublicKey, u64)>,
    ) -> Result<Self> {
        let mut entries = BTreeMap::new();
        let mut total_weight: u64 = 0;
        for (node_id, key, weight) in roster {
            if entries.insert(node_id, RosterEntry { key, weight }).is_some() {
                return Err(BlockStreamError::InvalidConfig(format!(
                    "node {} listed twice in history roster",
                    node_id
                )));
            }
            total_weight = total_weight.checked_add(weight).ok_or_else(|| {
                BlockStreamError::InvalidConfig("roster weight overflows u64".into())
            })?;
        }
        if total_weight == 0 {
            return Err(BlockStreamError::InvalidConfig(
                "history roster has no weight".into(),
            ));
        }
        Ok(Self {
            address_book_hash,
            roster: entries,
            total_weight,
            collected: RwLock::new(Collected::default()),
        })
    }

    /// Hash of the address book the roster attests to
    pub fn address_book_hash(&self) -> BlockHash {
        self.address_book_hash
    }

    /// Accept one node's signature over `metadata`.
    ///
    /// Returns true once a genesis proof for `metadata` exists.
    pub fn submit_signature(
        &self,
        node_id: u64,
        metadata: &[u8],
        signature: HistorySignature,
    ) -> Result<bool> {
        let entry = self.roster.get(&node_id).ok_or_else(|| {
            BlockStreamError::Crypto(format!("node {} is not in the history roster", node_id))
        })?;
        entry
            .key
            .verify_binding(self.address_book_hash.as_bytes(), metadata, &signature)?;

        let mut collected = self.collected.write();
        if collected.proofs.contains_key(metadata) {
            return Ok(true);
        }

        let group = collected.by_metadata.entry(metadata.to_vec()).or_default();
        group.insert(node_id, signature);
        let weight: u64 = group
            .keys()
            .filter_map(|id| self.roster.get(id))
            .map(|e| e.weight)
            .sum();
        if !is_strong_minority(weight, self.total_weight) {
            return Ok(false);
        }

        let proof = HistoryProof {
            address_book_hash: self.address_book_hash,
            metadata: metadata.to_vec(),
            signatures: group
                .iter()
                .map(|(id, sig)| NodeSignature {
                    node_id: *id,
                    signature: sig.as_bytes().to_vec(),
                })
                .collect(),
        };
        info!(
            "[block-stream] 📜 Genesis history proof formed for {}-byte metadata with {} signatures ({}/{} weight)",
            metadata.len(),
            proof.signatures.len(),
            weight,
            self.total_weight
        );
        collected.by_metadata.remove(metadata);
        collected.proofs.insert(metadata.to_vec(), proof);
        Ok(true)
    }

    /// Check a proof against this roster
    pub fn verify_proof(&self, proof: &HistoryProof) -> bool {
        if proof.address_book_hash != self.address_book_hash {
            return false;
        }
        let mut weight: u64 = 0;
        let mut last: Option<u64> = None;
        for node_sig in &proof.signatures {
            if last.map_or(false, |l| node_sig.node_id <= l) {
                return false;
            }
            last = Some(node_sig.node_id);

            let Some(entry) = self.roster.get(&node_sig.node_id) else {
                return false;
            };
            let Ok(sig) = HistorySignature::from_slice(&node_sig.signature) else {
                return false;
            };
            if let Err(e) =
                entry
                    .key
                    .verify_binding(self.address_book_hash.as_bytes(), &proof.metadata, &sig)
            {
                warn!(
                    "[block-stream] History signature from node {} rejected: {}",
                    node_sig.node_id, e
                );
                return false;
            }
            weight += entry.weight;
        }
        is_strong_minority(weight, self.total_weight)
    }
}

impl HistoryProofService for Ed25519HistoryService {
    fn proof_for(&self, metadata: &[u8]) -> Option<HistoryProof> {
        self.collected.read().proofs.get(metadata).cloned()
    }
}
