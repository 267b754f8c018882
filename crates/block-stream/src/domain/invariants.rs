//! Block and chain verification
//!
//! Checks a written block the way a downstream reader would: header first,
//! proof last, proof hash linkage, and the recomputed hash over every item
//! but the proof.

use crate::domain::{BlockHash, BlockItem, FinalizedBlock, SignatureScheme};
use crate::error::{BlockStreamError, Result};
use crate::utils::{block_hash, decode_item, trivial_signature};

fn broken(block_number: u64, reason: impl Into<String>) -> BlockStreamError {
    BlockStreamError::ChainBroken {
        block_number,
        reason: reason.into(),
    }
}

/// Verify one block given its encoded items (proof included, unframed)
/// and the hash it must chain from
pub fn verify_block_items(encoded: &[Vec<u8>], expected_previous: &BlockHash) -> Result<FinalizedBlock> {
    let (proof_bytes, body) = encoded
        .split_last()
        .ok_or_else(|| broken(0, "empty block"))?;

    let header = match body.first().map(|b| decode_item(b)).transpose()? {
        Some(BlockItem::BlockHeader(header)) => header,
        Some(other) => return Err(broken(0, format!("first item is {}", other.kind()))),
        None => return Err(broken(0, "block has no header")),
    };
    let number = header.number;

    let proof = match decode_item(proof_bytes)? {
        BlockItem::BlockProof(proof) => proof,
        other => {
            return Err(broken(
                number,
                format!("last item is {}, expected block_proof", other.kind()),
            ))
        }
    };

    let mut end_time = header.block_timestamp;
    for bytes in &body[1..] {
        match decode_item(bytes)? {
            BlockItem::BlockHeader(_) => return Err(broken(number, "second block header")),
            BlockItem::BlockProof(_) => return Err(broken(number, "proof before last item")),
            BlockItem::StateChanges(batch) => end_time = batch.consensus_time,
            _ => {}
        }
    }

    if proof.block_number != number {
        return Err(broken(
            number,
            format!("proof is for block {}", proof.block_number),
        ));
    }
    if proof.previous_block_hash != *expected_previous {
        return Err(broken(
            number,
            format!(
                "previous hash {} does not match expected {}",
                proof.previous_block_hash.short(),
                expected_previous.short()
            ),
        ));
    }

    let hash = block_hash(&proof.previous_block_hash, body)?;
    match proof.signature.scheme {
        SignatureScheme::Trivial | SignatureScheme::HistoryWrapped => {
            if proof.signature.bytes != trivial_signature(&hash) {
                return Err(broken(number, "trivial signature does not match block hash"));
            }
        }
        SignatureScheme::Threshold | SignatureScheme::ThresholdWithHistory => {}
    }
    if matches!(
        proof.signature.scheme,
        SignatureScheme::HistoryWrapped | SignatureScheme::ThresholdWithHistory
    ) && proof.signature.history_proof.is_none()
    {
        return Err(broken(number, "history scheme without history proof"));
    }

    Ok(FinalizedBlock {
        number,
        hash,
        previous_hash: proof.previous_block_hash,
        signature: proof.signature,
        item_count: encoded.len(),
        end_time,
    })
}

/// Verify consecutive blocks starting from `anchor`
pub fn verify_chain(blocks: &[Vec<Vec<u8>>], anchor: &BlockHash) -> Result<Vec<FinalizedBlock>> {
    let mut previous = *anchor;
    let mut expected_number: Option<u64> = None;
    let mut verified = Vec::with_capacity(blocks.len());
    for items in blocks {
        let block = verify_block_items(items, &previous)?;
        if let Some(expected) = expected_number {
            if block.number != expected {
                return Err(broken(
                    block.number,
                    format!("expected block {}", expected),
                ));
            }
        }
        expected_number = Some(block.number + 1);
        previous = block.hash;
        verified.push(block);
    }
    Ok(verified)
}
