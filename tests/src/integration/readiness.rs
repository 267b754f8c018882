//! # Signer Readiness
//!
//! The threshold and history collaborators bootstrap independently and in
//! either order. Blocks closed before the signer is ready wait in the
//! pipeline; round intake never does.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    use block_stream::{
        BlockHash, BlockHashSigner, BlockItem, BlockStreamManager, BlockStreamOrchestrator,
        BlsThresholdService, BoundaryStateChangeAccumulator, Ed25519HistoryService,
        HistoryProofService, InMemoryBlockItemWriter, InMemoryLedgerState, InitialStateHash,
        SignatureScheme, SigningStrategy, ThresholdSigningService, TssBlockHashSigner,
        ZERO_BLOCK_HASH,
    };
    use shared_crypto::{BlsKeyPair, BlsPublicKey, HistoryKeyPair};

    use crate::integration::fixtures::{drive_rounds, fast_config};

    const ROSTER: u64 = 4;
    const THRESHOLD: usize = 3;

    fn bls_key(id: u64) -> BlsKeyPair {
        let mut ikm = [0u8; 32];
        ikm[..8].copy_from_slice(&id.to_le_bytes());
        ikm[31] = 0x5A;
        BlsKeyPair::from_ikm(&ikm).unwrap()
    }

    fn history_key(id: u64) -> HistoryKeyPair {
        let mut seed = [0u8; 32];
        seed[..8].copy_from_slice(&id.to_le_bytes());
        HistoryKeyPair::from_seed(seed)
    }

    /// Verification key the threshold construction will converge on
    fn expected_vk() -> Vec<u8> {
        let keys: Vec<BlsPublicKey> = (0..THRESHOLD as u64).map(|id| bls_key(id).public_key()).collect();
        BlsPublicKey::aggregate(&keys).unwrap().to_bytes().to_vec()
    }

    struct Network {
        threshold: Arc<BlsThresholdService>,
        history: Arc<Ed25519HistoryService>,
    }

    impl Network {
        fn new() -> Self {
            let roster = (0..ROSTER)
                .map(|id| (id, history_key(id).public_key(), 1))
                .collect();
            Self {
                threshold: Arc::new(BlsThresholdService::new(THRESHOLD).unwrap()),
                history: Arc::new(
                    Ed25519HistoryService::new(BlockHash::repeat(0x42), roster).unwrap(),
                ),
            }
        }

        fn signer(&self) -> TssBlockHashSigner {
            TssBlockHashSigner::new(SigningStrategy::ThresholdWithHistory {
                threshold: self.threshold.clone(),
                history: self.history.clone(),
            })
        }

        fn converge_threshold(&self) {
            for id in 0..ROSTER {
                if self.threshold.register_party(id, bls_key(id)).unwrap() {
                    return;
                }
            }
            panic!("threshold construction did not converge");
        }

        fn endorse_history(&self, metadata: &[u8]) {
            let book = self.history.address_book_hash();
            for id in 0..ROSTER {
                let signature = history_key(id).sign_binding(book.as_bytes(), metadata);
                if self.history.submit_signature(id, metadata, signature).unwrap() {
                    return;
                }
            }
            panic!("history proof did not form");
        }
    }

    fn orchestrator(
        signer: Arc<TssBlockHashSigner>,
        writer: &InMemoryBlockItemWriter,
    ) -> BlockStreamOrchestrator {
        let mut stream = BlockStreamOrchestrator::new(
            fast_config(),
            signer,
            Box::new(writer.clone()),
            BoundaryStateChangeAccumulator::shared(),
            InitialStateHash::known(ZERO_BLOCK_HASH, 0),
        )
        .unwrap();
        stream.init_last_block_hash(ZERO_BLOCK_HASH).unwrap();
        stream
    }

    #[tokio::test]
    async fn test_threshold_first_then_history() {
        let network = Network::new();
        let signer = Arc::new(network.signer());
        let writer = InMemoryBlockItemWriter::new();
        let state = InMemoryLedgerState::new();
        let mut stream = orchestrator(signer.clone(), &writer);

        drive_rounds(&mut stream, &state, 1, 3, 1, 1).unwrap();
        assert!(!signer.is_ready());

        network.converge_threshold();
        assert!(!signer.is_ready(), "history proof still missing");
        let vk = network.threshold.verification_key().unwrap();
        network.endorse_history(&vk);
        assert!(signer.is_ready());

        timeout(Duration::from_secs(10), stream.await_finalized(2))
            .await
            .expect("blocks not finalized after bootstrap")
            .unwrap();
        stream.shutdown().await.unwrap();

        for (number, items) in writer.blocks().unwrap() {
            let proof = match items.last() {
                Some(BlockItem::BlockProof(proof)) => proof.clone(),
                other => panic!("block {} has no proof: {:?}", number, other),
            };
            assert_eq!(proof.signature.scheme, SignatureScheme::ThresholdWithHistory);
            let hash = block_hash_of(&writer, number);
            assert!(network
                .threshold
                .verify(hash.as_bytes(), &proof.signature.bytes)
                .unwrap());
            let history = proof.signature.history_proof.unwrap();
            assert_eq!(history.metadata, vk);
            assert!(network.history.verify_proof(&history));
        }
    }

    #[tokio::test]
    async fn test_history_first_then_threshold() {
        let network = Network::new();
        let signer = Arc::new(network.signer());
        let writer = InMemoryBlockItemWriter::new();
        let state = InMemoryLedgerState::new();
        let mut stream = orchestrator(signer.clone(), &writer);

        network.endorse_history(&expected_vk());
        assert!(network.history.proof_for(&expected_vk()).is_some());
        assert!(!signer.is_ready(), "threshold construction still missing");

        drive_rounds(&mut stream, &state, 1, 2, 0, 0).unwrap();
        network.converge_threshold();
        assert!(signer.is_ready());

        timeout(Duration::from_secs(10), stream.await_finalized(1))
            .await
            .expect("blocks not finalized after bootstrap")
            .unwrap();
        let info = stream.shutdown().await.unwrap();
        assert_eq!(info.last_block_number, Some(1));
        assert_eq!(writer.closed_numbers(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_empty_metadata_proof_does_not_block_combined_signer() {
        let network = Network::new();
        let signer = Arc::new(network.signer());
        let writer = InMemoryBlockItemWriter::new();
        let state = InMemoryLedgerState::new();
        let mut stream = orchestrator(signer.clone(), &writer);

        // A strong minority endorses empty metadata before the key exists
        network.endorse_history(&[]);
        network.converge_threshold();
        assert!(!signer.is_ready());

        // Intake keeps going; nothing reaches the writer yet
        drive_rounds(&mut stream, &state, 1, 3, 1, 1).unwrap();
        assert!(timeout(Duration::from_millis(100), stream.await_finalized(0))
            .await
            .is_err());
        assert!(writer.closed_numbers().is_empty());
        assert!(stream.is_live());

        let vk = network.threshold.verification_key().unwrap();
        network.endorse_history(&vk);
        assert!(signer.is_ready());
        timeout(Duration::from_secs(10), stream.await_finalized(2))
            .await
            .expect("blocks not finalized once the key was endorsed")
            .unwrap();
        stream.shutdown().await.unwrap();

        for (_, items) in writer.blocks().unwrap() {
            match items.last() {
                Some(BlockItem::BlockProof(proof)) => {
                    let history = proof.signature.history_proof.clone().unwrap();
                    assert_eq!(history.metadata, vk);
                }
                other => panic!("expected a proof, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_history_only_signs_with_proof() {
        let network = Network::new();
        let signer = Arc::new(TssBlockHashSigner::new(SigningStrategy::HistoryOnly(
            network.history.clone(),
        )));
        let writer = InMemoryBlockItemWriter::new();
        let state = InMemoryLedgerState::new();
        let mut stream = orchestrator(signer.clone(), &writer);

        network.endorse_history(&[]);
        drive_rounds(&mut stream, &state, 1, 1, 0, 0).unwrap();
        stream.shutdown().await.unwrap();

        let blocks = writer.blocks().unwrap();
        match blocks[0].1.last() {
            Some(BlockItem::BlockProof(proof)) => {
                assert_eq!(proof.signature.scheme, SignatureScheme::HistoryWrapped);
                assert!(proof.signature.history_proof.is_some());
            }
            other => panic!("expected a proof, got {:?}", other),
        }
    }

    /// Recompute block `number`'s hash from what the writer stored
    fn block_hash_of(writer: &InMemoryBlockItemWriter, number: u64) -> BlockHash {
        let encoded = writer.block_items(number).unwrap();
        let verified = block_stream::domain::verify_block_items(
            &encoded,
            &previous_hash_of(writer, number),
        )
        .unwrap();
        verified.hash
    }

    fn previous_hash_of(writer: &InMemoryBlockItemWriter, number: u64) -> BlockHash {
        let encoded = writer.block_items(number).unwrap();
        match encoded.last().map(|b| block_stream::utils::decode_item(b).unwrap()) {
            Some(BlockItem::BlockProof(proof)) => proof.previous_block_hash,
            other => panic!("expected a proof, got {:?}", other),
        }
    }
}
