//! # End-to-End Scenarios
//!
//! Round intake through signing to written blocks, observed only through the
//! writer and the public stream API.
//!
//! ## Flows Tested
//!
//! 1. **Single block**: one round, trivial signer, one open/close pair
//! 2. **Long chain**: gap-free numbering and an independently recomputed chain
//! 3. **Signing retry**: one failure, one retry, one write
//! 4. **Ordering**: signatures completing out of order still write in order
//! 5. **Lifecycle**: misuse fails fast without disturbing the stream

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    use block_stream::utils::trivial_signature;
    use block_stream::{
        BlockHash, BlockItem, BlockStreamError, BlockStreamManager, BlockStreamOrchestrator,
        BoundaryConfig, BoundaryStateChangeAccumulator, InMemoryBlockItemWriter,
        InMemoryLedgerState, InitialStateHash, SignatureScheme, StreamStatus, TssBlockHashSigner,
        WriterCall, ZERO_BLOCK_HASH,
    };

    use crate::integration::fixtures::{
        drive_rounds, fast_config, round_time, ChainRecomputingWriter, FlakySigner, JitterSigner,
    };

    const ANCHOR_AB: BlockHash = BlockHash::repeat(0xAB);

    /// Run a chain of `rounds` rounds against the recomputing writer and check
    /// the stream's final info agrees with it
    async fn run_chain(rounds: u64, events: u64, transactions: u64) {
        let (writer, log) = ChainRecomputingWriter::new(ANCHOR_AB);
        let state = InMemoryLedgerState::new();
        let mut stream = BlockStreamOrchestrator::new(
            fast_config(),
            Arc::new(TssBlockHashSigner::trivial()),
            Box::new(writer),
            BoundaryStateChangeAccumulator::shared(),
            InitialStateHash::known(ZERO_BLOCK_HASH, 0),
        )
        .unwrap();
        stream.init_last_block_hash(ANCHOR_AB).unwrap();

        drive_rounds(&mut stream, &state, 1, rounds, events, transactions).unwrap();
        let info = stream.shutdown().await.unwrap();

        let log = log.lock();
        let expected: Vec<u64> = (0..rounds).collect();
        assert_eq!(log.closed, expected, "block numbers must be gap-free");
        assert_eq!(log.opens, expected, "each block opened exactly once");
        assert_eq!(info.last_block_number, Some(rounds - 1));
        assert_eq!(info.last_block_hash, log.last_hash);
        assert_eq!(info.trailing_block_hashes.back(), log.hashes.last());

        // header + round header + events * (1 + 2 * transactions) + 2 boundary batches
        let per_block = 2 + events * (1 + 2 * transactions) + 2;
        assert!(log.item_counts.iter().all(|n| *n as u64 == per_block));

        for (hash, signature) in log.hashes.iter().zip(&log.signatures) {
            assert_eq!(signature.bytes, trivial_signature(hash));
        }
    }

    // =============================================================================
    // SCENARIO A: SINGLE BLOCK
    // =============================================================================

    #[tokio::test]
    async fn test_single_round_single_block() {
        let writer = InMemoryBlockItemWriter::new();
        let state = InMemoryLedgerState::new();
        let mut stream = BlockStreamOrchestrator::new(
            fast_config(),
            Arc::new(TssBlockHashSigner::trivial()),
            Box::new(writer.clone()),
            BoundaryStateChangeAccumulator::shared(),
            InitialStateHash::known(ZERO_BLOCK_HASH, 0),
        )
        .unwrap();
        stream.init_last_block_hash(ZERO_BLOCK_HASH).unwrap();

        drive_rounds(&mut stream, &state, 1, 1, 0, 0).unwrap();
        let info = stream.shutdown().await.unwrap();

        let calls = writer.calls();
        let opens = calls
            .iter()
            .filter(|c| matches!(c, WriterCall::Open(_)))
            .count();
        let closes = calls
            .iter()
            .filter(|c| matches!(c, WriterCall::Close(_)))
            .count();
        assert_eq!((opens, closes), (1, 1));
        assert_eq!(calls.first(), Some(&WriterCall::Open(0)));
        assert_eq!(calls.last(), Some(&WriterCall::Close(0)));

        let blocks = writer.blocks().unwrap();
        assert_eq!(blocks.len(), 1);
        let items = &blocks[0].1;
        assert!(matches!(items[0], BlockItem::BlockHeader(_)));
        assert_eq!(items[1], BlockItem::RoundHeader { round_no: 1 });
        let proof = match items.last() {
            Some(BlockItem::BlockProof(proof)) => proof,
            other => panic!("expected a trailing proof, got {:?}", other),
        };
        assert_eq!(proof.signature.scheme, SignatureScheme::Trivial);
        assert_eq!(proof.signature.bytes, trivial_signature(&info.last_block_hash));
        assert_eq!(proof.previous_block_hash, ZERO_BLOCK_HASH);
        assert_eq!(info.last_block_number, Some(0));
    }

    // =============================================================================
    // SCENARIO B: LONG CHAIN
    // =============================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_chain_recomputes_from_anchor() {
        run_chain(300, 10, 10).await;
    }

    /// Full size: 10000 rounds of 10 events with 100 transactions each
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore]
    async fn test_chain_recomputes_from_anchor_full_size() {
        run_chain(10_000, 10, 100).await;
    }

    #[tokio::test]
    async fn test_multi_round_blocks_chain() {
        let (writer, log) = ChainRecomputingWriter::new(ANCHOR_AB);
        let state = InMemoryLedgerState::new();
        let mut config = fast_config();
        config.boundary = BoundaryConfig::RoundsPerBlock { rounds: 4 };
        let mut stream = BlockStreamOrchestrator::new(
            config,
            Arc::new(TssBlockHashSigner::trivial()),
            Box::new(writer),
            BoundaryStateChangeAccumulator::shared(),
            InitialStateHash::known(ZERO_BLOCK_HASH, 0),
        )
        .unwrap();
        stream.init_last_block_hash(ANCHOR_AB).unwrap();

        // 10 rounds: blocks of rounds 1-4 and 5-8; rounds 9-10 stay open
        drive_rounds(&mut stream, &state, 1, 10, 1, 1).unwrap();
        assert_eq!(stream.next_block_number(), 2);
        let info = stream.shutdown().await.unwrap();

        let log = log.lock();
        assert_eq!(log.closed, vec![0, 1]);
        assert_eq!(info.last_block_hash, log.last_hash);
    }

    // =============================================================================
    // SCENARIO C: SIGNING RETRY
    // =============================================================================

    #[tokio::test]
    async fn test_signing_failure_retried_once() {
        let (writer, log) = ChainRecomputingWriter::new(ZERO_BLOCK_HASH);
        let signer = Arc::new(FlakySigner::new(1));
        let state = InMemoryLedgerState::new();
        let mut stream = BlockStreamOrchestrator::new(
            fast_config(),
            signer.clone(),
            Box::new(writer),
            BoundaryStateChangeAccumulator::shared(),
            InitialStateHash::known(ZERO_BLOCK_HASH, 0),
        )
        .unwrap();
        stream.init_last_block_hash(ZERO_BLOCK_HASH).unwrap();
        let metrics = stream.metrics();

        drive_rounds(&mut stream, &state, 1, 1, 2, 2).unwrap();
        timeout(Duration::from_secs(5), stream.await_finalized(0))
            .await
            .expect("block 0 not finalized in time")
            .unwrap();
        let info = stream.shutdown().await.unwrap();

        assert_eq!(signer.calls(), 2);
        assert_eq!(metrics.get_signature_retries(), 1);
        let log = log.lock();
        assert_eq!(log.opens, vec![0], "no duplicate open for a retried signature");
        assert_eq!(log.closed, vec![0]);
        assert_eq!(info.last_block_hash, log.last_hash);
        assert_eq!(log.signatures[0].bytes, trivial_signature(&log.last_hash));
    }

    #[tokio::test]
    async fn test_signing_budget_exhausted_halts() {
        let writer = InMemoryBlockItemWriter::new();
        let state = InMemoryLedgerState::new();
        let mut stream = BlockStreamOrchestrator::new(
            fast_config(),
            Arc::new(FlakySigner::new(u32::MAX)),
            Box::new(writer.clone()),
            BoundaryStateChangeAccumulator::shared(),
            InitialStateHash::known(ZERO_BLOCK_HASH, 0),
        )
        .unwrap();
        stream.init_last_block_hash(ZERO_BLOCK_HASH).unwrap();

        drive_rounds(&mut stream, &state, 1, 1, 0, 0).unwrap();
        let err = timeout(Duration::from_secs(5), stream.await_finalized(0))
            .await
            .expect("halt not observed in time")
            .unwrap_err();
        assert!(matches!(err, BlockStreamError::Halted { .. }));
        assert!(matches!(stream.status(), StreamStatus::Halted { .. }));

        // Intake refuses work once halted
        let next = drive_rounds(&mut stream, &state, 2, 1, 0, 0);
        assert!(matches!(next, Err(BlockStreamError::Halted { .. })));
        assert!(writer.closed_numbers().is_empty());
        assert!(stream.shutdown().await.is_err());
    }

    // =============================================================================
    // ORDERING
    // =============================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_out_of_order_signatures_write_in_order() {
        let (writer, log) = ChainRecomputingWriter::new(ZERO_BLOCK_HASH);
        let state = InMemoryLedgerState::new();
        let mut stream = BlockStreamOrchestrator::new(
            fast_config(),
            Arc::new(JitterSigner::new(Duration::from_millis(10))),
            Box::new(writer),
            BoundaryStateChangeAccumulator::shared(),
            InitialStateHash::known(ZERO_BLOCK_HASH, 0),
        )
        .unwrap();
        stream.init_last_block_hash(ZERO_BLOCK_HASH).unwrap();

        drive_rounds(&mut stream, &state, 1, 50, 1, 1).unwrap();
        let info = stream.shutdown().await.unwrap();

        let log = log.lock();
        assert_eq!(log.closed, (0..50).collect::<Vec<_>>());
        assert_eq!(info.last_block_hash, log.last_hash);
    }

    #[tokio::test]
    async fn test_intake_does_not_wait_for_signing() {
        let writer = InMemoryBlockItemWriter::new();
        let state = InMemoryLedgerState::new();
        let mut stream = BlockStreamOrchestrator::new(
            fast_config(),
            Arc::new(JitterSigner::new(Duration::from_millis(200))),
            Box::new(writer.clone()),
            BoundaryStateChangeAccumulator::shared(),
            InitialStateHash::known(ZERO_BLOCK_HASH, 0),
        )
        .unwrap();
        stream.init_last_block_hash(ZERO_BLOCK_HASH).unwrap();

        let started = std::time::Instant::now();
        drive_rounds(&mut stream, &state, 1, 20, 1, 1).unwrap();
        assert!(started.elapsed() < Duration::from_millis(200));
        assert_eq!(stream.next_block_number(), 20);

        stream.shutdown().await.unwrap();
        assert_eq!(writer.closed_numbers().len(), 20);
    }

    // =============================================================================
    // LIFECYCLE
    // =============================================================================

    #[tokio::test]
    async fn test_write_after_close_fails_fast() {
        let writer = InMemoryBlockItemWriter::new();
        let state = InMemoryLedgerState::new();
        let mut stream = BlockStreamOrchestrator::new(
            fast_config(),
            Arc::new(TssBlockHashSigner::trivial()),
            Box::new(writer.clone()),
            BoundaryStateChangeAccumulator::shared(),
            InitialStateHash::known(ZERO_BLOCK_HASH, 0),
        )
        .unwrap();
        stream.init_last_block_hash(ZERO_BLOCK_HASH).unwrap();

        drive_rounds(&mut stream, &state, 1, 1, 0, 0).unwrap();
        let err = stream
            .write_item(BlockItem::RoundHeader { round_no: 1 })
            .unwrap_err();
        assert!(matches!(err, BlockStreamError::OrderingViolation { .. }));
        assert!(matches!(
            stream.end_round(&state, 1),
            Err(BlockStreamError::OrderingViolation { .. })
        ));

        // The stream is still usable for the next round
        drive_rounds(&mut stream, &state, 2, 1, 0, 0).unwrap();
        stream.shutdown().await.unwrap();
        assert_eq!(writer.closed_numbers(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_round_gap_rejected() {
        let state = InMemoryLedgerState::new();
        let mut stream = BlockStreamOrchestrator::new(
            fast_config(),
            Arc::new(TssBlockHashSigner::trivial()),
            Box::new(InMemoryBlockItemWriter::new()),
            BoundaryStateChangeAccumulator::shared(),
            InitialStateHash::known(ZERO_BLOCK_HASH, 0),
        )
        .unwrap();
        stream.init_last_block_hash(ZERO_BLOCK_HASH).unwrap();

        drive_rounds(&mut stream, &state, 1, 1, 0, 0).unwrap();
        let err = drive_rounds(&mut stream, &state, 3, 1, 0, 0).unwrap_err();
        assert_eq!(
            err,
            BlockStreamError::NonSequentialRound {
                previous: 1,
                actual: 3
            }
        );
        stream.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_boundary_carries_chain_through_previous_block() {
        let writer = InMemoryBlockItemWriter::new();
        let state = InMemoryLedgerState::new();
        let mut stream = BlockStreamOrchestrator::new(
            fast_config(),
            Arc::new(TssBlockHashSigner::trivial()),
            Box::new(writer.clone()),
            BoundaryStateChangeAccumulator::shared(),
            InitialStateHash::known(ZERO_BLOCK_HASH, 0),
        )
        .unwrap();
        stream.init_last_block_hash(ZERO_BLOCK_HASH).unwrap();

        // Block 0 may still be signing when block 1 closes
        drive_rounds(&mut stream, &state, 1, 2, 0, 0).unwrap();
        stream.shutdown().await.unwrap();

        let blocks = writer.blocks().unwrap();
        let block0_hash = match blocks[1].1.last() {
            Some(BlockItem::BlockProof(proof)) => proof.previous_block_hash,
            other => panic!("expected a proof, got {:?}", other),
        };
        // Second-to-last item of block 1 is the stream info singleton batch
        let items = &blocks[1].1;
        let singleton = &items[items.len() - 2];
        let info = match singleton {
            BlockItem::StateChanges(batch) => match &batch.changes[0].payload {
                block_stream::StateChangePayload::Singleton(
                    block_stream::domain::SingletonValue::BlockStreamInfo(info),
                ) => info.clone(),
                other => panic!("expected stream info, got {:?}", other),
            },
            other => panic!("expected state changes, got {:?}", other),
        };
        assert_eq!(info.last_block_number, Some(0));
        assert_eq!(info.last_block_hash, block0_hash);
        assert_eq!(batch_time(singleton), Some(round_time(2)));
    }

    fn batch_time(item: &BlockItem) -> Option<block_stream::Timestamp> {
        match item {
            BlockItem::StateChanges(batch) => Some(batch.consensus_time),
            _ => None,
        }
    }
}
