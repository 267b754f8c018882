//! Synthetic consensus round source.
//!
//! Each round is fed to the stream the way the consensus-handling thread
//! would: round header, events with their transactions and results, the
//! ledger's post-round state changes captured into the boundary accumulator,
//! `end_round`, and finally the asynchronous state-hash notification.

use block_stream::{
    BlockHash, BlockItem, BlockStreamManager, BoundaryStateChanges, ConsensusRound, LedgerState,
    Result, SharedBoundary, StateChange, StateChangePayload, StateHashedNotification, Timestamp,
};
use block_stream::domain::{PlatformState, SingletonValue, STATE_ID_PLATFORM_STATE};
use shared_crypto::sha384_many;

use crate::config::DriverConfig;

/// Deterministic post-round state hash of `round`
pub fn state_hash(round: u64) -> BlockHash {
    BlockHash::new(sha384_many(&[b"block-stream/state".as_slice(), &round.to_le_bytes()]))
}

/// Feeds numbered rounds with advancing consensus time
#[derive(Debug)]
pub struct RoundDriver {
    config: DriverConfig,
    roster_size: u64,
    next_round: u64,
    clock: Timestamp,
    rounds_driven: u64,
}

impl RoundDriver {
    /// Start at `config.first_round`, with consensus time `start`
    pub fn new(config: DriverConfig, roster_size: u64, start: Timestamp) -> Self {
        Self {
            next_round: config.first_round,
            config,
            roster_size: roster_size.max(1),
            clock: start,
            rounds_driven: 0,
        }
    }

    /// Round the next call to [`RoundDriver::drive_round`] feeds
    pub fn next_round(&self) -> u64 {
        self.next_round
    }

    /// Rounds fed so far
    pub fn rounds_driven(&self) -> u64 {
        self.rounds_driven
    }

    /// Whether the configured round budget is spent
    pub fn finished(&self) -> bool {
        self.config
            .max_rounds
            .map_or(false, |max| self.rounds_driven >= max)
    }

    /// Feed one round into `stream`. Returns the number of items written.
    pub fn drive_round<M: BlockStreamManager>(
        &mut self,
        stream: &mut M,
        boundary: &SharedBoundary,
        state: &dyn LedgerState,
    ) -> Result<usize> {
        let round_no = self.next_round;
        let timestamp = self.clock;

        stream.start_round(&ConsensusRound::new(round_no, timestamp), state)?;
        let mut written = 0;
        stream.write_item(BlockItem::RoundHeader { round_no })?;
        written += 1;

        for event in 0..self.config.events_per_round {
            stream.write_item(BlockItem::EventHeader {
                creator_node_id: u64::from(event) % self.roster_size,
            })?;
            written += 1;
            for tx in 0..self.config.transactions_per_event {
                let id = format!("{}-{}-{}", round_no, event, tx);
                stream.write_item(BlockItem::EventTransaction {
                    payload: format!("tx-{}", id).into_bytes(),
                })?;
                stream.write_item(BlockItem::TransactionResult {
                    payload: format!("ok-{}", id).into_bytes(),
                })?;
                written += 2;
            }
        }

        boundary.lock().capture(
            timestamp,
            vec![StateChange {
                state_id: STATE_ID_PLATFORM_STATE,
                payload: StateChangePayload::Singleton(SingletonValue::PlatformState(
                    PlatformState {
                        round: round_no,
                        consensus_time: timestamp,
                    },
                )),
            }],
        );
        stream.end_round(state, round_no)?;
        stream.notify(StateHashedNotification {
            round: round_no,
            hash: state_hash(round_no),
        })?;

        stream_telemetry::log_round_event!(
            debug,
            "driver",
            "Round fed",
            round_no,
            items = written
        );

        self.next_round += 1;
        self.rounds_driven += 1;
        self.clock = timestamp.plus_millis(self.config.round_interval_ms);
        Ok(written)
    }
}
