//! Finalization pipeline
//!
//! ```text
//! intake ──ClosedBlock──▶ dispatcher ──(block, signing task)──▶ writer
//!                          │ semaphore                           │ awaits in block order
//!                          └─ spawn sign_block per block         └─ proof, write, record
//! ```
//!
//! Signing runs concurrently, bounded by `max_in_flight_signatures`. The
//! writer receives blocks in close order and awaits each signature before
//! touching the next block, so writes are strictly ordered by block number.
//! Any failure that survives its retry budget halts the pipeline.

use crate::config::{BlockStreamConfig, ReadinessConfig, RetryConfig};
use crate::domain::{
    BlockHash, BlockItem, BlockProof, BlockSignature, BlockStreamInfo, ClosedBlock,
    FinalizedBlock,
};
use crate::error::{BlockStreamError, Result};
use crate::metrics::Metrics;
use crate::ports::{BlockHashSigner, BlockItemWriter};
use crate::utils::{encode_item, frame_items};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Writer shared with blocking write tasks
pub type SharedWriter = Arc<Mutex<Box<dyn BlockItemWriter>>>;

/// What the pipeline has achieved so far
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineProgress {
    /// Highest block number signed and written
    pub last_finalized: Option<u64>,
    /// Set once the pipeline has halted
    pub halted: Option<String>,
}

/// Everything the pipeline tasks share
pub(crate) struct PipelineContext {
    pub config: Arc<BlockStreamConfig>,
    pub signer: Arc<dyn BlockHashSigner>,
    pub writer: SharedWriter,
    pub finalized: Arc<RwLock<BlockStreamInfo>>,
    pub metrics: Arc<Metrics>,
    pub progress: watch::Sender<PipelineProgress>,
}

/// Join handles of the two pipeline tasks
pub(crate) struct PipelineTasks {
    pub dispatcher: JoinHandle<()>,
    pub writer: JoinHandle<()>,
}

type SigningTask = JoinHandle<Result<(BlockSignature, u64)>>;

/// Start the dispatcher and writer tasks on `runtime`
pub(crate) fn spawn(
    runtime: &Handle,
    ctx: PipelineContext,
) -> (mpsc::UnboundedSender<ClosedBlock>, PipelineTasks) {
    let ctx = Arc::new(ctx);
    let (block_tx, block_rx) = mpsc::unbounded_channel::<ClosedBlock>();
    let (signed_tx, signed_rx) = mpsc::unbounded_channel::<(ClosedBlock, SigningTask)>();
    let semaphore = Arc::new(Semaphore::new(ctx.config.max_in_flight_signatures));

    let dispatcher = runtime.spawn(dispatch_loop(
        block_rx,
        signed_tx,
        Arc::clone(&ctx),
        semaphore,
    ));
    let writer = runtime.spawn(write_loop(signed_rx, ctx));

    (block_tx, PipelineTasks { dispatcher, writer })
}

async fn dispatch_loop(
    mut blocks: mpsc::UnboundedReceiver<ClosedBlock>,
    signed: mpsc::UnboundedSender<(ClosedBlock, SigningTask)>,
    ctx: Arc<PipelineContext>,
    semaphore: Arc<Semaphore>,
) {
    while let Some(block) = blocks.recv().await {
        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let signer = Arc::clone(&ctx.signer);
        let metrics = Arc::clone(&ctx.metrics);
        let readiness = ctx.config.readiness.clone();
        let retry = ctx.config.signing_retry.clone();
        let number = block.number;
        let hash = block.block_hash;

        let task = tokio::spawn(async move {
            let _permit = permit;
            sign_block(signer.as_ref(), &readiness, &retry, &metrics, number, hash).await
        });

        if signed.send((block, task)).is_err() {
            debug!("[block-stream] Writer gone, dispatcher stopping");
            break;
        }
    }
}

async fn write_loop(
    mut signed: mpsc::UnboundedReceiver<(ClosedBlock, SigningTask)>,
    ctx: Arc<PipelineContext>,
) {
    while let Some((block, signing)) = signed.recv().await {
        let number = block.number;
        match finalize_block(&ctx, block, signing).await {
            Ok(finalized) => {
                ctx.progress.send_modify(|p| p.last_finalized = Some(finalized.number));
            }
            Err(e) => {
                error!(
                    block_number = number,
                    "[block-stream] ❌ Halting block production: {}", e
                );
                ctx.progress
                    .send_modify(|p| p.halted = Some(e.to_string()));
                break;
            }
        }
    }
}

/// Wait for signer readiness, warning once after the grace period
pub(crate) async fn wait_until_ready(
    signer: &dyn BlockHashSigner,
    readiness: &ReadinessConfig,
    metrics: &Metrics,
    block_number: u64,
) {
    if signer.is_ready() {
        return;
    }
    let started = Instant::now();
    let mut warned = false;
    while !signer.is_ready() {
        if !warned && started.elapsed() >= readiness.grace_period() {
            warn!(
                block_number,
                "[block-stream] ⏳ Signer still bootstrapping after {:?}",
                started.elapsed()
            );
            warned = true;
        }
        tokio::time::sleep(readiness.poll_interval()).await;
    }
    let waited = started.elapsed();
    metrics.record_readiness_wait(waited.as_millis() as u64);
    info!(
        block_number,
        "[block-stream] Signer ready after {:?}", waited
    );
}

/// Sign one block hash, retrying with backoff. Returns the signature and the
/// signing time in microseconds.
pub(crate) async fn sign_block(
    signer: &dyn BlockHashSigner,
    readiness: &ReadinessConfig,
    retry: &RetryConfig,
    metrics: &Metrics,
    block_number: u64,
    hash: BlockHash,
) -> Result<(BlockSignature, u64)> {
    wait_until_ready(signer, readiness, metrics, block_number).await;

    let max_attempts = retry.max_attempts.max(1);
    let started = Instant::now();
    let mut attempt = 0;
    loop {
        attempt += 1;
        match signer.sign(&hash).await {
            Ok(signature) => {
                return Ok((signature, started.elapsed().as_micros() as u64));
            }
            Err(e) if attempt >= max_attempts => {
                return Err(BlockStreamError::SignatureFailed {
                    block_number,
                    attempts: attempt,
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                metrics.record_signature_retry();
                let backoff = retry.backoff(attempt);
                warn!(
                    block_number,
                    attempt,
                    "[block-stream] Signing failed, retrying in {:?}: {}",
                    backoff,
                    e
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

async fn finalize_block(
    ctx: &PipelineContext,
    block: ClosedBlock,
    signing: SigningTask,
) -> Result<FinalizedBlock> {
    let (signature, signing_us) = signing
        .await
        .map_err(|e| BlockStreamError::Internal(format!("signing task failed: {}", e)))??;
    let start_of_block_state_hash = block.start_state_hash.resolve().await?;

    let proof = encode_item(&BlockItem::BlockProof(BlockProof {
        block_number: block.number,
        previous_block_hash: block.previous_block_hash,
        start_of_block_state_hash,
        signature: signature.clone(),
    }))?;
    let batches = block
        .items
        .chunks(ctx.config.serialization_batch_size.max(1))
        .map(frame_items)
        .collect::<Result<Vec<_>>>()?;

    write_with_retry(ctx, block.number, Arc::new(batches), Arc::new(proof)).await?;

    {
        let mut info = ctx.finalized.write();
        info.record_block(
            block.number,
            block.block_hash,
            block.end_time,
            ctx.config.trailing_hashes_limit,
        );
    }
    ctx.metrics.record_block_finalized(signing_us);
    info!(
        block_number = block.number,
        "[block-stream] ✅ Block {} finalized: hash {}, {:?} signature",
        block.number,
        block.block_hash.short(),
        signature.scheme
    );

    Ok(FinalizedBlock {
        number: block.number,
        hash: block.block_hash,
        previous_hash: block.previous_block_hash,
        signature,
        item_count: block.items.len() + 1,
        end_time: block.end_time,
    })
}

async fn write_with_retry(
    ctx: &PipelineContext,
    block_number: u64,
    batches: Arc<Vec<Vec<u8>>>,
    proof: Arc<Vec<u8>>,
) -> Result<()> {
    let retry = &ctx.config.write_retry;
    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let writer = Arc::clone(&ctx.writer);
        let batches = Arc::clone(&batches);
        let proof = Arc::clone(&proof);
        let outcome = tokio::task::spawn_blocking(move || {
            let mut writer = writer.lock();
            writer.open_block(block_number)?;
            for batch in batches.iter() {
                writer.write_items(batch)?;
            }
            writer.write_item(&proof)?;
            writer.close_block()
        })
        .await
        .map_err(|e| BlockStreamError::Internal(format!("write task failed: {}", e)))?;

        match outcome {
            Ok(()) => return Ok(()),
            Err(e) if !e.is_retryable() || attempt >= max_attempts => {
                return Err(BlockStreamError::WriterFailed {
                    block_number,
                    attempts: attempt,
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                ctx.metrics.record_write_retry();
                let backoff: Duration = retry.backoff(attempt);
                warn!(
                    block_number,
                    attempt,
                    "[block-stream] Write failed, retrying in {:?}: {}",
                    backoff,
                    e
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
}
