//! In-memory adapters for tests and embedding.
//!
//! `InMemoryBlockItemWriter` keeps every closed block plus a log of the calls
//! it received, and can be told to fail so retry and halt paths can be driven
//! from tests.

use crate::domain::{BlockItem, BlockStreamInfo};
use crate::error::{Result, WriterError};
use crate::ports::{BlockItemWriter, LedgerState};
use crate::utils::{decode_block, frame_into, split_frames};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Ledger state holding only the stream-info singleton
#[derive(Debug, Default)]
pub struct InMemoryLedgerState {
    info: RwLock<Option<BlockStreamInfo>>,
}

impl InMemoryLedgerState {
    /// Empty state (true cold start)
    pub fn new() -> Self {
        Self::default()
    }

    /// State that already holds `info`
    pub fn with_info(info: BlockStreamInfo) -> Self {
        Self {
            info: RwLock::new(Some(info)),
        }
    }
}

impl LedgerState for InMemoryLedgerState {
    fn block_stream_info(&self) -> Option<BlockStreamInfo> {
        self.info.read().clone()
    }

    fn put_block_stream_info(&self, info: BlockStreamInfo) {
        *self.info.write() = Some(info);
    }
}

/// One call received by [`InMemoryBlockItemWriter`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriterCall {
    /// `open_block(n)`
    Open(u64),
    /// `write_item` with an item of this many bytes
    WriteItem(usize),
    /// `write_items` with a buffer of this many bytes
    WriteItems(usize),
    /// `close_block` for block n
    Close(u64),
}

#[derive(Debug, Default)]
struct MemoryWriterInner {
    open: Option<(u64, Vec<u8>)>,
    closed: BTreeMap<u64, Vec<u8>>,
    calls: Vec<WriterCall>,
    open_counts: HashMap<u64, u32>,
    failing_closes: u32,
    fail_always: bool,
}

/// Writer that keeps closed blocks in memory. Clones share storage.
#[derive(Clone, Debug, Default)]
pub struct InMemoryBlockItemWriter {
    inner: Arc<Mutex<MemoryWriterInner>>,
}

impl InMemoryBlockItemWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` calls to `close_block`
    pub fn fail_next_closes(&self, n: u32) {
        self.inner.lock().failing_closes = n;
    }

    /// Fail every `close_block` from now on (or stop doing so)
    pub fn set_fail_always(&self, fail: bool) {
        self.inner.lock().fail_always = fail;
    }

    /// Numbers of durably closed blocks, ascending
    pub fn closed_numbers(&self) -> Vec<u64> {
        self.inner.lock().closed.keys().copied().collect()
    }

    /// Raw framed content of block `number`
    pub fn raw_block(&self, number: u64) -> Option<Vec<u8>> {
        self.inner.lock().closed.get(&number).cloned()
    }

    /// Encoded (unframed) items of block `number`
    pub fn block_items(&self, number: u64) -> Option<Vec<Vec<u8>>> {
        let raw = self.raw_block(number)?;
        split_frames(&raw).ok()
    }

    /// Every closed block, decoded, in block-number order
    pub fn blocks(&self) -> Result<Vec<(u64, Vec<BlockItem>)>> {
        let inner = self.inner.lock();
        inner
            .closed
            .iter()
            .map(|(n, raw)| Ok((*n, decode_block(raw)?)))
            .collect()
    }

    /// Calls received so far, in order
    pub fn calls(&self) -> Vec<WriterCall> {
        self.inner.lock().calls.clone()
    }

    /// How many times block `number` was opened
    pub fn open_count(&self, number: u64) -> u32 {
        self.inner
            .lock()
            .open_counts
            .get(&number)
            .copied()
            .unwrap_or(0)
    }
}

impl BlockItemWriter for InMemoryBlockItemWriter {
    fn open_block(&mut self, block_number: u64) -> std::result::Result<(), WriterError> {
        let mut inner = self.inner.lock();
        inner.calls.push(WriterCall::Open(block_number));
        if let Some((open, _)) = &inner.open {
            if *open != block_number {
                return Err(WriterError::BlockAlreadyOpen {
                    open: *open,
                    requested: block_number,
                });
            }
        }
        *inner.open_counts.entry(block_number).or_insert(0) += 1;
        inner.open = Some((block_number, Vec::new()));
        Ok(())
    }

    fn write_item(&mut self, bytes: &[u8]) -> std::result::Result<(), WriterError> {
        let mut inner = self.inner.lock();
        inner.calls.push(WriterCall::WriteItem(bytes.len()));
        let (_, buf) = inner.open.as_mut().ok_or(WriterError::NoOpenBlock)?;
        frame_into(buf, bytes).map_err(|e| WriterError::Malformed(e.to_string()))
    }

    fn write_items(&mut self, framed: &[u8]) -> std::result::Result<(), WriterError> {
        let mut inner = self.inner.lock();
        inner.calls.push(WriterCall::WriteItems(framed.len()));
        let (_, buf) = inner.open.as_mut().ok_or(WriterError::NoOpenBlock)?;
        buf.extend_from_slice(framed);
        Ok(())
    }

    fn close_block(&mut self) -> std::result::Result<(), WriterError> {
        let mut inner = self.inner.lock();
        let number = match &inner.open {
            Some((n, _)) => *n,
            None => return Err(WriterError::NoOpenBlock),
        };
        inner.calls.push(WriterCall::Close(number));

        if inner.fail_always {
            return Err(WriterError::Injected(format!("close of block {}", number)));
        }
        if inner.failing_closes > 0 {
            inner.failing_closes -= 1;
            return Err(WriterError::Injected(format!("close of block {}", number)));
        }

        let (number, buf) = inner.open.take().ok_or(WriterError::NoOpenBlock)?;
        match inner.closed.get(&number) {
            Some(existing) if *existing != buf => Err(WriterError::Conflict {
                block_number: number,
            }),
            Some(_) => Ok(()),
            None => {
                inner.closed.insert(number, buf);
                Ok(())
            }
        }
    }
}

/// Writer that accepts and discards everything
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopBlockItemWriter;

impl BlockItemWriter for NoopBlockItemWriter {
    fn open_block(&mut self, _block_number: u64) -> std::result::Result<(), WriterError> {
        Ok(())
    }

    fn write_item(&mut self, _bytes: &[u8]) -> std::result::Result<(), WriterError> {
        Ok(())
    }

    fn write_items(&mut self, _framed: &[u8]) -> std::result::Result<(), WriterError> {
        Ok(())
    }

    fn close_block(&mut self) -> std::result::Result<(), WriterError> {
        Ok(())
    }
}
