//! One-file-per-block writer.
//!
//! Items are buffered until `close_block`, which writes a temp file, syncs it
//! and renames it to `{number:020}.blk` (`.blk.zst` when compressed). A block
//! file therefore either exists complete or not at all.

use crate::config::WriterConfig;
use crate::domain::{verify_block_items, BlockItem, BlockStreamInfo, SemanticVersion};
use crate::error::{BlockStreamError, Result, WriterError};
use crate::ports::BlockItemWriter;
use crate::utils::{decode_item, frame_into, split_frames};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const PLAIN_EXT: &str = "blk";
const COMPRESSED_EXT: &str = "blk.zst";

#[cfg(feature = "compression")]
const ZSTD_LEVEL: i32 = 3;

/// File path for block `number` under `dir`
pub fn block_file_path(dir: &Path, number: u64, compressed: bool) -> PathBuf {
    let ext = if compressed { COMPRESSED_EXT } else { PLAIN_EXT };
    dir.join(format!("{:020}.{}", number, ext))
}

/// Writes each block to its own file
#[derive(Debug)]
pub struct FileBlockItemWriter {
    dir: PathBuf,
    compress: bool,
    open: Option<(u64, Vec<u8>)>,
}

impl FileBlockItemWriter {
    /// Create the writer, making `config.data_dir` if needed
    pub fn new(config: &WriterConfig) -> std::result::Result<Self, WriterError> {
        if config.compress && !cfg!(feature = "compression") {
            return Err(WriterError::Unsupported(
                "compressed block files need the `compression` feature".into(),
            ));
        }
        fs::create_dir_all(&config.data_dir)?;
        info!(
            "[block-stream] 📁 Writing blocks to {} (compress={})",
            config.data_dir.display(),
            config.compress
        );
        Ok(Self {
            dir: config.data_dir.clone(),
            compress: config.compress,
            open: None,
        })
    }

    /// Directory blocks are written to
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn encode_file(&self, framed: &[u8]) -> std::result::Result<Vec<u8>, WriterError> {
        if !self.compress {
            return Ok(framed.to_vec());
        }
        #[cfg(feature = "compression")]
        {
            Ok(zstd::encode_all(framed, ZSTD_LEVEL)?)
        }
        #[cfg(not(feature = "compression"))]
        {
            Err(WriterError::Unsupported("compression".into()))
        }
    }
}

impl BlockItemWriter for FileBlockItemWriter {
    fn open_block(&mut self, block_number: u64) -> std::result::Result<(), WriterError> {
        if let Some((open, _)) = &self.open {
            if *open != block_number {
                return Err(WriterError::BlockAlreadyOpen {
                    open: *open,
                    requested: block_number,
                });
            }
            debug!("[block-stream] Re-opening block {}", block_number);
        }
        self.open = Some((block_number, Vec::new()));
        Ok(())
    }

    fn write_item(&mut self, bytes: &[u8]) -> std::result::Result<(), WriterError> {
        let (_, buf) = self.open.as_mut().ok_or(WriterError::NoOpenBlock)?;
        frame_into(buf, bytes).map_err(|e| WriterError::Malformed(e.to_string()))
    }

    fn write_items(&mut self, framed: &[u8]) -> std::result::Result<(), WriterError> {
        let (_, buf) = self.open.as_mut().ok_or(WriterError::NoOpenBlock)?;
        buf.extend_from_slice(framed);
        Ok(())
    }

    fn close_block(&mut self) -> std::result::Result<(), WriterError> {
        let (number, framed) = self.open.as_ref().ok_or(WriterError::NoOpenBlock)?;
        let number = *number;
        let path = block_file_path(&self.dir, number, self.compress);

        if path.exists() {
            let existing = read_block_file(&path)?;
            if existing != *framed {
                return Err(WriterError::Conflict {
                    block_number: number,
                });
            }
            warn!(
                "[block-stream] Block {} already on disk with identical content",
                number
            );
            self.open = None;
            return Ok(());
        }

        let contents = self.encode_file(framed)?;
        let tmp = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&contents)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        self.open = None;
        debug!(
            "[block-stream] 💾 Block {} written ({} bytes)",
            number,
            contents.len()
        );
        Ok(())
    }
}

/// Read a block file back into its framed item buffer
pub fn read_block_file(path: &Path) -> std::result::Result<Vec<u8>, WriterError> {
    let raw = fs::read(path)?;
    let compressed = path
        .file_name()
        .and_then(|n| n.to_str())
        .map_or(false, |n| n.ends_with(COMPRESSED_EXT));
    if !compressed {
        return Ok(raw);
    }
    #[cfg(feature = "compression")]
    {
        Ok(zstd::decode_all(raw.as_slice())?)
    }
    #[cfg(not(feature = "compression"))]
    {
        Err(WriterError::Unsupported(format!(
            "{} is compressed",
            path.display()
        )))
    }
}

fn parse_block_number(name: &str) -> Option<u64> {
    let stem = name
        .strip_suffix(&format!(".{}", COMPRESSED_EXT))
        .or_else(|| name.strip_suffix(&format!(".{}", PLAIN_EXT)))?;
    stem.parse().ok()
}

/// Block files under `dir`, ascending by block number
pub fn list_block_files(dir: &Path) -> std::result::Result<Vec<(u64, PathBuf)>, WriterError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if let Some(number) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_block_number)
        {
            files.push((number, path));
        }
    }
    files.sort_by_key(|(n, _)| *n);
    Ok(files)
}

/// Rebuild stream info from the newest block files under `dir`.
///
/// Only the last `max(trailing_limit, 1)` files are opened, one at a time,
/// each verified against its predecessor in that window. The oldest file in
/// the window supplies the anchor from its proof. Returns `None` when no
/// block was ever written.
pub fn recover_last_block(
    dir: &Path,
    software_version: SemanticVersion,
    trailing_limit: usize,
) -> Result<Option<BlockStreamInfo>> {
    let io_err = |e: WriterError| BlockStreamError::Internal(format!("reading blocks: {}", e));

    let files = list_block_files(dir).map_err(io_err)?;
    let window = trailing_limit.max(1).min(files.len());
    let tail = &files[files.len() - window..];
    let Some((first_number, first_path)) = tail.first() else {
        return Ok(None);
    };

    let first = split_frames(&read_block_file(first_path).map_err(io_err)?)?;
    let anchor = match first.last().map(|b| decode_item(b)).transpose()? {
        Some(BlockItem::BlockProof(proof)) => proof.previous_block_hash,
        _ => {
            return Err(BlockStreamError::ChainBroken {
                block_number: *first_number,
                reason: "missing block proof".into(),
            })
        }
    };

    let mut info = BlockStreamInfo::anchored(anchor, software_version);
    let mut expected = *first_number;
    let mut first = Some(first);
    for (number, path) in tail {
        let items = match first.take() {
            Some(items) => items,
            None => split_frames(&read_block_file(path).map_err(io_err)?)?,
        };
        let block = verify_block_items(&items, &info.last_block_hash)?;
        if block.number != *number || block.number != expected {
            return Err(BlockStreamError::ChainBroken {
                block_number: block.number,
                reason: format!("file for block {} holds block {}", number, block.number),
            });
        }
        info.record_block(block.number, block.hash, block.end_time, trailing_limit);
        expected = block.number + 1;
    }

    info!(
        "[block-stream] 💾 Recovered {} of {} blocks, last #{:?} {}",
        window,
        files.len(),
        info.last_block_number,
        info.last_block_hash.short()
    );
    Ok(Some(info))
}
