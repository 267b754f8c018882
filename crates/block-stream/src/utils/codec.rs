//! Item encoding and framing
//!
//! Items are encoded with bincode. On the wire and on disk a block is a
//! sequence of frames: a 4-byte little-endian length followed by the encoded
//! item.

use crate::domain::BlockItem;
use crate::error::{BlockStreamError, Result};

/// Bytes of the length prefix in front of every encoded item
pub const FRAME_PREFIX_LEN: usize = 4;

/// Encode one item
pub fn encode_item(item: &BlockItem) -> Result<Vec<u8>> {
    Ok(bincode::serialize(item)?)
}

/// Decode one item
pub fn decode_item(bytes: &[u8]) -> Result<BlockItem> {
    Ok(bincode::deserialize(bytes)?)
}

/// Length prefix for an encoded item
pub fn frame_prefix(len: usize) -> Result<[u8; FRAME_PREFIX_LEN]> {
    let len = u32::try_from(len)
        .map_err(|_| BlockStreamError::Serialization(format!("item of {} bytes too large", len)))?;
    Ok(len.to_le_bytes())
}

/// Append one framed item to `buf`
pub fn frame_into(buf: &mut Vec<u8>, encoded: &[u8]) -> Result<()> {
    buf.extend_from_slice(&frame_prefix(encoded.len())?);
    buf.extend_from_slice(encoded);
    Ok(())
}

/// Frame a run of encoded items into one buffer
pub fn frame_items<'a, I>(encoded: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = &'a Vec<u8>>,
{
    let mut buf = Vec::new();
    for item in encoded {
        frame_into(&mut buf, item)?;
    }
    Ok(buf)
}

/// Split a framed buffer back into encoded items
pub fn split_frames(mut buf: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut items = Vec::new();
    while !buf.is_empty() {
        if buf.len() < FRAME_PREFIX_LEN {
            return Err(BlockStreamError::Serialization(format!(
                "truncated frame prefix: {} trailing bytes",
                buf.len()
            )));
        }
        let mut prefix = [0u8; FRAME_PREFIX_LEN];
        prefix.copy_from_slice(&buf[..FRAME_PREFIX_LEN]);
        let len = u32::from_le_bytes(prefix) as usize;
        buf = &buf[FRAME_PREFIX_LEN..];
        if buf.len() < len {
            return Err(BlockStreamError::Serialization(format!(
                "truncated frame: need {} bytes, have {}",
                len,
                buf.len()
            )));
        }
        items.push(buf[..len].to_vec());
        buf = &buf[len..];
    }
    Ok(items)
}

/// Decode every item of a framed buffer, preserving order
pub fn decode_block(buf: &[u8]) -> Result<Vec<BlockItem>> {
    split_frames(buf)?
        .iter()
        .map(|bytes| decode_item(bytes))
        .collect()
}
