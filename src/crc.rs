//! CRC32 framing and padding helpers shared by the block device, WAL, and
//! SSTable layers.
//!
//! These are the primitives that let higher layers compose arbitrary-length
//! serialized data into block-aligned, integrity-checked byte streams:
//! [`wrap_block`] frames a single block-sized payload, [`add_crc_stream`]
//! frames an arbitrary-length stream a block at a time, and [`pad`] rounds a
//! byte stream up to a block boundary. [`logical_to_physical`] performs the
//! inverse of the CRC-stripping arithmetic so callers can translate a
//! logical (CRC-free) offset into the physical offset actually present on
//! disk.

use crc32fast::Hasher;

/// Size in bytes of a CRC32 checksum as written on disk.
pub const CRC_SIZE: usize = 4;

/// Computes the IEEE-polynomial CRC32 of `bytes`.
pub fn compute_crc32(bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// Computes the CRC32 over the concatenation of several byte slices,
/// without actually concatenating them.
pub fn compute_crc32_parts(parts: &[&[u8]]) -> u32 {
    let mut hasher = Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize()
}

/// Frames a single block's payload with its leading CRC32.
///
/// `payload` must be exactly `block_size - CRC_SIZE` bytes. Returns a
/// `block_size`-byte buffer: `CRC32_LE(4) | payload`.
pub fn wrap_block(payload: &[u8], block_size: u16) -> Vec<u8> {
    debug_assert_eq!(payload.len(), block_size as usize - CRC_SIZE);
    let mut out = Vec::with_capacity(block_size as usize);
    out.extend_from_slice(&compute_crc32(payload).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Validates a block read from disk, returning the payload (CRC stripped)
/// if the trailing checksum matches.
pub fn unwrap_block(framed: &[u8]) -> Option<&[u8]> {
    if framed.len() < CRC_SIZE {
        return None;
    }
    let (crc_bytes, payload) = framed.split_at(CRC_SIZE);
    let stored = u32::from_le_bytes(crc_bytes.try_into().ok()?);
    if compute_crc32(payload) == stored {
        Some(payload)
    } else {
        None
    }
}

/// Chunks `bytes` into `block_size - CRC_SIZE`-byte slices, each prefixed
/// with its own CRC32, producing a stream whose length is always a
/// multiple of `block_size` (the final chunk is zero-padded before
/// framing, per [`pad`]).
pub fn add_crc_stream(bytes: &[u8], block_size: u16) -> Vec<u8> {
    let chunk_len = block_size as usize - CRC_SIZE;
    let padded = pad(bytes, chunk_len);
    let mut out = Vec::with_capacity(padded.len() / chunk_len * block_size as usize);
    for chunk in padded.chunks(chunk_len) {
        out.extend_from_slice(&wrap_block(chunk, block_size));
    }
    out
}

/// Appends zero bytes to `bytes` until its length is a multiple of
/// `alignment`. A no-op if `bytes` is already aligned.
pub fn pad(bytes: &[u8], alignment: usize) -> Vec<u8> {
    let mut out = bytes.to_vec();
    let remainder = out.len() % alignment;
    if remainder != 0 {
        out.resize(out.len() + (alignment - remainder), 0);
    }
    out
}

/// Number of zero bytes [`pad`] would append for a stream of length `len`
/// at the given `alignment`, without allocating.
pub fn padding_len(len: usize, alignment: usize) -> usize {
    let remainder = len % alignment;
    if remainder == 0 { 0 } else { alignment - remainder }
}

/// Converts a logical offset (as if no CRC headers existed) into the
/// physical offset actually present on disk:
///
/// `physical = logical + floor(logical / (block_size - 4)) * 4 + 4`
///
/// The trailing `+ 4` accounts for the leading block's own CRC header,
/// which every logical offset is implicitly past.
pub fn logical_to_physical(logical: u64, block_size: u16) -> u64 {
    let chunk_len = u64::from(block_size) - CRC_SIZE as u64;
    logical + (logical / chunk_len) * CRC_SIZE as u64 + CRC_SIZE as u64
}

/// Inverse of [`logical_to_physical`]: recovers the logical offset a
/// physical (on-disk, CRC-aware) offset corresponds to.
pub fn physical_to_logical(physical: u64, block_size: u16) -> u64 {
    let bs = u64::from(block_size);
    let chunk_len = bs - CRC_SIZE as u64;
    let block_idx = physical / bs;
    let payload_offset = physical % bs - CRC_SIZE as u64;
    block_idx * chunk_len + payload_offset
}
