//! Write-Ahead Log (WAL).
//!
//! A segmented, block-fragmented append log. Every write goes through the
//! [`crate::block::BlockDevice`]: the WAL never touches a file directly, so
//! every block it reads back has already survived a CRC check.
//!
//! ## On-disk layout
//!
//! Segments are files named `wal_<n>.log`, each holding up to
//! [`crate::config::StorageConfig::wal_segment_blocks`] BDL blocks. Within a
//! block's logical payload (`block_size - 4` bytes, CRC already stripped by
//! the block device), records are packed as a sequence of *fragments*:
//!
//! ```text
//! [CRC32_LE(4)][payload_len(2)][frag_type(1)][log_number(4)][payload]
//! ```
//!
//! A record that fits fully within the remaining space of the current block
//! is written as a single [`FragmentType::Full`] fragment. A record that
//! does not fit is split across consecutive blocks as
//! `First, Middle*, Last` — but never across a segment boundary: if a
//! fragmented record would not fit in the blocks remaining in the current
//! segment, the writer pads out the rest of the segment and starts the
//! record fresh in the next one: fragments of a single record never cross
//! a segment boundary.
//!
//! ## Concurrency
//!
//! A WAL has exactly one writer. All mutable state — the in-progress block
//! buffer, its fill offset, the segment's block count, and the current
//! segment number — lives behind a single [`std::sync::Mutex`], an
//! `Arc<Mutex<_>>` single-writer pattern guarding an in-memory staging
//! buffer instead of a raw file handle (the actual file I/O is delegated
//! to the shared [`crate::block::BlockDevice`]).

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, trace, warn};

use crate::block::{self, BlockDevice};
use crate::config::StorageConfig;
use crate::crc;
use crate::error::{StorageError, wal_path};
use crate::record::Record;

// ------------------------------------------------------------------------------------------------
// Fragment format
// ------------------------------------------------------------------------------------------------

/// Size in bytes of a fragment header: `crc32(4) | len(2) | type(1) | log_number(4)`.
pub const FRAGMENT_HEADER_SIZE: usize = 11;

/// Position of a fragment within its record's byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentType {
    /// The record fits entirely in one fragment.
    Full,
    /// The first fragment of a multi-fragment record.
    First,
    /// An interior fragment of a multi-fragment record.
    Middle,
    /// The last fragment of a multi-fragment record.
    Last,
}

impl FragmentType {
    fn to_byte(self) -> u8 {
        match self {
            Self::Full => 4,
            Self::First => 1,
            Self::Middle => 2,
            Self::Last => 3,
        }
    }

    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            4 => Some(Self::Full),
            1 => Some(Self::First),
            2 => Some(Self::Middle),
            3 => Some(Self::Last),
            _ => None,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Writer state
// ------------------------------------------------------------------------------------------------

/// Mutable state of the in-progress WAL tail, guarded by a single mutex.
#[derive(Debug)]
struct WalState {
    /// The current block's payload, being filled left to right. Always
    /// `block_payload_len` bytes; unfilled tail bytes are zero until flush.
    buffer: Vec<u8>,
    /// Bytes of `buffer` already occupied by fragment data.
    offset: usize,
    /// Number of blocks already flushed to the current segment.
    blocks_in_segment: u16,
    /// The segment currently being written to.
    segment: u32,
}

/// A segmented, block-fragmented write-ahead log.
///
/// One [`Wal`] owns exactly one writer's worth of in-progress state; replay
/// of already-closed segments is done through the free functions
/// [`reconstruct`] and [`delete_segments_below`], which need no live `Wal`.
#[derive(Debug)]
pub struct Wal {
    dir: PathBuf,
    config: StorageConfig,
    device: Arc<BlockDevice>,
    state: Mutex<WalState>,
    block_payload_len: usize,
}

impl Wal {
    /// Opens (or creates) a WAL rooted at `dir`, beginning a fresh writer
    /// tail at `start_segment` — callers that just replayed existing
    /// segments via [`reconstruct`] pass one past the highest segment seen.
    ///
    /// This does not scan `dir` itself: segment discovery is the calling
    /// layer's job, which hands this constructor an already-decided
    /// starting point rather than having it infer one.
    pub fn open(dir: impl Into<PathBuf>, config: StorageConfig, device: Arc<BlockDevice>, start_segment: u32) -> Self {
        let block_payload_len = config.block_size as usize - crc::CRC_SIZE;
        debug!(segment = start_segment, "WAL writer opened");
        Self {
            dir: dir.into(),
            config,
            device,
            state: Mutex::new(WalState {
                buffer: vec![0u8; block_payload_len],
                offset: 0,
                blocks_in_segment: 0,
                segment: start_segment,
            }),
            block_payload_len,
        }
    }

    /// Appends one record, fragmenting it across blocks (and, if needed,
    /// segments).
    pub fn append(&self, record: &Record) -> Result<(), StorageError> {
        let payload = record.encode();
        let mut state = self.state.lock().map_err(|_| StorageError::poisoned("WAL state"))?;

        let remaining = self.block_payload_len - state.offset;
        if remaining >= FRAGMENT_HEADER_SIZE + payload.len() {
            self.write_fragment_into(&mut state, FragmentType::Full, &payload)?;
            return Ok(());
        }

        // Doesn't fit as a single FULL fragment in the space left in this
        // block: flush what's there (padded) and start fresh.
        self.flush_current_block(&mut state)?;

        let max_payload_per_fragment = self.block_payload_len - FRAGMENT_HEADER_SIZE;
        if payload.len() <= max_payload_per_fragment {
            self.write_fragment_into(&mut state, FragmentType::Full, &payload)?;
            return Ok(());
        }

        let fragment_count = payload.len().div_ceil(max_payload_per_fragment);
        let available_blocks = u64::from(self.config.wal_segment_blocks - state.blocks_in_segment);
        if fragment_count as u64 > available_blocks {
            // The whole fragmented record must land in one segment: the
            // current (empty) block is wasted padding, and we roll over
            // unconditionally — not just when the segment's block cap is
            // reached — since the remaining blocks aren't enough either way.
            self.flush_block_only(&mut state)?;
            self.rotate_segment(&mut state);
        }

        let mut written = 0usize;
        let mut remaining_fragments = fragment_count;
        while remaining_fragments > 0 {
            let chunk_len = (payload.len() - written).min(max_payload_per_fragment);
            let chunk = &payload[written..written + chunk_len];
            let frag_type = if remaining_fragments == fragment_count {
                FragmentType::First
            } else if remaining_fragments == 1 {
                FragmentType::Last
            } else {
                FragmentType::Middle
            };
            self.write_fragment_into(&mut state, frag_type, chunk)?;
            written += chunk_len;
            remaining_fragments -= 1;
        }

        Ok(())
    }

    /// Pads and flushes any in-progress block so every fragment appended so
    /// far is durable on disk. Does not rotate segments.
    pub fn close(&self) -> Result<(), StorageError> {
        let mut state = self.state.lock().map_err(|_| StorageError::poisoned("WAL state"))?;
        if state.offset > 0 {
            self.flush_current_block(&mut state)?;
        }
        Ok(())
    }

    /// The segment currently accepting writes.
    pub fn current_segment(&self) -> Result<u32, StorageError> {
        let state = self.state.lock().map_err(|_| StorageError::poisoned("WAL state"))?;
        Ok(state.segment)
    }

    /// Encodes one fragment's header and payload directly into the
    /// in-progress block buffer at the current offset, flushing the block
    /// if that fragment exactly fills it.
    fn write_fragment_into(&self, state: &mut WalState, frag_type: FragmentType, chunk: &[u8]) -> Result<(), StorageError> {
        let segment = state.segment;
        let crc = crc::compute_crc32(chunk);
        let start = state.offset;

        state.buffer[start..start + 4].copy_from_slice(&crc.to_le_bytes());
        state.buffer[start + 4..start + 6].copy_from_slice(&(chunk.len() as u16).to_le_bytes());
        state.buffer[start + 6] = frag_type.to_byte();
        state.buffer[start + 7..start + 11].copy_from_slice(&segment.to_le_bytes());
        state.buffer[start + 11..start + 11 + chunk.len()].copy_from_slice(chunk);
        state.offset += FRAGMENT_HEADER_SIZE + chunk.len();

        if state.offset == self.block_payload_len {
            self.flush_current_block(state)?;
        }
        Ok(())
    }

    /// Writes the current buffer as the next block of the current segment
    /// and resets it, without rotating segments even if the cap is reached.
    fn flush_block_only(&self, state: &mut WalState) -> Result<(), StorageError> {
        let loc = block::location_in(&self.dir, &segment_file_name(state.segment), u64::from(state.blocks_in_segment));
        self.device.write_block(&loc, &state.buffer)?;
        trace!(segment = state.segment, block = state.blocks_in_segment, "WAL block flushed");

        state.buffer.fill(0);
        state.offset = 0;
        state.blocks_in_segment += 1;
        Ok(())
    }

    fn flush_current_block(&self, state: &mut WalState) -> Result<(), StorageError> {
        self.flush_block_only(state)?;
        if state.blocks_in_segment >= self.config.wal_segment_blocks {
            self.rotate_segment(state);
        }
        Ok(())
    }

    fn rotate_segment(&self, state: &mut WalState) {
        state.segment += 1;
        state.blocks_in_segment = 0;
        warn!(segment = state.segment, "WAL rolled over to new segment");
    }
}

fn segment_file_name(segment: u32) -> String {
    format!("wal_{segment}.log")
}

// ------------------------------------------------------------------------------------------------
// Replay
// ------------------------------------------------------------------------------------------------

/// Outcome of [`reconstruct`]: the records are delivered to the visitor as
/// they are decoded; this return value only reports whether replay ran to
/// completion or was cut short by a corrupt block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconstructOutcome {
    /// `Some((segment, block))` if replay stopped early at a corrupt block;
    /// `None` if every block in `[start, end]` replayed cleanly.
    pub truncated_at: Option<(u32, u32)>,
}

/// Replays every record in segments `[start, end]` (inclusive), calling
/// `visit` for each one in on-disk order.
///
/// Stops at the first corrupt block rather than erroring out: the caller
/// decides the policy (treat a truncated tail as expected crash-recovery
/// behavior, or surface it) by inspecting [`ReconstructOutcome::truncated_at`].
pub fn reconstruct(
    dir: &Path,
    config: &StorageConfig,
    device: &BlockDevice,
    start: u32,
    end: u32,
    mut visit: impl FnMut(Record),
) -> Result<ReconstructOutcome, StorageError> {
    let block_payload_len = config.block_size as usize - crc::CRC_SIZE;
    let mut pending: Option<Vec<u8>> = None;

    for segment in start..=end {
        let path = wal_path(dir, segment);
        let Ok(metadata) = std::fs::metadata(&path) else {
            debug!(segment, "WAL segment missing during replay, skipping");
            continue;
        };
        let block_count = metadata.len() / u64::from(config.block_size);

        for block_idx in 0..block_count {
            let loc = block::location_in(dir, &segment_file_name(segment), block_idx);
            let payload = match device.read_block(&loc) {
                Ok(payload) => payload,
                Err(StorageError::CorruptBlock(_)) => {
                    warn!(segment, block = block_idx, "WAL replay stopped at corrupt block");
                    return Ok(ReconstructOutcome {
                        truncated_at: Some((segment, block_idx as u32)),
                    });
                }
                Err(other) => return Err(other),
            };

            if let Some(truncated) = replay_block(&payload, segment, block_idx as u32, block_payload_len, &mut pending, &mut visit)? {
                return Ok(ReconstructOutcome { truncated_at: Some(truncated) });
            }
        }
    }

    Ok(ReconstructOutcome { truncated_at: None })
}

/// Parses and replays every fragment packed into one block's payload.
/// Returns `Some((segment, block))` if a structural corruption was found.
fn replay_block(
    payload: &[u8],
    segment: u32,
    block_idx: u32,
    block_payload_len: usize,
    pending: &mut Option<Vec<u8>>,
    visit: &mut impl FnMut(Record),
) -> Result<Option<(u32, u32)>, StorageError> {
    debug_assert_eq!(payload.len(), block_payload_len);

    let mut cursor = 0usize;
    while cursor + FRAGMENT_HEADER_SIZE <= payload.len() {
        let header = &payload[cursor..cursor + FRAGMENT_HEADER_SIZE];
        if header.iter().all(|&b| b == 0) {
            break; // rest of the block is zero padding
        }

        let crc = u32::from_le_bytes(header[0..4].try_into().unwrap());
        let len = u16::from_le_bytes(header[4..6].try_into().unwrap()) as usize;
        let Some(frag_type) = FragmentType::from_byte(header[6]) else {
            warn!(segment, block_idx, "WAL fragment has unknown type byte");
            return Ok(Some((segment, block_idx)));
        };
        let log_number = u32::from_le_bytes(header[7..11].try_into().unwrap());

        if log_number != segment {
            warn!(segment, block_idx, log_number, "WAL fragment log_number mismatch");
            return Ok(Some((segment, block_idx)));
        }

        let payload_start = cursor + FRAGMENT_HEADER_SIZE;
        if payload_start + len > payload.len() {
            warn!(segment, block_idx, "WAL fragment length exceeds block bounds");
            return Ok(Some((segment, block_idx)));
        }
        let frag_payload = &payload[payload_start..payload_start + len];

        if crc::compute_crc32(frag_payload) != crc {
            warn!(segment, block_idx, "WAL fragment checksum mismatch");
            return Ok(Some((segment, block_idx)));
        }

        match frag_type {
            FragmentType::Full => {
                decode_and_visit(frag_payload, visit)?;
            }
            FragmentType::First => {
                *pending = Some(frag_payload.to_vec());
            }
            FragmentType::Middle => match pending {
                Some(buf) => buf.extend_from_slice(frag_payload),
                None => {
                    warn!(segment, block_idx, "WAL MIDDLE fragment with no preceding FIRST");
                    return Ok(Some((segment, block_idx)));
                }
            },
            FragmentType::Last => match pending.take() {
                Some(mut buf) => {
                    buf.extend_from_slice(frag_payload);
                    decode_and_visit(&buf, visit)?;
                }
                None => {
                    warn!(segment, block_idx, "WAL LAST fragment with no preceding FIRST");
                    return Ok(Some((segment, block_idx)));
                }
            },
        }

        cursor = payload_start + len;
    }

    Ok(None)
}

fn decode_and_visit(bytes: &[u8], visit: &mut impl FnMut(Record)) -> Result<(), StorageError> {
    let (record, _) = Record::decode_from(bytes)
        .map_err(|e| StorageError::Internal(format!("WAL record decode failed: {e}")))?;
    visit(record);
    Ok(())
}

/// Deletes every `wal_<n>.log` segment with `n < watermark`, and forgets
/// their per-file block-cache lock so the device doesn't keep state for a
/// file that no longer exists.
pub fn delete_segments_below(dir: &Path, device: &BlockDevice, watermark: u32) -> Result<(), StorageError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let Some(segment) = parse_segment_number(&entry.file_name()) else {
            continue;
        };
        if segment < watermark {
            std::fs::remove_file(entry.path())?;
            device.forget_file(&entry.path());
            debug!(segment, "WAL segment deleted below watermark");
        }
    }
    Ok(())
}

fn parse_segment_number(file_name: &std::ffi::OsStr) -> Option<u32> {
    let name = file_name.to_str()?;
    name.strip_prefix("wal_")?.strip_suffix(".log")?.parse().ok()
}
