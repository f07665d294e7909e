//! The immutable, five-component SSTable: Config, Data, Index, Summary,
//! Filter, Metadata.
//!
//! A single SSTable is materialized either as one bundled file
//! (`sstable_<i>.db`, Config followed by the other four components back to
//! back) or as five separate files (`sstable_<i>_{data,index,summary,filter,
//! metadata}.db`), depending on
//! [`crate::config::StorageConfig::sstable_use_separate_files`]. Either way,
//! every byte is written and read through [`crate::block::BlockDevice`].
//!
//! [`builder::SstableWriter`] materializes a sorted, non-empty batch of
//! records into the five components. [`reader::SstableReader`] answers
//! point lookups by walking Filter → bounds → Summary → Index → Data,
//! touching the Data component only on the final step.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::block::BlockDevice;
use crate::crc::{self, CRC_SIZE};
use crate::error::{BlockLocation, SstableComponent, StorageError, sstable_path};

pub mod builder;
pub mod reader;

pub use builder::SstableWriter;
pub use reader::SstableReader;

/// Size in bytes of one Index/Summary entry:
/// `data_offset(8) | key_length(8) | key_offset_in_component(8)`.
pub const ENTRY_SIZE: usize = 24;

/// The filename suffix for a component in separate-files mode. `Config`
/// has no suffix: it always lives at `sstable_<i>.db`, bundled or not.
pub fn component_suffix(component: SstableComponent) -> &'static str {
    match component {
        SstableComponent::Config => "",
        SstableComponent::Data => "_data",
        SstableComponent::Index => "_index",
        SstableComponent::Summary => "_summary",
        SstableComponent::Filter => "_filter",
        SstableComponent::Metadata => "_metadata",
    }
}

pub(crate) fn component_path(dir: &Path, index: u32, component: SstableComponent) -> PathBuf {
    sstable_path(dir, index, component_suffix(component))
}

/// One `(size, offset)` slot in the bundled Config's component table.
/// `offset` is the starting block index within the shared file; `size` is
/// the component's logical byte length (pre-framing, pre-padding).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ComponentSlot {
    pub size: u64,
    pub offset: u64,
}

/// The Config component: written first, patched last in bundled mode once
/// every other component's size and starting block are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SstableConfig {
    pub use_separate_files: bool,
    pub compression_enabled: bool,
    pub sparse_step: u16,
    /// `[Data, Index, Summary, Filter, Metadata]`. Only meaningful (and
    /// only encoded) when `!use_separate_files`.
    pub component_table: [ComponentSlot; 5],
}

impl SstableConfig {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + 5 * 16);
        out.push(u8::from(self.use_separate_files));
        out.push(u8::from(self.compression_enabled));
        out.extend_from_slice(&self.sparse_step.to_le_bytes());
        if !self.use_separate_files {
            for slot in &self.component_table {
                out.extend_from_slice(&slot.size.to_le_bytes());
                out.extend_from_slice(&slot.offset.to_le_bytes());
            }
        }
        out
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < 4 {
            return None;
        }
        let use_separate_files = buf[0] != 0;
        let compression_enabled = buf[1] != 0;
        let sparse_step = u16::from_le_bytes(buf[2..4].try_into().ok()?);
        let mut component_table = [ComponentSlot::default(); 5];
        if !use_separate_files {
            if buf.len() < 4 + 5 * 16 {
                return None;
            }
            for (i, slot) in component_table.iter_mut().enumerate() {
                let base = 4 + i * 16;
                slot.size = u64::from_le_bytes(buf[base..base + 8].try_into().ok()?);
                slot.offset = u64::from_le_bytes(buf[base + 8..base + 16].try_into().ok()?);
            }
        }
        Some(Self {
            use_separate_files,
            compression_enabled,
            sparse_step,
            component_table,
        })
    }

    fn slot(&self, component: SstableComponent) -> ComponentSlot {
        let idx = match component {
            SstableComponent::Data => 0,
            SstableComponent::Index => 1,
            SstableComponent::Summary => 2,
            SstableComponent::Filter => 3,
            SstableComponent::Metadata => 4,
            SstableComponent::Config => unreachable!("Config has no table slot"),
        };
        self.component_table[idx]
    }

    /// Where a component's bytes begin: a shared-file base block in bundled
    /// mode, or block 0 of that component's own file in separate mode.
    pub(crate) fn location(&self, dir: &Path, index: u32, component: SstableComponent) -> (Arc<Path>, u64) {
        if self.use_separate_files {
            (Arc::from(component_path(dir, index, component)), 0)
        } else {
            (
                Arc::from(component_path(dir, index, SstableComponent::Config)),
                self.slot(component).offset,
            )
        }
    }
}

/// One Index/Summary entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexEntry {
    pub data_offset: u64,
    pub key_length: u64,
    pub key_offset_in_component: u64,
}

impl IndexEntry {
    pub fn encode(&self) -> [u8; ENTRY_SIZE] {
        let mut out = [0u8; ENTRY_SIZE];
        out[0..8].copy_from_slice(&self.data_offset.to_le_bytes());
        out[8..16].copy_from_slice(&self.key_length.to_le_bytes());
        out[16..24].copy_from_slice(&self.key_offset_in_component.to_le_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < ENTRY_SIZE {
            return None;
        }
        Some(Self {
            data_offset: u64::from_le_bytes(buf[0..8].try_into().ok()?),
            key_length: u64::from_le_bytes(buf[8..16].try_into().ok()?),
            key_offset_in_component: u64::from_le_bytes(buf[16..24].try_into().ok()?),
        })
    }
}

/// Prepends an 8-byte logical-size prefix to `body` when materializing a
/// component in separate-files mode; returns `body` unchanged in bundled
/// mode, where the size instead lives in the Config's component table.
pub(crate) fn with_size_prefix(mut body: Vec<u8>, separate: bool) -> Vec<u8> {
    if separate {
        let mut out = Vec::with_capacity(8 + body.len());
        out.extend_from_slice(&(body.len() as u64).to_le_bytes());
        out.append(&mut body);
        out
    } else {
        body
    }
}

/// A sequential reader positioned at a physical (CRC-aware) byte offset
/// within one component's block stream. Successive [`PhysicalCursor::read`]
/// calls advance correctly across block boundaries — unlike raw physical
/// offset arithmetic, which would land inside the next block's CRC header
/// if a read ends exactly at a block's payload boundary.
pub(crate) struct PhysicalCursor<'a> {
    device: &'a BlockDevice,
    path: Arc<Path>,
    block_idx: u64,
    payload_offset: usize,
}

impl<'a> PhysicalCursor<'a> {
    pub fn at(
        device: &'a BlockDevice,
        path: Arc<Path>,
        base_block: u64,
        block_size: u16,
        physical_offset: u64,
    ) -> Result<Self, StorageError> {
        let bs = u64::from(block_size);
        let block_idx = base_block + physical_offset / bs;
        let intra = (physical_offset % bs) as usize;
        let payload_offset = intra.checked_sub(CRC_SIZE).ok_or_else(|| {
            StorageError::Internal("physical offset lands inside a block's CRC header".into())
        })?;
        Ok(Self {
            device,
            path,
            block_idx,
            payload_offset,
        })
    }

    pub fn read(&mut self, len: usize) -> Result<Vec<u8>, StorageError> {
        let mut out = Vec::with_capacity(len);
        while out.len() < len {
            let loc = BlockLocation::new(self.path.clone(), self.block_idx);
            let payload = self.device.read_block(&loc)?;
            if self.payload_offset > payload.len() {
                return Err(StorageError::Internal("physical offset past end of block payload".into()));
            }
            let available = payload.len() - self.payload_offset;
            let take = available.min(len - out.len());
            out.extend_from_slice(&payload[self.payload_offset..self.payload_offset + take]);
            self.payload_offset += take;
            if self.payload_offset == payload.len() {
                self.block_idx += 1;
                self.payload_offset = 0;
            }
        }
        Ok(out)
    }
}

/// One-shot convenience wrapper around [`PhysicalCursor`] for a single read.
pub(crate) fn read_physical(
    device: &BlockDevice,
    path: &Arc<Path>,
    base_block: u64,
    block_size: u16,
    physical_offset: u64,
    len: usize,
) -> Result<Vec<u8>, StorageError> {
    PhysicalCursor::at(device, path.clone(), base_block, block_size, physical_offset)?.read(len)
}

/// Recovers an entry's 0-based index within its component from the
/// physical offset of its `last_entry_offset` pointer — the inverse of the
/// arithmetic the writer used to place entries.
pub(crate) fn last_entry_index(last_entry_physical: u64, prefix_len: u64, block_size: u16) -> u64 {
    let last_logical = crc::physical_to_logical(last_entry_physical, block_size);
    (last_logical - (prefix_len + 8)) / ENTRY_SIZE as u64
}

#[cfg(test)]
mod tests;
