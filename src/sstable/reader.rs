//! SSTable point-lookup reader: Config → Filter → bounds → Summary →
//! Index → Data, short-circuiting as soon as a step rules the key out.
//!
//! Every component read goes through [`crate::block::BlockDevice`], so a
//! repeatedly-queried SSTable's hot components stay in its cache.

use std::path::Path;
use std::sync::Arc;

use crate::block::BlockDevice;
use crate::bloom::BloomFilter;
use crate::config::StorageConfig;
use crate::crc;
use crate::error::{SstableComponent, StorageError};
use crate::merkle::MerkleTree;
use crate::record::Record;

use super::{IndexEntry, PhysicalCursor, SstableConfig, component_path, last_entry_index, read_physical};

/// Reads SSTable components to answer point lookups.
pub struct SstableReader;

impl SstableReader {
    /// Looks up `key` in the SSTable at `index` inside `dir`.
    ///
    /// Returns `Ok(None)` if the key is absent (including the normal
    /// Bloom-false-positive case, which still resolves to `None` once the
    /// Index search comes up empty). A tombstoned match is returned as
    /// `Some(record)` with `record.tombstone == true` — callers decide
    /// whether that means "absent".
    pub fn get(
        dir: &Path,
        index: u32,
        key: &[u8],
        config: &StorageConfig,
        device: &BlockDevice,
    ) -> Result<Option<Record>, StorageError> {
        let block_size = config.block_size;
        let cfg = read_config(dir, index, device, block_size)?;
        let prefix_len: u64 = if cfg.use_separate_files { 8 } else { 0 };

        // 2. Filter check.
        let (filter_path, filter_base) = cfg.location(dir, index, SstableComponent::Filter);
        let filter_bytes = read_full_component(device, &filter_path, filter_base, block_size, &cfg, SstableComponent::Filter, index)?;
        let filter = BloomFilter::decode(&filter_bytes).ok_or(StorageError::CorruptSstable {
            index,
            component: SstableComponent::Filter,
            offset: 0,
        })?;
        if !filter.contains(key) {
            return Ok(None);
        }

        // 3. Bounds check against Index's first/last entries.
        let (index_path, index_base) = cfg.location(dir, index, SstableComponent::Index);
        let first_entry_physical = crc::logical_to_physical(prefix_len + 8, block_size);
        let first_entry = read_entry(device, &index_path, index_base, block_size, first_entry_physical, index, SstableComponent::Index)?;
        let first_key = read_key(device, &index_path, index_base, block_size, &first_entry, index, SstableComponent::Index)?;

        let index_last_entry_physical = read_last_entry_offset(device, &index_path, index_base, block_size, prefix_len, index, SstableComponent::Index)?;
        let last_entry = read_entry(device, &index_path, index_base, block_size, index_last_entry_physical, index, SstableComponent::Index)?;
        let last_key = read_key(device, &index_path, index_base, block_size, &last_entry, index, SstableComponent::Index)?;

        if key < first_key.as_slice() || key > last_key.as_slice() {
            return Ok(None);
        }
        if key == first_key.as_slice() {
            return fetch_data(dir, index, &cfg, device, block_size, first_entry.data_offset).map(Some);
        }
        if key == last_key.as_slice() {
            return fetch_data(dir, index, &cfg, device, block_size, last_entry.data_offset).map(Some);
        }

        let last_index_idx = last_entry_index(index_last_entry_physical, prefix_len, block_size);

        // 4. Summary binary search, narrowing to an Index search range.
        let (summary_path, summary_base) = cfg.location(dir, index, SstableComponent::Summary);
        let summary_last_entry_physical =
            read_last_entry_offset(device, &summary_path, summary_base, block_size, prefix_len, index, SstableComponent::Summary)?;
        let last_summary_idx = last_entry_index(summary_last_entry_physical, prefix_len, block_size);

        let (lo_summary, hi_summary) = summary_bracket(
            device,
            &summary_path,
            summary_base,
            block_size,
            prefix_len,
            last_summary_idx,
            key,
            index,
        )?;

        let sparse_step = cfg.sparse_step.max(1) as u64;
        let index_lo = lo_summary * sparse_step;
        let index_hi = ((hi_summary + 1) * sparse_step).min(last_index_idx);

        // 5. Index binary search over the narrowed range.
        let found = index_search(device, &index_path, index_base, block_size, prefix_len, index_lo, index_hi, key, index)?;

        match found {
            Some(data_offset) => fetch_data(dir, index, &cfg, device, block_size, data_offset).map(Some),
            None => Ok(None),
        }
    }

    /// Loads the Merkle tree stored in the Metadata component, for callers
    /// that want to explicitly validate an SSTable's integrity (never run
    /// implicitly on a lookup).
    pub fn load_merkle_tree(
        dir: &Path,
        index: u32,
        config: &StorageConfig,
        device: &BlockDevice,
    ) -> Result<MerkleTree, StorageError> {
        let block_size = config.block_size;
        let cfg = read_config(dir, index, device, block_size)?;
        let (path, base) = cfg.location(dir, index, SstableComponent::Metadata);
        let bytes = read_full_component(device, &path, base, block_size, &cfg, SstableComponent::Metadata, index)?;
        MerkleTree::deserialize(&bytes).ok_or(StorageError::CorruptSstable {
            index,
            component: SstableComponent::Metadata,
            offset: 0,
        })
    }
}

fn read_config(dir: &Path, index: u32, device: &BlockDevice, block_size: u16) -> Result<SstableConfig, StorageError> {
    let path: Arc<Path> = Arc::from(component_path(dir, index, SstableComponent::Config));
    let loc = crate::error::BlockLocation::new(path, 0);
    let payload = device.read_block(&loc).map_err(|e| corrupt(e, index, SstableComponent::Config, 0))?;
    SstableConfig::decode(&payload).ok_or(StorageError::CorruptSstable {
        index,
        component: SstableComponent::Config,
        offset: 0,
    })
}

fn corrupt(err: StorageError, index: u32, component: SstableComponent, offset: u64) -> StorageError {
    match err {
        StorageError::CorruptBlock(_) => StorageError::CorruptSstable { index, component, offset },
        other => other,
    }
}

#[allow(clippy::too_many_arguments)]
fn read_full_component(
    device: &BlockDevice,
    path: &Arc<Path>,
    base_block: u64,
    block_size: u16,
    cfg: &SstableConfig,
    component: SstableComponent,
    index: u32,
) -> Result<Vec<u8>, StorageError> {
    let start_physical = crc::logical_to_physical(0, block_size);
    let mut cursor = PhysicalCursor::at(device, path.clone(), base_block, block_size, start_physical)
        .map_err(|e| corrupt(e, index, component, start_physical))?;
    if cfg.use_separate_files {
        let size_bytes = cursor.read(8).map_err(|e| corrupt(e, index, component, start_physical))?;
        let size = u64::from_le_bytes(size_bytes.try_into().unwrap()) as usize;
        cursor.read(size).map_err(|e| corrupt(e, index, component, start_physical))
    } else {
        let size = cfg.component_table[component_table_index(component)].size as usize;
        cursor.read(size).map_err(|e| corrupt(e, index, component, start_physical))
    }
}

fn component_table_index(component: SstableComponent) -> usize {
    match component {
        SstableComponent::Data => 0,
        SstableComponent::Index => 1,
        SstableComponent::Summary => 2,
        SstableComponent::Filter => 3,
        SstableComponent::Metadata => 4,
        SstableComponent::Config => unreachable!("Config has no table slot"),
    }
}

#[allow(clippy::too_many_arguments)]
fn read_entry(
    device: &BlockDevice,
    path: &Arc<Path>,
    base_block: u64,
    block_size: u16,
    physical_offset: u64,
    index: u32,
    component: SstableComponent,
) -> Result<IndexEntry, StorageError> {
    let bytes = read_physical(device, path, base_block, block_size, physical_offset, super::ENTRY_SIZE)
        .map_err(|e| corrupt(e, index, component, physical_offset))?;
    IndexEntry::decode(&bytes).ok_or(StorageError::CorruptSstable {
        index,
        component,
        offset: physical_offset,
    })
}

#[allow(clippy::too_many_arguments)]
fn read_key(
    device: &BlockDevice,
    path: &Arc<Path>,
    base_block: u64,
    block_size: u16,
    entry: &IndexEntry,
    index: u32,
    component: SstableComponent,
) -> Result<Vec<u8>, StorageError> {
    read_physical(
        device,
        path,
        base_block,
        block_size,
        entry.key_offset_in_component,
        entry.key_length as usize,
    )
    .map_err(|e| corrupt(e, index, component, entry.key_offset_in_component))
}

#[allow(clippy::too_many_arguments)]
fn read_last_entry_offset(
    device: &BlockDevice,
    path: &Arc<Path>,
    base_block: u64,
    block_size: u16,
    prefix_len: u64,
    index: u32,
    component: SstableComponent,
) -> Result<u64, StorageError> {
    let physical = crc::logical_to_physical(prefix_len, block_size);
    let bytes = read_physical(device, path, base_block, block_size, physical, 8).map_err(|e| corrupt(e, index, component, physical))?;
    Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
}

/// Binary-searches the Summary for the adjacent pair of sampled entries
/// bracketing `key`, returning their indices `(lo, hi)` with `hi == lo + 1`
/// (or `lo == hi` on an exact Summary hit).
#[allow(clippy::too_many_arguments)]
fn summary_bracket(
    device: &BlockDevice,
    path: &Arc<Path>,
    base_block: u64,
    block_size: u16,
    prefix_len: u64,
    last_summary_idx: u64,
    key: &[u8],
    index: u32,
) -> Result<(u64, u64), StorageError> {
    let mut lo = 0u64;
    let mut hi = last_summary_idx;
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        let entry_physical = crc::logical_to_physical(prefix_len + 8 + mid * super::ENTRY_SIZE as u64, block_size);
        let entry = read_entry(device, path, base_block, block_size, entry_physical, index, SstableComponent::Summary)?;
        let mid_key = read_key(device, path, base_block, block_size, &entry, index, SstableComponent::Summary)?;
        if key <= mid_key.as_slice() {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    Ok((lo, hi))
}

/// Binary-searches Index entries `[lo, hi]` (inclusive) for an exact key
/// match, returning the matching entry's `data_offset`.
#[allow(clippy::too_many_arguments)]
fn index_search(
    device: &BlockDevice,
    path: &Arc<Path>,
    base_block: u64,
    block_size: u16,
    prefix_len: u64,
    mut lo: u64,
    mut hi: u64,
    key: &[u8],
    index: u32,
) -> Result<Option<u64>, StorageError> {
    loop {
        if lo > hi {
            return Ok(None);
        }
        let mid = lo + (hi - lo) / 2;
        let entry_physical = crc::logical_to_physical(prefix_len + 8 + mid * super::ENTRY_SIZE as u64, block_size);
        let entry = read_entry(device, path, base_block, block_size, entry_physical, index, SstableComponent::Index)?;
        let mid_key = read_key(device, path, base_block, block_size, &entry, index, SstableComponent::Index)?;

        match key.cmp(mid_key.as_slice()) {
            std::cmp::Ordering::Equal => return Ok(Some(entry.data_offset)),
            std::cmp::Ordering::Less => {
                if mid == 0 {
                    return Ok(None);
                }
                hi = mid - 1;
            }
            std::cmp::Ordering::Greater => lo = mid + 1,
        }
    }
}

fn fetch_data(
    dir: &Path,
    index: u32,
    cfg: &SstableConfig,
    device: &BlockDevice,
    block_size: u16,
    data_offset: u64,
) -> Result<Record, StorageError> {
    let (path, base) = cfg.location(dir, index, SstableComponent::Data);
    let mut cursor = PhysicalCursor::at(device, path, base, block_size, data_offset)
        .map_err(|e| corrupt(e, index, SstableComponent::Data, data_offset))?;
    let len_bytes = cursor.read(8).map_err(|e| corrupt(e, index, SstableComponent::Data, data_offset))?;
    let record_len = u64::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
    let record_bytes = cursor.read(record_len).map_err(|e| corrupt(e, index, SstableComponent::Data, data_offset))?;

    let (record, _) = Record::decode_from(&record_bytes).map_err(|_| StorageError::CorruptSstable {
        index,
        component: SstableComponent::Data,
        offset: data_offset,
    })?;
    Ok(record)
}
