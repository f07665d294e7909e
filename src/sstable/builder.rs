//! SSTable writer: materializes an already-sorted, non-empty batch of
//! records into the five on-disk components.
//!
//! Every component is built as a single in-memory logical byte stream,
//! then handed to the block device one `block_size - 4`-byte chunk at a
//! time — [`crate::block::BlockDevice::write_block`] adds each chunk's
//! CRC32, so the writer never frames a checksum itself.

use std::path::Path;
use std::sync::Arc;

use crate::block::BlockDevice;
use crate::bloom::BloomFilter;
use crate::config::StorageConfig;
use crate::crc::{self, CRC_SIZE};
use crate::error::{BlockLocation, SstableComponent, StorageError};
use crate::merkle::MerkleTree;
use crate::record::{self, Record};

use super::{ComponentSlot, IndexEntry, SstableConfig, ENTRY_SIZE, component_path, with_size_prefix};

/// Writes one SSTable, identified by `index`, into `dir`.
pub struct SstableWriter;

impl SstableWriter {
    /// `records` must be non-empty and already sorted by key.
    pub fn write(
        dir: &Path,
        index: u32,
        records: &[Record],
        config: &StorageConfig,
        device: &BlockDevice,
    ) -> Result<(), StorageError> {
        assert!(!records.is_empty(), "SSTable writer requires a non-empty, sorted batch");

        let block_size = config.block_size;
        let separate = config.sstable_use_separate_files;

        // --- Data: length-prefixed records, concatenated in order. ---
        let mut records_bytes = Vec::new();
        let mut data_logical_offsets = Vec::with_capacity(records.len());
        let data_prefix_len: u64 = if separate { 8 } else { 0 };
        for rec in records {
            data_logical_offsets.push(data_prefix_len + records_bytes.len() as u64);
            record::encode_length_prefixed(rec, &mut records_bytes);
        }
        let data_logical = with_size_prefix(records_bytes, separate);

        // --- Index: one entry per record, in key order. ---
        let index_items: Vec<(u64, Vec<u8>)> = records
            .iter()
            .zip(&data_logical_offsets)
            .map(|(rec, &logical)| (crc::logical_to_physical(logical, block_size), rec.key.clone()))
            .collect();
        let index_logical = build_index_like(&index_items, separate, block_size);

        // --- Summary: every sparse_step-th Index entry, plus first/last. ---
        let sparse_step = config.sstable_sparse_step.max(1) as usize;
        let mut summary_items: Vec<(u64, Vec<u8>)> = index_items.iter().step_by(sparse_step).cloned().collect();
        if let Some(last) = index_items.last() {
            if summary_items.last() != Some(last) {
                summary_items.push(last.clone());
            }
        }
        let summary_logical = build_index_like(&summary_items, separate, block_size);

        // --- Filter: Bloom filter over every key. ---
        let mut filter = BloomFilter::new(
            records.len() as u64,
            config.bloom_false_positive_rate,
            (0x9E37_79B9_7F4A_7C15, 0xC2B2_AE3D_27D4_EB4F),
        );
        for rec in records {
            filter.add(&rec.key);
        }
        let filter_logical = with_size_prefix(filter.encode(), separate);

        // --- Metadata: Merkle tree over the records' serialized bytes. ---
        let record_bytes: Vec<Vec<u8>> = records.iter().map(Record::encode).collect();
        let tree = MerkleTree::build(&record_bytes);
        let metadata_logical = with_size_prefix(tree.serialize(), separate);

        if separate {
            Self::write_separate(
                dir,
                index,
                device,
                config,
                &data_logical,
                &index_logical,
                &summary_logical,
                &filter_logical,
                &metadata_logical,
            )
        } else {
            Self::write_bundled(
                dir,
                index,
                device,
                config,
                &data_logical,
                &index_logical,
                &summary_logical,
                &filter_logical,
                &metadata_logical,
            )
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write_separate(
        dir: &Path,
        index: u32,
        device: &BlockDevice,
        storage: &StorageConfig,
        data: &[u8],
        idx: &[u8],
        summary: &[u8],
        filter: &[u8],
        metadata: &[u8],
    ) -> Result<(), StorageError> {
        let block_size = storage.block_size;
        let cfg = SstableConfig {
            use_separate_files: true,
            compression_enabled: storage.sstable_compression_enabled,
            sparse_step: storage.sstable_sparse_step,
            component_table: Default::default(),
        };
        write_config_block(dir, index, device, block_size, &cfg)?;

        for (component, bytes) in [
            (SstableComponent::Data, data),
            (SstableComponent::Index, idx),
            (SstableComponent::Summary, summary),
            (SstableComponent::Filter, filter),
            (SstableComponent::Metadata, metadata),
        ] {
            let path = component_path(dir, index, component);
            write_component(device, &path, 0, bytes, block_size)?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn write_bundled(
        dir: &Path,
        index: u32,
        device: &BlockDevice,
        storage: &StorageConfig,
        data: &[u8],
        idx: &[u8],
        summary: &[u8],
        filter: &[u8],
        metadata: &[u8],
    ) -> Result<(), StorageError> {
        let block_size = storage.block_size;
        let path = component_path(dir, index, SstableComponent::Config);

        let mut cfg = SstableConfig {
            use_separate_files: false,
            compression_enabled: storage.sstable_compression_enabled,
            sparse_step: storage.sstable_sparse_step,
            component_table: Default::default(),
        };

        // Block 0 is reserved for Config; the remaining components follow
        // back to back starting at block 1.
        let mut cursor = 1u64;
        for (i, bytes) in [data, idx, summary, filter, metadata].into_iter().enumerate() {
            cfg.component_table[i] = ComponentSlot {
                size: bytes.len() as u64,
                offset: cursor,
            };
            cursor += write_component(device, &path, cursor, bytes, block_size)?;
        }

        // Patch: the Config block is rewritten now that every component's
        // size and starting block is known.
        write_config_block(dir, index, device, block_size, &cfg)
    }
}

fn write_config_block(
    dir: &Path,
    index: u32,
    device: &BlockDevice,
    block_size: u16,
    cfg: &SstableConfig,
) -> Result<(), StorageError> {
    let path: Arc<Path> = Arc::from(component_path(dir, index, SstableComponent::Config));
    let payload = crc::pad(&cfg.encode(), block_size as usize - CRC_SIZE);
    let loc = BlockLocation::new(path, 0);
    device.write_block(&loc, &payload)
}

/// Writes `logical` (already including any size prefix) block by block,
/// starting at `start_block` in `path`. Returns the number of blocks
/// written.
fn write_component(
    device: &BlockDevice,
    path: &Path,
    start_block: u64,
    logical: &[u8],
    block_size: u16,
) -> Result<u64, StorageError> {
    let chunk_len = block_size as usize - CRC_SIZE;
    let padded = crc::pad(logical, chunk_len);
    let path: Arc<Path> = Arc::from(path);
    let num_blocks = padded.len() / chunk_len;
    for (i, chunk) in padded.chunks(chunk_len).enumerate() {
        let loc = BlockLocation::new(path.clone(), start_block + i as u64);
        device.write_block(&loc, chunk)?;
    }
    Ok(num_blocks as u64)
}

/// Builds the shared Index/Summary layout: `last_entry_offset(8) |
/// entry_0(24) | ... | entry_{n-1}(24) | key_data`, with every stored
/// offset converted from the writer's logical cursor to a physical one.
fn build_index_like(items: &[(u64, Vec<u8>)], separate: bool, block_size: u16) -> Vec<u8> {
    let n = items.len();
    let prefix_len: u64 = if separate { 8 } else { 0 };
    let metadata_len = 8 + (n as u64) * ENTRY_SIZE as u64;

    let mut key_offsets_logical = Vec::with_capacity(n);
    let mut key_data = Vec::new();
    for (_, key) in items {
        key_offsets_logical.push(prefix_len + metadata_len + key_data.len() as u64);
        key_data.extend_from_slice(key);
    }

    let last_entry_logical = prefix_len + 8 + (n as u64 - 1) * ENTRY_SIZE as u64;
    let last_entry_physical = crc::logical_to_physical(last_entry_logical, block_size);

    let mut body = Vec::with_capacity(metadata_len as usize + key_data.len());
    body.extend_from_slice(&last_entry_physical.to_le_bytes());
    for (i, (data_offset, key)) in items.iter().enumerate() {
        let entry = IndexEntry {
            data_offset: *data_offset,
            key_length: key.len() as u64,
            key_offset_in_component: crc::logical_to_physical(key_offsets_logical[i], block_size),
        };
        body.extend_from_slice(&entry.encode());
    }
    body.extend_from_slice(&key_data);

    with_size_prefix(body, separate)
}
