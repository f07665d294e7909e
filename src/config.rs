//! Storage configuration.
//!
//! [`StorageConfig`] is an immutable, already-validated value handed to the
//! [`crate::block::BlockDevice`], [`crate::wal::Wal`], and SSTable
//! writer/reader constructors. This crate never parses configuration from a
//! file or environment — the core consumes an already-validated
//! configuration record; turning a config file or env vars into one is the
//! calling layer's job.

/// Block sizes the storage core accepts.
pub const VALID_BLOCK_SIZES: [u16; 3] = [4096, 8192, 16384];

/// Default number of blocks per WAL segment.
pub const DEFAULT_WAL_SEGMENT_BLOCKS: u16 = 16;

/// Default number of entries retained in the block cache.
pub const DEFAULT_BLOCK_CACHE_CAPACITY: u32 = 100;

/// Default stride at which the SSTable summary samples the dense index.
pub const DEFAULT_SSTABLE_SPARSE_STEP: u16 = 10;

/// Default Bloom filter false-positive target.
pub const DEFAULT_BLOOM_FALSE_POSITIVE_RATE: f64 = 0.01;

/// Immutable configuration for a single open database directory.
///
/// Construct once per open database and pass by value (it is `Copy`) into
/// every layer.
#[derive(Debug, Clone, Copy)]
pub struct StorageConfig {
    /// Fixed block size used by the block device layer. Must be one of
    /// [`VALID_BLOCK_SIZES`].
    pub block_size: u16,

    /// Maximum number of block payloads retained in the block device's
    /// LRU cache.
    pub block_cache_capacity: u32,

    /// Number of blocks per WAL segment before rotation.
    pub wal_segment_blocks: u16,

    /// When `true`, an SSTable is materialized as five separate files
    /// (`sstable_<i>_{data,index,summary,filter,metadata}.db`). When
    /// `false`, all components are bundled into `sstable_<i>.db`.
    pub sstable_use_separate_files: bool,

    /// Reserved for an injected compress/decompress key hook. This crate
    /// does not implement compression itself; the flag is only threaded
    /// into the Config component so a collaborator can interpret it.
    pub sstable_compression_enabled: bool,

    /// Stride at which the sparse Summary samples the dense Index.
    pub sstable_sparse_step: u16,

    /// Target false-positive rate for each SSTable's Bloom filter.
    pub bloom_false_positive_rate: f64,
}

impl StorageConfig {
    /// Returns a configuration with every value set to its documented
    /// default, at the default 4 KiB block size.
    pub fn with_defaults(block_size: u16) -> Self {
        Self {
            block_size,
            block_cache_capacity: DEFAULT_BLOCK_CACHE_CAPACITY,
            wal_segment_blocks: DEFAULT_WAL_SEGMENT_BLOCKS,
            sstable_use_separate_files: true,
            sstable_compression_enabled: false,
            sstable_sparse_step: DEFAULT_SSTABLE_SPARSE_STEP,
            bloom_false_positive_rate: DEFAULT_BLOOM_FALSE_POSITIVE_RATE,
        }
    }

    /// Returns `true` if `block_size` is one of [`VALID_BLOCK_SIZES`].
    pub fn has_valid_block_size(&self) -> bool {
        VALID_BLOCK_SIZES.contains(&self.block_size)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::with_defaults(4096)
    }
}
