//! Closed error taxonomy shared by the block device, WAL, and SSTable
//! layers.
//!
//! The core never recovers silently from a corrupt block: a bad block in a
//! WAL stops replay at that block, a bad block in an SSTable fails the
//! lookup. Every `Corrupt*` variant carries enough context (file, block
//! index, component, offset) to diagnose the incident above this layer.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

/// Uniquely identifies one block on disk: the file it lives in and its
/// zero-based index within that file. Doubles as the block cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockLocation {
    /// Path to the file containing the block.
    pub path: Arc<Path>,
    /// Zero-based block index within `path`.
    pub index: u64,
}

impl BlockLocation {
    /// Builds a location from any path-like value and a block index.
    pub fn new(path: impl Into<Arc<Path>>, index: u64) -> Self {
        Self {
            path: path.into(),
            index,
        }
    }

    /// The byte offset of this block's first byte within its file.
    pub fn byte_offset(&self, block_size: u16) -> u64 {
        self.index * u64::from(block_size)
    }
}

impl fmt::Display for BlockLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.path.display(), self.index)
    }
}

/// Which SSTable component a corruption or lookup failure occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SstableComponent {
    /// The config/header component.
    Config,
    /// The sorted record data component.
    Data,
    /// The dense index component.
    Index,
    /// The sparse summary component.
    Summary,
    /// The Bloom filter component.
    Filter,
    /// The Merkle tree metadata component.
    Metadata,
}

impl fmt::Display for SstableComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Config => "config",
            Self::Data => "data",
            Self::Index => "index",
            Self::Summary => "summary",
            Self::Filter => "filter",
            Self::Metadata => "metadata",
        };
        f.write_str(name)
    }
}

/// The closed set of failures the storage core surfaces to its callers.
///
/// Nothing here is retried or self-healed internally.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// Underlying file operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A block's CRC did not match its payload on read.
    #[error("corrupt block at {0}")]
    CorruptBlock(BlockLocation),

    /// A WAL fragment failed integrity validation during replay.
    #[error("corrupt WAL at segment {segment}, block {block}: {reason}")]
    CorruptWal {
        /// Segment number the bad block was found in.
        segment: u32,
        /// Block index within the segment.
        block: u32,
        /// Human-readable description of the failure.
        reason: String,
    },

    /// An SSTable component failed an integrity check.
    #[error("corrupt SSTable {index}, component {component}, offset {offset}")]
    CorruptSstable {
        /// The SSTable's index identifier.
        index: u32,
        /// Which component the failure was found in.
        component: SstableComponent,
        /// Physical byte offset of the failure within the component.
        offset: u64,
    },

    /// A requested entity (key, component, file) does not exist.
    #[error("not found")]
    NotFound,

    /// Internal invariant violation (poisoned lock, unreachable state).
    #[error("internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Convenience constructor for [`StorageError::Internal`] from a
    /// poisoned-lock situation, used at every lock-acquisition site so the
    /// error message stays consistent.
    pub fn poisoned(what: &str) -> Self {
        Self::Internal(format!("{what} lock poisoned"))
    }
}

/// Helper used throughout the crate to build a `sstable_<index>...` style
/// path from a data directory.
pub fn sstable_path(dir: &Path, index: u32, suffix: &str) -> PathBuf {
    dir.join(format!("sstable_{index}{suffix}.db"))
}

/// Helper used throughout the crate to build a `wal_<n>.log` path.
pub fn wal_path(dir: &Path, segment: u32) -> PathBuf {
    dir.join(format!("wal_{segment}.log"))
}
