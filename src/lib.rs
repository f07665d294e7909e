//! # HundDB
//!
//! An embeddable LSM-tree storage core: a block-addressed, CRC-validating
//! device layer; a segmented, crash-safe write-ahead log; and an immutable,
//! five-component SSTable. HundDB deliberately stops at the storage core —
//! the memtable, manifest, and compaction scheduler that would sit above it
//! in a full database are a calling layer's job, not this crate's.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                  calling layer (out of scope)              │
//! │      memtable · manifest · compaction scheduler             │
//! └───────────────────────────┬───────────────────────────────┘
//!                             │
//! ┌───────────────────────────▼───────────────────────────────┐
//! │                        hunddb                               │
//! │  ┌────────────┐   ┌───────────────┐   ┌──────────────────┐ │
//! │  │    wal     │   │    sstable     │   │  bloom / merkle   │ │
//! │  │ (segments, │   │ (config, data, │   │  (per-SSTable     │ │
//! │  │ fragments) │   │ index, summary,│   │  primitives)      │ │
//! │  │            │   │ filter, meta)  │   │                   │ │
//! │  └─────┬──────┘   └───────┬───────┘   └──────────────────┘ │
//! │        │                  │                                 │
//! │        └────────┬─────────┘                                 │
//! │                  ▼                                          │
//! │           ┌─────────────┐                                   │
//! │           │    block     │  block-addressed, CRC-validating │
//! │           │  (BlockDevice)│ sole path to disk, cached        │
//! │           └─────────────┘                                   │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`block`] | Block device layer — the only component that touches disk |
//! | [`wal`] | Segmented, block-fragmented write-ahead log |
//! | [`sstable`] | Immutable five-component SSTable: writer and point-lookup reader |
//! | [`bloom`] | Per-SSTable Bloom filter, sized and seeded, serialized with named fields |
//! | [`merkle`] | Per-SSTable Merkle tree over record bytes, with a diff-locating `validate` |
//! | [`record`] | The shared `(key, value, timestamp, tombstone)` record type |
//! | [`config`] | Immutable, already-validated storage configuration |
//! | [`error`] | The closed error taxonomy shared by every layer |
//! | [`encoding`] | The hand-rolled binary `Encode`/`Decode` trait pair shared by all layers |
//!
//! ## Key properties
//!
//! - **Single disk path.** Every byte that hits disk goes through
//!   [`block::BlockDevice`]: fixed-size blocks, CRC32 framed, cached.
//! - **Crash-safe WAL.** Records are fragmented across blocks but never
//!   across segments; replay stops at the first corrupt block and reports
//!   exactly where.
//! - **Disk-minimizing point lookup.** An SSTable read consults its Bloom
//!   filter, then its key-range bounds, then a sparse Summary, then the
//!   dense Index — only the last step touches the Data component.
//! - **Integrity everywhere.** Every component is independently
//!   checksummed or Merkle-validated; nothing here retries or self-heals a
//!   corrupt read.

#![allow(dead_code)]

pub mod block;
pub mod bloom;
pub mod config;
pub mod encoding;
pub mod error;
pub mod merkle;
pub mod record;
pub mod sstable;
pub mod wal;

mod crc;
