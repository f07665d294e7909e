//! Micro-benchmarks for the storage core.
//!
//! Uses Criterion for statistically rigorous measurement with regression
//! detection and HTML reports.
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench micro              # run all micro-benchmarks
//! cargo bench --bench micro -- wal_append  # filter by name
//! ```
//!
//! Reports are generated in `target/criterion/report/index.html`.

use criterion::{
    BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main,
};

use std::sync::Arc;
use tempfile::TempDir;

use hunddb::block::{self, BlockDevice};
use hunddb::config::StorageConfig;
use hunddb::record::Record;
use hunddb::sstable::{SstableReader, SstableWriter};
use hunddb::wal::Wal;

// ------------------------------------------------------------------------------------------------
// Helpers
// ------------------------------------------------------------------------------------------------

const VALUE_128B: &[u8; 128] = &[0xAB; 128];
const VALUE_1K: &[u8; 1024] = &[0xCD; 1024];

fn make_key(i: u64) -> Vec<u8> {
    format!("key-{i:012}").into_bytes()
}

fn test_config(block_size: u16) -> StorageConfig {
    StorageConfig {
        block_size,
        sstable_sparse_step: 16,
        ..StorageConfig::default()
    }
}

fn sorted_records(n: u64, value: &[u8]) -> Vec<Record> {
    (0..n).map(|i| Record::put(make_key(i), value.to_vec(), i)).collect()
}

// ================================================================================================
// Block device benchmarks
// ================================================================================================

/// Raw write/read throughput of the block device, the sole path to disk
/// for every layer above it.
///
/// ## `write/{128B,1K}` and `read/{128B,1K}`
///
/// **Scenario:** Writes (or reads back) a single block whose payload is
/// filled with the given value size, padded to the block's full capacity.
///
/// **What it measures:** CRC32 computation and framing cost on the write
/// side; CRC verification and cache-fill cost on the read side.
fn bench_block_device(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_device");

    for &(label, value) in &[("128B", VALUE_128B.as_slice()), ("1K", VALUE_1K.as_slice())] {
        group.throughput(Throughput::Bytes(value.len() as u64));

        group.bench_function(BenchmarkId::new("write", label), |b| {
            let dir = TempDir::new().unwrap();
            let device = BlockDevice::new(4096, 64);
            let path = dir.path().join("bench.blk");
            let mut i = 0u64;
            b.iter(|| {
                let loc = block::location_in(dir.path(), "bench.blk", i % 64);
                device.write_block(black_box(&loc), black_box(value)).unwrap();
                i += 1;
            });
            let _ = path;
        });

        group.bench_function(BenchmarkId::new("read", label), |b| {
            let dir = TempDir::new().unwrap();
            let device = BlockDevice::new(4096, 64);
            let loc = block::location_in(dir.path(), "bench.blk", 0);
            device.write_block(&loc, value).unwrap();
            b.iter(|| {
                let _ = black_box(device.read_block(black_box(&loc)).unwrap());
            });
        });
    }

    group.finish();
}

// ================================================================================================
// WAL benchmarks
// ================================================================================================

/// Append throughput for the write-ahead log.
///
/// ## `append/{128B,1K}`
///
/// **Scenario:** Appends a single record to a freshly opened WAL.
///
/// **What it measures:** Fragment framing, CRC computation, and the
/// block-device write underneath a single-writer mutex.
///
/// **Expected behaviour:** Sub-millisecond; dominated by the block
/// device's CRC pass over the padded block, not by fragmentation (most
/// records here fit in one block).
fn bench_wal_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("wal_append");

    for &(label, value) in &[("128B", VALUE_128B.as_slice()), ("1K", VALUE_1K.as_slice())] {
        group.throughput(Throughput::Bytes(value.len() as u64));
        group.bench_function(label, |b| {
            let dir = TempDir::new().unwrap();
            let device = Arc::new(BlockDevice::new(4096, 256));
            let wal = Wal::open(dir.path(), test_config(4096), Arc::clone(&device), 0);
            let mut seq = 0u64;
            b.iter(|| {
                let rec = Record::put(make_key(seq), value.to_vec(), seq);
                wal.append(black_box(&rec)).unwrap();
                seq += 1;
            });
        });
    }

    group.finish();
}

// ================================================================================================
// SSTable write benchmarks
// ================================================================================================

/// Full-table write cost, amortised per record.
///
/// ## `write/{1K,10K}`
///
/// **Scenario:** Writes N sorted records as a single SSTable (Data, Index,
/// Summary, Filter, and Metadata components).
///
/// **What it measures:** End-to-end writer cost — length-prefixed record
/// encoding, dense Index construction, sparse Summary sampling, Bloom
/// filter population, and the Merkle tree build over every record.
fn bench_sstable_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("sstable_write");
    group.sample_size(20);

    for &n in &[1_000u64, 10_000] {
        let records = sorted_records(n, VALUE_128B);
        group.throughput(Throughput::Elements(n));
        group.bench_function(BenchmarkId::new("write", n), |b| {
            let config = test_config(4096);
            b.iter_batched(
                || (TempDir::new().unwrap(), BlockDevice::new(4096, 256)),
                |(dir, device)| {
                    SstableWriter::write(dir.path(), 0, black_box(&records), &config, &device).unwrap();
                },
                BatchSize::PerIteration,
            );
        });
    }

    group.finish();
}

// ================================================================================================
// SSTable point-lookup benchmarks
// ================================================================================================

/// Point-lookup latency against a prebuilt SSTable.
///
/// ## `hit/{1K,10K}` and `miss/{1K,10K}`
///
/// **Scenario:** `hit` queries keys known to be present; `miss` queries
/// keys known to be absent, both against an N-record table.
///
/// **What it measures:** The full read path — Config decode, Bloom probe,
/// key-range bounds check, Summary binary search, Index binary search,
/// and (on a hit) the final Data fetch.
///
/// **Expected behaviour:** `miss` should usually be faster than `hit`
/// because most misses are rejected by the Bloom filter or the key-range
/// bounds check before any Index or Data access.
fn bench_sstable_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("sstable_get");

    for &n in &[1_000u64, 10_000] {
        let config = test_config(4096);
        let records = sorted_records(n, VALUE_128B);
        let dir = TempDir::new().unwrap();
        let device = BlockDevice::new(4096, 512);
        SstableWriter::write(dir.path(), 0, &records, &config, &device).unwrap();

        group.bench_function(BenchmarkId::new("hit", n), |b| {
            let mut i = 0u64;
            b.iter(|| {
                let key = make_key(i % n);
                let _ = black_box(SstableReader::get(dir.path(), 0, black_box(&key), &config, &device).unwrap());
                i += 1;
            });
        });

        group.bench_function(BenchmarkId::new("miss", n), |b| {
            let mut i = 0u64;
            b.iter(|| {
                let key = make_key(n + i);
                let _ = black_box(SstableReader::get(dir.path(), 0, black_box(&key), &config, &device).unwrap());
                i += 1;
            });
        });
    }

    group.finish();
}

// ================================================================================================
// Group registration
// ================================================================================================

criterion_group!(
    benches,
    bench_block_device,
    bench_wal_append,
    bench_sstable_write,
    bench_sstable_get,
);

criterion_main!(benches);
