//! Round-trip point lookups: every written key is found, absent keys (and
//! Bloom false positives, which still resolve at the Index step) are not.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::tempdir;

    use crate::block::BlockDevice;
    use crate::config::StorageConfig;
    use crate::record::Record;
    use crate::sstable::{SstableReader, SstableWriter};

    fn test_config(block_size: u16, sparse_step: u16) -> StorageConfig {
        StorageConfig {
            block_size,
            sstable_use_separate_files: true,
            sstable_sparse_step: sparse_step,
            ..StorageConfig::default()
        }
    }

    fn sample_records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| Record::put(format!("key_{i:03}").into_bytes(), format!("val_{i}").into_bytes(), 1000 + i as u64))
            .collect()
    }

    #[test]
    fn every_written_key_is_found() {
        let dir = tempdir().unwrap();
        let device = Arc::new(BlockDevice::new(4096, 64));
        let config = test_config(4096, 10);
        let records = sample_records(100);

        SstableWriter::write(dir.path(), 7, &records, &config, &device).unwrap();

        for rec in &records {
            let found = SstableReader::get(dir.path(), 7, &rec.key, &config, &device).unwrap();
            assert_eq!(found.as_ref(), Some(rec), "missing key {:?}", String::from_utf8_lossy(&rec.key));
        }
    }

    #[test]
    fn absent_key_between_present_keys_returns_none() {
        let dir = tempdir().unwrap();
        let device = Arc::new(BlockDevice::new(4096, 64));
        let config = test_config(4096, 10);
        let records: Vec<Record> = (0..50)
            .map(|i| Record::put(format!("k{i:03}").into_bytes(), b"v".to_vec(), i as u64))
            .collect();

        SstableWriter::write(dir.path(), 1, &records, &config, &device).unwrap();

        let found = SstableReader::get(dir.path(), 1, b"k024.5", &config, &device).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn tombstone_round_trips_with_its_flag_set() {
        let dir = tempdir().unwrap();
        let device = Arc::new(BlockDevice::new(4096, 64));
        let config = test_config(4096, 10);
        let records = vec![
            Record::put(b"a".to_vec(), b"1".to_vec(), 1),
            Record::tombstone(b"b".to_vec(), 2),
            Record::put(b"c".to_vec(), b"3".to_vec(), 3),
        ];

        SstableWriter::write(dir.path(), 3, &records, &config, &device).unwrap();

        let found = SstableReader::get(dir.path(), 3, b"b", &config, &device).unwrap().unwrap();
        assert!(found.tombstone);
        assert!(found.value.is_empty());
    }

    #[test]
    fn single_record_sstable_round_trips() {
        let dir = tempdir().unwrap();
        let device = Arc::new(BlockDevice::new(4096, 16));
        let config = test_config(4096, 10);
        let records = vec![Record::put(b"only".to_vec(), b"value".to_vec(), 42)];

        SstableWriter::write(dir.path(), 0, &records, &config, &device).unwrap();

        let found = SstableReader::get(dir.path(), 0, b"only", &config, &device).unwrap();
        assert_eq!(found, Some(records[0].clone()));
        assert!(SstableReader::get(dir.path(), 0, b"nope", &config, &device).unwrap().is_none());
    }
}
