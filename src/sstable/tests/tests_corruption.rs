//! A corrupted component fails the lookup with `CorruptSstable`, naming
//! the component and offset, never a bare `CorruptBlock`.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::tempdir;

    use crate::block::BlockDevice;
    use crate::config::StorageConfig;
    use crate::error::StorageError;
    use crate::record::Record;
    use crate::sstable::{SstableReader, SstableWriter};

    fn test_config(block_size: u16) -> StorageConfig {
        StorageConfig {
            block_size,
            sstable_use_separate_files: true,
            sstable_sparse_step: 4,
            ..StorageConfig::default()
        }
    }

    #[test]
    fn a_flipped_byte_in_the_data_component_is_reported_as_corrupt_sstable() {
        let dir = tempdir().unwrap();
        let device = Arc::new(BlockDevice::new(256, 32));
        let config = test_config(256);
        let records: Vec<Record> = (0..20)
            .map(|i| Record::put(format!("k{i:02}").into_bytes(), format!("v{i}").into_bytes(), i as u64))
            .collect();
        SstableWriter::write(dir.path(), 9, &records, &config, &device).unwrap();

        // Corrupt a byte inside the *first* block so it lands under
        // `records[0]`'s data offset, not some later record's.
        let data_path = dir.path().join("sstable_9_data.db");
        let mut bytes = std::fs::read(&data_path).unwrap();
        bytes[10] ^= 0xFF;
        std::fs::write(&data_path, &bytes).unwrap();

        // Fresh device: bypass any cached copy of the now-corrupted block.
        let fresh_device = BlockDevice::new(256, 32);
        let err = SstableReader::get(dir.path(), 9, &records[0].key, &config, &fresh_device).unwrap_err();
        match err {
            StorageError::CorruptSstable { component, .. } => {
                assert_eq!(component.to_string(), "data");
            }
            other => panic!("expected CorruptSstable, got {other:?}"),
        }
    }

    #[test]
    fn a_flipped_byte_in_the_filter_component_is_reported_as_corrupt_sstable() {
        let dir = tempdir().unwrap();
        let device = Arc::new(BlockDevice::new(256, 32));
        let config = test_config(256);
        let records: Vec<Record> = (0..20)
            .map(|i| Record::put(format!("k{i:02}").into_bytes(), format!("v{i}").into_bytes(), i as u64))
            .collect();
        SstableWriter::write(dir.path(), 11, &records, &config, &device).unwrap();

        let filter_path = dir.path().join("sstable_11_filter.db");
        let mut bytes = std::fs::read(&filter_path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&filter_path, &bytes).unwrap();

        let fresh_device = BlockDevice::new(256, 32);
        let err = SstableReader::get(dir.path(), 11, &records[0].key, &config, &fresh_device).unwrap_err();
        assert!(matches!(err, StorageError::CorruptSstable { .. }));
    }
}
