//! The same batch of records round-trips identically in bundled
//! (single-file) and separate-files mode.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::tempdir;

    use crate::block::BlockDevice;
    use crate::config::StorageConfig;
    use crate::record::Record;
    use crate::sstable::{SstableReader, SstableWriter};

    fn records() -> Vec<Record> {
        (0..37)
            .map(|i| Record::put(format!("k{i:03}").into_bytes(), format!("v{i}").into_bytes(), i as u64))
            .collect()
    }

    #[test]
    fn bundled_mode_round_trips() {
        let dir = tempdir().unwrap();
        let device = Arc::new(BlockDevice::new(4096, 64));
        let config = StorageConfig {
            block_size: 4096,
            sstable_use_separate_files: false,
            sstable_sparse_step: 4,
            ..StorageConfig::default()
        };
        let recs = records();
        SstableWriter::write(dir.path(), 2, &recs, &config, &device).unwrap();

        assert!(dir.path().join("sstable_2.db").exists());
        assert!(!dir.path().join("sstable_2_data.db").exists());

        for rec in &recs {
            let found = SstableReader::get(dir.path(), 2, &rec.key, &config, &device).unwrap();
            assert_eq!(found.as_ref(), Some(rec));
        }
        assert!(SstableReader::get(dir.path(), 2, b"absent", &config, &device).unwrap().is_none());
    }

    #[test]
    fn separate_files_mode_creates_five_component_files() {
        let dir = tempdir().unwrap();
        let device = Arc::new(BlockDevice::new(4096, 64));
        let config = StorageConfig {
            block_size: 4096,
            sstable_use_separate_files: true,
            sstable_sparse_step: 4,
            ..StorageConfig::default()
        };
        let recs = records();
        SstableWriter::write(dir.path(), 5, &recs, &config, &device).unwrap();

        for suffix in ["", "_data", "_index", "_summary", "_filter", "_metadata"] {
            assert!(dir.path().join(format!("sstable_5{suffix}.db")).exists(), "missing {suffix}");
        }
    }
}
