//! The Metadata component holds a Merkle tree over the written records;
//! it round-trips and is never consulted implicitly by `get`.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::tempdir;

    use crate::block::BlockDevice;
    use crate::config::StorageConfig;
    use crate::merkle::MerkleTree;
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
    fn stored_merkle_root_matches_an_independently_built_tree() {
        let dir = tempdir().unwrap();
        let device = Arc::new(BlockDevice::new(512, 32));
        let config = test_config(512);
        let records: Vec<Record> = (0..15)
            .map(|i| Record::put(format!("k{i:02}").into_bytes(), format!("v{i}").into_bytes(), i as u64))
            .collect();
        SstableWriter::write(dir.path(), 4, &records, &config, &device).unwrap();

        let loaded = SstableReader::load_merkle_tree(dir.path(), 4, &config, &device).unwrap();

        let expected_bytes: Vec<Vec<u8>> = records.iter().map(Record::encode).collect();
        let expected = MerkleTree::build(&expected_bytes);

        assert_eq!(loaded.root_hash(), expected.root_hash());
        assert_eq!(loaded.leaf_count(), records.len());
    }

    #[test]
    fn a_single_record_sstable_still_has_a_loadable_merkle_tree() {
        let dir = tempdir().unwrap();
        let device = Arc::new(BlockDevice::new(512, 32));
        let config = test_config(512);
        let records = vec![Record::put(b"only".to_vec(), b"value".to_vec(), 1)];
        SstableWriter::write(dir.path(), 6, &records, &config, &device).unwrap();

        let loaded = SstableReader::load_merkle_tree(dir.path(), 6, &config, &device).unwrap();
        assert_eq!(loaded.leaf_count(), 1);
    }
}
