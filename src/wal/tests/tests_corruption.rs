//! Corruption-detection tests: a bad block stops replay at the exact
//! (segment, block) it occurred at, whether the damage is caught by the
//! block device's outer CRC or the WAL's own per-fragment CRC.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::tempdir;

    use crate::block::{self, BlockDevice};
    use crate::config::StorageConfig;
    use crate::error::wal_path;
    use crate::record::Record;
    use crate::wal::{Wal, reconstruct};

    fn test_config(block_size: u16) -> StorageConfig {
        StorageConfig {
            block_size,
            wal_segment_blocks: 16,
            ..StorageConfig::default()
        }
    }

    #[test]
    fn a_flipped_byte_is_caught_by_the_block_devices_outer_crc() {
        let dir = tempdir().unwrap();
        let device = Arc::new(BlockDevice::new(128, 16));
        let config = test_config(128);

        let wal = Wal::open(dir.path(), config, device.clone(), 0);
        wal.append(&Record::put(b"k".to_vec(), b"v".to_vec(), 1)).unwrap();
        wal.close().unwrap();

        let path = wal_path(dir.path(), 0);
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        // Force a cold read so the corrupted bytes are actually seen.
        let fresh_device = BlockDevice::new(128, 16);
        let mut replayed = Vec::new();
        let outcome = reconstruct(dir.path(), &config, &fresh_device, 0, 0, |r| replayed.push(r)).unwrap();
        assert_eq!(outcome.truncated_at, Some((0, 0)));
        assert!(replayed.is_empty());
    }

    #[test]
    fn a_bad_inner_fragment_checksum_is_detected_even_with_an_intact_outer_crc() {
        let dir = tempdir().unwrap();
        let device = BlockDevice::new(128, 16);
        let block_payload_len = 128usize - 4;

        let mut block = vec![0u8; block_payload_len];
        let frag_payload = b"hello";
        let wrong_crc = 0xDEAD_BEEFu32;
        block[0..4].copy_from_slice(&wrong_crc.to_le_bytes());
        block[4..6].copy_from_slice(&(frag_payload.len() as u16).to_le_bytes());
        block[6] = 4; // FULL
        block[7..11].copy_from_slice(&0u32.to_le_bytes()); // segment 0
        block[11..11 + frag_payload.len()].copy_from_slice(frag_payload);

        let loc = block::location_in(dir.path(), "wal_0.log", 0);
        device.write_block(&loc, &block).unwrap();

        let config = test_config(128);
        let mut replayed: Vec<Record> = Vec::new();
        let outcome = reconstruct(dir.path(), &config, &device, 0, 0, |r| replayed.push(r)).unwrap();
        assert_eq!(outcome.truncated_at, Some((0, 0)));
        assert!(replayed.is_empty());
    }

    #[test]
    fn a_middle_fragment_without_a_preceding_first_is_rejected() {
        let dir = tempdir().unwrap();
        let device = BlockDevice::new(128, 16);
        let block_payload_len = 128usize - 4;

        let mut block = vec![0u8; block_payload_len];
        let frag_payload = b"orphan";
        let crc = crate::crc::compute_crc32(frag_payload);
        block[0..4].copy_from_slice(&crc.to_le_bytes());
        block[4..6].copy_from_slice(&(frag_payload.len() as u16).to_le_bytes());
        block[6] = 2; // MIDDLE, with no preceding FIRST
        block[7..11].copy_from_slice(&0u32.to_le_bytes());
        block[11..11 + frag_payload.len()].copy_from_slice(frag_payload);

        let loc = block::location_in(dir.path(), "wal_0.log", 0);
        device.write_block(&loc, &block).unwrap();

        let config = test_config(128);
        let mut replayed: Vec<Record> = Vec::new();
        let outcome = reconstruct(dir.path(), &config, &device, 0, 0, |r| replayed.push(r)).unwrap();
        assert_eq!(outcome.truncated_at, Some((0, 0)));
        assert!(replayed.is_empty());
    }

    #[test]
    fn a_missing_segment_in_the_replay_range_is_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        let device = BlockDevice::new(128, 16);
        let config = test_config(128);

        let mut replayed: Vec<Record> = Vec::new();
        let outcome = reconstruct(dir.path(), &config, &device, 3, 5, |r| replayed.push(r)).unwrap();
        assert!(outcome.truncated_at.is_none());
        assert!(replayed.is_empty());
    }
}
