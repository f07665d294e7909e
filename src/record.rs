//! The single record type shared by the WAL and SSTable layers.
//!
//! A [`Record`] is immutable once handed to the WAL or an SSTable. Records
//! are totally ordered by lexicographic key, with ties broken by timestamp
//! descending (newer wins) — that ordering is a lookup/merge policy
//! ([`Record::supersedes`]), not a derived [`Ord`], so callers cannot
//! accidentally rely on `sort()` doing the wrong thing with duplicate keys.

use crate::encoding::{Decode, Encode, EncodingError};

/// A single `(key, value, timestamp, tombstone)` tuple.
///
/// Tombstone records carry no value (`value` is always empty when
/// `tombstone` is `true`; writers must not rely on whatever bytes happen to
/// be there).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// The record's key.
    pub key: Vec<u8>,
    /// The record's value. Empty for tombstones.
    pub value: Vec<u8>,
    /// Seconds-resolution timestamp assigned by the caller.
    pub timestamp: u64,
    /// `true` if this record marks `key` as deleted.
    pub tombstone: bool,
}

impl Record {
    /// Builds a live (non-tombstone) record.
    pub fn put(key: Vec<u8>, value: Vec<u8>, timestamp: u64) -> Self {
        Self {
            key,
            value,
            timestamp,
            tombstone: false,
        }
    }

    /// Builds a tombstone record for `key`.
    pub fn tombstone(key: Vec<u8>, timestamp: u64) -> Self {
        Self {
            key,
            value: Vec::new(),
            timestamp,
            tombstone: true,
        }
    }

    /// Returns `true` if this record shadows `other` under the "newest
    /// wins" policy: same key, and either a strictly later timestamp, or an
    /// equal timestamp (ties go to whichever the caller already treats as
    /// newer — callers resolve true simultaneity themselves).
    pub fn supersedes(&self, other: &Record) -> bool {
        self.key == other.key && self.timestamp >= other.timestamp
    }

    /// The exact number of bytes [`Record::encode_to`] will append.
    pub fn encoded_len(&self) -> usize {
        8 + 1 + 8 + 8 + self.key.len() + self.value.len()
    }

    /// Serializes this record using the fixed WAL/SSTable payload layout:
    ///
    /// `timestamp(8) | tombstone(1) | key_length(8) | value_length(8) | key | value`
    ///
    /// all integers little-endian, each field delegated to its
    /// [`Encode`] impl rather than hand-rolled. Key and value are
    /// appended as raw bytes under their own explicit `u64` length fields,
    /// not through `Vec<u8>`'s self-describing (`u32`-prefixed) encoding,
    /// since this layout's lengths are already fixed-width `u64`s.
    /// Appended to `buf` rather than returning a fresh allocation, so
    /// callers building a larger framed stream avoid an extra copy.
    pub fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.timestamp.encode_to(buf)?;
        self.tombstone.encode_to(buf)?;
        (self.key.len() as u64).encode_to(buf)?;
        (self.value.len() as u64).encode_to(buf)?;
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.value);
        Ok(())
    }

    /// Serializes this record into a freshly-allocated buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_to(&mut buf).expect("in-memory fields always encode");
        buf
    }

    /// Decodes one record from the front of `buf`, per [`Record::encode_to`].
    ///
    /// Returns `(record, bytes_consumed)`. Does not require `buf` to
    /// contain exactly one record — trailing bytes are ignored.
    pub fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0usize;

        let (timestamp, n) = u64::decode_from(&buf[offset..])?;
        offset += n;

        let (tombstone, n) = bool::decode_from(&buf[offset..])?;
        offset += n;

        let (key_len, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let key_len = key_len as usize;

        let (value_len, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let value_len = value_len as usize;

        if buf.len() < offset + key_len {
            return Err(EncodingError::UnexpectedEof {
                needed: offset + key_len,
                available: buf.len(),
            });
        }
        let key = buf[offset..offset + key_len].to_vec();
        offset += key_len;

        if buf.len() < offset + value_len {
            return Err(EncodingError::UnexpectedEof {
                needed: offset + value_len,
                available: buf.len(),
            });
        }
        let value = buf[offset..offset + value_len].to_vec();
        offset += value_len;

        Ok((
            Self {
                key,
                value,
                timestamp,
                tombstone,
            },
            offset,
        ))
    }
}

/// Serializes a record as `[record_length(8)][record_bytes]`, the framing
/// the SSTable data component uses around each record.
pub fn encode_length_prefixed(record: &Record, buf: &mut Vec<u8>) {
    let len = record.encoded_len() as u64;
    buf.extend_from_slice(&len.to_le_bytes());
    record.encode_to(buf).expect("in-memory fields always encode");
}

/// Inverse of [`encode_length_prefixed`]: reads the 8-byte length prefix,
/// then decodes exactly that many bytes as a record.
pub fn decode_length_prefixed(buf: &[u8]) -> Result<(Record, usize), EncodingError> {
    if buf.len() < 8 {
        return Err(EncodingError::UnexpectedEof {
            needed: 8,
            available: buf.len(),
        });
    }
    let len = u64::from_le_bytes(buf[..8].try_into().unwrap()) as usize;
    if buf.len() < 8 + len {
        return Err(EncodingError::UnexpectedEof {
            needed: 8 + len,
            available: buf.len(),
        });
    }
    let (record, consumed) = Record::decode_from(&buf[8..8 + len])?;
    debug_assert_eq!(consumed, len);
    Ok((record, 8 + len))
}
