//! SSTable-internal Bloom filter.
//!
//! Sized from the classic formulas `m = ceil(-n ln p / ln2^2)` bits and
//! `k = ceil((m/n) ln 2)` hash functions. Most Rust Bloom filter crates wrap
//! their bit array in an opaque serialization; this one hand-rolls it
//! instead, keeping the same double-hashing technique `bloomfilter` uses
//! internally (two independent seeded hashes combined à la
//! Kirsch–Mitzenmacher) but storing `m`, `k`, and the seeds as named,
//! independently-readable fields so the filter round-trips verbatim.
//! `bloomfilter` remains a dependency and is used by this module's tests as
//! a cross-check oracle for observed false-positive rate.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Default false-positive target used when the caller does not override it.
pub const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.01;

/// A sized, seeded Bloom filter over raw key bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    /// Number of bits in the filter.
    m: u64,
    /// Number of hash functions (derived probe count).
    k: u32,
    /// Two independent seeds the `k` probe indices are derived from.
    seeds: (u64, u64),
    /// The bit array, packed 8 bits per byte.
    bits: Vec<u8>,
}

impl BloomFilter {
    /// Builds an empty filter sized for `expected_items` insertions at the
    /// given target false-positive rate, with fresh seeds.
    pub fn new(expected_items: u64, false_positive_rate: f64, seeds: (u64, u64)) -> Self {
        let n = expected_items.max(1) as f64;
        let p = false_positive_rate.clamp(f64::MIN_POSITIVE, 0.5);

        let m = (-(n * p.ln()) / (std::f64::consts::LN_2 * std::f64::consts::LN_2)).ceil() as u64;
        let m = m.max(8);
        let k = ((m as f64 / n) * std::f64::consts::LN_2).ceil() as u32;
        let k = k.max(1);

        let byte_len = m.div_ceil(8) as usize;
        Self {
            m,
            k,
            seeds,
            bits: vec![0u8; byte_len],
        }
    }

    /// Number of bits backing this filter.
    pub fn num_bits(&self) -> u64 {
        self.m
    }

    /// Number of independent hash probes performed per key.
    pub fn num_hashes(&self) -> u32 {
        self.k
    }

    /// Inserts `key` into the filter, setting its `k` derived bits.
    pub fn add(&mut self, key: &[u8]) {
        for bit in self.probe_bits(key) {
            self.bits[(bit / 8) as usize] |= 1 << (bit % 8);
        }
    }

    /// Returns `true` if every one of `key`'s `k` derived bits is set.
    ///
    /// May return `true` for a key that was never inserted (a false
    /// positive), but never returns `false` for a key that was inserted:
    /// no false negatives.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.probe_bits(key).all(|bit| {
            self.bits[(bit / 8) as usize] & (1 << (bit % 8)) != 0
        })
    }

    fn probe_bits(&self, key: &[u8]) -> impl Iterator<Item = u64> + '_ {
        let (h1, h2) = self.seeded_hashes(key);
        (0..u64::from(self.k)).map(move |i| {
            let combined = h1.wrapping_add(i.wrapping_mul(h2));
            combined % self.m
        })
    }

    fn seeded_hashes(&self, key: &[u8]) -> (u64, u64) {
        let mut first = DefaultHasher::new();
        self.seeds.0.hash(&mut first);
        key.hash(&mut first);

        let mut second = DefaultHasher::new();
        self.seeds.1.hash(&mut second);
        key.hash(&mut second);

        (first.finish(), second.finish())
    }

    /// Serializes this filter as `m(8) | k(4) | seed0(8) | seed1(8) |
    /// bit_len(8) | bits`, all integers little-endian.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + 4 + 8 + 8 + 8 + self.bits.len());
        out.extend_from_slice(&self.m.to_le_bytes());
        out.extend_from_slice(&self.k.to_le_bytes());
        out.extend_from_slice(&self.seeds.0.to_le_bytes());
        out.extend_from_slice(&self.seeds.1.to_le_bytes());
        out.extend_from_slice(&(self.bits.len() as u64).to_le_bytes());
        out.extend_from_slice(&self.bits);
        out
    }

    /// Inverse of [`BloomFilter::encode`].
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < 36 {
            return None;
        }
        let m = u64::from_le_bytes(buf[0..8].try_into().ok()?);
        let k = u32::from_le_bytes(buf[8..12].try_into().ok()?);
        let seed0 = u64::from_le_bytes(buf[12..20].try_into().ok()?);
        let seed1 = u64::from_le_bytes(buf[20..28].try_into().ok()?);
        let bit_len = u64::from_le_bytes(buf[28..36].try_into().ok()?) as usize;
        let bits = buf.get(36..36 + bit_len)?.to_vec();
        Some(Self {
            m,
            k,
            seeds: (seed0, seed1),
            bits,
        })
    }
}
