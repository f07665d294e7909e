//! SSTable-internal Merkle tree.
//!
//! Hashes with **SHA-256** (32-byte output) via the `sha2` crate.
//! `LEAF_HASH_LEN` is the single constant both the writer and reader path
//! honor.
//!
//! Built index-based (a flat arena of node hashes plus a per-level size
//! table) rather than pointer-linked — depth-first serialization means
//! neither the on-disk format nor any consumer needs a live pointer graph.

use sha2::{Digest, Sha256};

/// Output size, in bytes, of the hash function this tree is built over.
pub const LEAF_HASH_LEN: usize = 32;

type Hash = [u8; LEAF_HASH_LEN];

fn hash_leaf(bytes: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

fn hash_internal(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// A Merkle tree over an ordered list of serialized record byte strings.
///
/// Internal structure: `levels[0]` is the leaf level (one hash per input
/// record), each subsequent level halves (with the last node duplicated on
/// an odd count, the common convention), and `levels.last()` holds exactly
/// one hash — the root.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    levels: Vec<Vec<Hash>>,
}

/// Result of [`MerkleTree::validate`]: either the trees match, or the
/// indices of the leaves where they first diverge (depth-first order).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MerkleValidation {
    /// Every leaf matched.
    Match,
    /// The leaves at these positions differ from `self`'s.
    Mismatch { leaf_indices: Vec<usize> },
}

impl MerkleTree {
    /// Builds a tree over the given serialized record byte strings.
    ///
    /// # Panics
    /// Panics if `records` is empty — an SSTable writer never calls this
    /// with zero records.
    pub fn build(records: &[Vec<u8>]) -> Self {
        assert!(!records.is_empty(), "Merkle tree requires at least one record");

        let mut levels = vec![records.iter().map(|r| hash_leaf(r)).collect::<Vec<Hash>>()];
        while levels.last().unwrap().len() > 1 {
            let prev = levels.last().unwrap();
            let mut next = Vec::with_capacity(prev.len().div_ceil(2));
            let mut i = 0;
            while i < prev.len() {
                let left = &prev[i];
                let right = if i + 1 < prev.len() { &prev[i + 1] } else { left };
                next.push(hash_internal(left, right));
                i += 2;
            }
            levels.push(next);
        }
        Self { levels }
    }

    /// The root hash of this tree.
    pub fn root_hash(&self) -> Hash {
        self.levels.last().unwrap()[0]
    }

    /// Number of leaves (original records) this tree covers.
    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// Depth-first serialization: parent hash, then left subtree, then
    /// right subtree, recursively — i.e. a pre-order walk of the implicit
    /// binary tree, written as a flat sequence of 32-byte hashes preceded
    /// by a leaf count.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.node_count() * LEAF_HASH_LEN);
        out.extend_from_slice(&(self.leaf_count() as u32).to_le_bytes());
        self.serialize_node(self.levels.len() - 1, 0, &mut out);
        out
    }

    fn node_count(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    fn serialize_node(&self, level: usize, index: usize, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.levels[level][index]);
        if level == 0 {
            return;
        }
        let child_count = self.levels[level - 1].len();
        let left = index * 2;
        let right = if left + 1 < child_count { left + 1 } else { left };
        self.serialize_node(level - 1, left, out);
        if right != left {
            self.serialize_node(level - 1, right, out);
        }
    }

    /// Rebuilds a tree from [`MerkleTree::serialize`]'s output by replaying
    /// the same pre-order traversal shape, reconstructing level sizes from
    /// the leaf count.
    pub fn deserialize(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 4 {
            return None;
        }
        let leaf_count = u32::from_le_bytes(bytes[0..4].try_into().ok()?) as usize;
        if leaf_count == 0 {
            return None;
        }

        let mut level_sizes = vec![leaf_count];
        while *level_sizes.last().unwrap() > 1 {
            level_sizes.push(level_sizes.last().unwrap().div_ceil(2));
        }
        level_sizes.reverse(); // now root-first: [1, ..., leaf_count]

        let mut levels: Vec<Vec<Hash>> = level_sizes.iter().map(|&n| Vec::with_capacity(n)).collect();
        let mut cursor = 4usize;
        deserialize_node(bytes, &mut cursor, &mut levels, &level_sizes, level_sizes.len() - 1)?;
        levels.reverse(); // back to leaf-first, matching `build`'s layout
        Some(Self { levels })
    }

    /// Compares `self` (presumed authoritative) against `other`, returning
    /// the leaf positions where they first diverge. Descends only as far
    /// as needed: a mismatching internal node's subtree is always
    /// descended into, a matching one is skipped entirely.
    pub fn validate(&self, other: &MerkleTree) -> MerkleValidation {
        if self.leaf_count() != other.leaf_count() {
            return MerkleValidation::Mismatch {
                leaf_indices: (0..self.leaf_count().max(other.leaf_count())).collect(),
            };
        }

        let mut mismatches = Vec::new();
        self.diff_node(
            other,
            self.levels.len() - 1,
            0,
            &mut mismatches,
        );
        if mismatches.is_empty() {
            MerkleValidation::Match
        } else {
            MerkleValidation::Mismatch {
                leaf_indices: mismatches,
            }
        }
    }

    fn diff_node(&self, other: &MerkleTree, level: usize, index: usize, out: &mut Vec<usize>) {
        if self.levels[level][index] == other.levels[level][index] {
            return;
        }
        if level == 0 {
            out.push(index);
            return;
        }
        let child_count = self.levels[level - 1].len();
        let left = index * 2;
        let right = if left + 1 < child_count { left + 1 } else { left };
        self.diff_node(other, level - 1, left, out);
        if right != left {
            self.diff_node(other, level - 1, right, out);
        }
    }
}

/// Helper for [`MerkleTree::deserialize`]: reads one node (and,
/// recursively, its children) from the pre-order byte stream into the
/// root-first `levels` scratch space, which is reversed to leaf-first once
/// the whole tree has been read.
fn deserialize_node(
    bytes: &[u8],
    cursor: &mut usize,
    levels: &mut [Vec<Hash>],
    level_sizes: &[usize],
    level: usize,
) -> Option<()> {
    let hash: Hash = bytes.get(*cursor..*cursor + LEAF_HASH_LEN)?.try_into().ok()?;
    *cursor += LEAF_HASH_LEN;
    levels[level].push(hash);

    if level == 0 {
        return Some(());
    }

    // `levels[level].len()` is this node's 1-based position within its
    // level (pre-order fills each level strictly left-to-right). Only the
    // rightmost parent of an odd-sized child level has a duplicated right
    // child, which was never separately serialized.
    let is_this_rightmost = levels[level].len() == level_sizes[level];
    let child_level_odd = level_sizes[level - 1] % 2 == 1;

    deserialize_node(bytes, cursor, levels, level_sizes, level - 1)?;
    if !(is_this_rightmost && child_level_odd) {
        deserialize_node(bytes, cursor, levels, level_sizes, level - 1)?;
    }
    Some(())
}
