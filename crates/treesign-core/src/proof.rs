//! Merkle proof trees over sorted-pair hashing
//!
//! Interior nodes are `H(min(a, b) || max(a, b))`, so a proof is nothing more
//! than the list of sibling hashes: replaying it never needs left/right
//! directions. Proofs are stored root-side first. A proof from a big root
//! down to some subtree root can therefore be extended with the subtree's
//! own proof by plain concatenation.

use crate::hash::{Hash32, HashAlgorithm};
use serde::{Deserialize, Serialize};

/// Ordered sibling hashes from the root side down to a leaf
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    siblings: Vec<Hash32>,
}

impl Proof {
    /// Create an empty proof
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a proof from root-side-first siblings
    pub fn from_siblings(siblings: Vec<Hash32>) -> Self {
        Self { siblings }
    }

    /// Sibling hashes, root side first
    pub fn siblings(&self) -> &[Hash32] {
        &self.siblings
    }

    /// Number of siblings (depth of the leaf below the root)
    pub fn len(&self) -> usize {
        self.siblings.len()
    }

    /// True when the leaf is the root itself
    pub fn is_empty(&self) -> bool {
        self.siblings.is_empty()
    }

    /// Append one sibling below the current deepest one
    pub fn push(&mut self, sibling: Hash32) {
        self.siblings.push(sibling);
    }

    /// Append the siblings of a proof that starts where this one ends
    pub fn extend_from(&mut self, lower: &Proof) {
        self.siblings.extend_from_slice(&lower.siblings);
    }

    /// Concatenate `self ++ lower` into a new proof
    pub fn concat(&self, lower: &Proof) -> Proof {
        let mut siblings = Vec::with_capacity(self.len() + lower.len());
        siblings.extend_from_slice(&self.siblings);
        siblings.extend_from_slice(&lower.siblings);
        Proof { siblings }
    }

    /// Replay the proof bottom-up from `leaf` and return the reached root
    pub fn calc(&self, hash: &dyn HashAlgorithm, leaf: &Hash32) -> Hash32 {
        self.siblings
            .iter()
            .rev()
            .fold(*leaf, |node, sibling| hash_pair(hash, &node, sibling))
    }

    /// Check that the proof leads from `leaf` to `root`
    pub fn check(&self, hash: &dyn HashAlgorithm, root: &Hash32, leaf: &Hash32) -> bool {
        &self.calc(hash, leaf) == root
    }
}

impl FromIterator<Hash32> for Proof {
    fn from_iter<I: IntoIterator<Item = Hash32>>(iter: I) -> Self {
        Self {
            siblings: iter.into_iter().collect(),
        }
    }
}

/// Hash two nodes in canonical (byte-sorted) order
pub fn hash_pair(hash: &dyn HashAlgorithm, a: &Hash32, b: &Hash32) -> Hash32 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut h = hash.hasher();
    h.update(lo.as_bytes());
    h.update(hi.as_bytes());
    h.finalize()
}

/// Build a Merkle tree over `leaves` and return the root plus one proof per
/// leaf, index-aligned with the input.
///
/// An unpaired node at the end of a level is promoted unchanged. An empty
/// input yields the zero root and no proofs.
pub fn build_proof_tree(hash: &dyn HashAlgorithm, leaves: &[Hash32]) -> (Hash32, Vec<Proof>) {
    if leaves.is_empty() {
        return (Hash32::ZERO, Vec::new());
    }

    let mut level: Vec<Hash32> = leaves.to_vec();
    // Position of each leaf's ancestor within the current level
    let mut positions: Vec<usize> = (0..leaves.len()).collect();
    let mut bottom_up: Vec<Vec<Hash32>> = vec![Vec::new(); leaves.len()];

    while level.len() > 1 {
        let mut next_level = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            match pair {
                [left, right] => next_level.push(hash_pair(hash, left, right)),
                [single] => next_level.push(*single),
                _ => unreachable!("chunks(2) yields one or two nodes"),
            }
        }

        for (pos, path) in positions.iter_mut().zip(bottom_up.iter_mut()) {
            let sibling = *pos ^ 1;
            if sibling < level.len() {
                path.push(level[sibling]);
            }
            *pos /= 2;
        }

        level = next_level;
    }

    let proofs = bottom_up
        .into_iter()
        .map(|path| path.into_iter().rev().collect())
        .collect();

    (level[0], proofs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{hash, Sha256Algorithm};
    use proptest::prelude::*;

    fn leaves(n: u8) -> Vec<Hash32> {
        (0..n).map(|i| hash(&[i])).collect()
    }

    #[test]
    fn test_empty_tree() {
        let (root, proofs) = build_proof_tree(&Sha256Algorithm, &[]);
        assert_eq!(root, Hash32::ZERO);
        assert!(proofs.is_empty());
    }

    #[test]
    fn test_single_leaf_is_root() {
        let leaf = hash(b"only");
        let (root, proofs) = build_proof_tree(&Sha256Algorithm, &[leaf]);
        assert_eq!(root, leaf);
        assert_eq!(proofs.len(), 1);
        assert!(proofs[0].is_empty());
        assert!(proofs[0].check(&Sha256Algorithm, &root, &leaf));
    }

    #[test]
    fn test_two_leaves_order_independent() {
        let a = hash(b"a");
        let b = hash(b"b");
        let (root_ab, _) = build_proof_tree(&Sha256Algorithm, &[a, b]);
        let (root_ba, _) = build_proof_tree(&Sha256Algorithm, &[b, a]);
        assert_eq!(root_ab, root_ba);
        assert_eq!(root_ab, hash_pair(&Sha256Algorithm, &a, &b));
    }

    #[test]
    fn test_three_leaves_promote_last() {
        let l = leaves(3);
        let (root, proofs) = build_proof_tree(&Sha256Algorithm, &l);
        let left = hash_pair(&Sha256Algorithm, &l[0], &l[1]);
        assert_eq!(root, hash_pair(&Sha256Algorithm, &left, &l[2]));
        assert_eq!(proofs[0].siblings(), &[l[2], l[1]]);
        assert_eq!(proofs[2].siblings(), &[left]);
    }

    #[test]
    fn test_tampered_leaf_fails() {
        let l = leaves(5);
        let (root, proofs) = build_proof_tree(&Sha256Algorithm, &l);
        let mut bad = l[3];
        bad.0[0] ^= 0x01;
        assert!(!proofs[3].check(&Sha256Algorithm, &root, &bad));
    }

    #[test]
    fn test_concat_extends_below() {
        let l = leaves(4);
        let (sub_root, sub_proofs) = build_proof_tree(&Sha256Algorithm, &l);
        let other = hash(b"other");
        let (top, top_proofs) = build_proof_tree(&Sha256Algorithm, &[sub_root, other]);
        let full = top_proofs[0].concat(&sub_proofs[2]);
        assert!(full.check(&Sha256Algorithm, &top, &l[2]));
    }

    proptest! {
        #[test]
        fn every_proof_replays_to_root(n in 1u8..64) {
            let l = leaves(n);
            let (root, proofs) = build_proof_tree(&Sha256Algorithm, &l);
            prop_assert_eq!(proofs.len(), l.len());
            for (leaf, proof) in l.iter().zip(proofs.iter()) {
                prop_assert!(proof.check(&Sha256Algorithm, &root, leaf));
            }
        }
    }
}
