//! append-only merkle accumulator over commitment digests
//!
//! every level of the tree is retained: `levels[0]` holds the leaves in
//! insertion order and `levels[k + 1]` pairs `levels[k]` left to right. an odd
//! trailing node is paired with itself. appends only touch the right-most
//! path, so each insert costs one hash per level while the stored tree stays
//! identical to a full bottom-up rebuild.
//!
//! ```text
//!                 root
//!              /        \
//!        H(z,c1)        H(c2,c2)
//!        /    \          /
//!       z     c1       c2          <- levels[0], index 0 is the zero commitment
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::digest::{zero_commitment, Digest, DigestHasher};
use crate::error::{Error, Result};

/// which operand the path node itself is at a given level
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// node is hashed as `hash_pair(node, sibling)`
    Left,
    /// node is hashed as `hash_pair(sibling, node)`
    Right,
}

impl Side {
    /// 0 for left, 1 for right
    pub fn as_index(&self) -> u8 {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathElement {
    pub sibling: Digest,
    pub side: Side,
}

/// inclusion path from a leaf up to (but excluding) the root
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerklePath {
    pub leaf_index: usize,
    /// ordered from the leaf level upwards
    pub elements: Vec<PathElement>,
}

impl MerklePath {
    /// fold the path over `leaf` to obtain the root it commits to
    pub fn compute_root<H: DigestHasher + ?Sized>(&self, leaf: &Digest, hasher: &H) -> Digest {
        self.elements.iter().fold(*leaf, |node, el| match el.side {
            Side::Left => hasher.hash_pair(&node, &el.sibling),
            Side::Right => hasher.hash_pair(&el.sibling, &node),
        })
    }

    pub fn verify<H: DigestHasher + ?Sized>(&self, leaf: &Digest, root: &Digest, hasher: &H) -> bool {
        &self.compute_root(leaf, hasher) == root
    }

    pub fn siblings(&self) -> Vec<Digest> {
        self.elements.iter().map(|el| el.sibling).collect()
    }

    /// side of each path node encoded as 0 (left) / 1 (right)
    pub fn path_indices(&self) -> Vec<u8> {
        self.elements.iter().map(|el| el.side.as_index()).collect()
    }

    pub fn depth(&self) -> usize {
        self.elements.len()
    }
}

/// merkle tree over an append-only leaf sequence
pub struct MerkleAccumulator<H> {
    hasher: H,
    /// levels[0] = leaves, last level = [root]
    levels: Vec<Vec<Digest>>,
    /// commitment -> first leaf index holding it
    positions: HashMap<Digest, usize>,
}

impl<H: DigestHasher> MerkleAccumulator<H> {
    /// empty tree with no root
    pub fn new(hasher: H) -> Self {
        Self {
            hasher,
            levels: vec![Vec::new()],
            positions: HashMap::new(),
        }
    }

    /// tree seeded with the zero commitment at index 0
    pub fn genesis(hasher: H) -> Self {
        let zero = zero_commitment(&hasher);
        let mut tree = Self::new(hasher);
        tree.append(zero);
        tree
    }

    /// rebuild from a persisted leaf sequence, no genesis seeding
    pub fn from_leaves<I>(hasher: H, leaves: I) -> Self
    where
        I: IntoIterator<Item = Digest>,
    {
        let mut tree = Self::new(hasher);
        for leaf in leaves {
            tree.append(leaf);
        }
        tree
    }

    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    /// append a leaf at the next free index, returning (index, new root)
    pub fn append(&mut self, leaf: Digest) -> (usize, Digest) {
        let index = self.levels[0].len();
        self.levels[0].push(leaf);
        self.positions.entry(leaf).or_insert(index);

        let mut level = 0;
        let mut node = index;
        while self.levels[level].len() > 1 {
            let parent = node / 2;
            let (left, right) = {
                let nodes = &self.levels[level];
                let left = nodes[parent * 2];
                let right = nodes.get(parent * 2 + 1).copied().unwrap_or(left);
                (left, right)
            };
            let hash = self.hasher.hash_pair(&left, &right);

            if self.levels.len() == level + 1 {
                self.levels.push(Vec::new());
            }
            let next = &mut self.levels[level + 1];
            if parent < next.len() {
                next[parent] = hash;
            } else {
                next.push(hash);
            }

            level += 1;
            node = parent;
        }

        // a non-empty tree always has a root
        let root = self.levels[level][0];
        (index, root)
    }

    /// current root, `None` only for an empty tree
    pub fn root(&self) -> Option<Digest> {
        self.levels.last().and_then(|nodes| nodes.first()).copied()
    }

    /// inclusion path for the first leaf equal to `leaf`
    pub fn path_for(&self, leaf: &Digest) -> Result<MerklePath> {
        let index = self.index_of(leaf).ok_or(Error::NotFound(*leaf))?;
        self.path_at(index)
    }

    /// inclusion path for the leaf at `index`
    pub fn path_at(&self, index: usize) -> Result<MerklePath> {
        let len = self.len();
        if index >= len {
            return Err(Error::IndexOutOfRange { index, len });
        }

        let mut elements = Vec::with_capacity(self.depth());
        let mut node = index;
        for nodes in &self.levels[..self.levels.len() - 1] {
            let element = if node % 2 == 1 {
                PathElement {
                    sibling: nodes[node - 1],
                    side: Side::Right,
                }
            } else {
                // trailing odd node was hashed with itself
                PathElement {
                    sibling: nodes.get(node + 1).copied().unwrap_or(nodes[node]),
                    side: Side::Left,
                }
            };
            elements.push(element);
            node /= 2;
        }

        Ok(MerklePath {
            leaf_index: index,
            elements,
        })
    }

    pub fn index_of(&self, leaf: &Digest) -> Option<usize> {
        self.positions.get(leaf).copied()
    }

    pub fn contains(&self, leaf: &Digest) -> bool {
        self.positions.contains_key(leaf)
    }

    pub fn leaves(&self) -> &[Digest] {
        &self.levels[0]
    }

    pub fn levels(&self) -> &[Vec<Digest>] {
        &self.levels
    }

    /// number of levels above the leaves
    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn len(&self) -> usize {
        self.levels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels[0].is_empty()
    }
}

/// full bottom-up root over `leaves` with self-pairing of odd tails
///
/// independent of [`MerkleAccumulator`]; used to cross-check it.
pub fn compute_root<H: DigestHasher + ?Sized>(hasher: &H, leaves: &[Digest]) -> Option<Digest> {
    if leaves.is_empty() {
        return None;
    }

    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => hasher.hash_pair(left, right),
                [single] => hasher.hash_pair(single, single),
                _ => unreachable!("chunks(2) yields one or two nodes"),
            })
            .collect();
    }
    Some(level[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::{Blake3Hasher, Sha256Hasher};

    fn leaf(i: u32) -> Digest {
        Sha256Hasher.hash(&i.to_le_bytes())
    }

    #[test]
    fn test_genesis_root_is_zero_commitment() {
        let tree = MerkleAccumulator::genesis(Sha256Hasher);
        let zero = zero_commitment(&Sha256Hasher);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.root(), Some(zero));
        assert_eq!(tree.index_of(&zero), Some(0));

        let path = tree.path_for(&zero).unwrap();
        assert!(path.elements.is_empty());
        assert!(path.verify(&zero, &zero, &Sha256Hasher));
    }

    #[test]
    fn test_empty_tree_has_no_root() {
        let tree = MerkleAccumulator::new(Sha256Hasher);
        assert!(tree.is_empty());
        assert_eq!(tree.root(), None);
        assert!(matches!(tree.path_at(0), Err(Error::IndexOutOfRange { index: 0, len: 0 })));
    }

    #[test]
    fn test_two_deposit_scenario() {
        let h = Sha256Hasher;
        let zero = zero_commitment(&h);
        let c1 = h.hash(b"C1");
        let c2 = h.hash(b"C2");

        let mut tree = MerkleAccumulator::genesis(h);

        let (i1, r1) = tree.append(c1);
        assert_eq!(i1, 1);
        assert_eq!(r1, h.hash_pair(&zero, &c1));

        let (i2, r2) = tree.append(c2);
        assert_eq!(i2, 2);
        let left = h.hash_pair(&zero, &c1);
        let right = h.hash_pair(&c2, &c2);
        assert_eq!(tree.levels()[1], vec![left, right]);
        assert_eq!(r2, h.hash_pair(&left, &right));
        assert_eq!(tree.root(), Some(r2));

        let path = tree.path_for(&c2).unwrap();
        assert_eq!(path.leaf_index, 2);
        assert_eq!(
            path.elements,
            vec![
                PathElement { sibling: c2, side: Side::Left },
                PathElement { sibling: left, side: Side::Right },
            ]
        );
        assert_eq!(path.path_indices(), vec![0, 1]);
        assert!(path.verify(&c2, &r2, &h));
    }

    #[test]
    fn test_incremental_matches_full_rebuild() {
        let mut tree = MerkleAccumulator::new(Sha256Hasher);
        let mut leaves = Vec::new();
        for i in 0..70 {
            let l = leaf(i);
            leaves.push(l);
            let (index, root) = tree.append(l);
            assert_eq!(index, i as usize);
            assert_eq!(Some(root), compute_root(&Sha256Hasher, &leaves), "n = {}", i + 1);
        }
    }

    #[test]
    fn test_every_path_reproduces_root() {
        let tree = MerkleAccumulator::from_leaves(Blake3Hasher, (0..37).map(leaf));
        let root = tree.root().unwrap();
        for (i, l) in tree.leaves().iter().enumerate() {
            let path = tree.path_at(i).unwrap();
            assert_eq!(path.depth(), tree.depth());
            assert!(path.verify(l, &root, &Blake3Hasher), "leaf {}", i);
        }
    }

    #[test]
    fn test_duplicate_leaf_first_occurrence_wins() {
        let dup = leaf(9);
        let mut tree = MerkleAccumulator::genesis(Sha256Hasher);
        tree.append(dup);
        tree.append(leaf(10));
        let (second, root) = tree.append(dup);

        assert_eq!(second, 3);
        assert_eq!(tree.len(), 4);
        let path = tree.path_for(&dup).unwrap();
        assert_eq!(path.leaf_index, 1);
        assert!(path.verify(&dup, &root, &Sha256Hasher));
    }

    #[test]
    fn test_unknown_leaf_not_found() {
        let tree = MerkleAccumulator::genesis(Sha256Hasher);
        let missing = leaf(1);
        assert!(matches!(tree.path_for(&missing), Err(Error::NotFound(d)) if d == missing));
        assert!(!tree.contains(&missing));
    }

    #[test]
    fn test_tampered_path_fails() {
        let tree = MerkleAccumulator::from_leaves(Sha256Hasher, (0..8).map(leaf));
        let root = tree.root().unwrap();
        let mut path = tree.path_at(5).unwrap();
        assert!(path.verify(&leaf(5), &root, &Sha256Hasher));

        path.elements[1].side = match path.elements[1].side {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        };
        assert!(!path.verify(&leaf(5), &root, &Sha256Hasher));
        assert!(!tree.path_at(5).unwrap().verify(&leaf(6), &root, &Sha256Hasher));
    }
}
