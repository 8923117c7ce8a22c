//! nullifier ledger - the set of spent notes
//!
//! a nullifier enters the set once and never leaves it. the set itself does
//! not reject duplicates; the engine checks membership first and turns an
//! existing entry into a double-spend rejection.

use std::collections::HashSet;

use crate::digest::Digest;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NullifierSet {
    nullifiers: HashSet<Digest>,
}

impl NullifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// true if the note behind `nullifier` was already spent
    pub fn contains(&self, nullifier: &Digest) -> bool {
        self.nullifiers.contains(nullifier)
    }

    /// mark spent, returns false if it was already present
    pub fn insert(&mut self, nullifier: Digest) -> bool {
        self.nullifiers.insert(nullifier)
    }

    pub fn len(&self) -> usize {
        self.nullifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nullifiers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Digest> {
        self.nullifiers.iter()
    }

    /// members in ascending byte order
    pub fn to_sorted_vec(&self) -> Vec<Digest> {
        let mut out: Vec<Digest> = self.nullifiers.iter().copied().collect();
        out.sort_unstable();
        out
    }
}

impl FromIterator<Digest> for NullifierSet {
    fn from_iter<I: IntoIterator<Item = Digest>>(iter: I) -> Self {
        Self {
            nullifiers: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nullifier_set() {
        let mut set = NullifierSet::new();
        let nf = Digest([1u8; 32]);

        assert!(!set.contains(&nf));
        assert!(set.insert(nf));
        assert!(set.contains(&nf));
        assert!(!set.insert(nf)); // already spent, still present
        assert!(set.contains(&nf));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_sorted_export() {
        let set: NullifierSet = [Digest([3u8; 32]), Digest([1u8; 32]), Digest([2u8; 32])]
            .into_iter()
            .collect();
        assert_eq!(
            set.to_sorted_vec(),
            vec![Digest([1u8; 32]), Digest([2u8; 32]), Digest([3u8; 32])]
        );
    }
}
