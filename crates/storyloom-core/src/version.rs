//! Version vectors for causal ordering.
//!
//! A version vector maps each author to the last local sequence number
//! seen from them. Vector comparison classifies two histories as causally
//! related (one dominates) or concurrent (neither dominates).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-author logical clock map carried by every event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionVector {
    entries: HashMap<Uuid, u64>,
}

impl VersionVector {
    /// Creates an empty vector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The last sequence seen from `author`, or 0 if never seen.
    #[must_use]
    pub fn get(&self, author_id: Uuid) -> u64 {
        self.entries.get(&author_id).copied().unwrap_or(0)
    }

    /// Records that `local_sequence` from `author` has been seen.
    /// Sequences never move backwards.
    pub fn observe(&mut self, author_id: Uuid, local_sequence: u64) {
        let entry = self.entries.entry(author_id).or_insert(0);
        if local_sequence > *entry {
            *entry = local_sequence;
        }
    }

    /// Whether this vector already covers `local_sequence` from `author`.
    #[must_use]
    pub fn includes(&self, author_id: Uuid, local_sequence: u64) -> bool {
        self.get(author_id) >= local_sequence
    }

    /// Whether this vector dominates `other`: it has seen at least as much
    /// from every author `other` has seen.
    #[must_use]
    pub fn dominates(&self, other: &Self) -> bool {
        other
            .entries
            .iter()
            .all(|(author, seq)| self.get(*author) >= *seq)
    }

    /// Whether neither vector dominates the other.
    #[must_use]
    pub fn concurrent_with(&self, other: &Self) -> bool {
        !self.dominates(other) && !other.dominates(self)
    }

    /// Takes the pointwise maximum of the two vectors.
    pub fn merge(&mut self, other: &Self) {
        for (author, seq) in &other.entries {
            self.observe(*author, *seq);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_vector_is_dominated_by_everything() {
        let empty = VersionVector::new();
        let mut seen = VersionVector::new();
        seen.observe(Uuid::new_v4(), 3);
        assert!(seen.dominates(&empty));
        assert!(!empty.dominates(&seen));
        assert!(!seen.concurrent_with(&empty));
    }

    #[test]
    fn test_divergent_vectors_are_concurrent() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let mut a = VersionVector::new();
        a.observe(alice, 2);
        let mut b = VersionVector::new();
        b.observe(bob, 1);
        assert!(a.concurrent_with(&b));
    }

    #[test]
    fn test_observe_never_moves_backwards() {
        let author = Uuid::new_v4();
        let mut vv = VersionVector::new();
        vv.observe(author, 5);
        vv.observe(author, 3);
        assert_eq!(vv.get(author), 5);
        assert!(vv.includes(author, 4));
        assert!(!vv.includes(author, 6));
    }

    #[test]
    fn test_merge_takes_pointwise_maximum() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let mut a = VersionVector::new();
        a.observe(alice, 2);
        a.observe(bob, 1);
        let mut b = VersionVector::new();
        b.observe(bob, 4);
        a.merge(&b);
        assert_eq!(a.get(alice), 2);
        assert_eq!(a.get(bob), 4);
        assert!(a.dominates(&b));
    }
}
