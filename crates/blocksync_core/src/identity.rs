//! Identity map between shared-sequence records and rendered blocks.
//!
//! The map is the source of truth for "is this change mine or a remote
//! one": a record id present in the sequence but absent here arrived
//! from a peer, and an id present here but gone from the sequence was
//! deleted by a peer.
//!
//! At every quiescent point (no sync batch in flight) the key set equals
//! exactly the materialized contents of the shared sequence, and each
//! key's value is the handle displayed at that key's index. Only the two
//! change appliers mutate the map, always inside the reentrancy guard.

use std::collections::{HashMap, HashSet};

use crate::surface::BlockHandle;
use crate::types::BlockId;

/// Bijective association between block records and render handles.
#[derive(Debug, Default)]
pub struct IdentityMap {
    entries: HashMap<BlockId, BlockHandle>,
}

/// Symmetric difference between the sequence's id set and the map's keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceDiff {
    /// Ids present in the sequence but not in the map, in sequence order.
    pub added: Vec<BlockId>,

    /// Ids present in the map but gone from the sequence. Order is not
    /// meaningful; removals are positioned by their handle's current
    /// display index, not by this list.
    pub removed: Vec<BlockId>,
}

impl SequenceDiff {
    /// Whether nothing differs.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl IdentityMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate a record id with the handle currently displaying it.
    ///
    /// Returns the previously associated handle, if any.
    pub fn insert(&mut self, id: BlockId, handle: BlockHandle) -> Option<BlockHandle> {
        self.entries.insert(id, handle)
    }

    /// Remove the association for `id`, returning its handle.
    pub fn remove(&mut self, id: &BlockId) -> Option<BlockHandle> {
        self.entries.remove(id)
    }

    /// The handle associated with `id`.
    pub fn get(&self, id: &BlockId) -> Option<&BlockHandle> {
        self.entries.get(id)
    }

    /// Whether `id` has an association.
    pub fn contains(&self, id: &BlockId) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of associations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All known record ids, in no particular order.
    pub fn ids(&self) -> impl Iterator<Item = &BlockId> {
        self.entries.keys()
    }

    /// Drop all associations.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Compute the symmetric difference against the sequence's current
    /// id set, delivered in sequence order.
    pub fn diff<I>(&self, sequence_ids: I) -> SequenceDiff
    where
        I: IntoIterator<Item = BlockId>,
    {
        let mut added = Vec::new();
        let mut seen = HashSet::new();
        for id in sequence_ids {
            seen.insert(id);
            if !self.entries.contains_key(&id) {
                added.push(id);
            }
        }
        let removed = self
            .entries
            .keys()
            .filter(|id| !seen.contains(*id))
            .copied()
            .collect();
        SequenceDiff { added, removed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(raw: u64) -> BlockHandle {
        BlockHandle::new(raw)
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut map = IdentityMap::new();
        let id = BlockId::new();

        assert!(map.insert(id, handle(1)).is_none());
        assert!(map.contains(&id));
        assert_eq!(map.get(&id), Some(&handle(1)));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut map = IdentityMap::new();
        let id = BlockId::new();
        map.insert(id, handle(1));

        assert_eq!(map.remove(&id), Some(handle(1)));
        assert!(map.is_empty());
        assert_eq!(map.remove(&id), None);
    }

    #[test]
    fn test_diff_added_preserves_sequence_order() {
        let mut map = IdentityMap::new();
        let known = BlockId::new();
        map.insert(known, handle(1));

        let new_a = BlockId::new();
        let new_b = BlockId::new();
        let diff = map.diff([new_a, known, new_b]);

        assert_eq!(diff.added, vec![new_a, new_b]);
        assert!(diff.removed.is_empty());
    }

    #[test]
    fn test_diff_removed() {
        let mut map = IdentityMap::new();
        let kept = BlockId::new();
        let dropped = BlockId::new();
        map.insert(kept, handle(1));
        map.insert(dropped, handle(2));

        let diff = map.diff([kept]);

        assert!(diff.added.is_empty());
        assert_eq!(diff.removed, vec![dropped]);
    }

    #[test]
    fn test_diff_empty_when_in_sync() {
        let mut map = IdentityMap::new();
        let a = BlockId::new();
        let b = BlockId::new();
        map.insert(a, handle(1));
        map.insert(b, handle(2));

        assert!(map.diff([a, b]).is_empty());
    }
}
