//! Insertion-ordered id set with O(1) removal.

use super::CellId;
use std::collections::HashMap;

/// Vector of ids plus a position map; removal swaps the last id into the gap.
#[derive(Debug, Clone, Default)]
pub struct IdList {
    ids: Vec<CellId>,
    pos: HashMap<CellId, usize>,
}

impl IdList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: Vec::with_capacity(capacity),
            pos: HashMap::with_capacity(capacity),
        }
    }

    /// Add an id. Returns false if it was already present.
    pub fn push(&mut self, id: CellId) -> bool {
        if self.pos.contains_key(&id) {
            return false;
        }
        self.pos.insert(id, self.ids.len());
        self.ids.push(id);
        true
    }

    /// Remove an id (O(1)). Returns false if it was absent.
    pub fn remove(&mut self, id: CellId) -> bool {
        let Some(pos) = self.pos.remove(&id) else {
            return false;
        };
        let last_pos = self.ids.len() - 1;
        if pos != last_pos {
            let swapped_id = self.ids[last_pos];
            self.ids.swap(pos, last_pos);
            self.pos.insert(swapped_id, pos);
        }
        self.ids.pop();
        true
    }

    #[inline]
    pub fn contains(&self, id: CellId) -> bool {
        self.pos.contains_key(&id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[CellId] {
        &self.ids
    }

    pub fn iter(&self) -> impl Iterator<Item = CellId> + '_ {
        self.ids.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_remove_keeps_positions() {
        let mut list = IdList::new();
        for id in 1..=4 {
            assert!(list.push(id));
        }
        assert!(!list.push(2));

        assert!(list.remove(2));
        assert_eq!(list.as_slice(), &[1, 4, 3]);
        assert!(!list.remove(2));

        // 4 moved into slot 1; removing it must still work.
        assert!(list.remove(4));
        assert_eq!(list.as_slice(), &[1, 3]);
        assert!(list.remove(3));
        assert!(list.remove(1));
        assert!(list.is_empty());
    }
}
