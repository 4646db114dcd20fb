use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

use crate::error::InvalidCapacity;

/// Fixed-capacity membership set that forgets its oldest entry first.
///
/// Eviction is strict insertion order: `contains` never refreshes an entry.
/// Meant for transient identifiers (processed message ids and the like)
/// where losing the oldest one is fine and unbounded growth is not.
#[derive(Debug, Clone)]
pub struct BoundedDedupSet<T> {
    capacity: usize,
    order: VecDeque<T>,
    members: HashSet<T>,
}

impl<T: Eq + Hash + Clone> BoundedDedupSet<T> {
    pub fn new(capacity: usize) -> Result<Self, InvalidCapacity> {
        if capacity < 1 {
            return Err(InvalidCapacity(capacity));
        }
        Ok(Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
        })
    }

    /// Insert `item`. Returns false (and changes nothing) if already present.
    pub fn add(&mut self, item: T) -> bool {
        if self.members.contains(&item) {
            return false;
        }
        if self.order.len() >= self.capacity
            && let Some(oldest) = self.order.pop_front()
        {
            self.members.remove(&oldest);
        }
        self.members.insert(item.clone());
        self.order.push_back(item);
        true
    }

    pub fn contains(&self, item: &T) -> bool {
        self.members.contains(item)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_rejected() {
        let err = BoundedDedupSet::<String>::new(0).unwrap_err();
        assert_eq!(err, InvalidCapacity(0));
    }

    #[test]
    fn evicts_oldest_at_capacity() {
        let mut set = BoundedDedupSet::new(2).unwrap();
        set.add("a");
        set.add("b");
        set.add("c");
        assert!(!set.contains(&"a"));
        assert!(set.contains(&"b"));
        assert!(set.contains(&"c"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn duplicate_add_is_noop() {
        let mut set = BoundedDedupSet::new(2).unwrap();
        assert!(set.add(1));
        assert!(!set.add(1));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn contains_does_not_refresh_recency() {
        let mut set = BoundedDedupSet::new(2).unwrap();
        set.add("a");
        set.add("b");
        assert!(set.contains(&"a"));
        set.add("c");
        // FIFO, not LRU: "a" goes even though it was just looked up.
        assert!(!set.contains(&"a"));
        assert!(set.contains(&"b"));
    }

    #[test]
    fn re_adding_duplicate_does_not_refresh_either() {
        let mut set = BoundedDedupSet::new(2).unwrap();
        set.add("a");
        set.add("b");
        set.add("a");
        set.add("c");
        assert!(!set.contains(&"a"));
    }

    #[test]
    fn clear_empties_the_set() {
        let mut set = BoundedDedupSet::new(3).unwrap();
        set.add(1);
        set.add(2);
        set.clear();
        assert!(set.is_empty());
        assert!(!set.contains(&1));
        assert!(set.add(1));
        assert_eq!(set.capacity(), 3);
    }

    #[test]
    fn capacity_one_keeps_latest() {
        let mut set = BoundedDedupSet::new(1).unwrap();
        set.add("x");
        set.add("y");
        assert!(set.contains(&"y"));
        assert!(!set.contains(&"x"));
    }
}
