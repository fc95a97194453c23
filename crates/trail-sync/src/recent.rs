use std::collections::{HashSet, VecDeque};

use trail_types::Digest;

/// Bounded set of recently accepted record digests.
///
/// Used to drop a record that arrives again over a second link before it
/// is linked or rebroadcast a second time. Oldest entries are evicted first.
#[derive(Debug, Clone)]
pub struct RecentDigests {
    capacity: usize,
    order: VecDeque<Digest>,
    seen: HashSet<Digest>,
}

impl RecentDigests {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity.min(4096)),
            seen: HashSet::with_capacity(capacity.min(4096)),
        }
    }

    pub fn contains(&self, digest: &Digest) -> bool {
        self.seen.contains(digest)
    }

    /// Remember `digest`. Returns `false` if it was already present.
    ///
    /// A zero capacity set remembers nothing.
    pub fn insert(&mut self, digest: Digest) -> bool {
        if self.capacity == 0 {
            return true;
        }
        if !self.seen.insert(digest) {
            return false;
        }
        self.order.push_back(digest);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
