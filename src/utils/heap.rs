//! A binary min-heap over small integer items with position tracking,
//! allowing removal of arbitrary items in logarithmic time.
//!
//! Used by the deadline scheduler, whose ready structure must support both
//! "extract the earliest deadline" and "extract this exact thread" (on block
//! or priority change). Entries with equal keys are ordered by insertion
//! sequence, making the heap stable.
use alloc::vec::Vec;
use core::fmt;

#[derive(Clone, Copy, Debug)]
struct Entry {
    key: u64,
    seq: u64,
    item: usize,
}

impl Entry {
    #[inline]
    fn rank(&self) -> (u64, u64) {
        (self.key, self.seq)
    }
}

const POS_NONE: usize = usize::MAX;

/// A stable min-heap of `(key, item)` pairs, where `item` is a slot index
/// below the capacity given at construction.
pub(crate) struct KeyedHeap {
    entries: Vec<Entry>,
    /// `pos[item]` is the index of `item`'s entry in `entries`, or
    /// `POS_NONE` if absent. Kept up to date by every sift.
    pos: Vec<usize>,
    next_seq: u64,
}

impl KeyedHeap {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            pos: alloc::vec![POS_NONE; capacity],
            next_seq: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, item: usize) -> bool {
        self.pos[item] != POS_NONE
    }

    /// Insert `item` with the given key. Panics if the item is already
    /// present; the caller maintains at-most-one-entry-per-item.
    pub fn push(&mut self, item: usize, key: u64) {
        assert_eq!(self.pos[item], POS_NONE, "item already in heap");
        let seq = self.next_seq;
        self.next_seq += 1;
        let i = self.entries.len();
        self.entries.push(Entry { key, seq, item });
        self.pos[item] = i;
        self.sift_up(i);
    }

    /// The item with the smallest `(key, seq)` rank, without removing it.
    pub fn peek(&self) -> Option<(usize, u64)> {
        self.entries.first().map(|e| (e.item, e.key))
    }

    /// Remove a specific item. Returns its key, or `None` if absent.
    pub fn remove(&mut self, item: usize) -> Option<u64> {
        let i = self.pos[item];
        if i == POS_NONE {
            return None;
        }
        let removed = self.entries[i];
        self.pos[item] = POS_NONE;
        let last = self.entries.pop().unwrap();
        if i < self.entries.len() {
            self.entries[i] = last;
            self.pos[last.item] = i;
            // The replacement may have to move either way
            if last.rank() < removed.rank() {
                self.sift_up(i);
            } else {
                self.sift_down(i);
            }
        }
        Some(removed.key)
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.entries[i].rank() >= self.entries[parent].rank() {
                break;
            }
            self.swap(i, parent);
            i = parent;
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        loop {
            let mut smallest = i;
            for child in [2 * i + 1, 2 * i + 2] {
                if child < self.entries.len()
                    && self.entries[child].rank() < self.entries[smallest].rank()
                {
                    smallest = child;
                }
            }
            if smallest == i {
                break;
            }
            self.swap(i, smallest);
            i = smallest;
        }
    }

    #[inline]
    fn swap(&mut self, a: usize, b: usize) {
        self.entries.swap(a, b);
        self.pos[self.entries[a].item] = a;
        self.pos[self.entries[b].item] = b;
    }
}

impl fmt::Debug for KeyedHeap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|e| (e.item, e.key)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn fifo_among_equal_keys() {
        let mut heap = KeyedHeap::new(8);
        heap.push(3, 10);
        heap.push(1, 10);
        heap.push(5, 5);
        heap.push(2, 10);

        assert_eq!(heap.peek(), Some((5, 5)));
        heap.remove(5);
        // Equal keys drain in insertion order
        assert_eq!(heap.peek(), Some((3, 10)));
        heap.remove(3);
        assert_eq!(heap.peek(), Some((1, 10)));
        heap.remove(1);
        assert_eq!(heap.peek(), Some((2, 10)));
    }

    #[test]
    fn remove_absent() {
        let mut heap = KeyedHeap::new(4);
        assert_eq!(heap.remove(2), None);
        heap.push(2, 7);
        assert_eq!(heap.remove(2), Some(7));
        assert_eq!(heap.remove(2), None);
        assert!(heap.is_empty());
    }

    /// Random push/remove sequences drain in nondecreasing key order.
    #[quickcheck]
    fn drains_sorted(ops: Vec<(u8, u8)>) {
        let mut heap = KeyedHeap::new(256);
        for (item, key) in ops {
            if heap.contains(item as usize) {
                heap.remove(item as usize);
            } else {
                heap.push(item as usize, key as u64);
            }
        }

        let mut last = 0;
        while let Some((item, key)) = heap.peek() {
            assert!(key >= last);
            last = key;
            heap.remove(item);
        }
    }
}
