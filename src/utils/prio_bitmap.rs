//! A two-level bit array supporting constant-time "find first set bit"
//! queries, used as the ready-queue index of the bitmap scheduler.
use alloc::vec::Vec;
use core::fmt;

type Word = usize;
const WORD_LEN: usize = Word::BITS as usize;

/// A two-level priority bitmap.
///
/// The first level holds one bit per second-level word; its invariant is
/// `summary.get_bit(i) == (groups[i] != 0)`. `find_set` therefore needs at
/// most two trailing-zeros scans. The bit count is fixed at construction.
#[derive(Clone)]
pub(crate) struct PrioBitmap {
    summary: Word,
    groups: Vec<Word>,
    len: usize,
}

impl PrioBitmap {
    /// Construct a bitmap holding `len` bits, all clear.
    ///
    /// `len` may not exceed `WORD_LEN * WORD_LEN` (4096 on 64-bit targets),
    /// which bounds the number of distinct priority levels.
    pub fn new(len: usize) -> Self {
        assert!(len <= WORD_LEN * WORD_LEN, "too many priority levels");
        let groups = len.div_ceil(WORD_LEN);
        Self {
            summary: 0,
            groups: alloc::vec![0; groups],
            len,
        }
    }

    pub fn get(&self, i: usize) -> bool {
        assert!(i < self.len);
        self.groups[i / WORD_LEN] & (1 << (i % WORD_LEN)) != 0
    }

    pub fn set(&mut self, i: usize) {
        assert!(i < self.len);
        self.groups[i / WORD_LEN] |= 1 << (i % WORD_LEN);
        self.summary |= 1 << (i / WORD_LEN);
    }

    pub fn clear(&mut self, i: usize) {
        assert!(i < self.len);
        let group = &mut self.groups[i / WORD_LEN];
        *group &= !(1 << (i % WORD_LEN));
        if *group == 0 {
            self.summary &= !(1 << (i / WORD_LEN));
        }
    }

    /// The position of the first (lowest-index) set bit.
    pub fn find_set(&self) -> Option<usize> {
        if self.summary == 0 {
            return None;
        }
        let group_i = self.summary.trailing_zeros() as usize;
        let group = self.groups[group_i];
        debug_assert_ne!(group, 0);
        Some(group_i * WORD_LEN + group.trailing_zeros() as usize)
    }
}

impl fmt::Debug for PrioBitmap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list()
            .entries((0..self.len).filter(|&i| self.get(i)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;
    use std::collections::BTreeSet;

    /// Drive the bitmap and a `BTreeSet` reference model through the same
    /// op sequence, checking `find_set` against the model's minimum after
    /// every step. `true` sets a bit chosen by `raw`; `false` clears one
    /// that was set earlier (falling back to a set when none remain).
    fn matches_reference(ops: &[(bool, u16)], len: usize) {
        let mut subject = PrioBitmap::new(len);
        let mut reference = BTreeSet::new();
        let mut set_so_far = Vec::new();

        for &(set, raw) in ops {
            if set || set_so_far.is_empty() {
                let bit = raw as usize % len;
                subject.set(bit);
                reference.insert(bit);
                set_so_far.push(bit);
            } else {
                let bit = set_so_far.swap_remove(raw as usize % set_so_far.len());
                subject.clear(bit);
                reference.remove(&bit);
            }

            assert_eq!(subject.find_set(), reference.iter().next().copied());
        }

        for bit in 0..len {
            assert_eq!(subject.get(bit), reference.contains(&bit));
        }
    }

    #[quickcheck]
    fn size_1(ops: Vec<(bool, u16)>) {
        matches_reference(&ops, 1);
    }

    #[quickcheck]
    fn size_10(ops: Vec<(bool, u16)>) {
        matches_reference(&ops, 10);
    }

    #[quickcheck]
    fn size_100(ops: Vec<(bool, u16)>) {
        matches_reference(&ops, 100);
    }

    #[quickcheck]
    fn size_1000(ops: Vec<(bool, u16)>) {
        matches_reference(&ops, 1000);
    }
}
