//! The simple policy: an O(n) sorted ready list.
//!
//! Adequate for systems with a handful of threads, and the easiest policy
//! to audit: the ready structure is literally a vector sorted by priority
//! with FIFO order within a level.
use alloc::vec::Vec;

use crate::{sched::SchedulerPolicy, Priority};

pub struct SimpleScheduler {
    /// Ready threads, most eligible first.
    queue: Vec<usize>,
    /// Current key per attached thread, by slot index.
    nodes: Vec<Option<Priority>>,
}

impl SimpleScheduler {
    pub fn new(max_threads: usize) -> Self {
        Self {
            queue: Vec::with_capacity(max_threads),
            nodes: alloc::vec![None; max_threads],
        }
    }

    fn key(&self, thread: usize) -> Priority {
        self.nodes[thread].expect("thread not attached to scheduler")
    }

    fn position(&self, thread: usize) -> Option<usize> {
        self.queue.iter().position(|&t| t == thread)
    }

    fn insert_at_rank(&mut self, thread: usize, priority: Priority, prepend: bool) {
        let pos = self
            .queue
            .iter()
            .position(|&t| {
                let k = self.key(t);
                if prepend {
                    k >= priority
                } else {
                    k > priority
                }
            })
            .unwrap_or(self.queue.len());
        self.queue.insert(pos, thread);
    }
}

impl SchedulerPolicy for SimpleScheduler {
    fn attach(&mut self, thread: usize, priority: Priority) {
        debug_assert!(self.nodes[thread].is_none());
        self.nodes[thread] = Some(priority);
    }

    fn detach(&mut self, thread: usize) {
        debug_assert!(self.position(thread).is_none());
        self.nodes[thread] = None;
    }

    fn admits(&self, _priority: Priority) -> bool {
        true
    }

    fn insert_ready(&mut self, thread: usize, priority: Priority, prepend: bool) {
        debug_assert!(self.position(thread).is_none());
        self.nodes[thread] = Some(priority);
        self.insert_at_rank(thread, priority, prepend);
    }

    fn extract(&mut self, thread: usize) {
        if let Some(pos) = self.position(thread) {
            self.queue.remove(pos);
        }
    }

    fn peek(&self) -> Option<(usize, Priority)> {
        self.queue.first().map(|&t| (t, self.key(t)))
    }

    fn change_priority(&mut self, thread: usize, priority: Priority, prepend: bool) {
        self.nodes[thread] = Some(priority);
        if let Some(pos) = self.position(thread) {
            self.queue.remove(pos);
            self.insert_at_rank(thread, priority, prepend);
        }
    }

    fn yield_thread(&mut self, thread: usize) {
        if let Some(pos) = self.position(thread) {
            self.queue.remove(pos);
            let priority = self.key(thread);
            self.insert_at_rank(thread, priority, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(s: &mut SimpleScheduler) -> Vec<usize> {
        let mut out = Vec::new();
        while let Some((t, _)) = s.peek() {
            out.push(t);
            s.extract(t);
        }
        out
    }

    #[test]
    fn sorted_with_fifo_ties() {
        let mut s = SimpleScheduler::new(8);
        for t in 0..4 {
            s.attach(t, 0);
        }
        s.insert_ready(0, 5, false);
        s.insert_ready(1, 3, false);
        s.insert_ready(2, 3, false);
        s.insert_ready(3, 7, false);
        assert_eq!(drain(&mut s), [1, 2, 0, 3]);
    }

    #[test]
    fn prepend_jumps_ahead_of_equals() {
        let mut s = SimpleScheduler::new(4);
        for t in 0..3 {
            s.attach(t, 0);
        }
        s.insert_ready(0, 3, false);
        s.insert_ready(1, 3, false);
        s.insert_ready(2, 3, true);
        assert_eq!(drain(&mut s), [2, 0, 1]);
    }

    #[test]
    fn yield_moves_to_level_tail() {
        let mut s = SimpleScheduler::new(4);
        for t in 0..3 {
            s.attach(t, 0);
        }
        s.insert_ready(0, 3, false);
        s.insert_ready(1, 3, false);
        s.insert_ready(2, 1, false);
        s.yield_thread(0);
        // Yield does not demote past other levels, only within its own
        assert_eq!(drain(&mut s), [2, 1, 0]);
    }

    #[test]
    fn change_priority_repositions() {
        let mut s = SimpleScheduler::new(4);
        for t in 0..2 {
            s.attach(t, 0);
        }
        s.insert_ready(0, 5, false);
        s.insert_ready(1, 9, false);
        s.change_priority(1, 2, false);
        assert_eq!(s.peek(), Some((1, 2)));
    }
}
