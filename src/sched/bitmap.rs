//! The priority-bitmap policy: O(1) heir selection via a two-level bit
//! array over per-level FIFO queues.
use alloc::{collections::VecDeque, vec::Vec};

use crate::{sched::SchedulerPolicy, utils::prio_bitmap::PrioBitmap, Priority};

pub struct BitmapScheduler {
    bitmap: PrioBitmap,
    levels: Vec<VecDeque<usize>>,
    /// Current level per attached thread, by slot index.
    nodes: Vec<Option<Priority>>,
}

impl BitmapScheduler {
    /// `priority_levels` bounds the priority range to `0..priority_levels`.
    pub fn new(priority_levels: usize, max_threads: usize) -> Self {
        let mut levels = Vec::with_capacity(priority_levels);
        levels.resize_with(priority_levels, VecDeque::new);
        Self {
            bitmap: PrioBitmap::new(priority_levels),
            levels,
            nodes: alloc::vec![None; max_threads],
        }
    }

    fn key(&self, thread: usize) -> Priority {
        self.nodes[thread].expect("thread not attached to scheduler")
    }

    fn remove_from_level(&mut self, thread: usize, level: usize) -> bool {
        let queue = &mut self.levels[level];
        if let Some(pos) = queue.iter().position(|&t| t == thread) {
            queue.remove(pos);
            if queue.is_empty() {
                self.bitmap.clear(level);
            }
            true
        } else {
            false
        }
    }
}

impl SchedulerPolicy for BitmapScheduler {
    fn attach(&mut self, thread: usize, priority: Priority) {
        debug_assert!(self.nodes[thread].is_none());
        assert!(self.admits(priority));
        self.nodes[thread] = Some(priority);
    }

    fn detach(&mut self, thread: usize) {
        self.nodes[thread] = None;
    }

    fn admits(&self, priority: Priority) -> bool {
        (priority as usize) < self.levels.len()
    }

    fn insert_ready(&mut self, thread: usize, priority: Priority, prepend: bool) {
        assert!(self.admits(priority));
        self.nodes[thread] = Some(priority);
        let level = priority as usize;
        if prepend {
            self.levels[level].push_front(thread);
        } else {
            self.levels[level].push_back(thread);
        }
        self.bitmap.set(level);
    }

    fn extract(&mut self, thread: usize) {
        let level = self.key(thread) as usize;
        self.remove_from_level(thread, level);
    }

    fn peek(&self) -> Option<(usize, Priority)> {
        let level = self.bitmap.find_set()?;
        let t = *self.levels[level]
            .front()
            .expect("summary bit set for an empty level");
        Some((t, level as Priority))
    }

    fn change_priority(&mut self, thread: usize, priority: Priority, prepend: bool) {
        assert!(self.admits(priority));
        let old_level = self.key(thread) as usize;
        let was_ready = self.remove_from_level(thread, old_level);
        if was_ready {
            self.insert_ready(thread, priority, prepend);
        } else {
            self.nodes[thread] = Some(priority);
        }
    }

    fn yield_thread(&mut self, thread: usize) {
        let level = self.key(thread) as usize;
        if self.remove_from_level(thread, level) {
            self.levels[level].push_back(thread);
            self.bitmap.set(level);
        }
    }
}
