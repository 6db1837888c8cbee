//! The earliest-deadline-first policy.
//!
//! The ready structure is a deadline-ordered heap. Threads with an active
//! deadline are keyed by the absolute deadline itself; threads without
//! one fall back to fixed-priority ordering *after* every deadline
//! bearer. The two groups share one `u64` key space split at a
//! configurable boundary: deadlines occupy `0..boundary`, and a
//! deadline-less thread of priority `p` is keyed `boundary | p`. The
//! boundary is a power of two chosen at configuration time, not a
//! hardcoded bit width.
use alloc::vec::Vec;

use crate::{
    error::ReleaseJobError,
    port::Port,
    sched::SchedulerPolicy,
    thread::update_heir,
    utils::heap::KeyedHeap,
    Kernel, Priority, ThreadId, Ticks,
};

/// Configuration of the deadline policy.
#[derive(Debug, Clone, Copy)]
pub struct EdfConfig {
    /// The priority-space partition point. Must be a power of two;
    /// absolute deadlines and fixed priorities must both stay below it.
    pub boundary: Priority,
}

impl Default for EdfConfig {
    fn default() -> Self {
        Self { boundary: 1 << 62 }
    }
}

struct EdfNode {
    priority: Priority,
    deadline: Option<Ticks>,
}

pub struct EdfScheduler {
    heap: KeyedHeap,
    nodes: Vec<Option<EdfNode>>,
    boundary: Priority,
}

impl EdfScheduler {
    pub fn new(cfg: EdfConfig, max_threads: usize) -> Self {
        assert!(cfg.boundary.is_power_of_two());
        let mut nodes = Vec::with_capacity(max_threads);
        nodes.resize_with(max_threads, || None);
        Self {
            heap: KeyedHeap::new(max_threads),
            nodes,
            boundary: cfg.boundary,
        }
    }

    pub fn boundary(&self) -> Priority {
        self.boundary
    }

    fn node(&self, thread: usize) -> &EdfNode {
        self.nodes[thread]
            .as_ref()
            .expect("thread not attached to scheduler")
    }

    fn key_of(&self, thread: usize) -> Priority {
        let node = self.node(thread);
        match node.deadline {
            Some(d) => d,
            None => self.boundary | node.priority,
        }
    }

    fn requeue(&mut self, thread: usize) {
        if self.heap.remove(thread).is_some() {
            let key = self.key_of(thread);
            self.heap.push(thread, key);
        }
    }

    /// Give `thread` an absolute deadline, moving it into the deadline
    /// region of the key space.
    pub(crate) fn set_deadline(&mut self, thread: usize, deadline: Ticks) {
        debug_assert!(deadline < self.boundary);
        self.nodes[thread]
            .as_mut()
            .expect("thread not attached to scheduler")
            .deadline = Some(deadline);
        self.requeue(thread);
    }

    /// Drop `thread`'s deadline, returning it to fixed-priority ordering.
    pub(crate) fn clear_deadline(&mut self, thread: usize) {
        self.nodes[thread]
            .as_mut()
            .expect("thread not attached to scheduler")
            .deadline = None;
        self.requeue(thread);
    }
}

impl SchedulerPolicy for EdfScheduler {
    fn attach(&mut self, thread: usize, priority: Priority) {
        debug_assert!(self.nodes[thread].is_none());
        assert!(self.admits(priority));
        self.nodes[thread] = Some(EdfNode {
            priority,
            deadline: None,
        });
    }

    fn detach(&mut self, thread: usize) {
        debug_assert!(!self.heap.contains(thread));
        self.nodes[thread] = None;
    }

    fn admits(&self, priority: Priority) -> bool {
        priority < self.boundary
    }

    fn insert_ready(&mut self, thread: usize, priority: Priority, _prepend: bool) {
        assert!(self.admits(priority));
        self.nodes[thread]
            .as_mut()
            .expect("thread not attached to scheduler")
            .priority = priority;
        let key = self.key_of(thread);
        self.heap.push(thread, key);
    }

    fn extract(&mut self, thread: usize) {
        self.heap.remove(thread);
    }

    fn peek(&self) -> Option<(usize, Priority)> {
        self.heap.peek()
    }

    fn change_priority(&mut self, thread: usize, priority: Priority, _prepend: bool) {
        assert!(self.admits(priority));
        self.nodes[thread]
            .as_mut()
            .expect("thread not attached to scheduler")
            .priority = priority;
        self.requeue(thread);
    }

    fn yield_thread(&mut self, thread: usize) {
        // Same key, fresh insertion sequence: the thread moves behind
        // others sharing its deadline or priority
        self.requeue(thread);
    }
}

impl<P: Port> Kernel<P, EdfScheduler> {
    /// Begin a job for `thread` due `relative_deadline` ticks from now.
    /// Until the job is canceled or replaced, the thread is scheduled by
    /// that deadline instead of its fixed priority.
    pub fn release_job(
        &self,
        thread: ThreadId,
        relative_deadline: Ticks,
    ) -> Result<(), ReleaseJobError> {
        if relative_deadline == 0 {
            return Err(ReleaseJobError::InvalidParameter);
        }
        let mut lock = self.lock();
        let state = &mut *lock;
        if state.threads.get(thread.0).is_none() {
            return Err(ReleaseJobError::BadId);
        }
        // The absolute deadline must land inside the deadline region;
        // a wrapped sum would masquerade as maximally urgent
        let deadline = match state.clock.elapsed.checked_add(relative_deadline) {
            Some(d) if d < state.scheduler.boundary() => d,
            _ => return Err(ReleaseJobError::InvalidParameter),
        };
        state.scheduler.set_deadline(thread.0.index(), deadline);
        update_heir(state, &self.cfg, false);
        self.unlock_and_check_dispatch(lock);
        Ok(())
    }

    /// End `thread`'s current job, returning it to fixed-priority
    /// ordering.
    pub fn cancel_job(&self, thread: ThreadId) -> Result<(), ReleaseJobError> {
        let mut lock = self.lock();
        let state = &mut *lock;
        if state.threads.get(thread.0).is_none() {
            return Err(ReleaseJobError::BadId);
        }
        state.scheduler.clear_deadline(thread.0.index());
        update_heir(state, &self.cfg, false);
        self.unlock_and_check_dispatch(lock);
        Ok(())
    }
}
