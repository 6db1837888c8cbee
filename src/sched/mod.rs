//! The scheduler framework: a policy interface over the ready structure,
//! with four implementations.
//!
//! A policy owns the ready structure and a per-thread node for every
//! attached thread, addressed by thread slot index. The executing thread
//! stays *in* the ready structure at its earned position; "who should run"
//! is therefore always [`peek`](SchedulerPolicy::peek), and a dispatch is
//! wanted exactly when `peek` names someone other than the executing
//! thread (subject to the preemptibility rules, which the dispatch core
//! applies).
//!
//! Eligibility keys are `u64` with lower values more important. The
//! fixed-priority policies use the priority directly; the deadline-based
//! policies partition the key space so absolute deadlines and fixed
//! priorities share one ordering (see [`edf`]).
use crate::Ticks;

pub mod bitmap;
pub mod cbs;
pub mod edf;
pub mod simple;

pub use bitmap::BitmapScheduler;
pub use cbs::CbsScheduler;
pub use edf::{EdfConfig, EdfScheduler};
pub use simple::SimpleScheduler;

/// A bandwidth-overrun callout that became due during
/// [`SchedulerPolicy::charge_tick`]. The kernel invokes the handler after
/// releasing its lock; handlers must not call back into the scheduler.
pub struct OverrunEvent {
    pub server: cbs::ServerId,
    pub handler: cbs::OverrunHandler,
}

/// The capability interface implemented by every scheduling policy.
///
/// Threads are addressed by their slot index in the kernel's thread
/// arena. The dispatch core guarantees a thread is attached before any
/// other call names it, inserted at most once, and detached only while
/// out of the ready structure.
pub trait SchedulerPolicy {
    /// Create the per-thread node. The thread starts out of the ready
    /// structure.
    fn attach(&mut self, thread: usize, priority: crate::Priority);

    /// Destroy the per-thread node.
    fn detach(&mut self, thread: usize);

    /// Whether `priority` is representable under this policy.
    fn admits(&self, priority: crate::Priority) -> bool;

    /// Insert a runnable thread. `prepend` places it ahead of equals
    /// instead of behind them (FIFO tie-break control).
    fn insert_ready(&mut self, thread: usize, priority: crate::Priority, prepend: bool);

    /// Remove a thread from the ready structure. No-op if absent.
    fn extract(&mut self, thread: usize);

    /// The most eligible ready thread and its current key.
    fn peek(&self) -> Option<(usize, crate::Priority)>;

    /// Reposition a thread after a priority change, whether or not it is
    /// currently in the ready structure.
    fn change_priority(&mut self, thread: usize, priority: crate::Priority, prepend: bool);

    /// Move a thread to the tail of its own eligibility level.
    fn yield_thread(&mut self, thread: usize);

    /// Account one tick of execution to `executing`. A budget-enforcing
    /// policy may reorder the ready structure and report a due overrun
    /// callout; other policies do nothing.
    fn charge_tick(&mut self, _executing: Option<usize>, _now: Ticks) -> Option<OverrunEvent> {
        None
    }

    /// Observe that a thread is becoming ready after a wait. A
    /// budget-enforcing policy applies its wakeup rule here.
    fn note_unblock(&mut self, _thread: usize, _now: Ticks) {}
}

impl SchedulerPolicy for alloc::boxed::Box<dyn SchedulerPolicy + Send> {
    fn attach(&mut self, thread: usize, priority: crate::Priority) {
        (**self).attach(thread, priority)
    }
    fn detach(&mut self, thread: usize) {
        (**self).detach(thread)
    }
    fn admits(&self, priority: crate::Priority) -> bool {
        (**self).admits(priority)
    }
    fn insert_ready(&mut self, thread: usize, priority: crate::Priority, prepend: bool) {
        (**self).insert_ready(thread, priority, prepend)
    }
    fn extract(&mut self, thread: usize) {
        (**self).extract(thread)
    }
    fn peek(&self) -> Option<(usize, crate::Priority)> {
        (**self).peek()
    }
    fn change_priority(&mut self, thread: usize, priority: crate::Priority, prepend: bool) {
        (**self).change_priority(thread, priority, prepend)
    }
    fn yield_thread(&mut self, thread: usize) {
        (**self).yield_thread(thread)
    }
    fn charge_tick(&mut self, executing: Option<usize>, now: Ticks) -> Option<OverrunEvent> {
        (**self).charge_tick(executing, now)
    }
    fn note_unblock(&mut self, thread: usize, now: Ticks) {
        (**self).note_unblock(thread, now)
    }
}
