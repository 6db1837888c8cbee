//! A real-time executive core: priority-driven thread dispatching,
//! synchronization objects, and delta-chain timeouts, portable over a
//! machine interface.
//!
//! The building blocks:
//!
//! - [`Kernel`] owns everything and exposes the operations. It is generic
//!   over a [`Port`] (the machine: interrupt masking and context
//!   switching) and a [`SchedulerPolicy`] (the ready structure).
//! - Threads are created dormant, started, and block on mutexes,
//!   semaphores, or the clock. Their schedulability is a composite of
//!   independent state bits (see [`thread::ThreadState`]).
//! - Mutexes track ownership and counter priority inversion with
//!   inheritance or ceilings; release hands the lock directly to the next
//!   waiter. Semaphores hand released units directly to waiters the same
//!   way.
//! - Timeouts live on delta chains advanced by [`Kernel::tick`], which
//!   the application's tick interrupt (or test harness) calls.
//!
//! Four scheduling policies ship with the crate: a sorted run queue
//! ([`sched::SimpleScheduler`]), a two-level bitmap
//! ([`sched::BitmapScheduler`]), earliest-deadline-first
//! ([`sched::EdfScheduler`]), and constant-bandwidth servers layered on
//! EDF ([`sched::CbsScheduler`]).
//!
//! All object tables are sized at construction; the kernel allocates at
//! creation time only, never on hot paths.
#![cfg_attr(not(test), no_std)]
extern crate alloc;

pub mod error;
mod klock;
pub mod mutex;
pub mod port;
pub mod sched;
pub mod semaphore;
pub mod thread;
mod utils;
mod wait;
mod watchdog;

#[cfg(test)]
mod test_utils;

use klock::{KLock, KLockGuard};
use mutex::MutexCb;
use port::Port;
use sched::SchedulerPolicy;
use semaphore::SemaphoreCb;
use thread::ThreadCb;
use utils::arena::{Arena, Id};
use watchdog::Clock;

pub use port::InterruptToken;
pub use wait::QueueOrder;

/// An eligibility key: lower is more important. Fixed-priority policies
/// use it as the priority; deadline policies partition the key space
/// between absolute deadlines and fixed priorities.
pub type Priority = u64;

/// A count of clock ticks.
pub type Ticks = u64;

/// Handle to a thread. Generation-checked: a handle to a destroyed
/// thread is rejected even if its slot was reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId(pub(crate) Id);

/// Handle to a mutex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutexId(pub(crate) Id);

/// Handle to a semaphore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SemaphoreId(pub(crate) Id);

/// Static configuration of a [`Kernel`], fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub max_threads: usize,
    pub max_mutexes: usize,
    pub max_semaphores: usize,
    /// Length of a second on the watchdog second chain, in ticks.
    pub ticks_per_second: Ticks,
    /// Keys at or below this value displace even non-preemptible
    /// threads, the way an interrupt would.
    pub pseudo_isr_priority: Priority,
    /// Number of processors for affinity validation. The dispatcher
    /// itself drives one processor.
    pub processors: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_threads: 32,
            max_mutexes: 16,
            max_semaphores: 16,
            ticks_per_second: 1000,
            pseudo_isr_priority: 0,
            processors: 1,
        }
    }
}

/// Everything mutable, guarded by the kernel lock.
pub(crate) struct KernelState<S> {
    pub threads: Arena<ThreadCb>,
    pub mutexes: Arena<MutexCb>,
    pub semaphores: Arena<SemaphoreCb>,
    pub clock: Clock,
    pub scheduler: S,
    /// The thread occupying the processor. Stays in the ready structure.
    pub executing: Option<usize>,
    /// The thread that should occupy it, recomputed whenever the ready
    /// structure changes.
    pub heir: Option<usize>,
    pub dispatch_disable: u32,
    pub dispatch_necessary: bool,
}

/// The executive. See the crate documentation.
pub struct Kernel<P, S> {
    port: P,
    cfg: Config,
    state: KLock<KernelState<S>>,
}

pub(crate) type Guard<'a, P, S> = KLockGuard<'a, P, KernelState<S>>;

impl<P: Port, S: SchedulerPolicy> Kernel<P, S> {
    /// Construct a kernel over the given port and scheduling policy. No
    /// thread is executing until one is created and started.
    pub fn new(port: P, scheduler: S, cfg: Config) -> Self {
        Self {
            port,
            state: KLock::new(KernelState {
                threads: Arena::with_capacity(cfg.max_threads),
                mutexes: Arena::with_capacity(cfg.max_mutexes),
                semaphores: Arena::with_capacity(cfg.max_semaphores),
                clock: Clock::new(cfg.max_threads, cfg.ticks_per_second),
                scheduler,
                executing: None,
                heir: None,
                dispatch_disable: 0,
                dispatch_necessary: false,
            }),
            cfg,
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub(crate) fn lock(&self) -> Guard<'_, P, S> {
        self.state.lock(&self.port)
    }
}
