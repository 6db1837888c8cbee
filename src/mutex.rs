//! The mutex: ownership-tracked mutual exclusion with optional recursion
//! and priority-inversion control.
//!
//! A held mutex is linked into its holder's held-mutex chain, and the
//! holder's effective priority is recomputed from that chain whenever it
//! can change: the base priority, the ceilings of held ceiling mutexes,
//! and the most important waiter of each held inheritance mutex all pull
//! it toward more important values. Inheritance is single-level: a holder
//! inherits from its own waiters, not transitively through chains of
//! blocked holders.
//!
//! Release hands the mutex directly to the next waiter under the kernel
//! lock. There is no window in which the mutex is free but contended, so
//! a release never lets an unrelated thread barge in ahead of the queue.
use log::debug;

use crate::{
    error::{
        CreateMutexError, DestroyMutexError, LockMutexError, LockMutexTimeoutError,
        QueryMutexError, TryLockMutexError, UnlockMutexError,
    },
    port::Port,
    sched::SchedulerPolicy,
    thread::{set_effective_priority, thread_cb, thread_cb_mut, unblock, ThreadState},
    wait::{QueueOrder, WaitMode, WaitOutcome, WaitQueue, WaitSource},
    watchdog::ChainKind,
    Config, Kernel, KernelState, MutexId, Priority, ThreadId, Ticks,
};

/// Priority-inversion control discipline, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutexProtocol {
    /// No priority adjustment.
    None,
    /// The holder inherits the priority of its most important waiter.
    Inherit,
    /// The holder is raised to the ceiling priority while holding.
    /// Acquisition by a thread more important than the ceiling is an
    /// error.
    Ceiling(Priority),
}

/// Creation-time attributes of a mutex.
#[derive(Debug, Clone, Copy)]
pub struct MutexAttributes {
    pub protocol: MutexProtocol,
    /// Waiter release discipline. Priority-based protocols require the
    /// priority discipline.
    pub order: QueueOrder,
    /// Whether nested acquisition by the holder is counted rather than
    /// rejected.
    pub recursive: bool,
    /// Acquire on behalf of the creating thread before returning.
    pub initially_locked: bool,
}

impl Default for MutexAttributes {
    fn default() -> Self {
        Self {
            protocol: MutexProtocol::None,
            order: QueueOrder::Priority,
            recursive: true,
            initially_locked: false,
        }
    }
}

pub(crate) struct MutexCb {
    pub queue: WaitQueue,
    pub protocol: MutexProtocol,
    pub recursive: bool,
    pub holder: Option<usize>,
    pub nest_count: u32,
    /// Next mutex on the holder's held-mutex chain.
    pub next_held: Option<usize>,
}

impl MutexCb {
    fn new(attrs: &MutexAttributes) -> Self {
        Self {
            queue: WaitQueue::new(attrs.order),
            protocol: attrs.protocol,
            recursive: attrs.recursive,
            holder: None,
            nest_count: 0,
            next_held: None,
        }
    }
}

fn mutex<S>(state: &KernelState<S>, idx: usize) -> &MutexCb {
    state
        .mutexes
        .get_at(idx)
        .expect("operation references a dead mutex slot")
}

fn mutex_mut<S>(state: &mut KernelState<S>, idx: usize) -> &mut MutexCb {
    state
        .mutexes
        .get_at_mut(idx)
        .expect("operation references a dead mutex slot")
}

/// A thread's effective priority: its base pulled up by every held
/// mutex's ceiling or most important waiter.
pub(crate) fn effective_priority<S>(state: &KernelState<S>, idx: usize) -> Priority {
    let t = thread_cb(state, idx);
    let mut priority = t.base_priority;
    let mut cur = t.held_mutexes;
    while let Some(m) = cur {
        let mu = mutex(state, m);
        match mu.protocol {
            MutexProtocol::None => {}
            MutexProtocol::Ceiling(c) => priority = priority.min(c),
            MutexProtocol::Inherit => {
                if let Some(w) = mu.queue.max_waiter_priority(&state.threads) {
                    priority = priority.min(w);
                }
            }
        }
        cur = mu.next_held;
    }
    priority
}

/// Recompute and apply the holder's effective priority after its waiter
/// set changed.
pub(crate) fn reevaluate_holder<S: SchedulerPolicy>(
    state: &mut KernelState<S>,
    cfg: &Config,
    midx: usize,
) {
    let holder = match state.mutexes.get_at(midx) {
        Some(m) => m.holder,
        None => return,
    };
    if let Some(h) = holder {
        let eff = effective_priority(state, h);
        set_effective_priority(state, cfg, h, eff);
    }
}

/// Record `t` as the holder of an unowned mutex and apply any ceiling
/// boost.
fn acquire<S: SchedulerPolicy>(state: &mut KernelState<S>, cfg: &Config, midx: usize, t: usize) {
    let head = thread_cb(state, t).held_mutexes;
    {
        let m = mutex_mut(state, midx);
        debug_assert!(m.holder.is_none());
        m.holder = Some(t);
        m.nest_count = 1;
        m.next_held = head;
    }
    {
        let tc = thread_cb_mut(state, t);
        tc.held_mutexes = Some(midx);
        tc.resource_count += 1;
    }
    if let MutexProtocol::Ceiling(c) = mutex(state, midx).protocol {
        if c < thread_cb(state, t).priority {
            set_effective_priority(state, cfg, t, c);
        }
    }
}

fn unlink_held<S>(state: &mut KernelState<S>, t: usize, midx: usize) {
    let mut cur = thread_cb(state, t).held_mutexes;
    if cur == Some(midx) {
        let next = mutex(state, midx).next_held;
        thread_cb_mut(state, t).held_mutexes = next;
        mutex_mut(state, midx).next_held = None;
        return;
    }
    while let Some(c) = cur {
        let next = mutex(state, c).next_held;
        if next == Some(midx) {
            let after = mutex(state, midx).next_held;
            mutex_mut(state, c).next_held = after;
            mutex_mut(state, midx).next_held = None;
            return;
        }
        cur = next;
    }
    panic!("mutex is not on its holder's held chain");
}

/// Take the mutex away from `holder` regardless of nesting, restore the
/// holder's priority, and hand the mutex to the next waiter if any.
pub(crate) fn force_release<S: SchedulerPolicy>(
    state: &mut KernelState<S>,
    cfg: &Config,
    midx: usize,
    holder: usize,
) {
    unlink_held(state, holder, midx);
    thread_cb_mut(state, holder).resource_count -= 1;
    {
        let m = mutex_mut(state, midx);
        m.holder = None;
        m.nest_count = 0;
    }
    let eff = effective_priority(state, holder);
    set_effective_priority(state, cfg, holder, eff);

    // Direct hand-off under the same lock: the mutex is never observably
    // free while contended
    let next = {
        let state = &mut *state;
        let m = state
            .mutexes
            .get_at_mut(midx)
            .expect("operation references a dead mutex slot");
        m.queue.dequeue(&mut state.threads)
    };
    if let Some(w) = next {
        acquire(state, cfg, midx, w);
        unblock(state, cfg, w, WaitOutcome::Satisfied);
    }
}

/// Shared failure set of the three acquisition entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockFailure {
    BadContext,
    BadId,
    Unavailable,
    Timeout,
    Deleted,
    CeilingViolated,
    NestingNotAllowed,
}

impl<P: Port, S: SchedulerPolicy> Kernel<P, S> {
    /// Create a mutex. With `initially_locked` the calling thread holds
    /// it on return, subject to the same ceiling validation as a lock.
    pub fn create_mutex(&self, attrs: MutexAttributes) -> Result<MutexId, CreateMutexError> {
        match attrs.protocol {
            // Priority-driven protocols need a priority-ranked queue
            MutexProtocol::Inherit | MutexProtocol::Ceiling(_)
                if attrs.order == QueueOrder::Fifo =>
            {
                return Err(CreateMutexError::BadParam)
            }
            _ => {}
        }
        let mut lock = self.lock();
        let state = &mut *lock;
        if let MutexProtocol::Ceiling(c) = attrs.protocol {
            if !state.scheduler.admits(c) {
                return Err(CreateMutexError::BadParam);
            }
        }
        let creator = if attrs.initially_locked {
            let cur = self
                .executing_caller(state)
                .ok_or(CreateMutexError::BadContext)?;
            if let MutexProtocol::Ceiling(c) = attrs.protocol {
                if thread_cb(state, cur).priority < c {
                    return Err(CreateMutexError::CeilingViolated);
                }
            }
            Some(cur)
        } else {
            None
        };
        let id = state
            .mutexes
            .alloc(MutexCb::new(&attrs))
            .map_err(|_| CreateMutexError::TooMany)?;
        if let Some(cur) = creator {
            acquire(state, &self.cfg, id.index(), cur);
        }
        debug!("created mutex {:?} ({:?})", id, attrs.protocol);
        Ok(MutexId(id))
    }

    fn lock_mutex_inner(&self, id: MutexId, mode: WaitMode) -> Result<(), LockFailure> {
        let mut lock = self.lock();
        let cur = self
            .executing_caller(&lock)
            .ok_or(LockFailure::BadContext)?;
        if lock.mutexes.get(id.0).is_none() {
            return Err(LockFailure::BadId);
        }
        let midx = id.0.index();
        let (holder, protocol, recursive) = {
            let m = mutex(&lock, midx);
            (m.holder, m.protocol, m.recursive)
        };
        // Ceiling validation applies to every acquisition attempt
        if let MutexProtocol::Ceiling(c) = protocol {
            if thread_cb(&lock, cur).priority < c {
                return Err(LockFailure::CeilingViolated);
            }
        }
        match holder {
            None => {
                acquire(&mut lock, &self.cfg, midx, cur);
                Ok(())
            }
            Some(h) if h == cur => {
                if recursive {
                    mutex_mut(&mut lock, midx).nest_count += 1;
                    Ok(())
                } else {
                    Err(LockFailure::NestingNotAllowed)
                }
            }
            Some(h) => {
                if mode == WaitMode::NonBlocking {
                    return Err(LockFailure::Unavailable);
                }
                {
                    let state = &mut *lock;
                    {
                        let m = state
                            .mutexes
                            .get_at_mut(midx)
                            .expect("operation references a dead mutex slot");
                        m.queue.enqueue(&mut state.threads, cur);
                    }
                    if protocol == MutexProtocol::Inherit {
                        let wanted = thread_cb(state, cur).priority;
                        if wanted < thread_cb(state, h).priority {
                            set_effective_priority(state, &self.cfg, h, wanted);
                        }
                    }
                }
                let timeout = match mode {
                    WaitMode::Timeout(t) => Some((ChainKind::Tick, t)),
                    _ => None,
                };
                match self.block_and_dispatch(
                    lock,
                    cur,
                    WaitSource::Mutex(midx),
                    ThreadState::WAITING_FOR_MUTEX,
                    timeout,
                ) {
                    WaitOutcome::Satisfied => Ok(()),
                    WaitOutcome::Timeout => Err(LockFailure::Timeout),
                    WaitOutcome::Deleted => Err(LockFailure::Deleted),
                }
            }
        }
    }

    /// Acquire the mutex, blocking without limit if it is held.
    pub fn lock_mutex(&self, id: MutexId) -> Result<(), LockMutexError> {
        match self.lock_mutex_inner(id, WaitMode::Forever) {
            Ok(()) => Ok(()),
            Err(LockFailure::BadContext) => Err(LockMutexError::BadContext),
            Err(LockFailure::BadId) => Err(LockMutexError::BadId),
            Err(LockFailure::Deleted) => Err(LockMutexError::Deleted),
            Err(LockFailure::CeilingViolated) => Err(LockMutexError::CeilingViolated),
            Err(LockFailure::NestingNotAllowed) => Err(LockMutexError::NestingNotAllowed),
            Err(f) => unreachable!("untimed lock failed with {:?}", f),
        }
    }

    /// Acquire the mutex only if that is possible without blocking.
    pub fn try_lock_mutex(&self, id: MutexId) -> Result<(), TryLockMutexError> {
        match self.lock_mutex_inner(id, WaitMode::NonBlocking) {
            Ok(()) => Ok(()),
            Err(LockFailure::BadContext) => Err(TryLockMutexError::BadContext),
            Err(LockFailure::BadId) => Err(TryLockMutexError::BadId),
            Err(LockFailure::Unavailable) => Err(TryLockMutexError::Unavailable),
            Err(LockFailure::CeilingViolated) => Err(TryLockMutexError::CeilingViolated),
            Err(LockFailure::NestingNotAllowed) => Err(TryLockMutexError::NestingNotAllowed),
            Err(f) => unreachable!("non-blocking lock failed with {:?}", f),
        }
    }

    /// Acquire the mutex, giving up after `ticks` clock ticks.
    pub fn lock_mutex_timeout(
        &self,
        id: MutexId,
        ticks: Ticks,
    ) -> Result<(), LockMutexTimeoutError> {
        if ticks == 0 {
            return Err(LockMutexTimeoutError::BadParam);
        }
        match self.lock_mutex_inner(id, WaitMode::Timeout(ticks)) {
            Ok(()) => Ok(()),
            Err(LockFailure::BadContext) => Err(LockMutexTimeoutError::BadContext),
            Err(LockFailure::BadId) => Err(LockMutexTimeoutError::BadId),
            Err(LockFailure::Timeout) => Err(LockMutexTimeoutError::Timeout),
            Err(LockFailure::Deleted) => Err(LockMutexTimeoutError::Deleted),
            Err(LockFailure::CeilingViolated) => Err(LockMutexTimeoutError::CeilingViolated),
            Err(LockFailure::NestingNotAllowed) => Err(LockMutexTimeoutError::NestingNotAllowed),
            Err(f) => unreachable!("timed lock failed with {:?}", f),
        }
    }

    /// Release one level of ownership. The outermost release restores the
    /// caller's priority and hands the mutex to the next waiter.
    pub fn unlock_mutex(&self, id: MutexId) -> Result<(), UnlockMutexError> {
        let mut lock = self.lock();
        {
            let state = &mut *lock;
            let cur = self
                .executing_caller(state)
                .ok_or(UnlockMutexError::BadContext)?;
            if state.mutexes.get(id.0).is_none() {
                return Err(UnlockMutexError::BadId);
            }
            let midx = id.0.index();
            let m = mutex_mut(state, midx);
            if m.holder != Some(cur) {
                return Err(UnlockMutexError::NotOwner);
            }
            m.nest_count -= 1;
            if m.nest_count == 0 {
                force_release(state, &self.cfg, midx, cur);
            }
        }
        self.unlock_and_check_dispatch(lock);
        Ok(())
    }

    /// Destroy a mutex. Fails if another thread holds it; a caller-held
    /// mutex is released first. All waiters are flushed with a deletion
    /// outcome.
    pub fn destroy_mutex(&self, id: MutexId) -> Result<(), DestroyMutexError> {
        let mut lock = self.lock();
        {
            let state = &mut *lock;
            let m = state.mutexes.get(id.0).ok_or(DestroyMutexError::BadId)?;
            let holder = m.holder;
            let midx = id.0.index();
            if let Some(h) = holder {
                if self.executing_caller(state) != Some(h) {
                    return Err(DestroyMutexError::InUse);
                }
            }
            loop {
                let w = {
                    let state = &mut *state;
                    let m = state
                        .mutexes
                        .get_at_mut(midx)
                        .expect("operation references a dead mutex slot");
                    m.queue.dequeue(&mut state.threads)
                };
                let Some(w) = w else { break };
                unblock(state, &self.cfg, w, WaitOutcome::Deleted);
            }
            debug_assert!(mutex(state, midx).queue.is_empty());
            if let Some(h) = holder {
                unlink_held(state, h, midx);
                thread_cb_mut(state, h).resource_count -= 1;
                {
                    let m = mutex_mut(state, midx);
                    m.holder = None;
                    m.nest_count = 0;
                }
                let eff = effective_priority(state, h);
                set_effective_priority(state, &self.cfg, h, eff);
            }
            state.mutexes.free(id.0);
            debug!("destroyed mutex {:?}", id);
        }
        self.unlock_and_check_dispatch(lock);
        Ok(())
    }

    /// The current holder, if any.
    pub fn mutex_holder(&self, id: MutexId) -> Result<Option<ThreadId>, QueryMutexError> {
        let lock = self.lock();
        let m = lock.mutexes.get(id.0).ok_or(QueryMutexError::BadId)?;
        Ok(m.holder
            .and_then(|h| lock.threads.id_at(h))
            .map(ThreadId))
    }

    /// The number of threads blocked on the mutex.
    pub fn mutex_waiter_count(&self, id: MutexId) -> Result<usize, QueryMutexError> {
        let lock = self.lock();
        let m = lock.mutexes.get(id.0).ok_or(QueryMutexError::BadId)?;
        Ok(m.queue.len(&lock.threads))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        sched::SimpleScheduler, test_utils::LoopbackPort, thread::ThreadStart, Config,
    };

    fn nop(_: usize) {}

    fn start(priority: Priority) -> ThreadStart {
        ThreadStart {
            entry: nop,
            param: 0,
            stack_size: 4096,
            priority,
            preemptible: true,
        }
    }

    fn kernel() -> Kernel<LoopbackPort, SimpleScheduler> {
        let cfg = Config::default();
        Kernel::new(
            LoopbackPort::new(),
            SimpleScheduler::new(cfg.max_threads),
            cfg,
        )
    }

    fn spawn(k: &Kernel<LoopbackPort, SimpleScheduler>, priority: Priority) -> ThreadId {
        let t = k.create_thread(start(priority)).unwrap();
        k.start_thread(t).unwrap();
        t
    }

    #[test]
    fn recursion_and_ownership() {
        let k = kernel();
        let a = spawn(&k, 5);
        let m = k.create_mutex(MutexAttributes::default()).unwrap();

        k.lock_mutex(m).unwrap();
        k.lock_mutex(m).unwrap();
        k.unlock_mutex(m).unwrap();
        // Still held until the outermost unlock
        assert_eq!(k.mutex_holder(m), Ok(Some(a)));
        k.unlock_mutex(m).unwrap();
        assert_eq!(k.mutex_holder(m), Ok(None));
        assert_eq!(k.unlock_mutex(m), Err(UnlockMutexError::NotOwner));
    }

    #[test]
    fn non_recursive_rejects_nesting() {
        let k = kernel();
        spawn(&k, 5);
        let m = k
            .create_mutex(MutexAttributes {
                recursive: false,
                ..MutexAttributes::default()
            })
            .unwrap();
        k.lock_mutex(m).unwrap();
        assert_eq!(k.lock_mutex(m), Err(LockMutexError::NestingNotAllowed));
        assert_eq!(
            k.try_lock_mutex(m),
            Err(TryLockMutexError::NestingNotAllowed)
        );
    }

    #[test]
    fn try_lock_reports_contention() {
        let k = kernel();
        let holder = spawn(&k, 2);
        let m = k.create_mutex(MutexAttributes::default()).unwrap();
        k.lock_mutex(m).unwrap();

        // A second thread finds the mutex taken
        let other = spawn(&k, 1);
        assert_eq!(k.current_thread(), Some(other));
        assert_eq!(k.try_lock_mutex(m), Err(TryLockMutexError::Unavailable));
        assert_eq!(k.mutex_holder(m), Ok(Some(holder)));
    }

    #[test]
    fn ceiling_boosts_and_validates() {
        let k = kernel();
        let a = spawn(&k, 5);
        let m = k
            .create_mutex(MutexAttributes {
                protocol: MutexProtocol::Ceiling(3),
                ..MutexAttributes::default()
            })
            .unwrap();

        k.lock_mutex(m).unwrap();
        assert_eq!(k.priority(a), Ok(3));
        assert_eq!(k.base_priority(a), Ok(5));
        k.unlock_mutex(m).unwrap();
        assert_eq!(k.priority(a), Ok(5));

        // A thread more important than the ceiling may not acquire
        let b = spawn(&k, 1);
        assert_eq!(k.current_thread(), Some(b));
        assert_eq!(k.lock_mutex(m), Err(LockMutexError::CeilingViolated));
    }

    #[test]
    fn ceiling_must_be_admissible_and_priority_ordered() {
        let k = kernel();
        assert_eq!(
            k.create_mutex(MutexAttributes {
                protocol: MutexProtocol::Inherit,
                order: QueueOrder::Fifo,
                ..MutexAttributes::default()
            }),
            Err(CreateMutexError::BadParam)
        );
    }

    #[test]
    fn initially_locked_needs_a_thread_context() {
        let k = kernel();
        assert_eq!(
            k.create_mutex(MutexAttributes {
                initially_locked: true,
                ..MutexAttributes::default()
            }),
            Err(CreateMutexError::BadContext)
        );

        let a = spawn(&k, 5);
        let m = k
            .create_mutex(MutexAttributes {
                initially_locked: true,
                ..MutexAttributes::default()
            })
            .unwrap();
        assert_eq!(k.mutex_holder(m), Ok(Some(a)));
    }

    /// The classic inversion scenario: a low-priority holder inherits
    /// from each more important waiter in turn, release hands off to the
    /// most important waiter, and the holder's priority reverts.
    #[test]
    fn inheritance_tracks_most_important_waiter() {
        let k = kernel();
        let low = spawn(&k, 10);
        let m = k
            .create_mutex(MutexAttributes {
                protocol: MutexProtocol::Inherit,
                ..MutexAttributes::default()
            })
            .unwrap();
        k.lock_mutex(m).unwrap();

        let mid = spawn(&k, 5);
        assert_eq!(k.current_thread(), Some(mid));
        // The loopback port returns from the blocking call immediately
        // (with a result the blocked thread will never see); the kernel
        // still records mid as a waiter and boosts the holder
        let _ = k.lock_mutex(m);
        assert_eq!(k.priority(low), Ok(5));
        assert_eq!(k.current_thread(), Some(low));

        let high = spawn(&k, 1);
        assert_eq!(k.current_thread(), Some(high));
        let _ = k.lock_mutex(m);
        assert_eq!(k.priority(low), Ok(1));
        assert_eq!(k.mutex_waiter_count(m), Ok(2));
        assert_eq!(k.current_thread(), Some(low));

        // Release: hand-off to high (most important waiter), low reverts
        k.unlock_mutex(m).unwrap();
        assert_eq!(k.mutex_holder(m), Ok(Some(high)));
        assert_eq!(k.priority(low), Ok(10));
        assert_eq!(k.current_thread(), Some(high));

        // high releases in turn: hand-off to mid
        k.unlock_mutex(m).unwrap();
        assert_eq!(k.mutex_holder(m), Ok(Some(mid)));
        assert_eq!(k.mutex_waiter_count(m), Ok(0));
    }

    #[test]
    fn inheritance_reverts_to_remaining_waiters_on_timeout() {
        let k = kernel();
        let low = spawn(&k, 10);
        let m = k
            .create_mutex(MutexAttributes {
                protocol: MutexProtocol::Inherit,
                ..MutexAttributes::default()
            })
            .unwrap();
        k.lock_mutex(m).unwrap();

        let mid = spawn(&k, 5);
        let _ = k.lock_mutex(m);
        let high = spawn(&k, 1);
        let _ = k.lock_mutex_timeout(m, 2);
        assert_eq!(k.priority(low), Ok(1));

        // high's timed wait expires; the boost falls back to mid's
        k.tick();
        k.tick();
        assert_eq!(k.mutex_waiter_count(m), Ok(1));
        assert_eq!(k.priority(low), Ok(5));
        assert_eq!(k.mutex_holder(m), Ok(Some(low)));
        // The timed-out waiter is runnable again and outranks the holder
        assert_eq!(k.current_thread(), Some(high));
        let _ = mid;
    }

    #[test]
    fn destroy_flushes_waiters() {
        let k = kernel();
        let low = spawn(&k, 10);
        let m = k.create_mutex(MutexAttributes::default()).unwrap();
        k.lock_mutex(m).unwrap();

        let w = spawn(&k, 5);
        let _ = k.lock_mutex(m);
        assert_eq!(k.mutex_waiter_count(m), Ok(1));
        assert_eq!(k.current_thread(), Some(low));

        k.destroy_mutex(m).unwrap();
        // The flushed waiter is runnable again and outranks the holder
        assert_eq!(k.current_thread(), Some(w));
        assert_eq!(k.mutex_holder(m), Err(QueryMutexError::BadId));
        assert_eq!(k.lock_mutex(m), Err(LockMutexError::BadId));
        assert_eq!(k.priority(low), Ok(10));
    }

    #[test]
    fn destroy_by_stranger_is_in_use() {
        let k = kernel();
        spawn(&k, 5);
        let m = k.create_mutex(MutexAttributes::default()).unwrap();
        k.lock_mutex(m).unwrap();

        let _other = spawn(&k, 1);
        assert_eq!(k.destroy_mutex(m), Err(DestroyMutexError::InUse));
    }

    #[test]
    fn held_chain_restores_the_strongest_remaining_boost() {
        // Two ceiling mutexes held at once: releasing the stricter one
        // falls back to the other's ceiling, not to the base priority
        let k = kernel();
        let a = spawn(&k, 9);
        let m1 = k
            .create_mutex(MutexAttributes {
                protocol: MutexProtocol::Ceiling(6),
                ..MutexAttributes::default()
            })
            .unwrap();
        let m2 = k
            .create_mutex(MutexAttributes {
                protocol: MutexProtocol::Ceiling(2),
                ..MutexAttributes::default()
            })
            .unwrap();

        k.lock_mutex(m1).unwrap();
        assert_eq!(k.priority(a), Ok(6));
        k.lock_mutex(m2).unwrap();
        assert_eq!(k.priority(a), Ok(2));

        k.unlock_mutex(m2).unwrap();
        assert_eq!(k.priority(a), Ok(6));
        k.unlock_mutex(m1).unwrap();
        assert_eq!(k.priority(a), Ok(9));
    }
}
