//! Thread control, the dispatch core, and the thread lifecycle
//! operations.
//!
//! A thread's schedulability is a composite of independent state bits:
//! the empty set means ready-or-executing, and every bit is a distinct
//! reason the thread cannot be scheduled. Blocking sets a waiting bit,
//! suspension sets its own bit orthogonally, and a thread becomes
//! runnable again only when the last bit clears.
//!
//! Dispatching is deferred: operations that change who should run record
//! the decision (`heir` plus the `dispatch_necessary` flag) under the
//! kernel lock, and the actual context switch happens when the lock is
//! released with the dispatch-disable count at zero. Only the displaced
//! thread itself may park; a pending dispatch noticed from any other
//! context stays pending until the displaced thread next enters the
//! kernel.
use core::convert::Infallible;

use bitflags::bitflags;
use log::{debug, trace};

use crate::{
    error::{
        CreateThreadError, DestroyThreadError, ExitThreadError, QueryThreadError,
        ResumeThreadError, SetAffinityError, SetPriorityError, SleepError, StartThreadError,
        SuspendThreadError, YieldError,
    },
    port::Port,
    sched::SchedulerPolicy,
    utils::arena::Id,
    wait::{WaitOutcome, WaitRecord, WaitSource},
    watchdog::{ChainKind, TimerAction},
    Config, Guard, Kernel, KernelState, Priority, ThreadId, Ticks,
};

bitflags! {
    /// The composite thread state. Empty means ready or executing; each
    /// bit is an independent reason the thread is not schedulable.
    pub struct ThreadState: u32 {
        /// Created but not started, or exited.
        const DORMANT = 1 << 0;
        /// Explicitly suspended. Orthogonal to the waiting bits: a
        /// suspended thread's wait can resolve without making it ready.
        const SUSPENDED = 1 << 1;
        const WAITING_FOR_TIME = 1 << 2;
        const WAITING_FOR_MUTEX = 1 << 3;
        const WAITING_FOR_SEMAPHORE = 1 << 4;

        const WAITING_MASK = Self::WAITING_FOR_TIME.bits
            | Self::WAITING_FOR_MUTEX.bits
            | Self::WAITING_FOR_SEMAPHORE.bits;
    }
}

/// The startup parameters of a thread, retained so a dormant thread can
/// be restarted from a pristine state.
#[derive(Debug, Clone, Copy)]
pub struct ThreadStart {
    /// The entry function. It must finish by calling
    /// [`Kernel::exit_thread`]; returning is a port-contract violation.
    pub entry: fn(usize),
    /// Passed verbatim to `entry`.
    pub param: usize,
    pub stack_size: usize,
    pub priority: Priority,
    pub preemptible: bool,
}

/// The thread control block.
pub(crate) struct ThreadCb {
    pub state: ThreadState,
    /// The priority assigned by the application.
    pub base_priority: Priority,
    /// The priority the scheduler sees: the base, possibly raised through
    /// held-mutex inheritance or ceilings.
    pub priority: Priority,
    /// Number of mutexes held.
    pub resource_count: u32,
    pub preemptible: bool,
    /// Processor affinity mask. Validated against the configured
    /// processor count; with one processor it is always `0b1`.
    pub affinity: u32,
    pub start: ThreadStart,
    pub wait: WaitRecord,
    /// The thread's dedicated timeout watchdog, allocated at creation.
    pub timer: Option<Id>,
    /// Head of the held-mutex chain, linked through each mutex's
    /// `next_held` field. Most recently acquired first.
    pub held_mutexes: Option<usize>,
}

impl ThreadCb {
    pub fn new(start: ThreadStart) -> Self {
        Self {
            state: ThreadState::DORMANT,
            base_priority: start.priority,
            priority: start.priority,
            resource_count: 0,
            preemptible: start.preemptible,
            affinity: 1,
            start,
            wait: WaitRecord::new(),
            timer: None,
            held_mutexes: None,
        }
    }
}

pub(crate) fn thread_cb<S>(state: &KernelState<S>, idx: usize) -> &ThreadCb {
    state
        .threads
        .get_at(idx)
        .expect("operation references a dead thread slot")
}

pub(crate) fn thread_cb_mut<S>(state: &mut KernelState<S>, idx: usize) -> &mut ThreadCb {
    state
        .threads
        .get_at_mut(idx)
        .expect("operation references a dead thread slot")
}

/// Recompute the heir from the ready structure and flag a dispatch if the
/// most eligible thread is not the executing one.
///
/// `force` bypasses the preemptibility check; it is used when the
/// executing thread is leaving the processor voluntarily (blocking,
/// exiting, being suspended) and *someone* must be picked regardless.
pub(crate) fn update_heir<S: SchedulerPolicy>(
    state: &mut KernelState<S>,
    cfg: &Config,
    force: bool,
) {
    let candidate = state.scheduler.peek();
    let cand = candidate.map(|(t, _)| t);
    if !force {
        if cand == state.executing {
            return;
        }
        if let Some(exec) = state.executing {
            if !thread_cb(state, exec).preemptible {
                // A non-preemptible thread is displaced only by the
                // pseudo-interrupt priority range
                match candidate {
                    Some((_, key)) if key <= cfg.pseudo_isr_priority => {}
                    _ => return,
                }
            }
        }
    }
    if state.heir != cand {
        trace!("heir is now thread slot {:?}", cand);
        state.heir = cand;
    }
    if cand != state.executing {
        state.dispatch_necessary = true;
    }
}

/// Resolve a thread's wait. Clears the wait record, disarms the timeout,
/// and makes the thread ready again unless another state bit (suspension)
/// still holds it.
pub(crate) fn unblock<S: SchedulerPolicy>(
    state: &mut KernelState<S>,
    cfg: &Config,
    idx: usize,
    outcome: WaitOutcome,
) {
    let timer = {
        let t = thread_cb_mut(state, idx);
        t.wait.source = None;
        t.wait.outcome = Some(outcome);
        t.state.remove(ThreadState::WAITING_MASK);
        t.timer
    };
    if let Some(timer) = timer {
        state.clock.cancel(timer);
    }
    let (runnable, priority) = {
        let t = thread_cb(state, idx);
        (t.state.is_empty(), t.priority)
    };
    if runnable {
        let now = state.clock.elapsed;
        state.scheduler.note_unblock(idx, now);
        state.scheduler.insert_ready(idx, priority, false);
        update_heir(state, cfg, false);
    }
}

/// Dispatch a fired watchdog's action. Runs under the kernel lock, from
/// the tick or time-adjustment paths.
pub(crate) fn handle_timer_action<S: SchedulerPolicy>(
    state: &mut KernelState<S>,
    cfg: &Config,
    action: TimerAction,
) {
    match action {
        TimerAction::ThreadTimeout(idx) => {
            let source = thread_cb(state, idx).wait.source;
            match source {
                // The wait already resolved; the cancel lost the race to
                // the tick only inside this drain pass
                None => {}
                Some(WaitSource::Sleep) => {
                    unblock(state, cfg, idx, WaitOutcome::Satisfied);
                }
                Some(WaitSource::Mutex(m)) => {
                    if let Some(mutex) = state.mutexes.get_at_mut(m) {
                        mutex.queue.extract(&mut state.threads, idx);
                    }
                    unblock(state, cfg, idx, WaitOutcome::Timeout);
                    // The departed waiter may have been the holder's
                    // inheritance source
                    crate::mutex::reevaluate_holder(state, cfg, m);
                }
                Some(WaitSource::Semaphore(s)) => {
                    if let Some(sem) = state.semaphores.get_at_mut(s) {
                        sem.queue.extract(&mut state.threads, idx);
                    }
                    unblock(state, cfg, idx, WaitOutcome::Timeout);
                }
            }
        }
    }
}

/// Apply a new effective priority to a thread, repositioning it wherever
/// its rank matters: the ready structure if it is runnable, or the wait
/// queue it is blocked on.
pub(crate) fn set_effective_priority<S: SchedulerPolicy>(
    state: &mut KernelState<S>,
    cfg: &Config,
    idx: usize,
    new: Priority,
) {
    let (old, runnable, queued_source) = {
        let t = thread_cb(state, idx);
        let source = if t.wait.queued { t.wait.source } else { None };
        (t.priority, t.state.is_empty(), source)
    };
    if old == new {
        return;
    }
    thread_cb_mut(state, idx).priority = new;
    if runnable {
        state.scheduler.change_priority(idx, new, false);
        update_heir(state, cfg, false);
    } else if let Some(source) = queued_source {
        match source {
            WaitSource::Mutex(m) => {
                if let Some(mutex) = state.mutexes.get_at_mut(m) {
                    mutex.queue.reposition(&mut state.threads, idx);
                }
            }
            WaitSource::Semaphore(s) => {
                if let Some(sem) = state.semaphores.get_at_mut(s) {
                    sem.queue.reposition(&mut state.threads, idx);
                }
            }
            WaitSource::Sleep => {}
        }
    }
}

impl<P: Port, S: SchedulerPolicy> Kernel<P, S> {
    /// The executing thread's slot index, if the port attributes the
    /// calling context to it. Interrupt context and threads that are not
    /// the executing one get `None`, which the blocking operations treat
    /// as a context error.
    pub(crate) fn executing_caller(&self, state: &KernelState<S>) -> Option<usize> {
        let id = self.port.caller()?;
        let idx = state.executing?;
        if state.threads.id_at(idx) == Some(id.0) {
            Some(idx)
        } else {
            None
        }
    }

    /// Release the kernel lock and perform any recorded dispatch.
    ///
    /// The switch is taken only when the caller is the thread being
    /// displaced (or no thread is, for a decision made from interrupt
    /// context while the processor idles). Otherwise the
    /// dispatch-necessary flag stays set and the displaced thread picks
    /// it up on its next kernel entry.
    pub(crate) fn unlock_and_check_dispatch(&self, mut lock: Guard<'_, P, S>) {
        let caller = self.port.caller();
        let mut switch = None;
        {
            let state = &mut *lock;
            if state.dispatch_disable == 0 && state.dispatch_necessary {
                let prev = state.executing;
                let next = state.heir;
                if prev == next {
                    state.dispatch_necessary = false;
                } else {
                    let prev_id = prev.and_then(|i| state.threads.id_at(i)).map(ThreadId);
                    let may_switch = match prev_id {
                        None => true,
                        Some(p) => caller == Some(p),
                    };
                    if may_switch {
                        state.dispatch_necessary = false;
                        state.executing = next;
                        let next_id = next.and_then(|i| state.threads.id_at(i)).map(ThreadId);
                        trace!("dispatch {:?} -> {:?}", prev_id, next_id);
                        switch = Some((prev_id, next_id));
                    }
                }
            }
        }
        drop(lock);
        if let Some((prev, next)) = switch {
            self.port.switch_context(prev, next);
        }
    }

    /// Commit the executing thread to a wait and give up the processor.
    /// Returns once the wait has resolved, with the outcome recorded by
    /// the resolving party.
    ///
    /// The caller has already linked the thread into the object's wait
    /// queue (if any) under the same lock it passes in, so the
    /// block-versus-release race has exactly one winner.
    pub(crate) fn block_and_dispatch(
        &self,
        mut lock: Guard<'_, P, S>,
        cur: usize,
        source: WaitSource,
        bits: ThreadState,
        timeout: Option<(ChainKind, Ticks)>,
    ) -> WaitOutcome {
        {
            let state = &mut *lock;
            let timer = {
                let t = thread_cb_mut(state, cur);
                t.state.insert(bits);
                t.wait.source = Some(source);
                t.wait.outcome = None;
                t.timer
            };
            state.scheduler.extract(cur);
            if let Some((kind, delta)) = timeout {
                let timer = timer.expect("thread has no timeout watchdog");
                state.clock.arm(timer, kind, delta);
            }
            update_heir(state, &self.cfg, true);
        }
        self.unlock_and_check_dispatch(lock);

        // Executing again: the wait resolved while we were parked
        let mut lock = self.lock();
        thread_cb_mut(&mut lock, cur)
            .wait
            .outcome
            .take()
            .unwrap_or(WaitOutcome::Satisfied)
    }

    fn all_processors(&self) -> u32 {
        if self.cfg.processors >= 32 {
            u32::MAX
        } else {
            (1u32 << self.cfg.processors) - 1
        }
    }

    /// Create a thread in the dormant state.
    pub fn create_thread(&self, start: ThreadStart) -> Result<ThreadId, CreateThreadError> {
        let mut lock = self.lock();
        let state = &mut *lock;
        if !state.scheduler.admits(start.priority) || start.stack_size == 0 {
            return Err(CreateThreadError::BadParam);
        }
        let id = state
            .threads
            .alloc(ThreadCb::new(start))
            .map_err(|_| CreateThreadError::TooMany)?;
        let idx = id.index();
        match state.clock.create_timer(TimerAction::ThreadTimeout(idx)) {
            Ok(timer) => thread_cb_mut(state, idx).timer = Some(timer),
            Err(_) => {
                state.threads.free(id);
                return Err(CreateThreadError::TooMany);
            }
        }
        thread_cb_mut(state, idx).affinity = self.all_processors();
        state.scheduler.attach(idx, start.priority);
        debug!("created thread {:?} at priority {}", id, start.priority);
        Ok(ThreadId(id))
    }

    /// Start a dormant thread: reset it to its startup parameters and
    /// make it ready.
    pub fn start_thread(&self, thread: ThreadId) -> Result<(), StartThreadError> {
        let mut lock = self.lock();
        {
            let state = &mut *lock;
            let t = state
                .threads
                .get_mut(thread.0)
                .ok_or(StartThreadError::BadId)?;
            if !t.state.contains(ThreadState::DORMANT) {
                return Err(StartThreadError::BadObjectState);
            }
            let start = t.start;
            t.state = ThreadState::empty();
            t.base_priority = start.priority;
            t.priority = start.priority;
            t.preemptible = start.preemptible;
            t.resource_count = 0;
            t.held_mutexes = None;
            t.wait = WaitRecord::new();
            self.port.initialize_context(thread, &start);
            let idx = thread.0.index();
            state.scheduler.insert_ready(idx, start.priority, false);
            update_heir(state, &self.cfg, false);
        }
        self.unlock_and_check_dispatch(lock);
        Ok(())
    }

    /// Terminate the calling thread. Held mutexes are released with
    /// direct hand-off to their next waiters; the thread returns to the
    /// dormant state and can be restarted or destroyed.
    pub fn exit_thread(&self) -> Result<Infallible, ExitThreadError> {
        let mut lock = self.lock();
        {
            let state = &mut *lock;
            let cur = self
                .executing_caller(state)
                .ok_or(ExitThreadError::BadContext)?;
            while let Some(m) = thread_cb(state, cur).held_mutexes {
                crate::mutex::force_release(state, &self.cfg, m, cur);
            }
            state.scheduler.extract(cur);
            {
                let t = thread_cb_mut(state, cur);
                t.state = ThreadState::DORMANT;
                t.wait = WaitRecord::new();
            }
            debug!("thread slot {} exited", cur);
            update_heir(state, &self.cfg, true);
        }
        self.unlock_and_check_dispatch(lock);
        panic!("a dormant thread was scheduled");
    }

    /// Destroy a dormant thread, releasing its slot and watchdog.
    pub fn destroy_thread(&self, thread: ThreadId) -> Result<(), DestroyThreadError> {
        let mut lock = self.lock();
        let state = &mut *lock;
        let t = state
            .threads
            .get(thread.0)
            .ok_or(DestroyThreadError::BadId)?;
        if !t.state.contains(ThreadState::DORMANT) {
            return Err(DestroyThreadError::BadObjectState);
        }
        let timer = t.timer;
        let idx = thread.0.index();
        state.scheduler.detach(idx);
        if let Some(timer) = timer {
            state.clock.destroy_timer(timer);
        }
        state.threads.free(thread.0);
        Ok(())
    }

    /// Suspend a thread. Suspension composes with waiting: a blocked
    /// thread can be suspended, and its wait resolving will not make it
    /// ready until it is resumed.
    pub fn suspend_thread(&self, thread: ThreadId) -> Result<(), SuspendThreadError> {
        let mut lock = self.lock();
        {
            let state = &mut *lock;
            let t = state
                .threads
                .get_mut(thread.0)
                .ok_or(SuspendThreadError::BadId)?;
            if t.state
                .intersects(ThreadState::DORMANT | ThreadState::SUSPENDED)
            {
                return Err(SuspendThreadError::BadObjectState);
            }
            let was_runnable = t.state.is_empty();
            t.state.insert(ThreadState::SUSPENDED);
            if was_runnable {
                let idx = thread.0.index();
                state.scheduler.extract(idx);
                let force = state.executing == Some(idx);
                update_heir(state, &self.cfg, force);
            }
        }
        self.unlock_and_check_dispatch(lock);
        Ok(())
    }

    /// Undo a suspension.
    pub fn resume_thread(&self, thread: ThreadId) -> Result<(), ResumeThreadError> {
        let mut lock = self.lock();
        {
            let state = &mut *lock;
            let t = state
                .threads
                .get_mut(thread.0)
                .ok_or(ResumeThreadError::BadId)?;
            if !t.state.contains(ThreadState::SUSPENDED) {
                return Err(ResumeThreadError::BadObjectState);
            }
            t.state.remove(ThreadState::SUSPENDED);
            if t.state.is_empty() {
                let priority = t.priority;
                let idx = thread.0.index();
                state.scheduler.insert_ready(idx, priority, false);
                update_heir(state, &self.cfg, false);
            }
        }
        self.unlock_and_check_dispatch(lock);
        Ok(())
    }

    /// Block the calling thread for `ticks` clock ticks.
    pub fn sleep(&self, ticks: Ticks) -> Result<(), SleepError> {
        self.sleep_inner(ticks, ChainKind::Tick)
    }

    /// Block the calling thread for `seconds` whole seconds, tracked on
    /// the second chain and therefore subject to time-of-day adjustment.
    pub fn sleep_seconds(&self, seconds: Ticks) -> Result<(), SleepError> {
        self.sleep_inner(seconds, ChainKind::Second)
    }

    fn sleep_inner(&self, delay: Ticks, kind: ChainKind) -> Result<(), SleepError> {
        if delay == 0 {
            return Err(SleepError::BadParam);
        }
        let lock = self.lock();
        let cur = self
            .executing_caller(&lock)
            .ok_or(SleepError::BadContext)?;
        let outcome = self.block_and_dispatch(
            lock,
            cur,
            WaitSource::Sleep,
            ThreadState::WAITING_FOR_TIME,
            Some((kind, delay)),
        );
        debug_assert_eq!(outcome, WaitOutcome::Satisfied);
        Ok(())
    }

    /// Move the calling thread behind its eligibility equals.
    pub fn yield_now(&self) -> Result<(), YieldError> {
        let mut lock = self.lock();
        {
            let state = &mut *lock;
            let cur = self
                .executing_caller(state)
                .ok_or(YieldError::BadContext)?;
            state.scheduler.yield_thread(cur);
            update_heir(state, &self.cfg, false);
        }
        self.unlock_and_check_dispatch(lock);
        Ok(())
    }

    /// Change a thread's base priority. The effective priority follows
    /// unless held-mutex ceilings or inheritance keep it raised.
    pub fn set_priority(
        &self,
        thread: ThreadId,
        priority: Priority,
    ) -> Result<(), SetPriorityError> {
        let mut lock = self.lock();
        {
            let state = &mut *lock;
            if !state.scheduler.admits(priority) {
                return Err(SetPriorityError::BadParam);
            }
            if state.threads.get(thread.0).is_none() {
                return Err(SetPriorityError::BadId);
            }
            let idx = thread.0.index();
            thread_cb_mut(state, idx).base_priority = priority;
            let eff = crate::mutex::effective_priority(state, idx);
            set_effective_priority(state, &self.cfg, idx, eff);
            // Re-ranking a blocked waiter can change what the holder
            // inherits
            if let Some(WaitSource::Mutex(m)) = thread_cb(state, idx).wait.source {
                crate::mutex::reevaluate_holder(state, &self.cfg, m);
            }
        }
        self.unlock_and_check_dispatch(lock);
        Ok(())
    }

    /// The thread's current (possibly inherited) priority.
    pub fn priority(&self, thread: ThreadId) -> Result<Priority, QueryThreadError> {
        let lock = self.lock();
        lock.threads
            .get(thread.0)
            .map(|t| t.priority)
            .ok_or(QueryThreadError::BadId)
    }

    /// The thread's base priority, ignoring inheritance and ceilings.
    pub fn base_priority(&self, thread: ThreadId) -> Result<Priority, QueryThreadError> {
        let lock = self.lock();
        lock.threads
            .get(thread.0)
            .map(|t| t.base_priority)
            .ok_or(QueryThreadError::BadId)
    }

    pub fn set_preemptible(
        &self,
        thread: ThreadId,
        preemptible: bool,
    ) -> Result<(), QueryThreadError> {
        let mut lock = self.lock();
        {
            let state = &mut *lock;
            let t = state
                .threads
                .get_mut(thread.0)
                .ok_or(QueryThreadError::BadId)?;
            t.preemptible = preemptible;
            update_heir(state, &self.cfg, false);
        }
        self.unlock_and_check_dispatch(lock);
        Ok(())
    }

    /// Set a thread's processor affinity. The mask must be a non-empty
    /// subset of the configured processors.
    pub fn set_affinity(&self, thread: ThreadId, affinity: u32) -> Result<(), SetAffinityError> {
        let all = self.all_processors();
        if affinity == 0 || affinity & !all != 0 {
            return Err(SetAffinityError::InvalidNumber);
        }
        let mut lock = self.lock();
        let t = lock
            .threads
            .get_mut(thread.0)
            .ok_or(SetAffinityError::BadId)?;
        t.affinity = affinity;
        Ok(())
    }

    pub fn affinity(&self, thread: ThreadId) -> Result<u32, QueryThreadError> {
        let lock = self.lock();
        lock.threads
            .get(thread.0)
            .map(|t| t.affinity)
            .ok_or(QueryThreadError::BadId)
    }

    /// The executing thread, if any.
    pub fn current_thread(&self) -> Option<ThreadId> {
        let lock = self.lock();
        lock.executing
            .and_then(|i| lock.threads.id_at(i))
            .map(ThreadId)
    }

    /// Raise the dispatch-disable count. While it is non-zero, decisions
    /// about who should run are recorded but no context switch happens.
    pub fn disable_dispatch(&self) {
        self.lock().dispatch_disable += 1;
    }

    /// Lower the dispatch-disable count, performing any dispatch that
    /// became pending while it was raised.
    pub fn enable_dispatch(&self) {
        let mut lock = self.lock();
        debug_assert!(lock.dispatch_disable > 0, "unbalanced enable_dispatch");
        lock.dispatch_disable = lock.dispatch_disable.saturating_sub(1);
        self.unlock_and_check_dispatch(lock);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        sched::{BitmapScheduler, SimpleScheduler},
        test_utils::LoopbackPort,
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

    #[test]
    fn start_dispatches_and_preemption_follows_priority() {
        let k = kernel();
        let a = k.create_thread(start(5)).unwrap();
        assert_eq!(k.current_thread(), None);
        k.start_thread(a).unwrap();
        assert_eq!(k.current_thread(), Some(a));

        // A more important arrival preempts
        let b = k.create_thread(start(3)).unwrap();
        k.start_thread(b).unwrap();
        assert_eq!(k.current_thread(), Some(b));

        // A less important one does not
        let c = k.create_thread(start(9)).unwrap();
        k.start_thread(c).unwrap();
        assert_eq!(k.current_thread(), Some(b));
    }

    #[test]
    fn lifecycle_errors() {
        let k = kernel();
        let a = k.create_thread(start(5)).unwrap();
        k.start_thread(a).unwrap();
        assert_eq!(
            k.start_thread(a),
            Err(StartThreadError::BadObjectState)
        );
        assert_eq!(
            k.destroy_thread(a),
            Err(DestroyThreadError::BadObjectState)
        );
    }

    #[test]
    fn zero_stack_is_rejected() {
        let k = kernel();
        let mut s = start(5);
        s.stack_size = 0;
        assert_eq!(k.create_thread(s), Err(CreateThreadError::BadParam));
    }

    #[test]
    fn thread_table_exhaustion() {
        let mut cfg = Config::default();
        cfg.max_threads = 2;
        let k = Kernel::new(LoopbackPort::new(), SimpleScheduler::new(2), cfg);
        k.create_thread(start(1)).unwrap();
        let b = k.create_thread(start(2)).unwrap();
        assert_eq!(k.create_thread(start(3)), Err(CreateThreadError::TooMany));
        // Destroying a dormant thread frees its slot for reuse
        k.destroy_thread(b).unwrap();
        k.create_thread(start(4)).unwrap();
    }

    #[test]
    fn suspend_resume_round_trip() {
        let k = kernel();
        let a = k.create_thread(start(5)).unwrap();
        let b = k.create_thread(start(7)).unwrap();
        k.start_thread(a).unwrap();
        k.start_thread(b).unwrap();
        assert_eq!(k.current_thread(), Some(a));

        k.suspend_thread(a).unwrap();
        assert_eq!(k.current_thread(), Some(b));
        assert_eq!(
            k.suspend_thread(a),
            Err(SuspendThreadError::BadObjectState)
        );

        k.resume_thread(a).unwrap();
        assert_eq!(k.current_thread(), Some(a));
        assert_eq!(k.resume_thread(a), Err(ResumeThreadError::BadObjectState));
    }

    #[test]
    fn sleep_wakes_after_its_delay() {
        let k = kernel();
        let a = k.create_thread(start(1)).unwrap();
        let b = k.create_thread(start(5)).unwrap();
        k.start_thread(a).unwrap();
        k.start_thread(b).unwrap();
        assert_eq!(k.current_thread(), Some(a));

        // The loopback port lets the sleep call return immediately; the
        // kernel's bookkeeping still blocks thread a for three ticks
        k.sleep(3).unwrap();
        assert_eq!(k.current_thread(), Some(b));
        k.tick();
        k.tick();
        assert_eq!(k.current_thread(), Some(b));
        k.tick();
        assert_eq!(k.current_thread(), Some(a));
        assert_eq!(k.elapsed_ticks(), 3);
    }

    #[test]
    fn sleep_of_zero_is_rejected() {
        let k = kernel();
        let a = k.create_thread(start(1)).unwrap();
        k.start_thread(a).unwrap();
        assert_eq!(k.sleep(0), Err(SleepError::BadParam));
    }

    #[test]
    fn yield_rotates_equals_only() {
        let k = kernel();
        let a = k.create_thread(start(4)).unwrap();
        let b = k.create_thread(start(4)).unwrap();
        let c = k.create_thread(start(8)).unwrap();
        k.start_thread(a).unwrap();
        k.start_thread(b).unwrap();
        k.start_thread(c).unwrap();
        assert_eq!(k.current_thread(), Some(a));

        k.yield_now().unwrap();
        assert_eq!(k.current_thread(), Some(b));
        k.yield_now().unwrap();
        assert_eq!(k.current_thread(), Some(a));
    }

    #[test]
    fn non_preemptible_defers_to_kernel_reentry() {
        let k = kernel();
        let mut s = start(5);
        s.preemptible = false;
        let a = k.create_thread(s).unwrap();
        k.start_thread(a).unwrap();
        let b = k.create_thread(start(1)).unwrap();
        k.start_thread(b).unwrap();
        // b outranks a but a is non-preemptible
        assert_eq!(k.current_thread(), Some(a));

        k.set_preemptible(a, true).unwrap();
        assert_eq!(k.current_thread(), Some(b));
    }

    #[test]
    fn dispatch_disable_defers_the_switch() {
        let k = kernel();
        let a = k.create_thread(start(5)).unwrap();
        k.start_thread(a).unwrap();
        k.disable_dispatch();
        let b = k.create_thread(start(1)).unwrap();
        k.start_thread(b).unwrap();
        assert_eq!(k.current_thread(), Some(a));
        k.enable_dispatch();
        assert_eq!(k.current_thread(), Some(b));
    }

    #[test]
    fn set_priority_repositions_and_admits() {
        let k = kernel();
        let a = k.create_thread(start(5)).unwrap();
        let b = k.create_thread(start(6)).unwrap();
        k.start_thread(a).unwrap();
        k.start_thread(b).unwrap();
        assert_eq!(k.current_thread(), Some(a));

        k.set_priority(b, 2).unwrap();
        assert_eq!(k.current_thread(), Some(b));
        assert_eq!(k.priority(b), Ok(2));
        assert_eq!(k.base_priority(b), Ok(2));

        // The bitmap policy bounds the admissible range
        let cfg = Config::default();
        let k = Kernel::new(
            LoopbackPort::new(),
            BitmapScheduler::new(16, cfg.max_threads),
            cfg,
        );
        let a = k.create_thread(start(5)).unwrap();
        assert_eq!(k.set_priority(a, 16), Err(SetPriorityError::BadParam));
        assert_eq!(
            k.create_thread(start(99)),
            Err(CreateThreadError::BadParam)
        );
    }

    #[test]
    fn affinity_must_name_configured_processors() {
        let k = kernel();
        let a = k.create_thread(start(5)).unwrap();
        assert_eq!(k.affinity(a), Ok(0b1));
        assert_eq!(k.set_affinity(a, 0), Err(SetAffinityError::InvalidNumber));
        assert_eq!(
            k.set_affinity(a, 0b10),
            Err(SetAffinityError::InvalidNumber)
        );
        k.set_affinity(a, 0b1).unwrap();
    }

    #[test]
    fn stale_thread_ids_are_rejected() {
        let k = kernel();
        let a = k.create_thread(start(5)).unwrap();
        k.destroy_thread(a).unwrap();
        // The slot may be reused; the old id's generation is stale
        let _b = k.create_thread(start(5)).unwrap();
        assert_eq!(k.start_thread(a), Err(StartThreadError::BadId));
        assert_eq!(k.priority(a), Err(QueryThreadError::BadId));
    }
}
