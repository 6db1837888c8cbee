//! The counting semaphore.
//!
//! A signal with waiters present hands the unit directly to the queue
//! head instead of incrementing the count, so the count and the queue are
//! never both non-empty and a release can never be stolen by a thread
//! that was not waiting.
use log::debug;

use crate::{
    error::{
        CreateSemaphoreError, PollSemaphoreError, QuerySemaphoreError, SignalSemaphoreError,
        WaitSemaphoreError, WaitSemaphoreTimeoutError,
    },
    port::Port,
    sched::SchedulerPolicy,
    thread::{unblock, ThreadState},
    wait::{QueueOrder, WaitMode, WaitOutcome, WaitQueue, WaitSource},
    watchdog::ChainKind,
    Kernel, SemaphoreId, Ticks,
};

pub(crate) struct SemaphoreCb {
    pub queue: WaitQueue,
    pub count: u32,
    pub max: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcquireFailure {
    BadContext,
    BadId,
    Unsatisfied,
    Timeout,
    Deleted,
}

impl<P: Port, S: SchedulerPolicy> Kernel<P, S> {
    /// Create a counting semaphore with the given initial count and
    /// ceiling.
    pub fn create_semaphore(
        &self,
        initial: u32,
        max: u32,
        order: QueueOrder,
    ) -> Result<SemaphoreId, CreateSemaphoreError> {
        if initial > max {
            return Err(CreateSemaphoreError::BadParam);
        }
        let mut lock = self.lock();
        let id = lock
            .semaphores
            .alloc(SemaphoreCb {
                queue: WaitQueue::new(order),
                count: initial,
                max,
            })
            .map_err(|_| CreateSemaphoreError::TooMany)?;
        debug!("created semaphore {:?} ({}/{})", id, initial, max);
        Ok(SemaphoreId(id))
    }

    fn acquire_inner(&self, id: SemaphoreId, mode: WaitMode) -> Result<(), AcquireFailure> {
        let mut lock = self.lock();
        if lock.semaphores.get(id.0).is_none() {
            return Err(AcquireFailure::BadId);
        }
        let sidx = id.0.index();
        {
            let s = lock
                .semaphores
                .get_at_mut(sidx)
                .expect("operation references a dead semaphore slot");
            if s.count > 0 {
                s.count -= 1;
                return Ok(());
            }
        }
        if mode == WaitMode::NonBlocking {
            return Err(AcquireFailure::Unsatisfied);
        }
        let cur = self
            .executing_caller(&lock)
            .ok_or(AcquireFailure::BadContext)?;
        {
            let state = &mut *lock;
            let s = state
                .semaphores
                .get_at_mut(sidx)
                .expect("operation references a dead semaphore slot");
            s.queue.enqueue(&mut state.threads, cur);
        }
        let timeout = match mode {
            WaitMode::Timeout(t) => Some((ChainKind::Tick, t)),
            _ => None,
        };
        match self.block_and_dispatch(
            lock,
            cur,
            WaitSource::Semaphore(sidx),
            ThreadState::WAITING_FOR_SEMAPHORE,
            timeout,
        ) {
            WaitOutcome::Satisfied => Ok(()),
            WaitOutcome::Timeout => Err(AcquireFailure::Timeout),
            WaitOutcome::Deleted => Err(AcquireFailure::Deleted),
        }
    }

    /// Take a unit only if one is immediately available. Unlike the
    /// blocking forms this needs no thread context.
    pub fn poll_semaphore(&self, id: SemaphoreId) -> Result<(), PollSemaphoreError> {
        match self.acquire_inner(id, WaitMode::NonBlocking) {
            Ok(()) => Ok(()),
            Err(AcquireFailure::BadId) => Err(PollSemaphoreError::BadId),
            Err(AcquireFailure::Unsatisfied) => Err(PollSemaphoreError::Unsatisfied),
            Err(f) => unreachable!("poll failed with {:?}", f),
        }
    }

    /// Take a unit, blocking without limit if none is available.
    pub fn wait_semaphore(&self, id: SemaphoreId) -> Result<(), WaitSemaphoreError> {
        match self.acquire_inner(id, WaitMode::Forever) {
            Ok(()) => Ok(()),
            Err(AcquireFailure::BadContext) => Err(WaitSemaphoreError::BadContext),
            Err(AcquireFailure::BadId) => Err(WaitSemaphoreError::BadId),
            Err(AcquireFailure::Deleted) => Err(WaitSemaphoreError::Deleted),
            Err(f) => unreachable!("untimed wait failed with {:?}", f),
        }
    }

    /// Take a unit, giving up after `ticks` clock ticks.
    pub fn wait_semaphore_timeout(
        &self,
        id: SemaphoreId,
        ticks: Ticks,
    ) -> Result<(), WaitSemaphoreTimeoutError> {
        if ticks == 0 {
            return Err(WaitSemaphoreTimeoutError::BadParam);
        }
        match self.acquire_inner(id, WaitMode::Timeout(ticks)) {
            Ok(()) => Ok(()),
            Err(AcquireFailure::BadContext) => Err(WaitSemaphoreTimeoutError::BadContext),
            Err(AcquireFailure::BadId) => Err(WaitSemaphoreTimeoutError::BadId),
            Err(AcquireFailure::Timeout) => Err(WaitSemaphoreTimeoutError::Timeout),
            Err(AcquireFailure::Deleted) => Err(WaitSemaphoreTimeoutError::Deleted),
            Err(f) => unreachable!("timed wait failed with {:?}", f),
        }
    }

    /// Release one unit: hand it to the queue head if anyone is waiting,
    /// otherwise increment the count. Callable from interrupt context.
    pub fn signal_semaphore(&self, id: SemaphoreId) -> Result<(), SignalSemaphoreError> {
        let mut lock = self.lock();
        {
            let state = &mut *lock;
            if state.semaphores.get(id.0).is_none() {
                return Err(SignalSemaphoreError::BadId);
            }
            let sidx = id.0.index();
            let waiter = {
                let state = &mut *state;
                let s = state
                    .semaphores
                    .get_at_mut(sidx)
                    .expect("operation references a dead semaphore slot");
                s.queue.dequeue(&mut state.threads)
            };
            match waiter {
                Some(w) => unblock(state, &self.cfg, w, WaitOutcome::Satisfied),
                None => {
                    let s = state
                        .semaphores
                        .get_at_mut(sidx)
                        .expect("operation references a dead semaphore slot");
                    if s.count == s.max {
                        return Err(SignalSemaphoreError::MaximumCountExceeded);
                    }
                    s.count += 1;
                }
            }
        }
        self.unlock_and_check_dispatch(lock);
        Ok(())
    }

    /// Release every waiter with a deletion outcome without destroying
    /// the semaphore.
    pub fn drain_semaphore(&self, id: SemaphoreId) -> Result<(), QuerySemaphoreError> {
        let mut lock = self.lock();
        {
            let state = &mut *lock;
            if state.semaphores.get(id.0).is_none() {
                return Err(QuerySemaphoreError::BadId);
            }
            self.flush_waiters(state, id.0.index());
        }
        self.unlock_and_check_dispatch(lock);
        Ok(())
    }

    /// Destroy a semaphore, flushing all waiters with a deletion outcome.
    pub fn destroy_semaphore(&self, id: SemaphoreId) -> Result<(), QuerySemaphoreError> {
        let mut lock = self.lock();
        {
            let state = &mut *lock;
            if state.semaphores.get(id.0).is_none() {
                return Err(QuerySemaphoreError::BadId);
            }
            self.flush_waiters(state, id.0.index());
            state.semaphores.free(id.0);
            debug!("destroyed semaphore {:?}", id);
        }
        self.unlock_and_check_dispatch(lock);
        Ok(())
    }

    fn flush_waiters(&self, state: &mut crate::KernelState<S>, sidx: usize) {
        loop {
            let w = {
                let state = &mut *state;
                let s = state
                    .semaphores
                    .get_at_mut(sidx)
                    .expect("operation references a dead semaphore slot");
                s.queue.dequeue(&mut state.threads)
            };
            let Some(w) = w else { break };
            unblock(state, &self.cfg, w, WaitOutcome::Deleted);
        }
        debug_assert!(state
            .semaphores
            .get_at(sidx)
            .expect("operation references a dead semaphore slot")
            .queue
            .is_empty());
    }

    /// The number of units currently available.
    pub fn semaphore_count(&self, id: SemaphoreId) -> Result<u32, QuerySemaphoreError> {
        let lock = self.lock();
        lock.semaphores
            .get(id.0)
            .map(|s| s.count)
            .ok_or(QuerySemaphoreError::BadId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        sched::SimpleScheduler, test_utils::LoopbackPort, thread::ThreadStart, Config, Priority,
        ThreadId,
    };
    use quickcheck_macros::quickcheck;

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
    fn poll_and_signal_track_the_count() {
        let k = kernel();
        let s = k.create_semaphore(2, 3, QueueOrder::Fifo).unwrap();
        assert_eq!(k.semaphore_count(s), Ok(2));

        k.poll_semaphore(s).unwrap();
        k.poll_semaphore(s).unwrap();
        assert_eq!(k.poll_semaphore(s), Err(PollSemaphoreError::Unsatisfied));

        k.signal_semaphore(s).unwrap();
        k.signal_semaphore(s).unwrap();
        k.signal_semaphore(s).unwrap();
        assert_eq!(
            k.signal_semaphore(s),
            Err(SignalSemaphoreError::MaximumCountExceeded)
        );
        assert_eq!(k.semaphore_count(s), Ok(3));
    }

    #[test]
    fn initial_count_must_fit_the_maximum() {
        let k = kernel();
        assert_eq!(
            k.create_semaphore(4, 3, QueueOrder::Fifo),
            Err(CreateSemaphoreError::BadParam)
        );
    }

    #[test]
    fn signal_hands_off_to_the_queue_head() {
        let k = kernel();
        let idle = spawn(&k, 50);
        let s = k.create_semaphore(0, 1, QueueOrder::Priority).unwrap();

        let a = spawn(&k, 5);
        // The loopback port returns from the blocking call immediately;
        // the kernel still records a as a waiter
        let _ = k.wait_semaphore(s);
        assert_eq!(k.current_thread(), Some(idle));

        // The unit goes to the waiter, not the count
        k.signal_semaphore(s).unwrap();
        assert_eq!(k.semaphore_count(s), Ok(0));
        assert_eq!(k.current_thread(), Some(a));
    }

    #[test]
    fn priority_queue_releases_most_important_first() {
        let k = kernel();
        let _idle = spawn(&k, 50);
        let s = k.create_semaphore(0, 1, QueueOrder::Priority).unwrap();

        let _a = spawn(&k, 7);
        let _ = k.wait_semaphore(s);
        let b = spawn(&k, 3);
        let _ = k.wait_semaphore(s);

        k.signal_semaphore(s).unwrap();
        assert_eq!(k.current_thread(), Some(b));
    }

    #[test]
    fn timed_wait_expires() {
        let k = kernel();
        let idle = spawn(&k, 50);
        let s = k.create_semaphore(0, 1, QueueOrder::Fifo).unwrap();

        let a = spawn(&k, 5);
        let _ = k.wait_semaphore_timeout(s, 2);
        assert_eq!(k.current_thread(), Some(idle));

        k.tick();
        k.tick();
        // a is runnable again with a timeout recorded
        assert_eq!(k.current_thread(), Some(a));
        assert_eq!(k.semaphore_count(s), Ok(0));

        assert_eq!(
            k.wait_semaphore_timeout(s, 0),
            Err(WaitSemaphoreTimeoutError::BadParam)
        );
    }

    #[test]
    fn destroy_flushes_waiters() {
        let k = kernel();
        let _idle = spawn(&k, 50);
        let s = k.create_semaphore(0, 1, QueueOrder::Fifo).unwrap();

        let a = spawn(&k, 5);
        let _ = k.wait_semaphore(s);
        k.destroy_semaphore(s).unwrap();
        assert_eq!(k.current_thread(), Some(a));
        assert_eq!(k.semaphore_count(s), Err(QuerySemaphoreError::BadId));
        assert_eq!(k.poll_semaphore(s), Err(PollSemaphoreError::BadId));
    }

    #[test]
    fn drain_keeps_the_semaphore_alive() {
        let k = kernel();
        let _idle = spawn(&k, 50);
        let s = k.create_semaphore(0, 2, QueueOrder::Fifo).unwrap();

        spawn(&k, 5);
        let _ = k.wait_semaphore(s);
        k.drain_semaphore(s).unwrap();
        k.signal_semaphore(s).unwrap();
        assert_eq!(k.semaphore_count(s), Ok(1));
    }

    /// The count never leaves `0..=max` and always matches a reference
    /// model under an arbitrary poll/signal sequence.
    #[quickcheck]
    fn count_matches_reference_model(ops: Vec<bool>, max: u8) {
        let k = kernel();
        let max = max as u32;
        let s = k.create_semaphore(0, max, QueueOrder::Fifo).unwrap();
        let mut reference: u32 = 0;

        for signal in ops {
            if signal {
                match k.signal_semaphore(s) {
                    Ok(()) => reference += 1,
                    Err(SignalSemaphoreError::MaximumCountExceeded) => {
                        assert_eq!(reference, max)
                    }
                    Err(e) => panic!("unexpected error {:?}", e),
                }
            } else {
                match k.poll_semaphore(s) {
                    Ok(()) => reference -= 1,
                    Err(PollSemaphoreError::Unsatisfied) => assert_eq!(reference, 0),
                    Err(e) => panic!("unexpected error {:?}", e),
                }
            }
            assert_eq!(k.semaphore_count(s), Ok(reference));
            assert!(reference <= max);
        }
    }
}
