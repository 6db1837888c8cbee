//! The constant-bandwidth-server policy: EDF plus per-server budget
//! enforcement.
//!
//! A server is an administrative object `{budget, period}`; attaching a
//! thread to it bounds the thread's CPU consumption to `budget` ticks per
//! `period`. The served thread is scheduled by the server's deadline.
//! When consumption reaches the budget before the deadline, the deadline
//! is postponed by one period and the budget replenished, which demotes
//! the thread behind more urgent work instead of letting it starve the
//! system; a registered overrun handler is reported to the kernel, which
//! invokes it once the kernel lock is released.
use arrayvec::ArrayVec;

use alloc::vec::Vec;
use core::fmt;

use crate::{
    error::{AttachServerError, CreateServerError, ServerError},
    port::Port,
    sched::{
        edf::{EdfConfig, EdfScheduler},
        OverrunEvent, SchedulerPolicy,
    },
    thread::update_heir,
    Kernel, Priority, ThreadId, Ticks,
};

/// Capacity of the server table.
pub const MAX_SERVERS: usize = 16;

/// Handle of a bandwidth server.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServerId(pub(crate) usize);

impl fmt::Debug for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ServerId({})", self.0)
    }
}

/// A budget-overrun callout. Must be O(1) and must not call back into the
/// kernel; it runs outside the kernel lock.
pub type OverrunHandler = fn(ServerId);

struct CbsServer {
    budget: Ticks,
    period: Ticks,
    thread: Option<usize>,
    /// Absolute deadline of the current period; meaningful while a
    /// thread is attached.
    deadline: Ticks,
    /// Budget consumed in the current period.
    consumed: Ticks,
    /// Total execution time charged to this server since creation.
    total_consumed: Ticks,
    handler: Option<OverrunHandler>,
}

pub struct CbsScheduler {
    edf: EdfScheduler,
    servers: ArrayVec<Option<CbsServer>, MAX_SERVERS>,
    /// Server slot per thread slot, for the charge path.
    bound: Vec<Option<usize>>,
}

impl CbsScheduler {
    pub fn new(cfg: EdfConfig, max_threads: usize) -> Self {
        let mut servers = ArrayVec::new();
        for _ in 0..MAX_SERVERS {
            servers.push(None);
        }
        let mut bound = Vec::with_capacity(max_threads);
        bound.resize_with(max_threads, || None);
        Self {
            edf: EdfScheduler::new(cfg, max_threads),
            servers,
            bound,
        }
    }

    pub fn boundary(&self) -> Priority {
        self.edf.boundary()
    }

    fn server(&self, id: ServerId) -> Result<&CbsServer, ServerError> {
        self.servers
            .get(id.0)
            .and_then(|s| s.as_ref())
            .ok_or(ServerError::NoServer)
    }

    fn server_mut(&mut self, id: ServerId) -> Result<&mut CbsServer, ServerError> {
        self.servers
            .get_mut(id.0)
            .and_then(|s| s.as_mut())
            .ok_or(ServerError::NoServer)
    }

    pub(crate) fn create_server(
        &mut self,
        budget: Ticks,
        period: Ticks,
        handler: Option<OverrunHandler>,
    ) -> Result<ServerId, CreateServerError> {
        // Validate before touching the table: a failed call leaves the
        // occupancy unchanged
        if budget == 0
            || period == 0
            || budget >= self.edf.boundary()
            || period >= self.edf.boundary()
        {
            return Err(CreateServerError::InvalidParameter);
        }
        let slot = self
            .servers
            .iter()
            .position(|s| s.is_none())
            .ok_or(CreateServerError::Full)?;
        self.servers[slot] = Some(CbsServer {
            budget,
            period,
            thread: None,
            deadline: 0,
            consumed: 0,
            total_consumed: 0,
            handler,
        });
        Ok(ServerId(slot))
    }

    pub(crate) fn destroy_server(&mut self, id: ServerId) -> Result<(), ServerError> {
        self.detach_thread(id)?;
        self.servers[id.0] = None;
        Ok(())
    }

    pub(crate) fn attach_thread(
        &mut self,
        id: ServerId,
        thread: usize,
        now: Ticks,
    ) -> Result<(), AttachServerError> {
        let server = self.server(id).map_err(|_| AttachServerError::NoServer)?;
        if server.thread.is_some() || self.bound[thread].is_some() {
            return Err(AttachServerError::BadObjectState);
        }
        // Deadlines must stay inside the deadline region of the key space
        let deadline = now.saturating_add(server.period).min(self.boundary() - 1);
        {
            let server = self.servers[id.0].as_mut().unwrap();
            server.thread = Some(thread);
            server.deadline = deadline;
            server.consumed = 0;
        }
        self.bound[thread] = Some(id.0);
        self.edf.set_deadline(thread, deadline);
        Ok(())
    }

    pub(crate) fn detach_thread(&mut self, id: ServerId) -> Result<(), ServerError> {
        let thread = self.server_mut(id)?.thread.take();
        if let Some(t) = thread {
            self.bound[t] = None;
            self.edf.clear_deadline(t);
        }
        Ok(())
    }

    pub(crate) fn execution_time(&self, id: ServerId) -> Result<Ticks, ServerError> {
        Ok(self.server(id)?.total_consumed)
    }

    pub(crate) fn remaining_budget(&self, id: ServerId) -> Result<Ticks, ServerError> {
        let server = self.server(id)?;
        Ok(server.budget - server.consumed)
    }
}

impl SchedulerPolicy for CbsScheduler {
    fn attach(&mut self, thread: usize, priority: Priority) {
        self.edf.attach(thread, priority);
    }

    fn detach(&mut self, thread: usize) {
        if let Some(slot) = self.bound[thread].take() {
            if let Some(server) = self.servers[slot].as_mut() {
                server.thread = None;
            }
        }
        self.edf.detach(thread);
    }

    fn admits(&self, priority: Priority) -> bool {
        self.edf.admits(priority)
    }

    fn insert_ready(&mut self, thread: usize, priority: Priority, prepend: bool) {
        self.edf.insert_ready(thread, priority, prepend);
    }

    fn extract(&mut self, thread: usize) {
        self.edf.extract(thread);
    }

    fn peek(&self) -> Option<(usize, Priority)> {
        self.edf.peek()
    }

    fn change_priority(&mut self, thread: usize, priority: Priority, prepend: bool) {
        self.edf.change_priority(thread, priority, prepend);
    }

    fn yield_thread(&mut self, thread: usize) {
        self.edf.yield_thread(thread);
    }

    fn charge_tick(&mut self, executing: Option<usize>, _now: Ticks) -> Option<OverrunEvent> {
        let thread = executing?;
        let slot = self.bound[thread]?;
        let boundary = self.boundary();
        let (deadline, handler) = {
            let server = self.servers[slot].as_mut()?;
            server.consumed += 1;
            server.total_consumed += 1;
            if server.consumed < server.budget {
                return None;
            }
            // Budget exhausted: postpone the deadline one period and
            // replenish, demoting the thread behind more urgent work.
            // The postponement pins at the top of the deadline region
            // rather than escaping it
            server.consumed = 0;
            server.deadline = server.deadline.saturating_add(server.period).min(boundary - 1);
            (server.deadline, server.handler)
        };
        self.edf.set_deadline(thread, deadline);
        handler.map(|handler| OverrunEvent {
            server: ServerId(slot),
            handler,
        })
    }

    fn note_unblock(&mut self, thread: usize, now: Ticks) {
        let Some(slot) = self.bound[thread] else { return };
        let boundary = self.boundary();
        let Some(server) = self.servers[slot].as_mut() else { return };
        // The wakeup rule: if the leftover budget cannot be consumed at
        // the server's bandwidth before the current deadline, start a
        // fresh period instead of letting the stale deadline overcommit.
        // The cross products are widened; they can reach twice the width
        // of the deadline region
        let remaining = server.budget - server.consumed;
        let recharge = server.deadline <= now
            || (remaining as u128) * (server.period as u128)
                > ((server.deadline - now) as u128) * (server.budget as u128);
        if recharge {
            let deadline = now.saturating_add(server.period).min(boundary - 1);
            server.deadline = deadline;
            server.consumed = 0;
            self.edf.set_deadline(thread, deadline);
        }
    }
}

impl<P: Port> Kernel<P, CbsScheduler> {
    /// Create a bandwidth server enforcing `budget` ticks of execution
    /// per `period`. Both must be nonzero and below the deadline-region
    /// boundary of the priority space.
    pub fn create_server(
        &self,
        budget: Ticks,
        period: Ticks,
        handler: Option<OverrunHandler>,
    ) -> Result<ServerId, CreateServerError> {
        let mut lock = self.lock();
        let id = lock.scheduler.create_server(budget, period, handler)?;
        log::debug!("created server {:?} ({}/{})", id, budget, period);
        Ok(id)
    }

    /// Destroy a server, detaching its thread first if one is attached.
    pub fn destroy_server(&self, id: ServerId) -> Result<(), ServerError> {
        let mut lock = self.lock();
        let state = &mut *lock;
        state.scheduler.destroy_server(id)?;
        update_heir(state, &self.cfg, false);
        self.unlock_and_check_dispatch(lock);
        Ok(())
    }

    /// Put `thread` under the server's bandwidth control, starting a
    /// fresh period now.
    pub fn attach_server(&self, id: ServerId, thread: ThreadId) -> Result<(), AttachServerError> {
        let mut lock = self.lock();
        let state = &mut *lock;
        if state.threads.get(thread.0).is_none() {
            return Err(AttachServerError::BadId);
        }
        let now = state.clock.elapsed;
        state.scheduler.attach_thread(id, thread.0.index(), now)?;
        update_heir(state, &self.cfg, false);
        self.unlock_and_check_dispatch(lock);
        Ok(())
    }

    /// Release the server's thread from bandwidth control, returning it
    /// to fixed-priority ordering.
    pub fn detach_server(&self, id: ServerId) -> Result<(), ServerError> {
        let mut lock = self.lock();
        let state = &mut *lock;
        state.scheduler.detach_thread(id)?;
        update_heir(state, &self.cfg, false);
        self.unlock_and_check_dispatch(lock);
        Ok(())
    }

    /// Total execution time charged to the server since creation.
    pub fn server_execution_time(&self, id: ServerId) -> Result<Ticks, ServerError> {
        self.lock().scheduler.execution_time(id)
    }

    /// Budget left in the server's current period.
    pub fn server_remaining_budget(&self, id: ServerId) -> Result<Ticks, ServerError> {
        self.lock().scheduler.remaining_budget(id)
    }
}
