//! Watchdog timers: the delta-chain timeout mechanism underlying every
//! blocking timeout and time-based wait.
//!
//! A [`WatchdogChain`] is an ordered list of nodes where each node stores
//! the delay *relative to its predecessor*; the head's delta is the true
//! remaining tick count. Advancing time touches only the head, and
//! insertion/removal repair the relative deltas locally, so the invariant
//! "sum of deltas from the head through node K equals K's remaining
//! delay" holds after any operation sequence.
//!
//! [`Clock`] owns two chains — one advanced every tick, one advanced once
//! per elapsed second — plus the node arena. Expired nodes are popped one
//! at a time and their actions dispatched by the caller, so an action
//! handler may re-arm a timer on the same chain without reentrancy
//! hazards.
use log::trace;

use crate::{
    klock::KLockGuard,
    port::Port,
    sched::SchedulerPolicy,
    thread::{handle_timer_action, update_heir},
    utils::arena::{Arena, Exhausted, Id},
    Kernel, KernelState, Ticks,
};

/// What to do when a watchdog fires. Dispatched under the kernel lock.
#[derive(Debug, Clone, Copy)]
pub(crate) enum TimerAction {
    /// Resolve the given thread's in-progress timed wait.
    ThreadTimeout(usize),
}

/// Which chain a node is armed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChainKind {
    Tick,
    Second,
}

#[derive(Debug)]
pub(crate) struct WatchdogNode {
    /// Delay relative to the predecessor node while active.
    pub delta: Ticks,
    pub active: bool,
    pub kind: ChainKind,
    pub action: TimerAction,
    prev: Option<usize>,
    next: Option<usize>,
}

impl WatchdogNode {
    pub fn new(action: TimerAction) -> Self {
        Self {
            delta: 0,
            active: false,
            kind: ChainKind::Tick,
            action,
            prev: None,
            next: None,
        }
    }
}

/// An ordered delta chain. See the module documentation.
#[derive(Debug)]
pub(crate) struct WatchdogChain {
    head: Option<usize>,
}

impl WatchdogChain {
    pub const fn new() -> Self {
        Self { head: None }
    }

    /// Arm `idx` to fire after `delta` ticks. A degenerate delay of zero
    /// is clamped to the minimum of one tick.
    pub fn insert(&mut self, nodes: &mut Arena<WatchdogNode>, idx: usize, delta: Ticks) {
        let mut remaining = delta.max(1);
        assert!(!node(nodes, idx).active, "double insert of an active watchdog");

        // Walk until the insertion point, converting the absolute delay
        // into a delta relative to the predecessor
        let mut pred = None;
        let mut cur = self.head;
        while let Some(c) = cur {
            let d = node(nodes, c).delta;
            if d > remaining {
                break;
            }
            remaining -= d;
            pred = cur;
            cur = node(nodes, c).next;
        }

        {
            let n = node_mut(nodes, idx);
            n.delta = remaining;
            n.active = true;
            n.prev = pred;
            n.next = cur;
        }
        match pred {
            Some(p) => node_mut(nodes, p).next = Some(idx),
            None => self.head = Some(idx),
        }
        if let Some(succ) = cur {
            let s = node_mut(nodes, succ);
            s.prev = Some(idx);
            // The successor's delta is now relative to the new node
            s.delta -= remaining;
        }
    }

    /// Disarm `idx`. Returns whether it was still active, letting callers
    /// distinguish "canceled in time" from "already fired".
    pub fn remove(&mut self, nodes: &mut Arena<WatchdogNode>, idx: usize) -> bool {
        if !node(nodes, idx).active {
            return false;
        }
        let (prev, next, delta) = {
            let n = node_mut(nodes, idx);
            n.active = false;
            (n.prev.take(), n.next.take(), n.delta)
        };
        match prev {
            Some(p) => node_mut(nodes, p).next = next,
            None => self.head = next,
        }
        if let Some(s) = next {
            let s = node_mut(nodes, s);
            s.prev = prev;
            // The removed node's share of the delay flows to its successor
            s.delta += delta;
        }
        true
    }

    /// Advance the chain by one tick.
    pub fn tickle(&mut self, nodes: &mut Arena<WatchdogNode>) {
        if let Some(h) = self.head {
            let n = node_mut(nodes, h);
            n.delta = n.delta.saturating_sub(1);
        }
    }

    /// Pop the head if it has expired. Callers loop over this, dispatching
    /// each action before popping the next, so an action that re-inserts a
    /// node observes a consistent chain.
    pub fn pop_expired(&mut self, nodes: &mut Arena<WatchdogNode>) -> Option<TimerAction> {
        let h = self.head?;
        if node(nodes, h).delta != 0 {
            return None;
        }
        self.remove(nodes, h);
        Some(node(nodes, h).action)
    }

    /// Delay every node by `units`, for a backward time step.
    pub fn adjust_backward(&mut self, nodes: &mut Arena<WatchdogNode>, units: Ticks) {
        if let Some(h) = self.head {
            node_mut(nodes, h).delta += units;
        }
    }

    /// Consume up to `units` ticks, stopping when the head expires.
    /// Returns the unconsumed remainder (zero when the chain is empty);
    /// the caller drains expired nodes with [`pop_expired`](Self::pop_expired)
    /// and calls again until the remainder is zero.
    pub fn adjust_forward(&mut self, nodes: &mut Arena<WatchdogNode>, units: Ticks) -> Ticks {
        let Some(h) = self.head else { return 0 };
        let n = node_mut(nodes, h);
        if n.delta >= units {
            n.delta -= units;
            0
        } else {
            let rest = units - n.delta;
            n.delta = 0;
            rest
        }
    }
}

fn node(nodes: &Arena<WatchdogNode>, idx: usize) -> &WatchdogNode {
    nodes.get_at(idx).expect("watchdog chain references a dead node")
}

fn node_mut(nodes: &mut Arena<WatchdogNode>, idx: usize) -> &mut WatchdogNode {
    nodes
        .get_at_mut(idx)
        .expect("watchdog chain references a dead node")
}

/// The kernel's time source: the node arena, the tick and second chains,
/// and the tick counters.
#[derive(Debug)]
pub(crate) struct Clock {
    pub nodes: Arena<WatchdogNode>,
    pub ticks: WatchdogChain,
    pub seconds: WatchdogChain,
    ticks_per_second: Ticks,
    tick_of_second: Ticks,
    pub elapsed: Ticks,
}

impl Clock {
    pub fn new(capacity: usize, ticks_per_second: Ticks) -> Self {
        assert!(ticks_per_second > 0);
        Self {
            nodes: Arena::with_capacity(capacity),
            ticks: WatchdogChain::new(),
            seconds: WatchdogChain::new(),
            ticks_per_second,
            tick_of_second: 0,
            elapsed: 0,
        }
    }

    pub fn create_timer(&mut self, action: TimerAction) -> Result<Id, Exhausted> {
        self.nodes.alloc(WatchdogNode::new(action))
    }

    pub fn destroy_timer(&mut self, id: Id) {
        self.cancel(id);
        self.nodes.free(id);
    }

    /// Arm a timer, disarming it first if it was already active.
    pub fn arm(&mut self, id: Id, kind: ChainKind, delta: Ticks) {
        self.cancel(id);
        let Some(n) = self.nodes.get_mut(id) else { return };
        n.kind = kind;
        let idx = id.index();
        match kind {
            ChainKind::Tick => self.ticks.insert(&mut self.nodes, idx, delta),
            ChainKind::Second => self.seconds.insert(&mut self.nodes, idx, delta),
        }
    }

    /// Disarm a timer. Returns whether it was active.
    pub fn cancel(&mut self, id: Id) -> bool {
        let Some(n) = self.nodes.get(id) else { return false };
        let kind = n.kind;
        let idx = id.index();
        match kind {
            ChainKind::Tick => self.ticks.remove(&mut self.nodes, idx),
            ChainKind::Second => self.seconds.remove(&mut self.nodes, idx),
        }
    }

    /// Advance by one tick. Returns whether a full second elapsed, in
    /// which case the second chain was tickled as well.
    pub fn advance(&mut self) -> bool {
        self.elapsed += 1;
        self.ticks.tickle(&mut self.nodes);
        self.tick_of_second += 1;
        if self.tick_of_second == self.ticks_per_second {
            self.tick_of_second = 0;
            self.seconds.tickle(&mut self.nodes);
            true
        } else {
            false
        }
    }
}

impl<P: Port, S: SchedulerPolicy> Kernel<P, S> {
    /// Announce one elapsed clock tick. The interrupt-context entry point
    /// of the time subsystem: never blocks and never parks the caller.
    ///
    /// Fires due timers, charges the executing thread's bandwidth server
    /// if the scheduling policy has one, and requests a dispatch if any of
    /// that changed the most eligible thread. A bandwidth-overrun callout,
    /// if one became due, is invoked after the kernel lock is released.
    pub fn tick(&self) {
        let mut lock = self.lock();
        let rolled = lock.clock.advance();
        self.drain_expired(&mut lock, ChainKind::Tick);
        if rolled {
            self.drain_expired(&mut lock, ChainKind::Second);
        }
        let overrun = {
            let state = &mut *lock;
            let ev = state
                .scheduler
                .charge_tick(state.executing, state.clock.elapsed);
            // Budget exhaustion may have postponed the executing thread's
            // deadline behind another ready thread's
            update_heir(state, &self.cfg, false);
            ev
        };
        self.unlock_and_check_dispatch(lock);
        if let Some(ev) = overrun {
            trace!("bandwidth overrun on {:?}", ev.server);
            (ev.handler)(ev.server);
        }
    }

    /// Ticks elapsed since the kernel was constructed.
    pub fn elapsed_ticks(&self) -> Ticks {
        self.lock().clock.elapsed
    }

    /// Step the time-of-day backward by `seconds`: every second-chain
    /// timer fires that much later.
    pub fn adjust_time_backward(&self, seconds: Ticks) {
        let mut lock = self.lock();
        let clock = &mut lock.clock;
        clock.seconds.adjust_backward(&mut clock.nodes, seconds);
    }

    /// Step the time-of-day forward by `seconds`, firing every
    /// second-chain timer whose delay is consumed by the step.
    pub fn adjust_time_forward(&self, seconds: Ticks) {
        let mut lock = self.lock();
        let mut units = seconds;
        while units > 0 {
            let remainder = {
                let clock = &mut lock.clock;
                clock.seconds.adjust_forward(&mut clock.nodes, units)
            };
            self.drain_expired(&mut lock, ChainKind::Second);
            if remainder == units {
                // Nothing left on the chain to consume the step
                break;
            }
            units = remainder;
        }
        self.unlock_and_check_dispatch(lock);
    }

    fn drain_expired(&self, lock: &mut KLockGuard<'_, P, KernelState<S>>, kind: ChainKind) {
        loop {
            let state = &mut *lock;
            let clock = &mut state.clock;
            let expired = match kind {
                ChainKind::Tick => clock.ticks.pop_expired(&mut clock.nodes),
                ChainKind::Second => clock.seconds.pop_expired(&mut clock.nodes),
            };
            let Some(action) = expired else { break };
            handle_timer_action(state, &self.cfg, action);
        }
    }
}
