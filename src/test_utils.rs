//! A degenerate in-process port for unit-testing kernel bookkeeping.
//!
//! [`LoopbackPort`] has no real execution contexts: `switch_context`
//! records who the kernel dispatched and returns immediately, so the one
//! host thread impersonates whichever kernel thread is "executing".
//! Blocking operations therefore return right away with an outcome the
//! impersonated thread would never have seen; tests discard it and assert
//! on the kernel's bookkeeping (queues, priorities, the dispatched
//! thread) instead.
//!
//! `exit_thread` cannot be exercised here, since the port would return
//! into the exit path's unreachable tail. The integration tests use a
//! port with real host threads for that.
use std::cell::Cell;

use crate::{
    port::{InterruptToken, Port},
    thread::ThreadStart,
    ThreadId,
};

pub(crate) struct LoopbackPort {
    current: Cell<Option<ThreadId>>,
}

impl LoopbackPort {
    pub fn new() -> Self {
        Self {
            current: Cell::new(None),
        }
    }
}

impl Port for LoopbackPort {
    fn disable_interrupts(&self) -> InterruptToken {
        0
    }

    fn restore_interrupts(&self, _token: InterruptToken) {}

    fn caller(&self) -> Option<ThreadId> {
        self.current.get()
    }

    fn initialize_context(&self, _thread: ThreadId, _start: &ThreadStart) {}

    fn switch_context(&self, _prev: Option<ThreadId>, next: Option<ThreadId>) {
        self.current.set(next);
    }
}
