//! Kernel state locking mechanism.
//!
//! All mutable executive state lives behind a single [`KLock`]. Entering it
//! masks interrupts through the port and then takes a spinlock; the
//! returned guard restores both on every exit path, so no code path can
//! leave the system with interrupts disabled or the lock held.
//!
//! The lock is held only for bounded spans: no operation allocates memory,
//! runs user callouts, or performs a context switch while holding it.
//! Context switches and bandwidth-overrun callouts happen strictly after
//! the guard is dropped.
use core::{mem::ManuallyDrop, ops};

use crate::port::{InterruptToken, Port};

pub(crate) struct KLock<T> {
    mutex: spin::Mutex<T>,
}

impl<T> KLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            mutex: spin::Mutex::new(value),
        }
    }

    /// Enter the kernel critical section.
    ///
    /// Interrupts are masked before the spinlock is taken, so an interrupt
    /// handler on the same processor can never spin against its own
    /// thread-level critical section.
    pub fn lock<'a, P: Port>(&'a self, port: &'a P) -> KLockGuard<'a, P, T> {
        let token = port.disable_interrupts();
        let guard = self.mutex.lock();
        KLockGuard {
            guard: ManuallyDrop::new(guard),
            port,
            token,
        }
    }
}

/// RAII guard for the kernel critical section.
pub(crate) struct KLockGuard<'a, P: Port, T> {
    guard: ManuallyDrop<spin::MutexGuard<'a, T>>,
    port: &'a P,
    token: InterruptToken,
}

impl<P: Port, T> Drop for KLockGuard<'_, P, T> {
    fn drop(&mut self) {
        // The spinlock must be released before interrupts are unmasked; an
        // interrupt taken in between must not find the lock held.
        // Safety: `guard` is never touched again after this point.
        unsafe { ManuallyDrop::drop(&mut self.guard) };
        self.port.restore_interrupts(self.token);
    }
}

impl<P: Port, T> ops::Deref for KLockGuard<'_, P, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl<P: Port, T> ops::DerefMut for KLockGuard<'_, P, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}
