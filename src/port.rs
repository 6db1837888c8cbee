//! The interface between the executive core and the machine.
//!
//! The core never touches registers, stacks, or interrupt controllers; it
//! reaches them through a [`Port`] implementation supplied at construction.
//! A port for a hosted environment (each kernel thread backed by an OS
//! thread parked on a run token) lives in the integration tests; a
//! bare-metal port would implement the same contract over real context
//! frames and interrupt masking.
use crate::{thread::ThreadStart, ThreadId};

/// Opaque interrupt state captured by [`Port::disable_interrupts`] and
/// consumed by [`Port::restore_interrupts`].
pub type InterruptToken = usize;

/// Machine services consumed by the executive.
pub trait Port {
    /// Mask interrupts on the current processor, returning the previous
    /// state. Nestable: each call is paired with one `restore_interrupts`.
    fn disable_interrupts(&self) -> InterruptToken;

    /// Restore the interrupt state captured by the matching
    /// [`disable_interrupts`](Self::disable_interrupts) call.
    fn restore_interrupts(&self, token: InterruptToken);

    /// The identity of the calling context: the kernel thread hosting the
    /// caller, or `None` for interrupt or startup context.
    ///
    /// The dispatcher uses this to decide whether it may park the caller:
    /// only the displaced thread itself gives up the processor. A
    /// scheduling decision made from interrupt context while a thread is
    /// executing stays pending until that thread next enters the kernel,
    /// or until the port's interrupt-exit path invokes a kernel entry
    /// point on its behalf.
    fn caller(&self) -> Option<ThreadId>;

    /// Prepare an execution context for a thread that is about to leave
    /// the dormant state. When the thread is first dispatched it begins
    /// executing `start.entry` with `start.param`.
    ///
    /// Entry functions do not return; they must end with
    /// [`Kernel::exit_thread`](crate::Kernel::exit_thread).
    fn initialize_context(&self, thread: ThreadId, start: &ThreadStart);

    /// Switch the processor from `prev` to `next`.
    ///
    /// - `next` of `Some(t)` makes `t` the running context; `None` idles
    ///   the processor until the next dispatch.
    /// - `prev` of `Some(t)` means the caller is `t` giving up the
    ///   processor: the call returns when `t` is dispatched again, which
    ///   may be never if `t` went dormant. `prev` of `None` means the call
    ///   was made from interrupt or startup context and returns
    ///   immediately after making `next` runnable.
    ///
    /// Called with the kernel lock released.
    fn switch_context(&self, prev: Option<ThreadId>, next: Option<ThreadId>);
}
