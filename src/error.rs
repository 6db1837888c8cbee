//! Error types returned by the executive's operations.
//!
//! Every public operation has its own error enum listing exactly the
//! failures that operation can produce. [`ResultCode`] is the union of all
//! of them; personality layers that funnel heterogeneous outcomes into a
//! single status channel can convert any operation error into it with
//! `From`.
use core::fmt;

/// The union of every error kind produced by this crate.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum ResultCode {
    /// The operation is not allowed in the calling context (e.g. a
    /// blocking call from interrupt context).
    BadContext,
    /// The given object id does not name a live object.
    BadId,
    /// A parameter value is out of range.
    BadParam,
    /// The object is in a state that forbids the operation.
    BadObjectState,
    /// The object table for this class is exhausted.
    TooMany,
    /// A non-blocking mutex acquisition found the mutex locked.
    Unavailable,
    /// A non-blocking semaphore acquisition found no unit available.
    Unsatisfied,
    /// A timed wait expired before it was satisfied.
    Timeout,
    /// The object was destroyed while the caller waited on it.
    Deleted,
    /// The caller does not hold the mutex.
    NotOwner,
    /// The caller's priority is more important than the mutex ceiling.
    CeilingViolated,
    /// Recursive acquisition of a non-recursive mutex.
    NestingNotAllowed,
    /// The object is held or waited on and cannot be destroyed.
    InUse,
    /// An affinity set is empty or names an unconfigured processor.
    InvalidNumber,
    /// A bandwidth-server parameter is zero or outside the deadline
    /// region of the priority space.
    InvalidParameter,
    /// The bandwidth-server table is full.
    Full,
    /// The given server id does not name a live server.
    NoServer,
    /// Incrementing the semaphore count would exceed its maximum.
    MaximumCountExceeded,
}

macro_rules! define_error {
    (
        $( #[doc $( $doc:tt )*] )*
        pub enum $Name:ident {
            $( $Variant:ident, )*
        }
    ) => {
        $( #[doc $( $doc )*] )*
        #[derive(PartialEq, Eq, Copy, Clone)]
        pub enum $Name {
            $( $Variant, )*
        }

        impl From<$Name> for ResultCode {
            #[inline]
            fn from(x: $Name) -> Self {
                match x {
                    $( $Name::$Variant => Self::$Variant ),*
                }
            }
        }

        impl fmt::Debug for $Name {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                ResultCode::from(*self).fmt(f)
            }
        }
    };
}

define_error! {
    /// Error type for [`Kernel::create_thread`](crate::Kernel::create_thread).
    pub enum CreateThreadError {
        BadParam,
        TooMany,
    }
}

define_error! {
    /// Error type for [`Kernel::start_thread`](crate::Kernel::start_thread).
    pub enum StartThreadError {
        BadId,
        BadObjectState,
    }
}

define_error! {
    /// Error type for [`Kernel::exit_thread`](crate::Kernel::exit_thread).
    pub enum ExitThreadError {
        BadContext,
    }
}

define_error! {
    /// Error type for [`Kernel::destroy_thread`](crate::Kernel::destroy_thread).
    pub enum DestroyThreadError {
        BadId,
        BadObjectState,
    }
}

define_error! {
    /// Error type for [`Kernel::suspend_thread`](crate::Kernel::suspend_thread).
    pub enum SuspendThreadError {
        BadId,
        BadObjectState,
    }
}

define_error! {
    /// Error type for [`Kernel::resume_thread`](crate::Kernel::resume_thread).
    pub enum ResumeThreadError {
        BadId,
        BadObjectState,
    }
}

define_error! {
    /// Error type for [`Kernel::sleep`](crate::Kernel::sleep) and
    /// [`Kernel::sleep_seconds`](crate::Kernel::sleep_seconds).
    pub enum SleepError {
        BadContext,
        BadParam,
    }
}

define_error! {
    /// Error type for [`Kernel::yield_now`](crate::Kernel::yield_now).
    pub enum YieldError {
        BadContext,
    }
}

define_error! {
    /// Error type for [`Kernel::set_priority`](crate::Kernel::set_priority).
    pub enum SetPriorityError {
        BadId,
        BadParam,
    }
}

define_error! {
    /// Error type for the read-only thread queries and
    /// [`Kernel::set_preemptible`](crate::Kernel::set_preemptible).
    pub enum QueryThreadError {
        BadId,
    }
}

define_error! {
    /// Error type for [`Kernel::set_affinity`](crate::Kernel::set_affinity).
    pub enum SetAffinityError {
        BadId,
        InvalidNumber,
    }
}

define_error! {
    /// Error type for [`Kernel::create_mutex`](crate::Kernel::create_mutex).
    pub enum CreateMutexError {
        BadContext,
        BadParam,
        CeilingViolated,
        TooMany,
    }
}

define_error! {
    /// Error type for [`Kernel::lock_mutex`](crate::Kernel::lock_mutex).
    pub enum LockMutexError {
        BadContext,
        BadId,
        Deleted,
        CeilingViolated,
        NestingNotAllowed,
    }
}

define_error! {
    /// Error type for [`Kernel::try_lock_mutex`](crate::Kernel::try_lock_mutex).
    pub enum TryLockMutexError {
        BadContext,
        BadId,
        Unavailable,
        CeilingViolated,
        NestingNotAllowed,
    }
}

define_error! {
    /// Error type for
    /// [`Kernel::lock_mutex_timeout`](crate::Kernel::lock_mutex_timeout).
    pub enum LockMutexTimeoutError {
        BadContext,
        BadId,
        BadParam,
        Timeout,
        Deleted,
        CeilingViolated,
        NestingNotAllowed,
    }
}

define_error! {
    /// Error type for [`Kernel::unlock_mutex`](crate::Kernel::unlock_mutex).
    pub enum UnlockMutexError {
        BadContext,
        BadId,
        NotOwner,
    }
}

define_error! {
    /// Error type for [`Kernel::destroy_mutex`](crate::Kernel::destroy_mutex).
    pub enum DestroyMutexError {
        BadId,
        InUse,
    }
}

define_error! {
    /// Error type for the read-only mutex queries.
    pub enum QueryMutexError {
        BadId,
    }
}

define_error! {
    /// Error type for
    /// [`Kernel::create_semaphore`](crate::Kernel::create_semaphore).
    pub enum CreateSemaphoreError {
        BadParam,
        TooMany,
    }
}

define_error! {
    /// Error type for
    /// [`Kernel::poll_semaphore`](crate::Kernel::poll_semaphore).
    pub enum PollSemaphoreError {
        BadId,
        Unsatisfied,
    }
}

define_error! {
    /// Error type for
    /// [`Kernel::wait_semaphore`](crate::Kernel::wait_semaphore).
    pub enum WaitSemaphoreError {
        BadContext,
        BadId,
        Deleted,
    }
}

define_error! {
    /// Error type for
    /// [`Kernel::wait_semaphore_timeout`](crate::Kernel::wait_semaphore_timeout).
    pub enum WaitSemaphoreTimeoutError {
        BadContext,
        BadId,
        BadParam,
        Timeout,
        Deleted,
    }
}

define_error! {
    /// Error type for
    /// [`Kernel::signal_semaphore`](crate::Kernel::signal_semaphore).
    pub enum SignalSemaphoreError {
        BadId,
        MaximumCountExceeded,
    }
}

define_error! {
    /// Error type for
    /// [`Kernel::drain_semaphore`](crate::Kernel::drain_semaphore),
    /// [`Kernel::destroy_semaphore`](crate::Kernel::destroy_semaphore), and
    /// [`Kernel::semaphore_count`](crate::Kernel::semaphore_count).
    pub enum QuerySemaphoreError {
        BadId,
    }
}

define_error! {
    /// Error type for [`Kernel::create_server`] on a
    /// bandwidth-server-scheduled kernel.
    ///
    /// `InvalidParameter` and `Full` are deliberately distinct: the former
    /// reports a rejected parameter set, the latter table exhaustion, and
    /// admission-control callers react differently to each.
    pub enum CreateServerError {
        InvalidParameter,
        Full,
    }
}

define_error! {
    /// Error type for the bandwidth-server operations addressing an
    /// existing server.
    pub enum ServerError {
        NoServer,
    }
}

define_error! {
    /// Error type for [`Kernel::attach_server`].
    pub enum AttachServerError {
        NoServer,
        BadId,
        BadObjectState,
    }
}

define_error! {
    /// Error type for [`Kernel::release_job`] and [`Kernel::cancel_job`]
    /// on a deadline-scheduled kernel.
    pub enum ReleaseJobError {
        BadId,
        InvalidParameter,
    }
}
