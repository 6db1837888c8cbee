//! The thread-queue core: the generic blocking engine shared by every
//! synchronization object.
//!
//! A [`WaitQueue`] is an intrusive doubly-linked list over thread slot
//! indices; the link fields live in each thread's [`WaitRecord`]. The
//! discipline is fixed at initialization: `Fifo` keeps strict arrival
//! order, `Priority` keeps the list sorted by current priority (most
//! important first) with FIFO order among equals, so the head is always
//! the next thread to release.
//!
//! The queue itself only handles linkage and ordering. Committing a thread
//! to the wait (state flags, timeout arming, giving up the processor) and
//! resolving the wait are the dispatcher's business; both happen under the
//! same kernel lock as the queue operation, which is what makes the
//! release-versus-block and release-versus-timeout races resolve to
//! exactly one winner.
use crate::{
    thread::ThreadCb,
    utils::arena::Arena,
    Priority,
};

/// Release-order discipline of a [`WaitQueue`], fixed at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOrder {
    /// Strict arrival order.
    Fifo,
    /// Most important current priority first; FIFO among equals.
    Priority,
}

/// What a blocked thread is waiting for. Stored in its [`WaitRecord`]
/// while the wait is in progress; the payload is the owning object's slot
/// index, which the timeout path uses to find the queue to extract from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitSource {
    Mutex(usize),
    Semaphore(usize),
    Sleep,
}

/// How a wait resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitOutcome {
    Satisfied,
    Timeout,
    Deleted,
}

/// Blocking behavior requested by an acquisition operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitMode {
    NonBlocking,
    Forever,
    Timeout(crate::Ticks),
}

/// Per-thread wait state: queue linkage plus the in-progress wait record.
#[derive(Debug)]
pub(crate) struct WaitRecord {
    /// Whether the thread is linked into some queue's list.
    pub queued: bool,
    pub prev: Option<usize>,
    pub next: Option<usize>,
    /// `Some` from commit-to-wait until the wait resolves.
    pub source: Option<WaitSource>,
    /// Set by the resolving party; consumed by the woken thread.
    pub outcome: Option<WaitOutcome>,
}

impl WaitRecord {
    pub const fn new() -> Self {
        Self {
            queued: false,
            prev: None,
            next: None,
            source: None,
            outcome: None,
        }
    }
}

/// A queue of blocked threads. See the module documentation.
#[derive(Debug)]
pub(crate) struct WaitQueue {
    order: QueueOrder,
    head: Option<usize>,
    tail: Option<usize>,
}

impl WaitQueue {
    pub const fn new(order: QueueOrder) -> Self {
        Self {
            order,
            head: None,
            tail: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Peek at the next thread to release without removing it.
    pub fn first(&self) -> Option<usize> {
        self.head
    }

    pub fn len(&self, threads: &Arena<ThreadCb>) -> usize {
        let mut n = 0;
        let mut cur = self.head;
        while let Some(i) = cur {
            n += 1;
            cur = thread(threads, i).wait.next;
        }
        n
    }

    /// The most important current priority among the waiters, if any.
    /// For the priority discipline this is the head's priority.
    pub fn max_waiter_priority(&self, threads: &Arena<ThreadCb>) -> Option<Priority> {
        match self.order {
            QueueOrder::Priority => self.head.map(|h| thread(threads, h).priority),
            QueueOrder::Fifo => {
                let mut best: Option<Priority> = None;
                let mut cur = self.head;
                while let Some(i) = cur {
                    let t = thread(threads, i);
                    best = Some(match best {
                        Some(b) => b.min(t.priority),
                        None => t.priority,
                    });
                    cur = t.wait.next;
                }
                best
            }
        }
    }

    /// Link `idx` into the queue at the position its discipline dictates.
    pub fn enqueue(&mut self, threads: &mut Arena<ThreadCb>, idx: usize) {
        debug_assert!(!thread(threads, idx).wait.queued);

        let insert_before = match self.order {
            QueueOrder::Fifo => None,
            QueueOrder::Priority => {
                // First waiter strictly less important than the newcomer.
                // Inserting before it keeps FIFO order among equals.
                let priority = thread(threads, idx).priority;
                let mut cur = self.head;
                loop {
                    match cur {
                        Some(i) if thread(threads, i).priority <= priority => {
                            cur = thread(threads, i).wait.next;
                        }
                        _ => break cur,
                    }
                }
            }
        };

        match insert_before {
            None => {
                // Tail insertion
                let old_tail = self.tail;
                {
                    let t = thread_mut(threads, idx);
                    t.wait.queued = true;
                    t.wait.prev = old_tail;
                    t.wait.next = None;
                }
                match old_tail {
                    Some(p) => thread_mut(threads, p).wait.next = Some(idx),
                    None => self.head = Some(idx),
                }
                self.tail = Some(idx);
            }
            Some(succ) => {
                let pred = thread(threads, succ).wait.prev;
                {
                    let t = thread_mut(threads, idx);
                    t.wait.queued = true;
                    t.wait.prev = pred;
                    t.wait.next = Some(succ);
                }
                thread_mut(threads, succ).wait.prev = Some(idx);
                match pred {
                    Some(p) => thread_mut(threads, p).wait.next = Some(idx),
                    None => self.head = Some(idx),
                }
            }
        }
    }

    /// Unlink and return the head: the next thread to release under this
    /// queue's discipline.
    pub fn dequeue(&mut self, threads: &mut Arena<ThreadCb>) -> Option<usize> {
        let head = self.head?;
        self.unlink(threads, head);
        Some(head)
    }

    /// Unlink a specific thread. Idempotent: returns `false` if the thread
    /// was not on this queue (e.g. the release path got there first).
    pub fn extract(&mut self, threads: &mut Arena<ThreadCb>, idx: usize) -> bool {
        if !thread(threads, idx).wait.queued {
            return false;
        }
        self.unlink(threads, idx);
        true
    }

    /// Re-rank a queued thread after its current priority changed.
    /// Re-enqueueing places it after equals, i.e. a repositioned thread
    /// loses its FIFO seniority within the new priority level. No-op for
    /// the FIFO discipline, where priority does not affect rank.
    pub fn reposition(&mut self, threads: &mut Arena<ThreadCb>, idx: usize) {
        if self.order == QueueOrder::Fifo {
            return;
        }
        if self.extract(threads, idx) {
            self.enqueue(threads, idx);
        }
    }

    fn unlink(&mut self, threads: &mut Arena<ThreadCb>, idx: usize) {
        let (prev, next) = {
            let t = thread_mut(threads, idx);
            let links = (t.wait.prev, t.wait.next);
            t.wait.queued = false;
            t.wait.prev = None;
            t.wait.next = None;
            links
        };
        match prev {
            Some(p) => thread_mut(threads, p).wait.next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => thread_mut(threads, n).wait.prev = prev,
            None => self.tail = prev,
        }
    }
}

fn thread(threads: &Arena<ThreadCb>, idx: usize) -> &ThreadCb {
    threads
        .get_at(idx)
        .expect("wait queue references a dead thread slot")
}

fn thread_mut(threads: &mut Arena<ThreadCb>, idx: usize) -> &mut ThreadCb {
    threads
        .get_at_mut(idx)
        .expect("wait queue references a dead thread slot")
}
