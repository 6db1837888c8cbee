//! A hosted port for integration tests: every kernel thread is backed by
//! an OS thread parked on a run token, and the main test thread plays the
//! role of interrupt context (it creates objects, drives the tick, and
//! observes, but never blocks).
use std::{
    cell::Cell,
    collections::HashMap,
    sync::{Arc, Condvar, Mutex},
    thread,
    time::{Duration, Instant},
};

use rtcore::{
    port::{InterruptToken, Port},
    sched::SimpleScheduler,
    thread::ThreadStart,
    Config, Kernel, ThreadId,
};

thread_local! {
    static CURRENT: Cell<Option<ThreadId>> = Cell::new(None);
}

/// A sticky binary run token. Granting before the wait begins is fine;
/// the grant is consumed by the next wait.
#[derive(Default)]
struct RunToken {
    runnable: Mutex<bool>,
    cond: Condvar,
}

impl RunToken {
    fn grant(&self) {
        *self.runnable.lock().unwrap() = true;
        self.cond.notify_one();
    }

    fn await_grant(&self) {
        let mut runnable = self.runnable.lock().unwrap();
        while !*runnable {
            runnable = self.cond.wait(runnable).unwrap();
        }
        *runnable = false;
    }
}

#[derive(Default)]
pub struct TestPort {
    tokens: Mutex<HashMap<ThreadId, Arc<RunToken>>>,
}

impl Port for TestPort {
    fn disable_interrupts(&self) -> InterruptToken {
        0
    }

    fn restore_interrupts(&self, _token: InterruptToken) {}

    fn caller(&self) -> Option<ThreadId> {
        CURRENT.with(|c| c.get())
    }

    fn initialize_context(&self, thread: ThreadId, start: &ThreadStart) {
        let token = Arc::new(RunToken::default());
        self.tokens.lock().unwrap().insert(thread, token.clone());
        let entry = start.entry;
        let param = start.param;
        thread::Builder::new()
            .name(format!("kthread-{:?}", thread))
            .spawn(move || {
                token.await_grant();
                CURRENT.with(|c| c.set(Some(thread)));
                entry(param);
                unreachable!("entry functions must end in exit_thread");
            })
            .expect("failed to spawn a host thread");
    }

    fn switch_context(&self, prev: Option<ThreadId>, next: Option<ThreadId>) {
        let (prev_token, next_token) = {
            let tokens = self.tokens.lock().unwrap();
            (
                prev.map(|t| tokens[&t].clone()),
                next.map(|t| tokens[&t].clone()),
            )
        };
        if let Some(t) = next_token {
            t.grant();
        }
        if let Some(t) = prev_token {
            // Park until this thread is dispatched again; a dormant
            // thread parks forever and its host thread is simply leaked
            t.await_grant();
        }
    }
}

pub type TestKernel = Kernel<TestPort, SimpleScheduler>;

/// A leaked kernel, so entry functions can reach it through a plain
/// pointer smuggled in their start parameter.
pub fn kernel(cfg: Config) -> &'static TestKernel {
    let _ = env_logger::builder().is_test(true).try_init();
    Box::leak(Box::new(Kernel::new(
        TestPort::default(),
        SimpleScheduler::new(cfg.max_threads),
        cfg,
    )))
}

/// Poll `cond` until it holds, failing the test after `deadline`.
pub fn wait_until(deadline: Duration, what: &str, mut cond: impl FnMut() -> bool) {
    let begin = Instant::now();
    while !cond() {
        assert!(
            begin.elapsed() < deadline,
            "timed out waiting for: {}",
            what
        );
        thread::sleep(Duration::from_millis(1));
    }
}

pub const LONG: Duration = Duration::from_secs(10);
