//! Built-in kernel self-tests, run with the `run TEST` action.
//!
//! Each test prints a transcript of `(name) message` lines. A failed check
//! is a kernel panic, the same as any other broken invariant.

use crate::error::KernelError;
use crate::sync::SchedMode;
use crate::thread::{PRI_DEFAULT, PRI_MIN, TIMER_FREQ};
use crate::{kassert, kpanic, Kernel};
use log::info;
use std::sync::{Arc, Mutex, PoisonError};

/// Output of one self-test, shared with the threads it spawns.
#[derive(Clone)]
pub struct Transcript {
    name: &'static str,
    lines: Arc<Mutex<Vec<String>>>,
}

impl Transcript {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            lines: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn msg(&self, text: impl Into<String>) {
        let line = format!("({}) {}", self.name, text.into());
        info!("{}", line);
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line);
    }

    fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

struct SelfTest {
    name: &'static str,
    run: fn(&Kernel, &Transcript),
}

static TESTS: &[SelfTest] = &[
    SelfTest {
        name: "sema-self-test",
        run: sema_self_test,
    },
    SelfTest {
        name: "priority-donate-one",
        run: priority_donate_one,
    },
    SelfTest {
        name: "priority-donate-nest",
        run: priority_donate_nest,
    },
    SelfTest {
        name: "priority-sema",
        run: priority_sema,
    },
    SelfTest {
        name: "priority-condvar",
        run: priority_condvar,
    },
    SelfTest {
        name: "mlfqs-load-1",
        run: mlfqs_load_1,
    },
];

/// Names of the available self-tests.
pub fn list() -> impl Iterator<Item = &'static str> {
    TESTS.iter().map(|t| t.name)
}

/// Runs the named self-test on the calling kernel thread and returns its
/// transcript.
pub fn run_test(kernel: &Kernel, name: &str) -> Result<Vec<String>, KernelError> {
    let test = TESTS
        .iter()
        .find(|t| t.name == name)
        .ok_or_else(|| KernelError::UnknownTest(name.to_string()))?;

    let transcript = Transcript::new(test.name);
    transcript.msg("begin");
    (test.run)(kernel, &transcript);
    transcript.msg("end");
    Ok(transcript.lines())
}

fn require_priority_mode(kernel: &Kernel) {
    kassert!(
        kernel.mode() == SchedMode::Priority,
        "this test does not work with -mlfqs"
    );
}

/// Ping-pongs control between two threads through a pair of semaphores.
fn sema_self_test(kernel: &Kernel, out: &Transcript) {
    out.msg("Testing semaphores...");
    let ping = kernel.sema_create(0);
    let pong = kernel.sema_create(0);

    kernel.spawn("sema-test", PRI_DEFAULT, move |k| {
        for _ in 0..10 {
            k.sema_down(ping);
            k.sema_up(pong);
        }
    });
    for _ in 0..10 {
        kernel.sema_up(ping);
        kernel.sema_down(pong);
    }
    out.msg("done.");
}

fn priority_donate_one(kernel: &Kernel, out: &Transcript) {
    require_priority_mode(kernel);
    kassert!(kernel.thread_get_priority() == PRI_DEFAULT);

    let lock = kernel.lock_create();
    kernel.lock_acquire(lock);

    for (name, priority) in [("acquire1", PRI_DEFAULT + 1), ("acquire2", PRI_DEFAULT + 2)] {
        let t = out.clone();
        kernel.spawn(name, priority, move |k| {
            k.lock_acquire(lock);
            t.msg(format!("{}: got the lock", name));
            k.lock_release(lock);
            t.msg(format!("{}: done", name));
        });
        out.msg(format!(
            "This thread should have priority {}.  Actual priority: {}.",
            priority,
            kernel.thread_get_priority()
        ));
    }

    kernel.lock_release(lock);
    out.msg("acquire2, acquire1 must already have finished, in that order.");
    out.msg("This should be the last line before finishing this test.");
}

fn priority_donate_nest(kernel: &Kernel, out: &Transcript) {
    require_priority_mode(kernel);
    kassert!(kernel.thread_get_priority() == PRI_DEFAULT);

    let a = kernel.lock_create();
    let b = kernel.lock_create();
    kernel.lock_acquire(a);

    let t = out.clone();
    kernel.spawn("medium", PRI_DEFAULT + 1, move |k| {
        k.lock_acquire(b);
        k.lock_acquire(a);

        t.msg(format!(
            "Medium thread should have priority {}.  Actual priority: {}.",
            PRI_DEFAULT + 2,
            k.thread_get_priority()
        ));
        t.msg("Medium thread got the lock.");

        k.lock_release(a);
        k.thread_yield();

        k.lock_release(b);
        k.thread_yield();

        t.msg("High thread should have just finished.");
        t.msg("Middle thread finished.");
    });
    kernel.thread_yield();
    out.msg(format!(
        "Low thread should have priority {}.  Actual priority: {}.",
        PRI_DEFAULT + 1,
        kernel.thread_get_priority()
    ));

    let t = out.clone();
    kernel.spawn("high", PRI_DEFAULT + 2, move |k| {
        k.lock_acquire(b);
        t.msg("High thread got the lock.");
        k.lock_release(b);
        t.msg("High thread finished.");
    });
    kernel.thread_yield();
    out.msg(format!(
        "Low thread should have priority {}.  Actual priority: {}.",
        PRI_DEFAULT + 2,
        kernel.thread_get_priority()
    ));

    kernel.lock_release(a);
    kernel.thread_yield();
    out.msg("Medium thread should just have finished.");
    out.msg(format!(
        "Low thread should have priority {}.  Actual priority: {}.",
        PRI_DEFAULT,
        kernel.thread_get_priority()
    ));
}

fn priority_sema(kernel: &Kernel, out: &Transcript) {
    require_priority_mode(kernel);

    let sema = kernel.sema_create(0);
    kernel.thread_set_priority(PRI_MIN);
    for i in 0..10 {
        let priority = PRI_DEFAULT - (i + 3) % 10 - 1;
        let t = out.clone();
        kernel.spawn(&format!("priority {}", priority), priority, move |k| {
            k.sema_down(sema);
            t.msg(format!("Thread {} woke up.", k.thread_name()));
        });
    }

    for _ in 0..10 {
        kernel.sema_up(sema);
        out.msg("Back in main thread.");
    }
}

fn priority_condvar(kernel: &Kernel, out: &Transcript) {
    require_priority_mode(kernel);

    let lock = kernel.lock_create();
    let cond = kernel.cond_create();
    kernel.thread_set_priority(PRI_MIN);
    for i in 0..10 {
        let priority = PRI_DEFAULT - (i + 7) % 10 - 1;
        let t = out.clone();
        kernel.spawn(&format!("priority {}", priority), priority, move |k| {
            t.msg(format!("Thread {} starting.", k.thread_name()));
            k.lock_acquire(lock);
            k.cond_wait(cond, lock);
            t.msg(format!("Thread {} woke up.", k.thread_name()));
            k.lock_release(lock);
        });
    }

    for _ in 0..10 {
        kernel.lock_acquire(lock);
        out.msg("Signaling...");
        kernel.cond_signal(cond, lock);
        kernel.lock_release(lock);
    }
}

/// Spins on the CPU until the load average rises above 0.5. With exactly
/// one runnable thread that takes 43 seconds of timer ticks.
fn mlfqs_load_1(kernel: &Kernel, out: &Transcript) {
    kassert!(
        kernel.mode() == SchedMode::Mlfqs,
        "this test requires -mlfqs"
    );

    out.msg("spinning for up to 45 seconds, please wait...");
    let start = kernel.timer_ticks();
    let elapsed = loop {
        kernel.timer_interrupt();
        let load_avg = kernel.thread_get_load_avg();
        kassert!(load_avg >= 0);
        let elapsed = (kernel.timer_ticks() - start) / TIMER_FREQ;
        if load_avg > 100 {
            kpanic!(
                "FAIL: load average is {}.{:02} but should be between 0 and 1 (after {} seconds)",
                load_avg / 100,
                load_avg % 100,
                elapsed
            );
        } else if load_avg > 50 {
            break elapsed;
        } else if elapsed > 45 {
            kpanic!("FAIL: load average stayed below 0.5 for more than 45 seconds");
        }
    };

    if elapsed < 38 {
        kpanic!(
            "FAIL: load average took only {} seconds to rise above 0.5",
            elapsed
        );
    }
    out.msg(format!("load average rose to 0.5 after {} seconds", elapsed));
}
