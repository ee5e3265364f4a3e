pub mod cmdline;
pub mod error;
pub mod fixed;
pub mod formula;
pub mod interrupt;
pub mod selftest;
pub mod sync;
pub mod thread;
pub mod types;

pub use crate::cmdline::BootOptions;
pub use crate::error::KernelError;
pub use crate::fixed::Fixed;
pub use crate::interrupt::IntrLevel;
pub use crate::sync::SchedMode;
pub use crate::types::{CondHandle, LockHandle, SemaHandle, ThreadHandle};

use crate::interrupt::InterruptState;
use crate::sync::{SyncPolicy, SyncTables};
use crate::thread::ThreadManager;
use log::{error, info};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Everything the emulated CPU can touch. Only the thread that owns the CPU
/// mutates it, always through [`Kernel::lock_state`].
pub(crate) struct KernelState {
    pub(crate) threads: ThreadManager,
    pub(crate) sync: SyncTables,
    pub(crate) intr: InterruptState,
    halted: Option<String>,
}

pub(crate) type StateGuard<'a> = MutexGuard<'a, KernelState>;

struct KernelInner {
    state: Mutex<KernelState>,
    /// Signalled whenever the CPU changes hands.
    cpu: Condvar,
    policy: &'static dyn SyncPolicy,
    options: BootOptions,
}

/// A booted uniprocessor kernel.
///
/// Each kernel thread runs on its own OS thread, but only the thread the
/// scheduler picked is allowed past [`Kernel::wait_for_cpu`]; all others
/// sleep until the CPU is handed to them. That single owner, together with
/// the state mutex, is what "interrupts disabled" means here: nothing else
/// can observe or change kernel state in the middle of an operation.
///
/// `Kernel` is a cheap handle; clone it into spawned threads.
#[derive(Clone)]
pub struct Kernel {
    inner: Arc<KernelInner>,
}

impl Kernel {
    /// Boots the kernel and turns the calling OS thread into the `main`
    /// kernel thread. It runs at `PRI_DEFAULT`, or at the formula priority
    /// under MLFQS.
    pub fn boot(options: BootOptions) -> Self {
        info!("Cadence booting with {} scheduling", options.mode);
        let policy = sync::policy_for(options.mode);
        let threads = ThreadManager::new(options.mode);

        Self {
            inner: Arc::new(KernelInner {
                state: Mutex::new(KernelState {
                    threads,
                    sync: SyncTables::new(),
                    intr: InterruptState::new(),
                    halted: None,
                }),
                cpu: Condvar::new(),
                policy,
                options,
            }),
        }
    }

    pub fn options(&self) -> &BootOptions {
        &self.inner.options
    }

    pub fn mode(&self) -> SchedMode {
        self.inner.options.mode
    }

    pub(crate) fn policy(&self) -> &'static dyn SyncPolicy {
        self.inner.policy
    }

    /// Locks the kernel state. A panic on another kernel thread poisons the
    /// mutex; the state is still consistent enough to report the halt.
    pub(crate) fn lock_state(&self) -> StateGuard<'_> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleeps until the scheduler hands the CPU to `me`.
    pub(crate) fn wait_for_cpu<'a>(
        &'a self,
        mut st: StateGuard<'a>,
        me: ThreadHandle,
    ) -> StateGuard<'a> {
        loop {
            if let Some(reason) = st.halted.clone() {
                drop(st);
                panic!("kernel halted: {}", reason);
            }
            if st.threads.current_thread == Some(me) {
                return st;
            }
            st = self
                .inner
                .cpu
                .wait(st)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub(crate) fn cpu_handed_over(&self) {
        self.inner.cpu.notify_all();
    }

    /// Stops the machine: every kernel thread waiting for the CPU panics with
    /// `reason`, and so does the caller.
    pub(crate) fn halt(&self, mut st: StateGuard<'_>, reason: String) -> ! {
        if st.halted.is_none() {
            st.halted = Some(reason.clone());
        }
        drop(st);
        self.cpu_handed_over();
        crate::kpanic!("{}", reason)
    }

    /// Records a panic that escaped a spawned kernel thread.
    pub(crate) fn record_crash(&self, thread: &str, reason: String) {
        error!("thread `{}' crashed: {}", thread, reason);
        let mut st = self.lock_state();
        if st.halted.is_none() {
            st.halted = Some(format!("thread `{}' crashed: {}", thread, reason));
        }
        drop(st);
        self.cpu_handed_over();
    }

    /// True once a kernel panic stopped the machine.
    pub fn is_halted(&self) -> bool {
        self.lock_state().halted.is_some()
    }
}
