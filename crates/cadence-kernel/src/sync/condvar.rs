use crate::types::{CondHandle, LockHandle, SemaHandle, ThreadHandle};
use crate::{kassert, Kernel, StateGuard};
use log::trace;
use std::collections::VecDeque;

/// One thread inside `cond_wait`, sleeping on its own private semaphore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CondWaiter {
    pub thread: ThreadHandle,
    pub semaphore: SemaHandle,
}

/// A Mesa-style condition variable. Signalling is a hint: the woken thread
/// competes for the lock again and must recheck its condition.
#[derive(Debug, Default)]
pub struct Condition {
    pub waiters: VecDeque<CondWaiter>,
}

impl Kernel {
    pub fn cond_create(&self) -> CondHandle {
        self.lock_state().sync.new_cond()
    }

    pub fn cond_destroy(&self, cond: CondHandle) {
        let mut st = self.lock_state();
        let waiters = st.sync.cond(cond).waiters.len();
        kassert!(waiters == 0, "destroying {} with {} waiters", cond, waiters);
        st.sync.conds.remove(&cond);
    }

    /// Atomically releases `lock` and sleeps until `cond` is signalled, then
    /// reacquires `lock` before returning.
    pub fn cond_wait(&self, cond: CondHandle, lock: LockHandle) {
        let mut st = self.lock_state();
        kassert!(
            !st.intr.in_external,
            "cond_wait on {} in interrupt context",
            cond
        );
        let me = st.threads.current();
        let holder = st.sync.lock(lock).holder;
        kassert!(
            holder == Some(me),
            "{} waits on {} without holding {}",
            me,
            cond,
            lock
        );

        let semaphore = st.sync.new_sema(0);
        st.sync.cond_mut(cond).waiters.push_back(CondWaiter {
            thread: me,
            semaphore,
        });
        trace!("{} waits on {}", me, cond);

        st = self.lock_release_locked(st, lock);
        st = self.sema_down_locked(st, semaphore);
        st.sync.semas.remove(&semaphore);
        st = self.lock_acquire_locked(st, lock);
        drop(st);
    }

    /// Wakes one waiter, if there is one. The caller must hold `lock`.
    pub fn cond_signal(&self, cond: CondHandle, lock: LockHandle) {
        let st = self.lock_state();
        drop(self.cond_signal_locked(st, cond, lock));
    }

    /// Wakes every waiter. The caller must hold `lock`.
    pub fn cond_broadcast(&self, cond: CondHandle, lock: LockHandle) {
        let mut st = self.lock_state();
        loop {
            self.check_signaller(&st, cond, lock);
            if st.sync.cond(cond).waiters.is_empty() {
                break;
            }
            st = self.cond_signal_locked(st, cond, lock);
        }
        drop(st);
    }

    /// Threads waiting on `cond`, oldest first.
    pub fn cond_waiters(&self, cond: CondHandle) -> Vec<ThreadHandle> {
        self.lock_state()
            .sync
            .cond(cond)
            .waiters
            .iter()
            .map(|w| w.thread)
            .collect()
    }

    pub fn dump_cond(&self, cond: CondHandle) -> String {
        let st = self.lock_state();
        let waiters: Vec<String> = st
            .sync
            .cond(cond)
            .waiters
            .iter()
            .map(|w| format!("{}@{} on {}", w.thread, st.threads.get(w.thread).priority, w.semaphore))
            .collect();
        format!("{} waiters [{}]", cond, waiters.join(", "))
    }

    fn check_signaller(&self, st: &StateGuard<'_>, cond: CondHandle, lock: LockHandle) {
        kassert!(
            !st.intr.in_external,
            "signalling {} in interrupt context",
            cond
        );
        let me = st.threads.current();
        let holder = st.sync.lock(lock).holder;
        kassert!(
            holder == Some(me),
            "{} signals {} without holding {}",
            me,
            cond,
            lock
        );
    }

    fn cond_signal_locked<'a>(
        &'a self,
        mut st: StateGuard<'a>,
        cond: CondHandle,
        lock: LockHandle,
    ) -> StateGuard<'a> {
        self.check_signaller(&st, cond, lock);

        let priorities: Vec<i32> = st
            .sync
            .cond(cond)
            .waiters
            .iter()
            .map(|w| st.threads.get(w.thread).priority)
            .collect();
        let Some(index) = self.policy().select_waiter(&priorities) else {
            return st;
        };
        let Some(waiter) = st.sync.cond_mut(cond).waiters.remove(index) else {
            return st;
        };
        trace!("{} signals {}", cond, waiter.thread);
        self.sema_up_yielding(st, waiter.semaphore)
    }
}
