use crate::interrupt::IntrLevel;
use crate::types::{SemaHandle, ThreadHandle};
use crate::{kassert, Kernel, KernelState, StateGuard};
use log::trace;
use std::collections::VecDeque;

/// A counting semaphore: a nonnegative value plus the threads sleeping in
/// `down` until it becomes positive.
#[derive(Debug)]
pub struct Semaphore {
    pub value: u32,
    /// Sleeping threads in arrival order.
    pub waiters: VecDeque<ThreadHandle>,
}

impl Kernel {
    pub fn sema_create(&self, value: u32) -> SemaHandle {
        let handle = self.lock_state().sync.new_sema(value);
        trace!("{} created with value {}", handle, value);
        handle
    }

    /// Frees a semaphore. Nobody may be sleeping on it.
    pub fn sema_destroy(&self, sema: SemaHandle) {
        let mut st = self.lock_state();
        let waiters = st.sync.sema(sema).waiters.len();
        kassert!(waiters == 0, "destroying {} with {} waiters", sema, waiters);
        st.sync.semas.remove(&sema);
    }

    /// Waits for the value to become positive, then decrements it.
    ///
    /// May sleep, so it must not be called from an interrupt handler. It
    /// may be called with interrupts disabled; if it sleeps, the next thread
    /// to run decides the interrupt level.
    pub fn sema_down(&self, sema: SemaHandle) {
        let st = self.lock_state();
        drop(self.sema_down_locked(st, sema));
    }

    /// Decrements the value if it is positive. Never sleeps, so it is safe
    /// in an interrupt handler.
    pub fn sema_try_down(&self, sema: SemaHandle) -> bool {
        let mut st = self.lock_state();
        let s = st.sync.sema_mut(sema);
        if s.value > 0 {
            s.value -= 1;
            true
        } else {
            false
        }
    }

    /// Increments the value and wakes one waiter, if any.
    ///
    /// Under strict priority scheduling the caller then yields, so a woken
    /// thread with higher priority runs immediately.
    pub fn sema_up(&self, sema: SemaHandle) {
        let st = self.lock_state();
        drop(self.sema_up_yielding(st, sema));
    }

    /// `up` for interrupt handlers: wakes a waiter but never yields. Use
    /// [`Kernel::intr_yield_on_return`] to preempt once the handler is done.
    pub fn sema_up_intr(&self, sema: SemaHandle) {
        let mut st = self.lock_state();
        kassert!(
            st.intr.in_external,
            "sema_up_intr outside an interrupt handler"
        );
        self.sema_up_locked(&mut st, sema);
    }

    pub fn sema_value(&self, sema: SemaHandle) -> u32 {
        self.lock_state().sync.sema(sema).value
    }

    /// Threads sleeping on `sema`, oldest first.
    pub fn sema_waiters(&self, sema: SemaHandle) -> Vec<ThreadHandle> {
        self.lock_state().sync.sema(sema).waiters.iter().copied().collect()
    }

    pub fn dump_sema(&self, sema: SemaHandle) -> String {
        let st = self.lock_state();
        let s = st.sync.sema(sema);
        let waiters: Vec<String> = s
            .waiters
            .iter()
            .map(|&t| format!("{}@{}", t, st.threads.get(t).priority))
            .collect();
        format!("{} value {} waiters [{}]", sema, s.value, waiters.join(", "))
    }

    pub(crate) fn sema_down_locked<'a>(
        &'a self,
        mut st: StateGuard<'a>,
        sema: SemaHandle,
    ) -> StateGuard<'a> {
        kassert!(
            !st.intr.in_external,
            "sema_down on {} in interrupt context",
            sema
        );

        let old_level = st.intr.set_level(IntrLevel::Off);
        loop {
            let me = st.threads.current();
            let s = st.sync.sema_mut(sema);
            if s.value > 0 {
                s.value -= 1;
                break;
            }
            s.waiters.push_back(me);
            trace!("{} sleeps on {}", me, sema);
            st = self.block_current_thread(st);
        }
        st.intr.set_level(old_level);
        st
    }

    /// Normal-context `up`: wakes a waiter and, if the policy asks for it,
    /// yields before returning the guard.
    pub(crate) fn sema_up_yielding<'a>(
        &'a self,
        mut st: StateGuard<'a>,
        sema: SemaHandle,
    ) -> StateGuard<'a> {
        kassert!(
            !st.intr.in_external,
            "sema_up on {} in interrupt context; use sema_up_intr",
            sema
        );
        self.sema_up_locked(&mut st, sema);
        if self.policy().yields_after_up() {
            st = self.yield_current_thread(st);
        }
        st
    }

    /// Wakes the waiter the policy picks and increments the value. Returns
    /// the woken thread. Never yields.
    fn sema_up_locked(&self, st: &mut KernelState, sema: SemaHandle) -> Option<ThreadHandle> {
        let old_level = st.intr.set_level(IntrLevel::Off);
        let KernelState { threads, sync, .. } = &mut *st;

        let s = sync.sema_mut(sema);
        let priorities: Vec<i32> = s.waiters.iter().map(|&t| threads.get(t).priority).collect();
        let woken = self
            .policy()
            .select_waiter(&priorities)
            .and_then(|index| s.waiters.remove(index));
        kassert!(s.value < u32::MAX, "{} value overflow", sema);
        s.value += 1;

        if let Some(thread) = woken {
            trace!("{} wakes {}", sema, thread);
            threads.unblock(thread);
        }
        st.intr.set_level(old_level);
        woken
    }
}
