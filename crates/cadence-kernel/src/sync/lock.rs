use crate::types::{LockHandle, SemaHandle, ThreadHandle};
use crate::{kassert, Kernel, StateGuard};
use log::debug;

/// A lock: a binary semaphore plus the thread that owns it.
///
/// Unlike a semaphore, a lock is released by the same thread that acquired
/// it, and it is not recursive.
#[derive(Debug)]
pub struct Lock {
    pub holder: Option<ThreadHandle>,
    /// Starts at 1; 0 while held.
    pub semaphore: SemaHandle,
}

impl Kernel {
    pub fn lock_create(&self) -> LockHandle {
        self.lock_state().sync.new_lock()
    }

    /// Frees a lock. It must be free with nobody waiting for it.
    pub fn lock_destroy(&self, lock: LockHandle) {
        let mut st = self.lock_state();
        let (holder, semaphore) = {
            let l = st.sync.lock(lock);
            (l.holder, l.semaphore)
        };
        kassert!(holder.is_none(), "destroying {} held by {:?}", lock, holder);
        let waiters = st.sync.sema(semaphore).waiters.len();
        kassert!(waiters == 0, "destroying {} with {} waiters", lock, waiters);
        st.sync.locks.remove(&lock);
        st.sync.semas.remove(&semaphore);
    }

    /// Acquires `lock`, sleeping until it is free.
    ///
    /// Under strict priority scheduling a waiter donates its priority to the
    /// holder, and through the holder to any lock the holder is waiting for.
    pub fn lock_acquire(&self, lock: LockHandle) {
        let st = self.lock_state();
        drop(self.lock_acquire_locked(st, lock));
    }

    /// Acquires `lock` only if it is free right now.
    pub fn lock_try_acquire(&self, lock: LockHandle) -> bool {
        let mut st = self.lock_state();
        let me = st.threads.current();
        let (holder, semaphore) = {
            let l = st.sync.lock(lock);
            (l.holder, l.semaphore)
        };
        kassert!(holder != Some(me), "{} already holds {}", me, lock);

        let s = st.sync.sema_mut(semaphore);
        if s.value == 0 {
            return false;
        }
        s.value -= 1;
        st.sync.lock_mut(lock).holder = Some(me);
        st.threads.get_mut(me).held_locks.insert(lock);
        debug!("{} took {} without waiting", me, lock);
        true
    }

    /// Releases `lock`, which the running thread must hold, and gives back
    /// any priority that was donated through it.
    pub fn lock_release(&self, lock: LockHandle) {
        let st = self.lock_state();
        drop(self.lock_release_locked(st, lock));
    }

    pub fn lock_held_by_current_thread(&self, lock: LockHandle) -> bool {
        let st = self.lock_state();
        st.sync.lock(lock).holder == Some(st.threads.current())
    }

    pub fn lock_holder(&self, lock: LockHandle) -> Option<ThreadHandle> {
        self.lock_state().sync.lock(lock).holder
    }

    pub(crate) fn lock_acquire_locked<'a>(
        &'a self,
        mut st: StateGuard<'a>,
        lock: LockHandle,
    ) -> StateGuard<'a> {
        kassert!(
            !st.intr.in_external,
            "lock_acquire on {} in interrupt context",
            lock
        );
        let me = st.threads.current();
        let (holder, semaphore) = {
            let l = st.sync.lock(lock);
            (l.holder, l.semaphore)
        };
        kassert!(holder != Some(me), "{} already holds {}", me, lock);

        if let Some(holder) = holder {
            debug!("{} waits for {} held by {}", me, lock, holder);
            st.threads.get_mut(me).blocked_on = Some(lock);
            self.policy().on_contended_acquire(&mut st, me, holder);
        }

        st = self.sema_down_locked(st, semaphore);

        let tcb = st.threads.get_mut(me);
        tcb.blocked_on = None;
        tcb.held_locks.insert(lock);
        st.sync.lock_mut(lock).holder = Some(me);
        debug!("{} acquired {}", me, lock);
        st
    }

    pub(crate) fn lock_release_locked<'a>(
        &'a self,
        mut st: StateGuard<'a>,
        lock: LockHandle,
    ) -> StateGuard<'a> {
        let me = st.threads.current();
        let (holder, semaphore) = {
            let l = st.sync.lock(lock);
            (l.holder, l.semaphore)
        };
        kassert!(
            holder == Some(me),
            "{} releasing {} held by {:?}",
            me,
            lock,
            holder
        );

        st.threads.get_mut(me).held_locks.remove(&lock);
        self.policy().on_release_recompute(&mut st, me);
        st.sync.lock_mut(lock).holder = None;
        debug!("{} released {}", me, lock);
        self.sema_up_yielding(st, semaphore)
    }
}
