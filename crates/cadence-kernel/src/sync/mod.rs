//! Sleeping synchronization primitives: semaphores, locks and condition
//! variables, plus priority donation.
//!
//! Primitives live in handle tables owned by the kernel; the handles are
//! plain `Copy` ids that can be moved into any kernel thread.

pub mod condvar;
mod donation;
pub mod lock;
mod policy;
pub mod semaphore;

pub use condvar::{CondWaiter, Condition};
pub use lock::Lock;
pub(crate) use donation::recompute_priority;
pub use policy::SchedMode;
pub(crate) use policy::{policy_for, SyncPolicy};
pub use semaphore::Semaphore;

use crate::kpanic;
use crate::types::{CondHandle, HandleAllocator, LockHandle, SemaHandle};
use std::collections::{HashMap, VecDeque};

pub(crate) struct SyncTables {
    pub(crate) semas: HashMap<SemaHandle, Semaphore>,
    pub(crate) locks: HashMap<LockHandle, Lock>,
    pub(crate) conds: HashMap<CondHandle, Condition>,
    sema_ids: HandleAllocator,
    lock_ids: HandleAllocator,
    cond_ids: HandleAllocator,
}

impl SyncTables {
    pub(crate) fn new() -> Self {
        Self {
            semas: HashMap::new(),
            locks: HashMap::new(),
            conds: HashMap::new(),
            sema_ids: HandleAllocator::new(),
            lock_ids: HandleAllocator::new(),
            cond_ids: HandleAllocator::new(),
        }
    }

    pub(crate) fn new_sema(&mut self, value: u32) -> SemaHandle {
        let handle = self.sema_ids.next(SemaHandle::new);
        self.semas.insert(
            handle,
            Semaphore {
                value,
                waiters: VecDeque::new(),
            },
        );
        handle
    }

    pub(crate) fn new_lock(&mut self) -> LockHandle {
        let semaphore = self.new_sema(1);
        let handle = self.lock_ids.next(LockHandle::new);
        self.locks.insert(
            handle,
            Lock {
                holder: None,
                semaphore,
            },
        );
        handle
    }

    pub(crate) fn new_cond(&mut self) -> CondHandle {
        let handle = self.cond_ids.next(CondHandle::new);
        self.conds.insert(handle, Condition::default());
        handle
    }

    pub(crate) fn sema(&self, handle: SemaHandle) -> &Semaphore {
        match self.semas.get(&handle) {
            Some(sema) => sema,
            None => kpanic!("unknown semaphore {}", handle),
        }
    }

    pub(crate) fn sema_mut(&mut self, handle: SemaHandle) -> &mut Semaphore {
        match self.semas.get_mut(&handle) {
            Some(sema) => sema,
            None => kpanic!("unknown semaphore {}", handle),
        }
    }

    pub(crate) fn lock(&self, handle: LockHandle) -> &Lock {
        match self.locks.get(&handle) {
            Some(lock) => lock,
            None => kpanic!("unknown lock {}", handle),
        }
    }

    pub(crate) fn lock_mut(&mut self, handle: LockHandle) -> &mut Lock {
        match self.locks.get_mut(&handle) {
            Some(lock) => lock,
            None => kpanic!("unknown lock {}", handle),
        }
    }

    pub(crate) fn cond(&self, handle: CondHandle) -> &Condition {
        match self.conds.get(&handle) {
            Some(cond) => cond,
            None => kpanic!("unknown condition {}", handle),
        }
    }

    pub(crate) fn cond_mut(&mut self, handle: CondHandle) -> &mut Condition {
        match self.conds.get_mut(&handle) {
            Some(cond) => cond,
            None => kpanic!("unknown condition {}", handle),
        }
    }
}
