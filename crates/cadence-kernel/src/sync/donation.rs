//! Priority donation.
//!
//! A thread that sleeps on a lock lends its priority to the holder, and to
//! whoever that holder is itself waiting on, so a high-priority thread never
//! waits behind a lower-priority one for longer than the critical sections
//! in the chain. Donation only raises priorities; `lock_release` is the only
//! place they come back down.

use crate::types::ThreadHandle;
use crate::KernelState;
use log::{debug, trace};
use std::collections::HashSet;

/// Raises `holder` to `priority` and follows its `blocked_on` chain.
///
/// Stops at the first thread that already runs at `priority` or above. The
/// visited set only guards against malformed wait-for graphs; a revisit ends
/// the walk without complaint.
pub(crate) fn donate(st: &mut KernelState, holder: ThreadHandle, priority: i32) {
    let mut visited = HashSet::new();
    let mut work = vec![holder];

    while let Some(thread) = work.pop() {
        if !visited.insert(thread) {
            trace!("donation chain revisits {}", thread);
            break;
        }

        let tcb = st.threads.get_mut(thread);
        if tcb.priority >= priority {
            break;
        }
        debug!("donate priority {} to {} (was {})", priority, thread, tcb.priority);
        tcb.priority = priority;
        tcb.donated = true;

        let next = tcb
            .blocked_on
            .and_then(|lock| st.sync.locks.get(&lock))
            .and_then(|lock| lock.holder);
        if let Some(next) = next {
            work.push(next);
        }
    }
}

/// Highest effective priority among the threads sleeping on locks `thread`
/// still holds.
fn strongest_donor(st: &KernelState, thread: ThreadHandle) -> Option<i32> {
    st.threads
        .get(thread)
        .held_locks
        .iter()
        .map(|&lock| st.sync.lock(lock).semaphore)
        .flat_map(|sema| st.sync.sema(sema).waiters.iter())
        .map(|&waiter| st.threads.get(waiter).priority)
        .max()
}

/// Recomputes `thread`'s effective priority from its base priority and the
/// waiters on the locks it holds.
pub(crate) fn recompute_priority(st: &mut KernelState, thread: ThreadHandle) {
    let donor = strongest_donor(st, thread);
    let tcb = st.threads.get_mut(thread);
    match donor {
        Some(priority) if priority > tcb.base_priority => {
            tcb.priority = priority;
            tcb.donated = true;
        }
        _ => {
            tcb.priority = tcb.base_priority;
            tcb.donated = false;
        }
    }
    trace!(
        "{} priority now {} (base {})",
        thread,
        tcb.priority,
        tcb.base_priority
    );
}
