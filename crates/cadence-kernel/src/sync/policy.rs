use super::donation;
use crate::types::ThreadHandle;
use crate::KernelState;
use core::fmt;

/// Scheduling policy, chosen once at boot.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SchedMode {
    /// Strict priority scheduling with priority donation.
    #[default]
    Priority,
    /// Multi-level feedback queue: priorities come from the formulas and
    /// nothing is donated.
    Mlfqs,
}

impl fmt::Display for SchedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedMode::Priority => write!(f, "priority"),
            SchedMode::Mlfqs => write!(f, "mlfqs"),
        }
    }
}

/// Every place where the two scheduling modes disagree goes through this
/// trait; the primitives never look at the mode themselves.
pub(crate) trait SyncPolicy: Send + Sync {
    fn mode(&self) -> SchedMode;

    /// Picks which waiter to wake. `priorities` holds the waiters' effective
    /// priorities in arrival order.
    fn select_waiter(&self, priorities: &[i32]) -> Option<usize>;

    /// Runs before `acquirer` sleeps on a lock owned by `holder`.
    fn on_contended_acquire(&self, st: &mut KernelState, acquirer: ThreadHandle, holder: ThreadHandle);

    /// Runs after `thread` dropped a lock from its held set.
    fn on_release_recompute(&self, st: &mut KernelState, thread: ThreadHandle);

    /// Whether a normal-context `up` yields the CPU afterwards.
    fn yields_after_up(&self) -> bool;
}

pub(crate) struct PriorityDonation;

impl SyncPolicy for PriorityDonation {
    fn mode(&self) -> SchedMode {
        SchedMode::Priority
    }

    /// Highest priority first; the earliest arrival wins a tie.
    fn select_waiter(&self, priorities: &[i32]) -> Option<usize> {
        let mut best: Option<(usize, i32)> = None;
        for (index, &priority) in priorities.iter().enumerate() {
            if best.map_or(true, |(_, top)| priority > top) {
                best = Some((index, priority));
            }
        }
        best.map(|(index, _)| index)
    }

    fn on_contended_acquire(&self, st: &mut KernelState, acquirer: ThreadHandle, holder: ThreadHandle) {
        let incoming = st.threads.get(acquirer).priority;
        if st.threads.get(holder).priority < incoming {
            donation::donate(st, holder, incoming);
        }
    }

    fn on_release_recompute(&self, st: &mut KernelState, thread: ThreadHandle) {
        donation::recompute_priority(st, thread);
    }

    fn yields_after_up(&self) -> bool {
        true
    }
}

pub(crate) struct Mlfqs;

impl SyncPolicy for Mlfqs {
    fn mode(&self) -> SchedMode {
        SchedMode::Mlfqs
    }

    /// Oldest waiter first; the formulas already encode fairness.
    fn select_waiter(&self, priorities: &[i32]) -> Option<usize> {
        if priorities.is_empty() {
            None
        } else {
            Some(0)
        }
    }

    fn on_contended_acquire(&self, _st: &mut KernelState, _acquirer: ThreadHandle, _holder: ThreadHandle) {}

    fn on_release_recompute(&self, _st: &mut KernelState, _thread: ThreadHandle) {}

    /// Preemption waits for the next tick so timeslice accounting stays exact.
    fn yields_after_up(&self) -> bool {
        false
    }
}

static PRIORITY_DONATION: PriorityDonation = PriorityDonation;
static MLFQS: Mlfqs = Mlfqs;

pub(crate) fn policy_for(mode: SchedMode) -> &'static dyn SyncPolicy {
    match mode {
        SchedMode::Priority => &PRIORITY_DONATION,
        SchedMode::Mlfqs => &MLFQS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_mode_wakes_highest_priority() {
        let policy = policy_for(SchedMode::Priority);
        assert_eq!(policy.mode(), SchedMode::Priority);
        assert_eq!(policy.select_waiter(&[3, 7, 5]), Some(1));
        assert_eq!(policy.select_waiter(&[3, 5]), Some(1));
        assert_eq!(policy.select_waiter(&[3]), Some(0));
        assert_eq!(policy.select_waiter(&[]), None);
        assert!(policy.yields_after_up());
    }

    #[test]
    fn strict_mode_breaks_ties_by_arrival() {
        let policy = policy_for(SchedMode::Priority);
        assert_eq!(policy.select_waiter(&[4, 9, 9, 1]), Some(1));
    }

    #[test]
    fn mlfqs_wakes_oldest() {
        let policy = policy_for(SchedMode::Mlfqs);
        assert_eq!(policy.mode(), SchedMode::Mlfqs);
        assert_eq!(policy.select_waiter(&[3, 7, 5]), Some(0));
        assert_eq!(policy.select_waiter(&[]), None);
        assert!(!policy.yields_after_up());
    }

    #[test]
    fn mode_names() {
        assert_eq!(SchedMode::Priority.to_string(), "priority");
        assert_eq!(SchedMode::Mlfqs.to_string(), "mlfqs");
        assert_eq!(SchedMode::default(), SchedMode::Priority);
    }
}
