use super::ThreadTable;
use crate::types::ThreadHandle;
use std::collections::VecDeque;

pub trait Scheduler: Send {
    /// Removes and returns the thread to run next.
    fn schedule(&mut self, threads: &ThreadTable) -> Option<ThreadHandle>;

    /// Appends a ready thread.
    fn enqueue(&mut self, thread: ThreadHandle);

    /// Drops `thread` from the queue; false if it was not queued.
    fn dequeue(&mut self, thread: ThreadHandle) -> bool;

    /// Highest effective priority among ready threads
    fn max_priority(&self, threads: &ThreadTable) -> Option<i32>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Runs the ready thread with the highest effective priority; equal
/// priorities take turns in queue order.
///
/// Priorities are read at selection time, so a donation to a thread that
/// is already queued takes effect without requeueing it. Both scheduling
/// modes use it: under MLFQS the priorities come from the formulas.
pub struct PriorityScheduler {
    ready_queue: VecDeque<ThreadHandle>,
}

impl Default for PriorityScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityScheduler {
    pub fn new() -> Self {
        Self {
            ready_queue: VecDeque::new(),
        }
    }

    fn position_of_max(&self, threads: &ThreadTable) -> Option<usize> {
        let mut best: Option<(usize, i32)> = None;
        for (pos, handle) in self.ready_queue.iter().enumerate() {
            let priority = threads.get(handle).map_or(i32::MIN, |t| t.priority);
            if best.map_or(true, |(_, p)| priority > p) {
                best = Some((pos, priority));
            }
        }
        best.map(|(pos, _)| pos)
    }
}

impl Scheduler for PriorityScheduler {
    fn schedule(&mut self, threads: &ThreadTable) -> Option<ThreadHandle> {
        let pos = self.position_of_max(threads)?;
        self.ready_queue.remove(pos)
    }

    fn enqueue(&mut self, thread: ThreadHandle) {
        self.ready_queue.push_back(thread);
    }

    fn dequeue(&mut self, thread: ThreadHandle) -> bool {
        if let Some(pos) = self.ready_queue.iter().position(|&h| h == thread) {
            self.ready_queue.remove(pos);
            true
        } else {
            false
        }
    }

    fn max_priority(&self, threads: &ThreadTable) -> Option<i32> {
        self.ready_queue
            .iter()
            .filter_map(|h| threads.get(h))
            .map(|t| t.priority)
            .max()
    }

    fn len(&self) -> usize {
        self.ready_queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::tcb::ThreadControlBlock;

    fn table(priorities: &[i32]) -> (ThreadTable, Vec<ThreadHandle>) {
        let mut threads = ThreadTable::new();
        let mut handles = Vec::new();
        for (i, &priority) in priorities.iter().enumerate() {
            let handle = ThreadHandle::new(i as u32 + 1).unwrap();
            threads.insert(handle, ThreadControlBlock::new(handle, "t", priority));
            handles.push(handle);
        }
        (threads, handles)
    }

    #[test]
    fn picks_highest_priority_then_queue_order() {
        let (threads, h) = table(&[10, 40, 40, 20]);
        let mut sched = PriorityScheduler::new();
        for &handle in &h {
            sched.enqueue(handle);
        }
        assert_eq!(sched.max_priority(&threads), Some(40));
        assert_eq!(sched.schedule(&threads), Some(h[1]));
        assert_eq!(sched.schedule(&threads), Some(h[2]));
        assert_eq!(sched.schedule(&threads), Some(h[3]));
        assert_eq!(sched.schedule(&threads), Some(h[0]));
        assert_eq!(sched.schedule(&threads), None);
        assert!(sched.is_empty());
    }

    #[test]
    fn priority_changes_apply_while_queued() {
        let (mut threads, h) = table(&[10, 20]);
        let mut sched = PriorityScheduler::new();
        sched.enqueue(h[0]);
        sched.enqueue(h[1]);
        if let Some(t) = threads.get_mut(&h[0]) {
            t.priority = 50;
        }
        assert_eq!(sched.schedule(&threads), Some(h[0]));
    }

    #[test]
    fn dequeue_removes_only_queued_threads() {
        let (threads, h) = table(&[10, 20]);
        let mut sched = PriorityScheduler::new();
        sched.enqueue(h[0]);
        assert!(sched.dequeue(h[0]));
        assert!(!sched.dequeue(h[1]));
        assert_eq!(sched.len(), 0);
        assert_eq!(sched.schedule(&threads), None);
    }
}
