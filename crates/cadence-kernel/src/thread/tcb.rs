use crate::fixed::Fixed;
use crate::interrupt::IntrLevel;
use crate::types::{LockHandle, ThreadHandle};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Ready,
    Running,
    Blocked,
    Dying,
}

pub struct ThreadControlBlock {
    pub handle: ThreadHandle,
    pub name: String,
    pub state: ThreadState,
    /// Priority assigned at creation or by `thread_set_priority` / the MLFQS formula.
    pub base_priority: i32,
    /// Scheduling priority; above `base_priority` only while `donated` is set.
    pub priority: i32,
    pub donated: bool,
    pub held_locks: BTreeSet<LockHandle>,
    /// The lock this thread is sleeping on, used to walk donation chains.
    pub blocked_on: Option<LockHandle>,
    pub nice: i32,
    pub recent_cpu: Fixed,
    /// Interrupt level to restore when this thread gets the CPU back.
    pub saved_intr_level: IntrLevel,
}

impl ThreadControlBlock {
    pub fn new(handle: ThreadHandle, name: &str, priority: i32) -> Self {
        Self {
            handle,
            name: name.to_string(),
            state: ThreadState::Ready,
            base_priority: priority,
            priority,
            donated: false,
            held_locks: BTreeSet::new(),
            blocked_on: None,
            nice: super::NICE_DEFAULT,
            recent_cpu: Fixed::ZERO,
            saved_intr_level: IntrLevel::On,
        }
    }
}
