//! Threads and the ready queue.
//!
//! This is the collaborator the synchronization core blocks and wakes
//! threads through: `current_thread`, `block_current_thread`, `unblock`
//! and `yield_current_thread`. It also owns the MLFQS bookkeeping that the
//! timer interrupt drives.

pub mod scheduler;
pub mod tcb;

use crate::fixed::Fixed;
use crate::sync::{self, SchedMode};
use crate::types::{HandleAllocator, LockHandle, ThreadHandle};
use crate::{formula, kassert, kpanic, Kernel, StateGuard};
use log::{debug, info, trace, warn};
use scheduler::{PriorityScheduler, Scheduler};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use tcb::{ThreadControlBlock, ThreadState};

/// Lowest priority.
pub const PRI_MIN: i32 = 0;
/// Default priority.
pub const PRI_DEFAULT: i32 = 31;
/// Highest priority.
pub const PRI_MAX: i32 = 63;

pub const NICE_MIN: i32 = -20;
pub const NICE_DEFAULT: i32 = 0;
pub const NICE_MAX: i32 = 20;

/// Timer interrupts per second.
pub const TIMER_FREQ: u64 = 100;
/// Timer ticks a thread may run before it is asked to yield.
pub const TIME_SLICE: u32 = 4;
/// Ticks between MLFQS priority recomputations.
const PRIORITY_PERIOD: u64 = 4;

pub type ThreadTable = HashMap<ThreadHandle, ThreadControlBlock>;

pub struct ThreadManager {
    pub threads: ThreadTable,
    pub scheduler: Box<dyn Scheduler>,
    pub current_thread: Option<ThreadHandle>,
    handles: HandleAllocator,
    mode: SchedMode,
    ticks: u64,
    thread_ticks: u32,
    load_avg: Fixed,
}

impl ThreadManager {
    /// The thread calling this becomes `main`, already running.
    pub fn new(mode: SchedMode) -> Self {
        let mut manager = Self {
            threads: HashMap::new(),
            scheduler: Box::new(PriorityScheduler::new()),
            current_thread: None,
            handles: HandleAllocator::new(),
            mode,
            ticks: 0,
            thread_ticks: 0,
            load_avg: Fixed::ZERO,
        };

        let handle = manager.handles.next(ThreadHandle::new);
        let mut tcb = ThreadControlBlock::new(handle, "main", PRI_DEFAULT);
        tcb.state = ThreadState::Running;
        manager.threads.insert(handle, tcb);
        manager.current_thread = Some(handle);
        if mode == SchedMode::Mlfqs {
            manager.refresh_priority(handle);
        }
        manager
    }

    pub fn current(&self) -> ThreadHandle {
        match self.current_thread {
            Some(handle) => handle,
            None => kpanic!("no thread is running"),
        }
    }

    pub fn get(&self, handle: ThreadHandle) -> &ThreadControlBlock {
        match self.threads.get(&handle) {
            Some(tcb) => tcb,
            None => kpanic!("unknown thread {}", handle),
        }
    }

    pub fn get_mut(&mut self, handle: ThreadHandle) -> &mut ThreadControlBlock {
        match self.threads.get_mut(&handle) {
            Some(tcb) => tcb,
            None => kpanic!("unknown thread {}", handle),
        }
    }

    /// Creates a ready thread. Under MLFQS it inherits `nice` and
    /// `recent_cpu` from the creator and `priority` is ignored.
    pub fn create(&mut self, name: &str, priority: i32) -> ThreadHandle {
        let handle = self.handles.next(ThreadHandle::new);
        let mut tcb = ThreadControlBlock::new(handle, name, priority);
        if let Some(parent) = self.current_thread.and_then(|h| self.threads.get(&h)) {
            tcb.nice = parent.nice;
            tcb.recent_cpu = parent.recent_cpu;
        }
        self.threads.insert(handle, tcb);
        if self.mode == SchedMode::Mlfqs {
            self.refresh_priority(handle);
        }
        self.scheduler.enqueue(handle);
        handle
    }

    pub fn block_current(&mut self) {
        let current = self.current();
        self.get_mut(current).state = ThreadState::Blocked;
    }

    /// Moves a blocked thread to the ready queue. Does not preempt.
    pub fn unblock(&mut self, handle: ThreadHandle) {
        let tcb = self.get_mut(handle);
        kassert!(
            tcb.state == ThreadState::Blocked,
            "unblocking {} which is {:?}",
            handle,
            tcb.state
        );
        tcb.state = ThreadState::Ready;
        self.scheduler.enqueue(handle);
    }

    /// Puts the running thread back on the ready queue.
    pub fn ready_current(&mut self) {
        let current = self.current();
        self.get_mut(current).state = ThreadState::Ready;
        self.scheduler.enqueue(current);
    }

    pub fn exit_current(&mut self) -> ThreadControlBlock {
        let current = self.current();
        self.current_thread = None;
        match self.threads.remove(&current) {
            Some(mut tcb) => {
                tcb.state = ThreadState::Dying;
                tcb
            }
            None => kpanic!("unknown thread {}", current),
        }
    }

    /// Picks the next thread and marks it running.
    pub fn schedule_next(&mut self) -> Option<ThreadHandle> {
        let next = self.scheduler.schedule(&self.threads)?;
        self.get_mut(next).state = ThreadState::Running;
        self.current_thread = Some(next);
        self.thread_ticks = 0;
        Some(next)
    }

    /// True when a ready thread has a higher priority than the running one.
    pub fn outranked(&self) -> bool {
        let Some(current) = self.current_thread else {
            return false;
        };
        let running = self.get(current).priority;
        self.scheduler
            .max_priority(&self.threads)
            .is_some_and(|ready| ready > running)
    }

    /// Ready threads plus the running one.
    pub fn ready_threads(&self) -> usize {
        self.scheduler.len() + usize::from(self.current_thread.is_some())
    }

    pub fn blocked_threads(&self) -> usize {
        self.threads
            .values()
            .filter(|t| t.state == ThreadState::Blocked)
            .count()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn load_avg(&self) -> Fixed {
        self.load_avg
    }

    /// MLFQS priority from the thread's own `recent_cpu` and `nice`.
    pub fn refresh_priority(&mut self, handle: ThreadHandle) {
        let tcb = self.get_mut(handle);
        let priority = formula::priority(tcb.recent_cpu, tcb.nice).clamp(PRI_MIN, PRI_MAX);
        tcb.base_priority = priority;
        tcb.priority = priority;
    }

    /// Accounts one timer tick. Returns true when the running thread should
    /// yield once the interrupt returns.
    pub fn tick(&mut self) -> bool {
        self.ticks += 1;
        self.thread_ticks += 1;

        if self.mode == SchedMode::Mlfqs {
            if let Some(current) = self.current_thread {
                let tcb = self.get_mut(current);
                tcb.recent_cpu = tcb.recent_cpu.add_int(1);
            }

            if self.ticks % TIMER_FREQ == 0 {
                let ready = i32::try_from(self.ready_threads()).unwrap_or(i32::MAX);
                self.load_avg = formula::load_avg(self.load_avg, ready);
                let load_avg = self.load_avg;
                for tcb in self.threads.values_mut() {
                    tcb.recent_cpu = formula::recent_cpu(tcb.recent_cpu, load_avg, tcb.nice);
                }
                debug!("tick {}: load_avg {} ({} ready)", self.ticks, self.load_avg, ready);
            }

            if self.ticks % PRIORITY_PERIOD == 0 {
                let handles: Vec<ThreadHandle> = self.threads.keys().copied().collect();
                for handle in handles {
                    self.refresh_priority(handle);
                }
            }
        }

        self.thread_ticks >= TIME_SLICE || self.outranked()
    }
}

/// Snapshot of one thread for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub handle: ThreadHandle,
    pub name: String,
    pub state: ThreadState,
    pub priority: i32,
    pub base_priority: i32,
    pub donated: bool,
    pub held_locks: Vec<LockHandle>,
    pub blocked_on: Option<LockHandle>,
    pub nice: i32,
    pub recent_cpu: Fixed,
}

impl From<&ThreadControlBlock> for ThreadInfo {
    fn from(tcb: &ThreadControlBlock) -> Self {
        Self {
            handle: tcb.handle,
            name: tcb.name.clone(),
            state: tcb.state,
            priority: tcb.priority,
            base_priority: tcb.base_priority,
            donated: tcb.donated,
            held_locks: tcb.held_locks.iter().copied().collect(),
            blocked_on: tcb.blocked_on,
            nice: tcb.nice,
            recent_cpu: tcb.recent_cpu,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Kernel {
    pub fn current_thread(&self) -> ThreadHandle {
        self.lock_state().threads.current()
    }

    pub fn thread_name(&self) -> String {
        let st = self.lock_state();
        st.threads.get(st.threads.current()).name.clone()
    }

    /// Snapshot of a live thread, `None` once it has exited.
    pub fn thread_info(&self, handle: ThreadHandle) -> Option<ThreadInfo> {
        self.lock_state().threads.threads.get(&handle).map(ThreadInfo::from)
    }

    /// Starts a kernel thread running `f`. The thread exits when `f` returns.
    ///
    /// If the new thread outranks the caller, the caller yields before this
    /// returns.
    pub fn spawn<F>(&self, name: &str, priority: i32, f: F) -> ThreadHandle
    where
        F: FnOnce(Kernel) + Send + 'static,
    {
        let mut st = self.lock_state();
        kassert!(
            (PRI_MIN..=PRI_MAX).contains(&priority),
            "priority {} out of range",
            priority
        );
        kassert!(!st.intr.in_external, "spawn from interrupt context");

        let handle = st.threads.create(name, priority);
        let kernel = self.clone();
        let thread_name = name.to_string();
        let spawned = std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    let st = kernel.lock_state();
                    drop(kernel.wait_for_cpu(st, handle));
                    f(kernel.clone());
                }));
                match outcome {
                    Ok(()) => kernel.exit_current_thread(),
                    Err(payload) => kernel.record_crash(&thread_name, panic_message(&*payload)),
                }
            });
        if let Err(e) = spawned {
            self.halt(st, format!("cannot start thread `{}': {}", name, e));
        }

        let current = st.threads.current();
        let new_priority = st.threads.get(handle).priority;
        info!("created {} `{}' at priority {}", handle, name, new_priority);
        if new_priority > st.threads.get(current).priority {
            st = self.yield_current_thread(st);
        }
        drop(st);
        handle
    }

    pub fn thread_yield(&self) {
        let st = self.lock_state();
        drop(self.yield_current_thread(st));
    }

    /// Effective priority of the running thread.
    pub fn thread_get_priority(&self) -> i32 {
        let st = self.lock_state();
        st.threads.get(st.threads.current()).priority
    }

    /// Sets the running thread's base priority. Donations it currently
    /// receives still apply. Ignored under MLFQS.
    pub fn thread_set_priority(&self, priority: i32) {
        let mut st = self.lock_state();
        kassert!(
            (PRI_MIN..=PRI_MAX).contains(&priority),
            "priority {} out of range",
            priority
        );
        if self.mode() == SchedMode::Mlfqs {
            debug!("thread_set_priority({}) ignored under mlfqs", priority);
            return;
        }

        let current = st.threads.current();
        st.threads.get_mut(current).base_priority = priority;
        sync::recompute_priority(&mut st, current);
        if st.threads.outranked() {
            st = self.yield_current_thread(st);
        }
        drop(st);
    }

    pub fn thread_get_nice(&self) -> i32 {
        let st = self.lock_state();
        st.threads.get(st.threads.current()).nice
    }

    /// Sets the running thread's nice value and, under MLFQS, recomputes its
    /// priority right away.
    pub fn thread_set_nice(&self, nice: i32) {
        let mut st = self.lock_state();
        kassert!(
            (NICE_MIN..=NICE_MAX).contains(&nice),
            "nice {} out of range",
            nice
        );
        let current = st.threads.current();
        st.threads.get_mut(current).nice = nice;
        if self.mode() == SchedMode::Mlfqs {
            st.threads.refresh_priority(current);
            if st.threads.outranked() {
                st = self.yield_current_thread(st);
            }
        }
        drop(st);
    }

    /// 100 times the system load average, rounded.
    pub fn thread_get_load_avg(&self) -> i32 {
        self.lock_state().threads.load_avg().mul_int(100).to_int_round()
    }

    /// 100 times the running thread's `recent_cpu`, rounded.
    pub fn thread_get_recent_cpu(&self) -> i32 {
        let st = self.lock_state();
        st.threads
            .get(st.threads.current())
            .recent_cpu
            .mul_int(100)
            .to_int_round()
    }

    pub fn timer_ticks(&self) -> u64 {
        self.lock_state().threads.ticks()
    }

    /// Delivers one timer tick to the running thread.
    pub fn timer_interrupt(&self) {
        self.interrupt("timer", |kernel| {
            let mut st = kernel.lock_state();
            if st.threads.tick() {
                st.intr.yield_on_return = true;
            }
        });
    }

    pub fn dump_thread(&self, handle: ThreadHandle) -> String {
        let st = self.lock_state();
        match st.threads.threads.get(&handle) {
            Some(tcb) => describe(tcb),
            None => format!("{} (exited)", handle),
        }
    }

    /// Puts the running thread to sleep until someone calls `unblock` on it.
    pub(crate) fn block_current_thread<'a>(&'a self, mut st: StateGuard<'a>) -> StateGuard<'a> {
        kassert!(!st.intr.in_external, "blocking in interrupt context");
        let me = st.threads.current();
        trace!("{} blocks", me);
        st.threads.block_current();
        self.switch_threads(st, me)
    }

    pub(crate) fn yield_current_thread<'a>(&'a self, mut st: StateGuard<'a>) -> StateGuard<'a> {
        kassert!(!st.intr.in_external, "yield in interrupt context");
        let me = st.threads.current();
        st.threads.ready_current();
        self.switch_threads(st, me)
    }

    /// Hands the CPU to the next ready thread and returns once `me` has been
    /// scheduled again. `me` must already be off the CPU (ready or blocked).
    fn switch_threads<'a>(&'a self, mut st: StateGuard<'a>, me: ThreadHandle) -> StateGuard<'a> {
        let level = st.intr.level;
        st.threads.get_mut(me).saved_intr_level = level;

        match st.threads.schedule_next() {
            Some(next) => {
                let level = st.threads.get(next).saved_intr_level;
                st.intr.set_level(level);
                if next != me {
                    trace!("switch {} -> {}", me, next);
                }
            }
            None => {
                let reason = format!(
                    "all {} threads blocked and nothing can wake them",
                    st.threads.blocked_threads()
                );
                self.halt(st, reason);
            }
        }

        self.cpu_handed_over();
        self.wait_for_cpu(st, me)
    }

    fn exit_current_thread(&self) {
        let mut st = self.lock_state();
        let tcb = st.threads.exit_current();
        if !tcb.held_locks.is_empty() {
            warn!(
                "{} `{}' exits holding {:?}",
                tcb.handle, tcb.name, tcb.held_locks
            );
        }
        info!("{} `{}' exiting", tcb.handle, tcb.name);

        match st.threads.schedule_next() {
            Some(next) => {
                let level = st.threads.get(next).saved_intr_level;
                st.intr.set_level(level);
            }
            None if st.threads.blocked_threads() > 0 => {
                let reason = format!(
                    "`{}' exited leaving {} threads blocked with nothing to wake them",
                    tcb.name,
                    st.threads.blocked_threads()
                );
                self.halt(st, reason);
            }
            None => debug!("cpu idle: no threads left"),
        }
        drop(st);
        self.cpu_handed_over();
    }
}

fn describe(tcb: &ThreadControlBlock) -> String {
    let mut out = format!(
        "{} `{}' {:?} priority {} (base {}{}) nice {} recent_cpu {}",
        tcb.handle,
        tcb.name,
        tcb.state,
        tcb.priority,
        tcb.base_priority,
        if tcb.donated { ", donated" } else { "" },
        tcb.nice,
        tcb.recent_cpu,
    );
    if !tcb.held_locks.is_empty() {
        let held: Vec<String> = tcb.held_locks.iter().map(|l| l.to_string()).collect();
        out.push_str(&format!(" holds [{}]", held.join(", ")));
    }
    if let Some(lock) = tcb.blocked_on {
        out.push_str(&format!(" waiting for {}", lock));
    }
    out
}
