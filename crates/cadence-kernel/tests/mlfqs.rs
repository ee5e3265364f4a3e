mod common;

use cadence_kernel::thread::{PRI_DEFAULT, PRI_MAX, TIME_SLICE, TIMER_FREQ};
use cadence_kernel::SchedMode;
use common::{boot, Events};

#[test]
fn boots_at_top_priority() {
    let kernel = boot(SchedMode::Mlfqs);
    assert_eq!(kernel.mode(), SchedMode::Mlfqs);
    assert_eq!(kernel.thread_get_priority(), PRI_MAX);
    assert_eq!(kernel.thread_get_load_avg(), 0);
    assert_eq!(kernel.thread_get_recent_cpu(), 0);
}

#[test]
fn priority_is_recomputed_every_fourth_tick() {
    let kernel = boot(SchedMode::Mlfqs);
    for _ in 0..3 {
        kernel.timer_interrupt();
    }
    assert_eq!(kernel.thread_get_recent_cpu(), 300);
    assert_eq!(kernel.thread_get_priority(), PRI_MAX);

    kernel.timer_interrupt();
    assert_eq!(kernel.thread_get_recent_cpu(), 400);
    assert_eq!(kernel.thread_get_priority(), PRI_MAX - 1);
    assert_eq!(kernel.timer_ticks(), 4);
}

#[test]
fn load_avg_and_recent_cpu_decay_once_a_second() {
    let kernel = boot(SchedMode::Mlfqs);
    for _ in 0..TIMER_FREQ - 1 {
        kernel.timer_interrupt();
    }
    assert_eq!(kernel.thread_get_load_avg(), 0);
    assert_eq!(kernel.thread_get_recent_cpu(), 9900);

    kernel.timer_interrupt();
    // load_avg = 1/60; recent_cpu = 100 * (2/60) / (2/60 + 1).
    assert_eq!(kernel.thread_get_load_avg(), 2);
    assert_eq!(kernel.thread_get_recent_cpu(), 322);
    assert_eq!(kernel.thread_get_priority(), PRI_MAX - 1);
}

#[test]
fn set_priority_is_ignored() {
    let kernel = boot(SchedMode::Mlfqs);
    kernel.thread_set_priority(10);
    assert_eq!(kernel.thread_get_priority(), PRI_MAX);
}

#[test]
fn nice_applies_immediately_and_is_inherited() {
    let kernel = boot(SchedMode::Mlfqs);
    kernel.thread_set_nice(3);
    assert_eq!(kernel.thread_get_nice(), 3);
    assert_eq!(kernel.thread_get_priority(), PRI_MAX - 6);

    let child = kernel.spawn("child", PRI_DEFAULT, |_| {});
    let info = kernel.thread_info(child).unwrap();
    assert_eq!(info.nice, 3);
    assert_eq!(info.priority, PRI_MAX - 6);
    assert_eq!(info.base_priority, PRI_MAX - 6);
}

#[test]
fn raising_nice_yields_to_a_stronger_thread() {
    let kernel = boot(SchedMode::Mlfqs);
    let events = Events::default();

    let e = events.clone();
    kernel.spawn("peer", PRI_DEFAULT, move |_| e.push("peer ran"));
    assert!(events.take().is_empty());

    kernel.thread_set_nice(20);
    assert_eq!(events.take(), ["peer ran"]);
    assert_eq!(kernel.thread_get_priority(), PRI_MAX - 40);
}

#[test]
fn time_slice_rotates_equal_priorities() {
    let kernel = boot(SchedMode::Priority);
    let events = Events::default();

    let e = events.clone();
    kernel.spawn("peer", PRI_DEFAULT, move |_| e.push("peer ran"));

    for _ in 1..TIME_SLICE {
        kernel.timer_interrupt();
    }
    assert!(events.take().is_empty());

    kernel.timer_interrupt();
    assert_eq!(events.take(), ["peer ran"]);
}

#[test]
fn strict_mode_keeps_formulas_out() {
    let kernel = boot(SchedMode::Priority);
    for _ in 0..TIMER_FREQ {
        kernel.timer_interrupt();
    }
    assert_eq!(kernel.thread_get_priority(), PRI_DEFAULT);
    assert_eq!(kernel.thread_get_recent_cpu(), 0);
    assert_eq!(kernel.thread_get_load_avg(), 0);
}
