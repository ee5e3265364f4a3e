mod common;

use cadence_kernel::thread::tcb::ThreadState;
use cadence_kernel::thread::{PRI_DEFAULT, PRI_MIN};
use cadence_kernel::SchedMode;
use common::{boot, Events};

#[test]
fn waiter_donates_to_holder_until_release() {
    let kernel = boot(SchedMode::Priority);
    let lock = kernel.lock_create();
    let events = Events::default();
    let main = kernel.current_thread();

    kernel.lock_acquire(lock);
    assert!(kernel.lock_held_by_current_thread(lock));

    let e = events.clone();
    let high = kernel.spawn("high", 40, move |k| {
        k.lock_acquire(lock);
        e.push("high got the lock");
        k.lock_release(lock);
    });

    let info = kernel.thread_info(main).unwrap();
    assert_eq!(info.priority, 40);
    assert_eq!(info.base_priority, PRI_DEFAULT);
    assert!(info.donated);
    assert_eq!(info.held_locks, [lock]);

    let waiter = kernel.thread_info(high).unwrap();
    assert_eq!(waiter.state, ThreadState::Blocked);
    assert_eq!(waiter.blocked_on, Some(lock));

    kernel.lock_release(lock);
    assert_eq!(events.take(), ["high got the lock"]);
    assert_eq!(kernel.thread_get_priority(), PRI_DEFAULT);
    assert!(!kernel.thread_info(main).unwrap().donated);
    assert_eq!(kernel.lock_holder(lock), None);
    kernel.lock_destroy(lock);
}

#[test]
fn lower_priority_waiter_does_not_donate() {
    let kernel = boot(SchedMode::Priority);
    let lock = kernel.lock_create();
    let go = kernel.sema_create(0);

    kernel.lock_acquire(lock);
    let low = kernel.spawn("low", PRI_DEFAULT - 5, move |k| {
        k.lock_acquire(lock);
        k.lock_release(lock);
    });
    kernel.spawn("waker", PRI_MIN + 10, move |k| k.sema_up(go));

    // `low` runs into the lock, then `waker` brings us back.
    kernel.sema_down(go);

    assert_eq!(kernel.thread_info(low).unwrap().blocked_on, Some(lock));
    assert_eq!(kernel.thread_get_priority(), PRI_DEFAULT);
    assert!(!kernel.thread_info(kernel.current_thread()).unwrap().donated);
    kernel.lock_release(lock);
}

#[test]
fn release_keeps_donations_from_other_locks() {
    let kernel = boot(SchedMode::Priority);
    let a = kernel.lock_create();
    let b = kernel.lock_create();
    let events = Events::default();

    kernel.lock_acquire(a);
    kernel.lock_acquire(b);

    for (name, priority, lock) in [("a-waiter", 35, a), ("b-waiter", 40, b)] {
        let e = events.clone();
        kernel.spawn(name, priority, move |k| {
            k.lock_acquire(lock);
            e.push(k.thread_name());
            k.lock_release(lock);
        });
    }
    assert_eq!(kernel.thread_get_priority(), 40);

    kernel.lock_release(b);
    assert_eq!(events.take(), ["b-waiter"]);
    assert_eq!(kernel.thread_get_priority(), 35);

    kernel.lock_release(a);
    assert_eq!(events.take(), ["a-waiter"]);
    assert_eq!(kernel.thread_get_priority(), PRI_DEFAULT);
}

#[test]
fn donation_follows_chains_of_locks() {
    let kernel = boot(SchedMode::Priority);
    let a = kernel.lock_create();
    let b = kernel.lock_create();
    let events = Events::default();
    let main = kernel.current_thread();

    kernel.lock_acquire(a);

    let e = events.clone();
    let medium = kernel.spawn("medium", PRI_DEFAULT + 1, move |k| {
        k.lock_acquire(b);
        k.lock_acquire(a);
        e.push(format!("medium at {}", k.thread_get_priority()));
        k.lock_release(a);
        k.lock_release(b);
        e.push(format!("medium done at {}", k.thread_get_priority()));
    });
    assert_eq!(kernel.thread_get_priority(), PRI_DEFAULT + 1);

    let e = events.clone();
    kernel.spawn("high", PRI_DEFAULT + 2, move |k| {
        k.lock_acquire(b);
        e.push("high got b");
        k.lock_release(b);
    });

    assert_eq!(kernel.thread_info(medium).unwrap().priority, PRI_DEFAULT + 2);
    assert_eq!(kernel.thread_info(main).unwrap().priority, PRI_DEFAULT + 2);

    kernel.lock_release(a);
    assert_eq!(
        events.take(),
        ["medium at 33", "high got b", "medium done at 32"]
    );
    assert_eq!(kernel.thread_get_priority(), PRI_DEFAULT);
}

#[test]
fn set_priority_while_donated_changes_only_base() {
    let kernel = boot(SchedMode::Priority);
    let lock = kernel.lock_create();
    kernel.lock_acquire(lock);
    kernel.spawn("donor", 40, move |k| {
        k.lock_acquire(lock);
        k.lock_release(lock);
    });

    kernel.thread_set_priority(20);
    assert_eq!(kernel.thread_get_priority(), 40);
    kernel.thread_set_priority(50);
    assert_eq!(kernel.thread_get_priority(), 50);
    assert!(!kernel.thread_info(kernel.current_thread()).unwrap().donated);
    kernel.thread_set_priority(20);
    assert_eq!(kernel.thread_get_priority(), 40);

    kernel.lock_release(lock);
    assert_eq!(kernel.thread_get_priority(), 20);
}

#[test]
fn try_acquire_never_sleeps() {
    let kernel = boot(SchedMode::Priority);
    let lock = kernel.lock_create();
    let go = kernel.sema_create(0);

    kernel.spawn("owner", 40, move |k| {
        k.lock_acquire(lock);
        k.sema_down(go);
        k.lock_release(lock);
    });
    assert!(!kernel.lock_held_by_current_thread(lock));
    assert!(!kernel.lock_try_acquire(lock));

    kernel.sema_up(go);
    assert_eq!(kernel.lock_holder(lock), None);
    assert!(kernel.lock_try_acquire(lock));
    assert_eq!(kernel.lock_holder(lock), Some(kernel.current_thread()));
    kernel.lock_release(lock);
}

#[test]
fn mlfqs_tracks_waiters_but_never_donates() {
    let kernel = boot(SchedMode::Mlfqs);
    let lock = kernel.lock_create();
    let events = Events::default();
    let main = kernel.current_thread();

    kernel.thread_set_nice(20);
    let low_priority = kernel.thread_get_priority();
    kernel.lock_acquire(lock);

    let e = events.clone();
    let eager = kernel.spawn("eager", PRI_DEFAULT, move |k| {
        k.thread_set_nice(0);
        k.lock_acquire(lock);
        e.push("eager got the lock");
        k.lock_release(lock);
    });
    kernel.thread_yield();

    let waiter = kernel.thread_info(eager).unwrap();
    assert_eq!(waiter.blocked_on, Some(lock));
    assert!(waiter.priority > low_priority);

    let info = kernel.thread_info(main).unwrap();
    assert_eq!(info.priority, low_priority);
    assert!(!info.donated);

    kernel.lock_release(lock);
    assert!(events.take().is_empty());
    kernel.thread_yield();
    assert_eq!(events.take(), ["eager got the lock"]);
}

#[test]
#[should_panic(expected = "already holds")]
fn locks_are_not_recursive() {
    let kernel = boot(SchedMode::Priority);
    let lock = kernel.lock_create();
    kernel.lock_acquire(lock);
    kernel.lock_acquire(lock);
}

#[test]
#[should_panic(expected = "releasing")]
fn releasing_a_free_lock_is_fatal() {
    let kernel = boot(SchedMode::Priority);
    let lock = kernel.lock_create();
    kernel.lock_release(lock);
}

#[test]
#[should_panic(expected = "releasing")]
fn releasing_another_threads_lock_is_fatal() {
    let kernel = boot(SchedMode::Priority);
    let lock = kernel.lock_create();
    let go = kernel.sema_create(0);
    kernel.spawn("owner", 40, move |k| {
        k.lock_acquire(lock);
        k.sema_down(go);
    });
    kernel.lock_release(lock);
}

#[test]
#[should_panic(expected = "in interrupt context")]
fn acquire_in_interrupt_context_is_fatal() {
    let kernel = boot(SchedMode::Priority);
    let lock = kernel.lock_create();
    kernel.interrupt("bad", |k| k.lock_acquire(lock));
}

#[test]
#[should_panic(expected = "destroying")]
fn destroying_a_held_lock_is_fatal() {
    let kernel = boot(SchedMode::Priority);
    let lock = kernel.lock_create();
    kernel.lock_acquire(lock);
    kernel.lock_destroy(lock);
}
