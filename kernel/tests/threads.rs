//! Thread system: scheduling bands, join semantics and the blocking
//! primitives.

use std::sync::Arc;

use kernel::lock::{Condition, Semaphore, SleepLock};
use kernel::process::{Thread, ThreadStatus};
use kernel::{BootArgs, Kernel};

fn boot() -> Arc<Kernel> {
    Kernel::boot(BootArgs::default())
}

#[test]
fn priority_bands_run_high_to_low() {
    let kernel = boot();
    let order = Arc::new(spin::Mutex::new(Vec::new()));

    let mut threads = Vec::new();
    for (name, priority) in [("low", 5), ("mid", 20), ("high", 25)] {
        let thread = Thread::new(&kernel, name, true);
        thread.set_priority(priority);
        let order = order.clone();
        thread.fork(move |_| {
            order.lock().push(priority);
        });
        threads.push(thread);
    }
    for thread in &threads {
        thread.join().unwrap();
    }
    assert_eq!(*order.lock(), vec![25, 20, 5]);
}

#[test]
fn join_collects_exit_code_once() {
    let kernel = boot();
    let child = Thread::new(&kernel, "child", true);
    child.fork(|k| k.finish_current(7));

    assert_eq!(child.join().unwrap(), 7);
    assert!(child.join().is_err());
    assert!(!kernel.procs.has_key(child.pid()));
}

#[test]
fn join_requires_the_join_flag() {
    let kernel = boot();
    let child = Thread::new(&kernel, "loner", false);
    child.fork(|_| {});
    assert!(child.join().is_err());
    kernel.yield_now();
    assert_eq!(child.status(), ThreadStatus::Finished);
}

#[test]
fn finished_thread_leaves_the_process_table() {
    let kernel = boot();
    let child = Thread::new(&kernel, "worker", false);
    let pid = child.pid();
    assert!(!kernel.procs.has_key(pid));
    child.fork(|_| {});
    assert!(kernel.procs.has_key(pid));
    kernel.yield_now();
    assert!(!kernel.procs.has_key(pid));
}

#[test]
fn pids_are_monotonic() {
    let kernel = boot();
    let a = Thread::new(&kernel, "a", false);
    let b = Thread::new(&kernel, "b", false);
    assert!(a.pid() > 0);
    assert!(b.pid() > a.pid());
}

#[test]
fn yield_with_empty_ready_set_is_a_no_op() {
    let kernel = boot();
    kernel.yield_now();
    assert_eq!(kernel.cpu.current().name(), "main");
}

#[test]
fn semaphore_blocks_until_v() {
    let kernel = boot();
    let sem = Arc::new(Semaphore::new(Arc::downgrade(&kernel), "gate", 0));

    let child = Thread::new(&kernel, "poster", true);
    let child_sem = sem.clone();
    child.fork(move |_| child_sem.v());

    // Blocks until the child runs and posts.
    sem.p();
    child.join().unwrap();
}

#[test]
fn sleeplock_excludes_a_second_holder() {
    let kernel = boot();
    let counter = Arc::new(SleepLock::new(Arc::downgrade(&kernel), 0u32, "counter"));

    let mut workers = Vec::new();
    for name in ["w1", "w2"] {
        let worker = Thread::new(&kernel, name, true);
        let counter = counter.clone();
        worker.fork(move |k| {
            let mut guard = counter.lock();
            let seen = *guard;
            // Give the other worker a chance to barge in while we hold it.
            k.yield_now();
            *guard = seen + 1;
        });
        workers.push(worker);
    }
    for worker in &workers {
        worker.join().unwrap();
    }
    assert_eq!(*counter.lock(), 2);
}

#[test]
#[should_panic(expected = "recursive acquire")]
fn recursive_sleeplock_is_fatal() {
    let kernel = boot();
    let lock = SleepLock::new(Arc::downgrade(&kernel), (), "once");
    let _first = lock.lock();
    let _second = lock.lock();
}

#[test]
fn condition_hands_items_to_the_waiter() {
    let kernel = boot();
    let queue = Arc::new(SleepLock::new(Arc::downgrade(&kernel), Vec::new(), "queue"));
    let items = Arc::new(Condition::new(Arc::downgrade(&kernel), "items"));

    let producer = Thread::new(&kernel, "producer", true);
    let producer_queue = queue.clone();
    let producer_items = items.clone();
    producer.fork(move |_| {
        let mut guard = producer_queue.lock();
        guard.push(42u32);
        producer_items.signal();
    });

    let mut guard = queue.lock();
    while guard.is_empty() {
        guard = items.wait(guard);
    }
    assert_eq!(guard.pop(), Some(42));
    drop(guard);
    producer.join().unwrap();
}

#[test]
fn broadcast_wakes_every_joiner() {
    let kernel = boot();
    let child = Thread::new(&kernel, "shared", true);
    let watcher = Thread::new(&kernel, "watcher", true);
    let seen = Arc::new(spin::Mutex::new(None));

    let watched = child.clone();
    let watcher_seen = seen.clone();
    watcher.fork(move |_| {
        // This thread and main wait on the same exit value.
        watcher_seen.lock().replace(watched.join().unwrap());
    });
    child.fork(|k| k.finish_current(3));

    assert_eq!(child.join().unwrap(), 3);
    assert_eq!(watcher.join().unwrap(), 0);
    assert_eq!(*seen.lock(), Some(3));
}
