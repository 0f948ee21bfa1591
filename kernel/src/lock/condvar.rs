use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use spin::Mutex;

use super::{SleepLock, SleepLockGuard};
use crate::machine::interrupt::IntStatus;
use crate::process::Thread;
use crate::Kernel;

/// Condition variable with Mesa semantics: a woken waiter re-acquires the
/// lock and must re-test its predicate.
pub struct Condition {
    kernel: Weak<Kernel>,
    name: &'static str,
    queue: Mutex<VecDeque<Arc<Thread>>>,
}

impl Condition {
    pub fn new(kernel: Weak<Kernel>, name: &'static str) -> Self {
        Self {
            kernel,
            name,
            queue: Mutex::new(VecDeque::new()),
        }
    }

    fn kernel(&self) -> Arc<Kernel> {
        self.kernel.upgrade().expect("condition outlived the kernel")
    }

    /// Atomically release the lock and sleep; the lock is held again when
    /// this returns.
    pub fn wait<'a, T>(&self, guard: SleepLockGuard<'a, T>) -> SleepLockGuard<'a, T> {
        let kernel = self.kernel();
        let lock: &'a SleepLock<T> = guard.sleeplock();
        let old = kernel.interrupt.set_level(IntStatus::Off);
        let current = kernel.cpu.current();
        log::trace!(target: "synch", "{} waits on condition {}", current.name(), self.name);
        self.queue.lock().push_back(current);
        drop(guard);
        kernel.sleep_current();
        kernel.interrupt.set_level(old);
        lock.lock()
    }

    /// Wake one waiter, if any.
    pub fn signal(&self) {
        let kernel = self.kernel();
        let old = kernel.interrupt.set_level(IntStatus::Off);
        if let Some(thread) = self.queue.lock().pop_front() {
            kernel.scheduler.ready_to_run(thread);
        }
        kernel.interrupt.set_level(old);
    }

    /// Wake every waiter.
    pub fn broadcast(&self) {
        let kernel = self.kernel();
        let old = kernel.interrupt.set_level(IntStatus::Off);
        let mut queue = self.queue.lock();
        while let Some(thread) = queue.pop_front() {
            kernel.scheduler.ready_to_run(thread);
        }
        drop(queue);
        kernel.interrupt.set_level(old);
    }
}
