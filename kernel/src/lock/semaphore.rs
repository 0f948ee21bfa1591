use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use spin::Mutex;

use crate::machine::interrupt::IntStatus;
use crate::process::Thread;
use crate::Kernel;

/// Counting semaphore. `p` waits for a positive count and decrements it;
/// `v` increments and wakes at most one waiter.
pub struct Semaphore {
    kernel: Weak<Kernel>,
    name: &'static str,
    count: Mutex<usize>,
    queue: Mutex<VecDeque<Arc<Thread>>>,
}

impl Semaphore {
    pub fn new(kernel: Weak<Kernel>, name: &'static str, count: usize) -> Self {
        Self {
            kernel,
            name,
            count: Mutex::new(count),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub(crate) fn kernel(&self) -> Arc<Kernel> {
        self.kernel.upgrade().expect("semaphore outlived the kernel")
    }

    pub fn p(&self) {
        let kernel = self.kernel();
        let old = kernel.interrupt.set_level(IntStatus::Off);
        loop {
            {
                let mut count = self.count.lock();
                if *count > 0 {
                    *count -= 1;
                    break;
                }
            }
            let current = kernel.cpu.current();
            log::trace!(target: "synch", "{} blocks on semaphore {}", current.name(), self.name);
            self.queue.lock().push_back(current);
            kernel.sleep_current();
        }
        kernel.interrupt.set_level(old);
    }

    pub fn v(&self) {
        let kernel = self.kernel();
        let old = kernel.interrupt.set_level(IntStatus::Off);
        *self.count.lock() += 1;
        if let Some(thread) = self.queue.lock().pop_front() {
            kernel.scheduler.ready_to_run(thread);
        }
        kernel.interrupt.set_level(old);
    }
}
