use std::collections::VecDeque;
use std::sync::Arc;

use spin::Mutex;

use super::thread::{Thread, ThreadStatus};
use crate::define::param::DEFAULT_PRIORITY;
use crate::Kernel;

/// The ready set: three sequences indexed by priority band. High band
/// first on selection; inside a band threads stay sorted by priority with
/// ties in arrival order.
pub struct Scheduler {
    ready: Mutex<[VecDeque<Arc<Thread>>; 3]>,
}

fn band(priority: usize) -> usize {
    if priority < DEFAULT_PRIORITY {
        0
    } else if priority == DEFAULT_PRIORITY {
        1
    } else {
        2
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            ready: Mutex::new([VecDeque::new(), VecDeque::new(), VecDeque::new()]),
        }
    }

    /// Mark a thread ready and queue it for the CPU. Interrupts must be
    /// off.
    pub fn ready_to_run(&self, thread: Arc<Thread>) {
        let priority = thread.priority();
        log::trace!(target: "scheduler", "readying {} at priority {}", thread.name(), priority);
        thread.set_status(ThreadStatus::Ready);
        let mut ready = self.ready.lock();
        let queue = &mut ready[band(priority)];
        let at = queue
            .iter()
            .position(|t| t.priority() > priority)
            .unwrap_or(queue.len());
        queue.insert(at, thread);
    }

    /// Remove and return the next thread to run, or `None` if every thread
    /// is blocked. Interrupts must be off.
    pub fn find_next_to_run(&self) -> Option<Arc<Thread>> {
        let mut ready = self.ready.lock();
        for b in (0..3).rev() {
            if let Some(thread) = ready[b].pop_front() {
                return Some(thread);
            }
        }
        None
    }

    #[cfg(test)]
    fn ready_len(&self) -> usize {
        self.ready.lock().iter().map(|q| q.len()).sum()
    }

    /// Dispatch the CPU to `next`. The caller has already moved the
    /// current thread to whatever state it belongs in (ready, blocked or
    /// finished); this returns only when the caller is scheduled again.
    pub fn run(&self, kernel: &Kernel, next: Arc<Thread>) {
        assert!(kernel.interrupt.is_off(), "scheduler: dispatch with interrupts enabled");
        let old = kernel.cpu.current();

        if old.has_space() {
            old.save_user_state(&kernel.machine);
        }

        next.set_status(ThreadStatus::Running);
        log::trace!(target: "scheduler", "switching from {} to {}", old.name(), next.name());
        kernel.cpu.set_current(next.clone());
        next.context.resume();
        old.context.wait();

        // Back on `old`'s stack. If the thread we switched away from was
        // finishing, its carcass can be dropped now that we no longer run
        // on it.
        kernel.cpu.reap();
        if old.has_space() {
            old.restore_user_state(&kernel.machine);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BootArgs, Kernel};

    #[test]
    fn selection_scans_bands_high_to_low() {
        let kernel = Kernel::boot(BootArgs::default());
        for priority in [5usize, 20, 25] {
            let thread = Thread::new(&kernel, "t", false);
            thread.set_priority(priority);
            kernel.scheduler.ready_to_run(thread);
        }
        let order: Vec<usize> = (0..3)
            .map(|_| kernel.scheduler.find_next_to_run().unwrap().priority())
            .collect();
        assert_eq!(order, vec![25, 20, 5]);
        assert!(kernel.scheduler.find_next_to_run().is_none());
        assert_eq!(kernel.scheduler.ready_len(), 0);
    }

    #[test]
    fn equal_priorities_keep_arrival_order() {
        let kernel = Kernel::boot(BootArgs::default());
        for name in ["first", "second", "third"] {
            let thread = Thread::new(&kernel, name, false);
            thread.set_priority(30);
            kernel.scheduler.ready_to_run(thread);
        }
        let order: Vec<String> = (0..3)
            .map(|_| kernel.scheduler.find_next_to_run().unwrap().name().to_string())
            .collect();
        assert_eq!(order, vec!["first", "second", "third"]);
    }

    #[test]
    fn sorted_insert_uses_the_priority_as_key() {
        let kernel = Kernel::boot(BootArgs::default());
        for priority in [29usize, 27, 28] {
            let thread = Thread::new(&kernel, "t", false);
            thread.set_priority(priority);
            kernel.scheduler.ready_to_run(thread);
        }
        // One band; ordered by the insertion key, not arrival.
        let order: Vec<usize> = (0..3)
            .map(|_| kernel.scheduler.find_next_to_run().unwrap().priority())
            .collect();
        assert_eq!(order, vec![27, 28, 29]);
    }
}
