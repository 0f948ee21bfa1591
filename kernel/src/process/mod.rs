//! Threads, the scheduler and the process table.

pub mod context;
pub mod manager;
pub mod scheduler;
pub mod thread;

use std::sync::Arc;

use spin::Mutex;

pub use manager::ProcTable;
pub use scheduler::Scheduler;
pub use thread::{Thread, ThreadStatus};

use crate::machine::interrupt::IntStatus;
use crate::Kernel;

/// The single simulated processor: which thread holds it, and the carcass
/// of a finished thread awaiting destruction after the switch away from
/// its stack.
pub struct Cpu {
    current: Mutex<Option<Arc<Thread>>>,
    to_destroy: Mutex<Option<Arc<Thread>>>,
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
            to_destroy: Mutex::new(None),
        }
    }

    pub fn current(&self) -> Arc<Thread> {
        self.current.lock().clone().expect("no running thread")
    }

    pub(crate) fn set_current(&self, thread: Arc<Thread>) {
        *self.current.lock() = Some(thread);
    }

    pub(crate) fn mark_destroy(&self, thread: Arc<Thread>) {
        let mut slot = self.to_destroy.lock();
        assert!(slot.is_none(), "cpu: destruction slot already taken");
        *slot = Some(thread);
    }

    pub(crate) fn reap(&self) {
        let carcass = self.to_destroy.lock().take();
        drop(carcass);
    }
}

impl Kernel {
    /// Give the CPU away voluntarily; the caller stays ready.
    pub fn yield_now(&self) {
        let old = self.interrupt.set_level(IntStatus::Off);
        if let Some(next) = self.scheduler.find_next_to_run() {
            let current = self.cpu.current();
            log::trace!(target: "scheduler", "{} yields", current.name());
            self.scheduler.ready_to_run(current);
            self.scheduler.run(self, next);
        }
        self.interrupt.set_level(old);
    }

    /// Relinquish the CPU with the current thread already parked on some
    /// wait set. Interrupts must be off. If nothing is ready the machine
    /// idles, delivering pending device interrupts until a thread wakes.
    pub fn sleep_current(&self) {
        assert!(self.interrupt.is_off(), "sleep with interrupts enabled");
        let current = self.cpu.current();
        current.set_status(ThreadStatus::Blocked);
        loop {
            if let Some(next) = self.scheduler.find_next_to_run() {
                self.scheduler.run(self, next);
                return;
            }
            self.interrupt.idle();
        }
    }

    /// End the current thread with `code`. Open descriptors are released,
    /// the exit value is published for joiners, and the thread is flagged
    /// for destruction once another thread runs; it is not safe to free a
    /// stack we are still running on.
    pub fn finish_current(&self, code: i32) {
        let current = self.cpu.current();
        log::debug!(target: "thread", "{} (pid {}) finishing with code {}", current.name(), current.pid(), code);
        current.release_files();
        current.set_space(None);
        current.deposit_exit(code);
        if !current.join_enabled() {
            self.procs.remove(current.pid());
        }

        let _ = self.interrupt.set_level(IntStatus::Off);
        current.set_status(ThreadStatus::Finished);
        self.cpu.mark_destroy(current);
        loop {
            if let Some(next) = self.scheduler.find_next_to_run() {
                self.scheduler.run(self, next);
                unreachable!("finished thread was rescheduled");
            }
            self.interrupt.idle();
        }
    }
}
