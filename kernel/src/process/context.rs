use std::sync::{Condvar, Mutex};

/// Run gate of one logical thread. The kernel multiplexes its threads over
/// host threads cooperatively: exactly one gate is open at any instant, so
/// `resume` hands the processor to another thread and `wait` parks the
/// caller until the processor is handed back. `wait` does not return until
/// some other thread resumes the waiter.
pub struct Context {
    running: Mutex<bool>,
    cond: Condvar,
}

impl Context {
    pub fn new() -> Self {
        Self {
            running: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Open the gate: the owning thread may run.
    pub fn resume(&self) {
        let mut running = self.running.lock().unwrap();
        *running = true;
        self.cond.notify_one();
    }

    /// Park until the gate opens, then close it again.
    pub fn wait(&self) {
        let mut running = self.running.lock().unwrap();
        while !*running {
            running = self.cond.wait(running).unwrap();
        }
        *running = false;
    }
}
