//! Simulated interrupt hardware: a single enable level plus a queue of
//! device completions. A device finishes a transfer by scheduling a
//! handler here; the handler fires the next time interrupts come back on,
//! or when the machine idles waiting for something to happen.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use spin::Mutex;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum IntStatus {
    Off,
    On,
}

type Handler = Box<dyn FnOnce() + Send>;

pub struct Interrupt {
    level: Mutex<IntStatus>,
    pending: Mutex<VecDeque<Handler>>,
    halted: AtomicBool,
}

impl Interrupt {
    pub fn new() -> Self {
        Self {
            level: Mutex::new(IntStatus::On),
            pending: Mutex::new(VecDeque::new()),
            halted: AtomicBool::new(false),
        }
    }

    /// Change the interrupt level and return the previous one. Turning
    /// interrupts back on delivers any pending device completions.
    pub fn set_level(&self, new: IntStatus) -> IntStatus {
        let old = {
            let mut level = self.level.lock();
            let old = *level;
            *level = new;
            old
        };
        if new == IntStatus::On {
            self.deliver_pending();
        }
        old
    }

    pub fn level(&self) -> IntStatus {
        *self.level.lock()
    }

    pub fn is_off(&self) -> bool {
        self.level() == IntStatus::Off
    }

    /// Queue a device completion handler.
    pub fn schedule(&self, handler: Handler) {
        self.pending.lock().push_back(handler);
    }

    /// Called with interrupts off when no thread is ready to run: deliver
    /// pending completions so a sleeping thread can be woken. If nothing is
    /// pending the machine can make no further progress.
    pub fn idle(&self) {
        assert!(self.is_off(), "interrupt: idle with interrupts enabled");
        if self.pending.lock().is_empty() {
            panic!("no threads ready and no pending interrupts: machine deadlocked");
        }
        self.fire_pending();
    }

    /// Halt the machine. Latched; observed by the user-program run loop.
    pub fn halt(&self) {
        log::debug!(target: "machine", "machine halting");
        self.halted.store(true, Ordering::SeqCst);
    }

    pub fn halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Handlers always run with interrupts off, as on the real machine.
    fn deliver_pending(&self) {
        loop {
            let handler = self.pending.lock().pop_front();
            match handler {
                Some(h) => {
                    *self.level.lock() = IntStatus::Off;
                    h();
                    *self.level.lock() = IntStatus::On;
                }
                None => break,
            }
        }
    }

    fn fire_pending(&self) {
        loop {
            let handler = self.pending.lock().pop_front();
            match handler {
                Some(h) => h(),
                None => break,
            }
        }
    }
}
