//! Simulated console: a byte device with a pre-fed input stream and a
//! captured output stream. Each transfer queues a completion interrupt.

use std::collections::VecDeque;

use spin::Mutex;

use super::interrupt::Interrupt;

pub struct Console {
    input: Mutex<VecDeque<u8>>,
    output: Mutex<Vec<u8>>,
}

impl Console {
    pub fn new(input: Vec<u8>) -> Self {
        Self {
            input: Mutex::new(input.into()),
            output: Mutex::new(Vec::new()),
        }
    }

    pub fn has_input(&self) -> bool {
        !self.input.lock().is_empty()
    }

    /// Ask for the next input byte. The read-done interrupt fires only when
    /// a byte is available; a reader of an exhausted stream waits forever.
    pub fn get_request(&self, interrupt: &Interrupt, done: Box<dyn FnOnce() + Send>) {
        if self.has_input() {
            interrupt.schedule(done);
        }
    }

    /// The byte delivered by the last read-done interrupt.
    pub fn pop_byte(&self) -> Option<u8> {
        self.input.lock().pop_front()
    }

    pub fn put_request(&self, byte: u8, interrupt: &Interrupt, done: Box<dyn FnOnce() + Send>) {
        self.output.lock().push(byte);
        interrupt.schedule(done);
    }

    /// Feed more bytes into the input stream.
    pub fn feed_input(&self, bytes: &[u8]) {
        self.input.lock().extend(bytes.iter().copied());
    }

    /// Drain everything written so far.
    pub fn take_output(&self) -> Vec<u8> {
        std::mem::take(&mut *self.output.lock())
    }
}
