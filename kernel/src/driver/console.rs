//! Synchronous console access, one side per direction: readers and writers
//! each take a lock, issue a byte transfer and sleep until the device's
//! completion interrupt releases them.

use std::sync::{Arc, Weak};

use crate::lock::{Semaphore, SleepLock};
use crate::Kernel;

pub struct SynchConsole {
    kernel: Weak<Kernel>,
    read_lock: SleepLock<()>,
    write_lock: SleepLock<()>,
    read_done: Arc<Semaphore>,
    write_done: Arc<Semaphore>,
}

impl SynchConsole {
    pub fn new(kernel: Weak<Kernel>) -> Self {
        Self {
            kernel: kernel.clone(),
            read_lock: SleepLock::new(kernel.clone(), (), "console read"),
            write_lock: SleepLock::new(kernel.clone(), (), "console write"),
            read_done: Arc::new(Semaphore::new(kernel.clone(), "console read done", 0)),
            write_done: Arc::new(Semaphore::new(kernel, "console write done", 0)),
        }
    }

    fn kernel(&self) -> Arc<Kernel> {
        self.kernel.upgrade().expect("console outlived the kernel")
    }

    /// Fill `buf` from console input; returns how many bytes arrived
    /// before the input ran dry.
    pub fn get_string(&self, buf: &mut [u8]) -> usize {
        let kernel = self.kernel();
        let guard = self.read_lock.lock();
        let mut read = 0;
        for slot in buf.iter_mut() {
            if !kernel.machine.console.has_input() {
                break;
            }
            let done = self.read_done.clone();
            kernel
                .machine
                .console
                .get_request(&kernel.interrupt, Box::new(move || done.v()));
            self.read_done.p();
            match kernel.machine.console.pop_byte() {
                Some(byte) => {
                    *slot = byte;
                    read += 1;
                }
                None => break,
            }
        }
        drop(guard);
        read
    }

    /// Write `buf` to console output; returns the byte count.
    pub fn put_string(&self, buf: &[u8]) -> usize {
        let kernel = self.kernel();
        let guard = self.write_lock.lock();
        for &byte in buf {
            let done = self.write_done.clone();
            kernel
                .machine
                .console
                .put_request(byte, &kernel.interrupt, Box::new(move || done.v()));
            self.write_done.p();
        }
        drop(guard);
        buf.len()
    }
}
