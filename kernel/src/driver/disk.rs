//! Synchronous disk access. The simulated disk completes requests through
//! an interrupt; this wrapper issues one request at a time and puts the
//! caller to sleep on a semaphore that the completion interrupt releases.

use std::sync::{Arc, Weak};

use fs_lib::SECTOR_SIZE;

use crate::lock::{Semaphore, SleepLock};
use crate::Kernel;

pub struct SynchDisk {
    kernel: Weak<Kernel>,
    /// Serialises requests: at most one outstanding transfer.
    lock: SleepLock<()>,
    /// V()'d by the disk completion interrupt.
    done: Arc<Semaphore>,
}

impl SynchDisk {
    pub fn new(kernel: Weak<Kernel>) -> Self {
        Self {
            kernel: kernel.clone(),
            lock: SleepLock::new(kernel.clone(), (), "synch disk"),
            done: Arc::new(Semaphore::new(kernel, "disk done", 0)),
        }
    }

    fn kernel(&self) -> Arc<Kernel> {
        self.kernel.upgrade().expect("disk outlived the kernel")
    }

    /// Read `sector` into `data`, waiting for the transfer to finish.
    pub fn read_sector(&self, sector: usize, data: &mut [u8]) {
        let kernel = self.kernel();
        let guard = self.lock.lock();
        let done = self.done.clone();
        kernel
            .machine
            .disk
            .read_request(sector, data, &kernel.interrupt, Box::new(move || done.v()));
        self.done.p();
        drop(guard);
    }

    /// Write `data` to `sector`, waiting for the transfer to finish.
    pub fn write_sector(&self, sector: usize, data: &[u8]) {
        let kernel = self.kernel();
        let guard = self.lock.lock();
        let done = self.done.clone();
        kernel
            .machine
            .disk
            .write_request(sector, data, &kernel.interrupt, Box::new(move || done.v()));
        self.done.p();
        drop(guard);
    }

    /// Overwrite a sector with zeroes.
    pub fn clear_sector(&self, sector: usize) {
        let zeroes = [0u8; SECTOR_SIZE];
        self.write_sector(sector, &zeroes);
    }
}
