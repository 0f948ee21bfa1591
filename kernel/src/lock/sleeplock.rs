use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Weak};

use spin::Mutex;

use super::Semaphore;
use crate::Kernel;

/// Mutual-exclusion lock that suspends the caller while the lock is held
/// elsewhere. One owner at a time; acquiring it twice from the same thread
/// or releasing it from a non-owner is a kernel bug.
pub struct SleepLock<T: ?Sized> {
    kernel: Weak<Kernel>,
    name: &'static str,
    sem: Semaphore,
    owner: Mutex<Option<usize>>,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Sync for SleepLock<T> {}
unsafe impl<T: ?Sized + Send> Send for SleepLock<T> {}

impl<T> SleepLock<T> {
    pub fn new(kernel: Weak<Kernel>, data: T, name: &'static str) -> Self {
        Self {
            kernel: kernel.clone(),
            name,
            sem: Semaphore::new(kernel, name, 1),
            owner: Mutex::new(None),
            data: UnsafeCell::new(data),
        }
    }
}

impl<T: ?Sized> SleepLock<T> {
    fn kernel(&self) -> Arc<Kernel> {
        self.kernel.upgrade().expect("sleeplock outlived the kernel")
    }

    pub fn lock(&self) -> SleepLockGuard<'_, T> {
        let kernel = self.kernel();
        let me = kernel.cpu.current().pid();
        assert!(
            *self.owner.lock() != Some(me),
            "sleeplock {}: recursive acquire",
            self.name
        );
        self.sem.p();
        *self.owner.lock() = Some(me);
        SleepLockGuard {
            lock: self,
            data: unsafe { &mut *self.data.get() },
        }
    }

    /// Called by the guard when dropped.
    fn unlock(&self) {
        let kernel = self.kernel();
        let me = kernel.cpu.current().pid();
        {
            let mut owner = self.owner.lock();
            assert_eq!(*owner, Some(me), "sleeplock {}: released by non-owner", self.name);
            *owner = None;
        }
        self.sem.v();
    }
}

pub struct SleepLockGuard<'a, T: ?Sized + 'a> {
    lock: &'a SleepLock<T>,
    data: &'a mut T,
}

impl<'a, T: ?Sized> SleepLockGuard<'a, T> {
    pub(crate) fn sleeplock(&self) -> &'a SleepLock<T> {
        self.lock
    }
}

impl<'a, T: ?Sized> Deref for SleepLockGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &*self.data
    }
}

impl<'a, T: ?Sized> DerefMut for SleepLockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut *self.data
    }
}

impl<'a, T: ?Sized> Drop for SleepLockGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}
