use std::sync::{Arc, Weak};

use array_macro::array;
use spin::Mutex;

use super::context::Context;
use crate::define::param::{DEFAULT_PRIORITY, NOFILE};
use crate::fs::OpenFile;
use crate::lock::{Condition, SleepLock};
use crate::machine::interrupt::IntStatus;
use crate::machine::{Machine, NUM_TOTAL_REGS};
use crate::memory::AddressSpace;
use crate::Kernel;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ThreadStatus {
    JustCreated,
    Ready,
    Running,
    Blocked,
    Finished,
}

pub(crate) struct JoinState {
    pub exit: Option<i32>,
    pub consumed: bool,
}

/// A kernel thread. Created by `new`, set running by `fork`; everything
/// else about its life is driven through the scheduler.
pub struct Thread {
    kernel: Weak<Kernel>,
    name: String,
    pid: usize,
    join_enabled: bool,
    priority: Mutex<usize>,
    status: Mutex<ThreadStatus>,
    /// Current directory, used to resolve relative paths.
    path: Mutex<String>,
    space: Mutex<Option<Arc<AddressSpace>>>,
    user_regs: Mutex<[i32; NUM_TOTAL_REGS]>,
    files: Mutex<[Option<Arc<OpenFile>>; NOFILE]>,
    join: SleepLock<JoinState>,
    join_cond: Condition,
    pub(crate) context: Context,
}

impl Thread {
    pub fn new(kernel: &Arc<Kernel>, name: &str, join_enabled: bool) -> Arc<Thread> {
        let weak = Arc::downgrade(kernel);
        Arc::new(Thread {
            kernel: weak.clone(),
            name: name.to_string(),
            pid: kernel.alloc_pid(),
            join_enabled,
            priority: Mutex::new(DEFAULT_PRIORITY),
            status: Mutex::new(ThreadStatus::JustCreated),
            path: Mutex::new(String::from("/")),
            space: Mutex::new(None),
            user_regs: Mutex::new([0; NUM_TOTAL_REGS]),
            files: Mutex::new(array![_ => None; NOFILE]),
            join: SleepLock::new(weak.clone(), JoinState { exit: None, consumed: false }, "join"),
            join_cond: Condition::new(weak, "join"),
            context: Context::new(),
        })
    }

    fn kernel(&self) -> Arc<Kernel> {
        self.kernel.upgrade().expect("thread outlived the kernel")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pid(&self) -> usize {
        self.pid
    }

    pub fn join_enabled(&self) -> bool {
        self.join_enabled
    }

    pub fn priority(&self) -> usize {
        *self.priority.lock()
    }

    /// Stable scheduling priority; set it before the thread is forked.
    /// Raising it afterwards does not reorder an already-queued thread.
    pub fn set_priority(&self, priority: usize) {
        *self.priority.lock() = priority;
    }

    pub fn status(&self) -> ThreadStatus {
        *self.status.lock()
    }

    pub(crate) fn set_status(&self, status: ThreadStatus) {
        *self.status.lock() = status;
    }

    /// Current directory of this thread.
    pub fn path(&self) -> String {
        self.path.lock().clone()
    }

    pub fn set_path(&self, path: &str) {
        *self.path.lock() = path.to_string();
    }

    pub fn space(&self) -> Option<Arc<AddressSpace>> {
        self.space.lock().clone()
    }

    pub fn set_space(&self, space: Option<Arc<AddressSpace>>) {
        *self.space.lock() = space;
    }

    pub fn has_space(&self) -> bool {
        self.space.lock().is_some()
    }

    /// Install an open file, returning the smallest free descriptor.
    /// Descriptors 0 and 1 belong to the console.
    pub fn add_file(&self, file: Arc<OpenFile>) -> Option<usize> {
        let mut files = self.files.lock();
        for fd in 2..NOFILE {
            if files[fd].is_none() {
                files[fd] = Some(file);
                return Some(fd);
            }
        }
        None
    }

    pub fn get_file(&self, fd: usize) -> Option<Arc<OpenFile>> {
        self.files.lock().get(fd).cloned().flatten()
    }

    pub fn is_open_file(&self, fd: usize) -> bool {
        fd >= 2 && fd < NOFILE && self.files.lock()[fd].is_some()
    }

    pub fn remove_file(&self, fd: usize) -> Option<Arc<OpenFile>> {
        self.files.lock().get_mut(fd)?.take()
    }

    /// Drop every open descriptor; closing may carry out deferred removes.
    pub(crate) fn release_files(&self) {
        for fd in 2..NOFILE {
            let file = self.files.lock()[fd].take();
            drop(file);
        }
    }

    pub(crate) fn save_user_state(&self, machine: &Machine) {
        *self.user_regs.lock() = machine.save_registers();
        if let Some(space) = self.space() {
            space.save_state();
        }
    }

    pub(crate) fn restore_user_state(&self, machine: &Machine) {
        machine.load_registers(&self.user_regs.lock());
        if let Some(space) = self.space() {
            space.restore_state(machine);
        }
    }

    /// Start the thread: register it with the process table and put it on
    /// the ready set. `f` runs once the scheduler first dispatches it;
    /// returning from `f` finishes the thread with exit value 0.
    pub fn fork<F>(self: &Arc<Self>, f: F)
    where
        F: FnOnce(&Arc<Kernel>) + Send + 'static,
    {
        let kernel = self.kernel();
        assert_eq!(self.status(), ThreadStatus::JustCreated, "thread {} forked twice", self.name);
        log::debug!(target: "thread", "forking {} (pid {}, priority {})", self.name, self.pid, self.priority());
        kernel.procs.add(self.clone());

        let thread = self.clone();
        let weak = self.kernel.clone();
        std::thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                // Parked until the scheduler dispatches us the first time.
                thread.context.wait();
                let kernel = weak.upgrade().expect("thread outlived the kernel");
                kernel.cpu.reap();
                if thread.has_space() {
                    thread.restore_user_state(&kernel.machine);
                }
                kernel.interrupt.set_level(IntStatus::On);
                f(&kernel);
                kernel.finish_current(0);
            })
            .expect("Fail to spawn host thread");

        let old = kernel.interrupt.set_level(IntStatus::Off);
        kernel.scheduler.ready_to_run(self.clone());
        kernel.interrupt.set_level(old);
    }

    /// Block until this thread finishes and collect its exit value. Only
    /// join-enabled threads can be joined, each exit value only once.
    pub fn join(self: &Arc<Self>) -> Result<i32, &'static str> {
        let kernel = self.kernel();
        if !self.join_enabled {
            return Err("thread is not joinable");
        }
        if kernel.cpu.current().pid() == self.pid {
            return Err("thread cannot join itself");
        }
        let mut state = self.join.lock();
        if state.consumed {
            return Err("exit value already consumed");
        }
        while state.exit.is_none() {
            state = self.join_cond.wait(state);
        }
        let value = state.exit.unwrap();
        state.consumed = true;
        drop(state);
        kernel.procs.remove(self.pid);
        Ok(value)
    }

    /// Publish the exit value and wake every joiner.
    pub(crate) fn deposit_exit(&self, code: i32) {
        let mut state = self.join.lock();
        state.exit = Some(code);
        drop(state);
        self.join_cond.broadcast();
    }
}
