//! A teaching kernel on a simulated machine: a cooperative thread system
//! with a banded priority scheduler, a file system over a simulated
//! sector disk, and the system-call layer gluing simulated user mode to
//! both.
//!
//! Everything process-wide lives in [`Kernel`], built once by
//! [`Kernel::boot`] and handed around explicitly. The host thread that
//! boots the kernel becomes its first thread; further threads are forked
//! through [`process::Thread`] and multiplexed cooperatively, one running
//! at a time.

pub mod define;
pub mod driver;
pub mod fs;
pub mod lock;
pub mod machine;
pub mod memory;
pub mod process;
pub mod syscall;
pub mod trap;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use spin::{Mutex, Once};

use define::param::NUM_PHYS_PAGES;
use driver::{SynchConsole, SynchDisk};
use fs::{Bitmap, FileSystem};
use machine::interrupt::Interrupt;
use machine::Machine;
use process::{Cpu, ProcTable, Scheduler, Thread, ThreadStatus};

/// Boot configuration.
pub struct BootArgs {
    /// Format the disk instead of expecting an existing file system.
    pub format: bool,
    /// Seed the disk from a snapshotted image.
    pub disk_image: Option<Vec<u8>>,
    /// Bytes available on console input.
    pub console_input: Vec<u8>,
}

impl Default for BootArgs {
    fn default() -> Self {
        Self {
            format: true,
            disk_image: None,
            console_input: Vec::new(),
        }
    }
}

/// The explicit kernel context: machine, devices, thread system and file
/// system. One per simulated machine.
pub struct Kernel {
    pub machine: Machine,
    pub interrupt: Interrupt,
    pub cpu: Cpu,
    pub scheduler: Scheduler,
    pub procs: ProcTable,
    pub disk: SynchDisk,
    pub console: SynchConsole,
    /// Physical frame allocator for user address spaces.
    pub frames: Mutex<Bitmap>,
    filesys: Once<Arc<FileSystem>>,
    next_pid: AtomicUsize,
}

impl Kernel {
    /// Bring up the machine, the thread system and the file system. The
    /// calling host thread becomes the kernel's first thread.
    pub fn boot(args: BootArgs) -> Arc<Kernel> {
        let kernel = Arc::new_cyclic(|weak: &Weak<Kernel>| Kernel {
            machine: Machine::new(args.disk_image, args.console_input),
            interrupt: Interrupt::new(),
            cpu: Cpu::new(),
            scheduler: Scheduler::new(),
            procs: ProcTable::new(),
            disk: SynchDisk::new(weak.clone()),
            console: SynchConsole::new(weak.clone()),
            frames: Mutex::new(Bitmap::new(NUM_PHYS_PAGES)),
            filesys: Once::new(),
            next_pid: AtomicUsize::new(1),
        });

        let main = Thread::new(&kernel, "main", false);
        main.set_status(ThreadStatus::Running);
        kernel.cpu.set_current(main.clone());
        kernel.procs.add(main);

        let filesys = FileSystem::new(&kernel, args.format);
        kernel.filesys.call_once(|| filesys);
        log::debug!(target: "kernel", "kernel is up");
        kernel
    }

    pub fn fs(&self) -> &Arc<FileSystem> {
        self.filesys.get().expect("file system not initialised")
    }

    pub(crate) fn try_fs(&self) -> Option<&Arc<FileSystem>> {
        self.filesys.get()
    }

    pub(crate) fn alloc_pid(&self) -> usize {
        self.next_pid.fetch_add(1, Ordering::Relaxed)
    }
}
