//! Process-side system calls.

use std::sync::Arc;

use fs_lib::FILE_NAME_MAX_LEN;

use super::{read_str_from_user, save_args, write_args};
use crate::machine::{ARG1_REG, ARG2_REG};
use crate::memory::AddressSpace;
use crate::process::Thread;
use crate::Kernel;

/// Block until the named process exits; its exit code, or -1.
pub fn sys_join(kernel: &Arc<Kernel>, pid: i32) -> i32 {
    if pid < 0 {
        return -1;
    }
    let Some(thread) = kernel.procs.get(pid as usize) else {
        log::debug!(target: "syscall", "join on unknown pid {}", pid);
        return -1;
    };
    log::debug!(target: "syscall", "joining pid {}", pid);
    thread.join().unwrap_or(-1)
}

/// Spawn a program from the named file on a fresh address space. The
/// child's pid, or -1.
pub fn sys_exec(kernel: &Arc<Kernel>, name_addr: i32, argv_addr: i32, join_flag: i32) -> i32 {
    let Some(name) = read_str_from_user(kernel, name_addr as usize, FILE_NAME_MAX_LEN) else {
        return -1;
    };
    let args = save_args(kernel, argv_addr as usize);
    log::debug!(target: "syscall", "exec `{}` with {} args, join_flag={}", name, args.len(), join_flag);
    let Some(executable) = kernel.fs().open(&name) else {
        return -1;
    };
    let space = match AddressSpace::new(kernel, Some(&executable)) {
        Ok(space) => space,
        Err(err) => {
            log::debug!(target: "syscall", "exec `{}`: {}", name, err);
            return -1;
        }
    };
    drop(executable);

    let child = Thread::new(kernel, &name, join_flag != 0);
    child.set_space(Some(Arc::new(space)));
    let pid = child.pid() as i32;
    child.fork(move |k| run_program(k, &args));
    pid
}

/// First activation of an exec'd program: registers and argument vector
/// in place, then into the machine's run loop.
fn run_program(kernel: &Arc<Kernel>, args: &[String]) {
    let current = kernel.cpu.current();
    let space = current.space().expect("user program without address space");
    space.init_registers(&kernel.machine);
    space.restore_state(&kernel.machine);
    let (argc, argv) = write_args(kernel, args);
    kernel.machine.write_register(ARG1_REG, argc);
    kernel.machine.write_register(ARG2_REG, argv);
    crate::machine::run(kernel);
}
