//! The user-mode entry layer: syscall dispatch, argument marshalling,
//! page faults and program spawning.

use std::sync::Arc;

use kernel::define::param::PAGE_SIZE;
use kernel::machine::{
    ExceptionType, ARG1_REG, ARG2_REG, ARG3_REG, BAD_VADDR_REG, NEXT_PC_REG, PC_REG, RET_REG,
};
use kernel::memory::AddressSpace;
use kernel::process::Thread;
use kernel::syscall::{SC_CLOSE, SC_CREATE, SC_EXEC, SC_HALT, SC_JOIN, SC_OPEN, SC_READ, SC_WRITE};
use kernel::{trap, BootArgs, Kernel};

/// Boot a kernel whose first thread runs with a user address space, the
/// way a started process does.
fn boot_user(console_input: &[u8]) -> Arc<Kernel> {
    let kernel = Kernel::boot(BootArgs {
        format: true,
        disk_image: None,
        console_input: console_input.to_vec(),
    });
    let space = AddressSpace::new(&kernel, None).unwrap();
    kernel.cpu.current().set_space(Some(Arc::new(space)));
    kernel
}

/// Store bytes into the current thread's user memory.
fn poke(kernel: &Kernel, addr: usize, bytes: &[u8]) {
    let space = kernel.cpu.current().space().unwrap();
    for (i, &byte) in bytes.iter().enumerate() {
        let pa = space.translate(addr + i, true).unwrap();
        kernel.machine.write_phys_byte(pa, byte);
    }
}

/// Read bytes back out of user memory.
fn peek(kernel: &Kernel, addr: usize, len: usize) -> Vec<u8> {
    let space = kernel.cpu.current().space().unwrap();
    (0..len)
        .map(|i| kernel.machine.read_phys_byte(space.translate(addr + i, false).unwrap()))
        .collect()
}

/// Trap into the kernel the way a user program does.
fn syscall(kernel: &Arc<Kernel>, id: i32, arg1: i32, arg2: i32, arg3: i32) -> i32 {
    kernel.machine.write_register(RET_REG, id);
    kernel.machine.write_register(ARG1_REG, arg1);
    kernel.machine.write_register(ARG2_REG, arg2);
    kernel.machine.write_register(ARG3_REG, arg3);
    trap::handle_exception(kernel, ExceptionType::Syscall);
    kernel.machine.read_register(RET_REG)
}

#[test]
fn create_open_write_read_close() {
    let kernel = boot_user(b"");
    poke(&kernel, 64, b"f\0");
    poke(&kernel, 128, b"syscalls");

    assert_eq!(syscall(&kernel, SC_CREATE, 64, 0, 0), 1);
    let fd = syscall(&kernel, SC_OPEN, 64, 0, 0);
    assert_eq!(fd, 2);
    assert_eq!(syscall(&kernel, SC_WRITE, 128, 8, fd), 8);
    assert_eq!(syscall(&kernel, SC_CLOSE, fd, 0, 0), -1);

    let fd = syscall(&kernel, SC_OPEN, 64, 0, 0);
    assert_eq!(syscall(&kernel, SC_READ, 192, 8, fd), 8);
    assert_eq!(peek(&kernel, 192, 8), b"syscalls");
}

#[test]
fn the_pc_advances_past_a_syscall() {
    let kernel = boot_user(b"");
    kernel.machine.write_register(PC_REG, 0);
    kernel.machine.write_register(NEXT_PC_REG, 4);
    poke(&kernel, 64, b"f\0");
    syscall(&kernel, SC_CREATE, 64, 0, 0);
    assert_eq!(kernel.machine.read_register(PC_REG), 4);
    assert_eq!(kernel.machine.read_register(NEXT_PC_REG), 8);
}

#[test]
fn overlong_names_are_refused() {
    let kernel = boot_user(b"");
    poke(&kernel, 64, b"0123456789x\0");
    assert_eq!(syscall(&kernel, SC_CREATE, 64, 0, 0), 0);
    assert_eq!(syscall(&kernel, SC_OPEN, 64, 0, 0), -1);
}

#[test]
fn open_of_a_missing_file_fails() {
    let kernel = boot_user(b"");
    poke(&kernel, 64, b"ghost\0");
    assert_eq!(syscall(&kernel, SC_OPEN, 64, 0, 0), -1);
}

#[test]
fn reads_and_writes_on_bad_descriptors_fail() {
    let kernel = boot_user(b"");
    poke(&kernel, 128, b"data");
    assert_eq!(syscall(&kernel, SC_WRITE, 128, 4, 7), -1);
    assert_eq!(syscall(&kernel, SC_READ, 128, 4, 7), -1);
    assert_eq!(syscall(&kernel, SC_WRITE, 128, 0, 1), -1);
}

#[test]
fn console_write_reaches_the_device() {
    let kernel = boot_user(b"");
    poke(&kernel, 128, b"hi there");
    assert_eq!(syscall(&kernel, SC_WRITE, 128, 8, 1), 8);
    assert_eq!(kernel.machine.console.take_output(), b"hi there");
}

#[test]
fn console_read_drains_the_input() {
    let kernel = boot_user(b"hello");
    assert_eq!(syscall(&kernel, SC_READ, 192, 5, 0), 5);
    assert_eq!(peek(&kernel, 192, 5), b"hello");
}

#[test]
fn halt_stops_the_machine() {
    let kernel = boot_user(b"");
    assert!(!kernel.interrupt.halted());
    syscall(&kernel, SC_HALT, 0, 0, 0);
    assert!(kernel.interrupt.halted());
}

#[test]
fn join_on_an_unknown_pid_fails() {
    let kernel = boot_user(b"");
    assert_eq!(syscall(&kernel, SC_JOIN, 4242, 0, 0), -1);
}

#[test]
fn exec_of_a_missing_file_fails() {
    let kernel = boot_user(b"");
    poke(&kernel, 64, b"ghost\0");
    assert_eq!(syscall(&kernel, SC_EXEC, 64, 0, 1), -1);
}

#[test]
fn exec_spawns_a_child_that_join_reaps() {
    let kernel = boot_user(b"");
    {
        let fs = kernel.fs();
        fs.create("/p", 0).unwrap();
        let image = fs.open("/p").unwrap();
        image.write_at(&[0u8; 64], 0);
    }
    poke(&kernel, 64, b"p\0");
    let pid = syscall(&kernel, SC_EXEC, 64, 0, 1);
    assert!(pid > 0);
    // There is no interpreter behind the simulated CPU, so the program is
    // killed on its first instruction.
    assert_eq!(syscall(&kernel, SC_JOIN, pid, 0, 0), -1);
    assert!(!kernel.procs.has_key(pid as usize));
}

#[test]
fn a_page_fault_fills_the_tlb() {
    let kernel = boot_user(b"");
    kernel.machine.tlb_flush();
    assert!(kernel.machine.tlb_translate(0, false).is_err());

    kernel.machine.write_register(BAD_VADDR_REG, 0);
    trap::handle_exception(&kernel, ExceptionType::PageFault);
    assert!(kernel.machine.tlb_translate(0, false).is_ok());
}

#[test]
fn an_unresolvable_page_fault_kills_the_thread() {
    let kernel = boot_user(b"");
    let victim = Thread::new(&kernel, "victim", true);
    victim.fork(|k| {
        let space = AddressSpace::new(k, None).unwrap();
        let beyond = (space.size() + PAGE_SIZE) as i32;
        k.cpu.current().set_space(Some(Arc::new(space)));
        k.machine.write_register(BAD_VADDR_REG, beyond);
        trap::handle_exception(k, ExceptionType::PageFault);
        unreachable!("survived an unresolvable page fault");
    });
    assert_eq!(victim.join().unwrap(), -1);
}

#[test]
fn a_read_only_violation_kills_the_thread() {
    let kernel = boot_user(b"");
    let victim = Thread::new(&kernel, "victim", true);
    victim.fork(|k| {
        let mut space = AddressSpace::new(k, None).unwrap();
        space.set_read_only(0);
        k.cpu.current().set_space(Some(Arc::new(space)));
        k.machine.write_register(BAD_VADDR_REG, 0);
        trap::handle_exception(k, ExceptionType::ReadOnly);
        unreachable!("survived a read-only violation");
    });
    assert_eq!(victim.join().unwrap(), -1);
}

#[test]
fn address_spaces_give_their_frames_back() {
    let kernel = Kernel::boot(BootArgs::default());
    let mut spaces = Vec::new();
    // Four stack-only spaces fill the 32 physical pages.
    for _ in 0..4 {
        spaces.push(AddressSpace::new(&kernel, None).unwrap());
    }
    assert!(AddressSpace::new(&kernel, None).is_err());
    spaces.pop();
    assert!(AddressSpace::new(&kernel, None).is_ok());
}
