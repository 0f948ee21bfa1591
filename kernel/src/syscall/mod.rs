//! System call numbers, argument marshalling between user memory and the
//! kernel, and the dispatch itself.

mod sysfile;
mod sysproc;

use std::sync::Arc;

use crate::define::param::{MAX_ARG_COUNT, MAX_ARG_LEN};
use crate::machine::{Machine, ARG1_REG, ARG2_REG, ARG3_REG, RET_REG, STACK_REG};
use crate::memory::AddressSpace;
use crate::Kernel;

pub const SC_HALT: i32 = 0;
pub const SC_EXIT: i32 = 1;
pub const SC_EXEC: i32 = 2;
pub const SC_JOIN: i32 = 3;
pub const SC_CREATE: i32 = 4;
pub const SC_REMOVE: i32 = 5;
pub const SC_OPEN: i32 = 6;
pub const SC_READ: i32 = 7;
pub const SC_WRITE: i32 = 8;
pub const SC_CLOSE: i32 = 9;

/// Handle the system call the current program trapped with. The id sits
/// in the result register, arguments in the argument registers; whatever
/// the handler returns goes back in the result register, and the program
/// counter moves past the trap for every call that returns at all.
pub fn dispatch(kernel: &Arc<Kernel>) {
    let machine = &kernel.machine;
    let id = machine.read_register(RET_REG);
    let arg1 = machine.read_register(ARG1_REG);
    let arg2 = machine.read_register(ARG2_REG);
    let arg3 = machine.read_register(ARG3_REG);
    log::trace!(target: "syscall", "syscall {} ({}, {}, {})", id, arg1, arg2, arg3);

    match id {
        SC_HALT => {
            log::debug!(target: "syscall", "shutdown initiated by user program");
            kernel.interrupt.halt();
        }
        SC_EXIT => {
            machine.write_register(RET_REG, arg1);
            kernel.finish_current(arg1);
        }
        SC_EXEC => machine.write_register(RET_REG, sysproc::sys_exec(kernel, arg1, arg2, arg3)),
        SC_JOIN => machine.write_register(RET_REG, sysproc::sys_join(kernel, arg1)),
        SC_CREATE => machine.write_register(RET_REG, sysfile::sys_create(kernel, arg1)),
        SC_REMOVE => machine.write_register(RET_REG, sysfile::sys_remove(kernel, arg1)),
        SC_OPEN => machine.write_register(RET_REG, sysfile::sys_open(kernel, arg1)),
        SC_READ => machine.write_register(RET_REG, sysfile::sys_read(kernel, arg1, arg2, arg3)),
        SC_WRITE => machine.write_register(RET_REG, sysfile::sys_write(kernel, arg1, arg2, arg3)),
        SC_CLOSE => machine.write_register(RET_REG, sysfile::sys_close(kernel, arg1)),
        _ => panic!("unexpected system call id {}", id),
    }
    machine.advance_pc();
}

fn current_space(kernel: &Kernel) -> Option<Arc<AddressSpace>> {
    kernel.cpu.current().space()
}

fn read_user_byte(kernel: &Kernel, space: &AddressSpace, vaddr: usize) -> Option<u8> {
    let pa = space.translate(vaddr, false)?;
    Some(kernel.machine.read_phys_byte(pa))
}

/// Read a NUL-terminated string out of user memory, byte by byte. Refused
/// when longer than `max` or when any byte does not translate.
pub fn read_str_from_user(kernel: &Kernel, addr: usize, max: usize) -> Option<String> {
    if addr == 0 {
        log::debug!(target: "syscall", "null user string pointer");
        return None;
    }
    let space = current_space(kernel)?;
    let mut bytes = Vec::new();
    for i in 0..=max {
        let byte = read_user_byte(kernel, &space, addr + i)?;
        if byte == 0 {
            return String::from_utf8(bytes).ok();
        }
        if i == max {
            log::debug!(target: "syscall", "user string longer than {} bytes", max);
            return None;
        }
        bytes.push(byte);
    }
    None
}

/// Copy `len` bytes out of user memory.
pub fn read_buf_from_user(kernel: &Kernel, addr: usize, len: usize) -> Option<Vec<u8>> {
    let space = current_space(kernel)?;
    let mut bytes = Vec::with_capacity(len);
    for i in 0..len {
        bytes.push(read_user_byte(kernel, &space, addr + i)?);
    }
    Some(bytes)
}

/// Copy `bytes` into user memory.
pub fn write_buf_to_user(kernel: &Kernel, addr: usize, bytes: &[u8]) -> Option<()> {
    let space = current_space(kernel)?;
    for (i, &byte) in bytes.iter().enumerate() {
        let pa = space.translate(addr + i, true)?;
        kernel.machine.write_phys_byte(pa, byte);
    }
    Some(())
}

/// Read an EXEC argument vector: an array of string pointers terminated
/// by a null pointer.
pub fn save_args(kernel: &Kernel, argv_addr: usize) -> Vec<String> {
    let mut args = Vec::new();
    if argv_addr == 0 {
        return args;
    }
    let Some(space) = current_space(kernel) else { return args };
    for i in 0..MAX_ARG_COUNT {
        let mut ptr_bytes = [0u8; 4];
        for (j, slot) in ptr_bytes.iter_mut().enumerate() {
            match read_user_byte(kernel, &space, argv_addr + i * 4 + j) {
                Some(byte) => *slot = byte,
                None => return args,
            }
        }
        let ptr = u32::from_le_bytes(ptr_bytes) as usize;
        if ptr == 0 {
            break;
        }
        match read_str_from_user(kernel, ptr, MAX_ARG_LEN) {
            Some(arg) => args.push(arg),
            None => break,
        }
    }
    args
}

/// Lay an argument vector out on the current program's stack. Returns
/// argc and the user address of argv.
pub fn write_args(kernel: &Kernel, args: &[String]) -> (i32, i32) {
    let machine: &Machine = &kernel.machine;
    let mut sp = machine.read_register(STACK_REG) as usize;
    let mut pointers = Vec::with_capacity(args.len());
    for arg in args {
        sp -= arg.len() + 1;
        let mut bytes = arg.as_bytes().to_vec();
        bytes.push(0);
        if write_buf_to_user(kernel, sp, &bytes).is_none() {
            return (0, 0);
        }
        pointers.push(sp as u32);
    }
    sp &= !3;
    sp -= (pointers.len() + 1) * 4;
    let argv = sp;
    let mut table = Vec::with_capacity((pointers.len() + 1) * 4);
    for ptr in &pointers {
        table.extend_from_slice(&ptr.to_le_bytes());
    }
    table.extend_from_slice(&0u32.to_le_bytes());
    if write_buf_to_user(kernel, argv, &table).is_none() {
        return (0, 0);
    }
    // Room for the callee's register spill area.
    machine.write_register(STACK_REG, (argv - 16) as i32);
    (args.len() as i32, argv as i32)
}
