//! File-side system calls.

use std::sync::Arc;

use fs_lib::FILE_NAME_MAX_LEN;

use super::{read_buf_from_user, read_str_from_user, write_buf_to_user};
use crate::define::param::{CONSOLE_INPUT, CONSOLE_OUTPUT};
use crate::Kernel;

/// Create a zero-size file. Returns 1 for success, 0 otherwise.
pub fn sys_create(kernel: &Arc<Kernel>, name_addr: i32) -> i32 {
    let Some(name) = read_str_from_user(kernel, name_addr as usize, FILE_NAME_MAX_LEN) else {
        return 0;
    };
    log::debug!(target: "syscall", "create requested for `{}`", name);
    kernel.fs().create(&name, 0).is_ok() as i32
}

/// Unlink a file or directory. Returns 1 for success, 0 otherwise.
pub fn sys_remove(kernel: &Arc<Kernel>, name_addr: i32) -> i32 {
    let Some(name) = read_str_from_user(kernel, name_addr as usize, FILE_NAME_MAX_LEN) else {
        return 0;
    };
    log::debug!(target: "syscall", "remove requested for `{}`", name);
    kernel.fs().remove(&name).is_ok() as i32
}

/// Open a file and install it in the caller's descriptor table.
pub fn sys_open(kernel: &Arc<Kernel>, name_addr: i32) -> i32 {
    let Some(name) = read_str_from_user(kernel, name_addr as usize, FILE_NAME_MAX_LEN) else {
        return -1;
    };
    log::debug!(target: "syscall", "open requested for `{}`", name);
    match kernel.fs().open(&name) {
        Some(file) => match kernel.cpu.current().add_file(file) {
            Some(fd) => fd as i32,
            None => -1,
        },
        None => -1,
    }
}

/// Drop a descriptor; closing the underlying handle happens when the last
/// reference goes away.
pub fn sys_close(kernel: &Arc<Kernel>, fd: i32) -> i32 {
    let current = kernel.cpu.current();
    log::debug!(target: "syscall", "close requested for descriptor {}", fd);
    if fd >= 0 && current.is_open_file(fd as usize) {
        drop(current.remove_file(fd as usize));
    }
    -1
}

/// Read `size` bytes into the user buffer, from the console or a file.
pub fn sys_read(kernel: &Arc<Kernel>, buf_addr: i32, size: i32, fd: i32) -> i32 {
    if size <= 0 || buf_addr == 0 {
        return -1;
    }
    let size = size as usize;
    if fd == CONSOLE_INPUT {
        let mut bytes = vec![0u8; size];
        let n = kernel.console.get_string(&mut bytes);
        match write_buf_to_user(kernel, buf_addr as usize, &bytes[..n]) {
            Some(()) => n as i32,
            None => -1,
        }
    } else {
        let current = kernel.cpu.current();
        if !current.is_open_file(fd as usize) {
            return -1;
        }
        let file = current.get_file(fd as usize).unwrap();
        let mut bytes = vec![0u8; size];
        let n = file.read(&mut bytes);
        match write_buf_to_user(kernel, buf_addr as usize, &bytes[..n]) {
            Some(()) => n as i32,
            None => -1,
        }
    }
}

/// Write `size` bytes from the user buffer, to the console or a file.
pub fn sys_write(kernel: &Arc<Kernel>, buf_addr: i32, size: i32, fd: i32) -> i32 {
    if size <= 0 || buf_addr == 0 {
        return -1;
    }
    let Some(bytes) = read_buf_from_user(kernel, buf_addr as usize, size as usize) else {
        return -1;
    };
    if fd == CONSOLE_OUTPUT {
        kernel.console.put_string(&bytes) as i32
    } else {
        let current = kernel.cpu.current();
        if !current.is_open_file(fd as usize) {
            return -1;
        }
        let file = current.get_file(fd as usize).unwrap();
        file.write(&bytes) as i32
    }
}
