//! Entry points from simulated user mode back into the kernel: system
//! calls, page faults, and protection violations. Anything else the CPU
//! raises is a kernel bug.

use std::sync::Arc;

use crate::define::param::PAGE_SIZE;
use crate::machine::{ExceptionType, BAD_VADDR_REG, RET_REG};
use crate::syscall;
use crate::Kernel;

pub fn handle_exception(kernel: &Arc<Kernel>, which: ExceptionType) {
    match which {
        ExceptionType::Syscall => syscall::dispatch(kernel),
        ExceptionType::PageFault => page_fault_handler(kernel),
        ExceptionType::ReadOnly => {
            let bad = kernel.machine.read_register(BAD_VADDR_REG);
            log::warn!(target: "trap", "write to read-only page at {:#x}", bad);
            kernel.finish_current(-1);
        }
        other => default_handler(kernel, other),
    }
}

/// Look the faulting page up in the current address space and put its
/// translation into the TLB; a page the space cannot resolve is fatal to
/// the thread.
fn page_fault_handler(kernel: &Arc<Kernel>) {
    let bad = kernel.machine.read_register(BAD_VADDR_REG) as usize;
    let vpn = bad / PAGE_SIZE;
    let resolved = kernel
        .cpu
        .current()
        .space()
        .map(|space| space.update_tlb(kernel, vpn))
        .unwrap_or(false);
    if !resolved {
        log::warn!(target: "trap", "unresolvable page fault at {:#x}", bad);
        kernel.finish_current(-1);
    }
}

fn default_handler(kernel: &Arc<Kernel>, which: ExceptionType) -> ! {
    let arg = kernel.machine.read_register(RET_REG);
    panic!("unexpected user mode exception {:?}, arg {}", which, arg);
}
