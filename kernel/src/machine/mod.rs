//! The simulated machine: registers, physical memory, the TLB and the
//! devices. The core kernel consumes only this interface; the instruction
//! interpreter proper is outside it.

pub mod console;
pub mod disk;
pub mod interrupt;

use std::sync::Arc;

use array_macro::array;
use spin::Mutex;

use crate::define::param::{MEMORY_SIZE, PAGE_SIZE, TLB_SIZE};
use crate::memory::PageTableEntry;
use crate::Kernel;
use console::Console;
use disk::Disk;

pub const NUM_GP_REGS: usize = 32;
/// Register conventions of the simulated CPU.
pub const RET_REG: usize = 2;
pub const ARG1_REG: usize = 4;
pub const ARG2_REG: usize = 5;
pub const ARG3_REG: usize = 6;
pub const ARG4_REG: usize = 7;
pub const STACK_REG: usize = 29;
pub const HI_REG: usize = 32;
pub const LO_REG: usize = 33;
pub const PC_REG: usize = 34;
pub const NEXT_PC_REG: usize = 35;
pub const PREV_PC_REG: usize = 36;
pub const LOAD_REG: usize = 37;
pub const LOAD_VALUE_REG: usize = 38;
pub const BAD_VADDR_REG: usize = 39;
pub const NUM_TOTAL_REGS: usize = 40;

/// What user mode can trap back into the kernel with.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ExceptionType {
    Syscall,
    PageFault,
    ReadOnly,
    BusError,
    AddressError,
    Overflow,
    IllegalInstruction,
}

pub struct Machine {
    regs: Mutex<[i32; NUM_TOTAL_REGS]>,
    memory: Mutex<Vec<u8>>,
    tlb: Mutex<[Option<PageTableEntry>; TLB_SIZE]>,
    tlb_victim: Mutex<usize>,
    pub disk: Disk,
    pub console: Console,
}

impl Machine {
    pub fn new(disk_image: Option<Vec<u8>>, console_input: Vec<u8>) -> Self {
        Self {
            regs: Mutex::new([0; NUM_TOTAL_REGS]),
            memory: Mutex::new(vec![0; MEMORY_SIZE]),
            tlb: Mutex::new(array![_ => None; TLB_SIZE]),
            tlb_victim: Mutex::new(0),
            disk: Disk::new(disk_image),
            console: Console::new(console_input),
        }
    }

    pub fn read_register(&self, reg: usize) -> i32 {
        self.regs.lock()[reg]
    }

    pub fn write_register(&self, reg: usize, value: i32) {
        self.regs.lock()[reg] = value;
    }

    pub fn save_registers(&self) -> [i32; NUM_TOTAL_REGS] {
        *self.regs.lock()
    }

    pub fn load_registers(&self, saved: &[i32; NUM_TOTAL_REGS]) {
        *self.regs.lock() = *saved;
    }

    /// Advance the program counter past the current instruction.
    pub fn advance_pc(&self) {
        let mut regs = self.regs.lock();
        regs[PREV_PC_REG] = regs[PC_REG];
        regs[PC_REG] = regs[NEXT_PC_REG];
        regs[NEXT_PC_REG] += 4;
    }

    pub fn read_phys(&self, addr: usize, buf: &mut [u8]) {
        let memory = self.memory.lock();
        buf.copy_from_slice(&memory[addr..addr + buf.len()]);
    }

    pub fn write_phys(&self, addr: usize, buf: &[u8]) {
        let mut memory = self.memory.lock();
        memory[addr..addr + buf.len()].copy_from_slice(buf);
    }

    pub fn read_phys_byte(&self, addr: usize) -> u8 {
        self.memory.lock()[addr]
    }

    pub fn write_phys_byte(&self, addr: usize, value: u8) {
        self.memory.lock()[addr] = value;
    }

    /// Install a translation, evicting FIFO.
    pub fn tlb_install(&self, entry: PageTableEntry) {
        let mut tlb = self.tlb.lock();
        let mut victim = self.tlb_victim.lock();
        tlb[*victim] = Some(entry);
        *victim = (*victim + 1) % TLB_SIZE;
    }

    /// Drop every translation, e.g. when another address space takes over.
    pub fn tlb_flush(&self) {
        let mut tlb = self.tlb.lock();
        for entry in tlb.iter_mut() {
            *entry = None;
        }
    }

    /// Translate as the MMU would: through the TLB only. A miss records the
    /// faulting address and reports a page fault.
    pub fn tlb_translate(&self, vaddr: usize, writing: bool) -> Result<usize, ExceptionType> {
        let vpn = vaddr / PAGE_SIZE;
        let hit = self.tlb.lock().iter().flatten().find(|e| e.vpn == vpn).copied();
        match hit {
            Some(entry) => {
                if writing && entry.flags.contains(crate::memory::PteFlags::READONLY) {
                    self.write_register(BAD_VADDR_REG, vaddr as i32);
                    return Err(ExceptionType::ReadOnly);
                }
                Ok(entry.ppn * PAGE_SIZE + vaddr % PAGE_SIZE)
            }
            None => {
                self.write_register(BAD_VADDR_REG, vaddr as i32);
                Err(ExceptionType::PageFault)
            }
        }
    }

    /// Fetch the instruction word at `vaddr`.
    pub fn fetch_word(&self, vaddr: usize) -> Result<u32, ExceptionType> {
        let pa = self.tlb_translate(vaddr, false)?;
        let mut buf = [0u8; 4];
        self.read_phys(pa, &mut buf);
        Ok(u32::from_le_bytes(buf))
    }
}

/// Execute the current program. Instruction decoding belongs to the real
/// simulator outside this crate; fetches still go through the TLB so the
/// fault path behaves as on hardware, and a word that cannot be executed
/// kills the program.
pub fn run(kernel: &Arc<Kernel>) {
    loop {
        if kernel.interrupt.halted() {
            return;
        }
        let pc = kernel.machine.read_register(PC_REG) as usize;
        match kernel.machine.fetch_word(pc) {
            Err(exception) => crate::trap::handle_exception(kernel, exception),
            Ok(word) => {
                log::debug!(target: "machine", "no interpreter for instruction {:#010x} at {:#x}", word, pc);
                kernel.finish_current(-1);
            }
        }
    }
}
