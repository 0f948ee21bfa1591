use std::sync::{Arc, Weak};

use fs_lib::div_round_up;

use super::page_table::{PageTableEntry, PteFlags};
use crate::define::param::{PAGE_SIZE, STACK_PAGES};
use crate::fs::OpenFile;
use crate::machine::{Machine, NEXT_PC_REG, NUM_GP_REGS, PC_REG, STACK_REG};
use crate::Kernel;

/// A user program's address space: a page table over frames taken from
/// the kernel's frame map, sized for the executable image plus the stack.
pub struct AddressSpace {
    kernel: Weak<Kernel>,
    page_table: Vec<PageTableEntry>,
}

impl AddressSpace {
    /// Build an address space and load `executable` (taken as a flat
    /// image; format conversion happens outside the kernel) at address 0.
    pub fn new(kernel: &Arc<Kernel>, executable: Option<&OpenFile>) -> Result<Self, &'static str> {
        let image_size = executable.map(|f| f.length() as usize).unwrap_or(0);
        let num_pages = div_round_up(image_size, PAGE_SIZE) + STACK_PAGES;

        let mut page_table = Vec::with_capacity(num_pages);
        {
            let mut frames = kernel.frames.lock();
            if frames.count_clear() < num_pages {
                return Err("not enough physical pages");
            }
            for vpn in 0..num_pages {
                let ppn = frames.find().unwrap();
                page_table.push(PageTableEntry::new(vpn, ppn));
            }
        }
        log::debug!(target: "memory", "address space of {} pages", num_pages);

        let space = Self {
            kernel: Arc::downgrade(kernel),
            page_table,
        };

        // Fresh frames, then the image.
        let zeroes = vec![0u8; PAGE_SIZE];
        for pte in &space.page_table {
            kernel.machine.write_phys(pte.ppn * PAGE_SIZE, &zeroes);
        }
        if let Some(file) = executable {
            let mut buf = vec![0u8; PAGE_SIZE];
            let mut offset = 0;
            while offset < image_size {
                let n = file.read_at(&mut buf, offset as u32);
                if n == 0 {
                    break;
                }
                let pte = &space.page_table[offset / PAGE_SIZE];
                kernel.machine.write_phys(pte.ppn * PAGE_SIZE, &buf[..n]);
                offset += n;
            }
        }
        Ok(space)
    }

    pub fn num_pages(&self) -> usize {
        self.page_table.len()
    }

    pub fn size(&self) -> usize {
        self.num_pages() * PAGE_SIZE
    }

    /// Kernel-mode translation through the page table.
    pub fn translate(&self, vaddr: usize, writing: bool) -> Option<usize> {
        let pte = self.page_table.get(vaddr / PAGE_SIZE)?;
        if !pte.flags.contains(PteFlags::VALID) {
            return None;
        }
        if writing && pte.flags.contains(PteFlags::READONLY) {
            return None;
        }
        Some(pte.ppn * PAGE_SIZE + vaddr % PAGE_SIZE)
    }

    /// Resolve a faulting page into the TLB. False when the page does not
    /// belong to this space.
    pub fn update_tlb(&self, kernel: &Kernel, vpn: usize) -> bool {
        match self.page_table.get(vpn) {
            Some(pte) if pte.flags.contains(PteFlags::VALID) => {
                kernel.machine.tlb_install(*pte);
                true
            }
            _ => false,
        }
    }

    /// Mark a page read-only (the loader does this for code pages).
    pub fn set_read_only(&mut self, vpn: usize) {
        if let Some(pte) = self.page_table.get_mut(vpn) {
            pte.flags |= PteFlags::READONLY;
        }
    }

    /// Set up registers for running from the start of the space.
    pub fn init_registers(&self, machine: &Machine) {
        for reg in 0..NUM_GP_REGS {
            machine.write_register(reg, 0);
        }
        machine.write_register(PC_REG, 0);
        machine.write_register(NEXT_PC_REG, 4);
        // Leave slack at the very top so reads off the end of the stack
        // stay inside the space.
        machine.write_register(STACK_REG, (self.size() - 16) as i32);
    }

    /// Nothing is cached outside the machine on a switch away.
    pub fn save_state(&self) {}

    /// On a switch in, the TLB contents belong to someone else.
    pub fn restore_state(&self, machine: &Machine) {
        machine.tlb_flush();
    }
}

impl Drop for AddressSpace {
    fn drop(&mut self) {
        if let Some(kernel) = self.kernel.upgrade() {
            let mut frames = kernel.frames.lock();
            for pte in &self.page_table {
                frames.clear(pte.ppn);
            }
        }
    }
}
