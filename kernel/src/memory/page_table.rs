use bitflags::bitflags;

bitflags! {
    pub struct PteFlags: u32 {
        const VALID    = 1 << 0;
        const READONLY = 1 << 1;
        const USE      = 1 << 2;
        const DIRTY    = 1 << 3;
    }
}

/// One virtual-to-physical page translation.
#[derive(Clone, Copy, Debug)]
pub struct PageTableEntry {
    pub vpn: usize,
    pub ppn: usize,
    pub flags: PteFlags,
}

impl PageTableEntry {
    pub fn new(vpn: usize, ppn: usize) -> Self {
        Self { vpn, ppn, flags: PteFlags::VALID }
    }
}
