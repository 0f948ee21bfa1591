use fs_lib::{div_round_up, RawFileHeader, NUM_DIRECT, SECTOR_SIZE};

use super::bitmap::Bitmap;
use crate::driver::SynchDisk;

/// In-memory copy of an on-disk file header. The header maps file bytes
/// to disk sectors through the direct list; it occupies one sector and is
/// fetched and written back as a unit.
#[derive(Clone)]
pub struct FileHeader {
    raw: RawFileHeader,
}

impl FileHeader {
    pub fn new() -> Self {
        Self { raw: RawFileHeader::new() }
    }

    pub fn length(&self) -> u32 {
        self.raw.num_bytes
    }

    pub fn num_sectors(&self) -> u32 {
        self.raw.num_sectors
    }

    /// Grab data sectors for a file of `bytes` bytes. Fails without
    /// touching the free map when the file would be too large or the disk
    /// too full; the caller must not commit anything in that case.
    pub fn allocate(&mut self, free_map: &mut Bitmap, bytes: u32) -> bool {
        let sectors = div_round_up(bytes as usize, SECTOR_SIZE);
        if sectors >= NUM_DIRECT {
            return false;
        }
        if free_map.count_clear() < sectors {
            return false;
        }
        self.raw.num_bytes = bytes;
        self.raw.num_sectors = sectors as u32;
        for i in 0..sectors {
            self.raw.data_sectors[i] = free_map.find().unwrap() as u32;
        }
        true
    }

    /// Grow the file by `extra` bytes, appending sectors past what the
    /// current count covers.
    pub fn extend(&mut self, free_map: &mut Bitmap, extra: u32) -> bool {
        let new_len = self.raw.num_bytes + extra;
        let needed = div_round_up(new_len as usize, SECTOR_SIZE);
        let have = self.raw.num_sectors as usize;
        if needed >= NUM_DIRECT {
            return false;
        }
        if needed > have {
            if free_map.count_clear() < needed - have {
                return false;
            }
            for i in have..needed {
                self.raw.data_sectors[i] = free_map.find().unwrap() as u32;
            }
            self.raw.num_sectors = needed as u32;
        }
        self.raw.num_bytes = new_len;
        true
    }

    /// Return every data sector to the free map. The header's own sector
    /// is the caller's to clear.
    pub fn deallocate(&self, free_map: &mut Bitmap) {
        for i in 0..self.raw.num_sectors as usize {
            free_map.clear(self.raw.data_sectors[i] as usize);
        }
    }

    /// Disk sector holding the file byte at `offset`.
    pub fn byte_to_sector(&self, offset: u32) -> u32 {
        let index = offset as usize / SECTOR_SIZE;
        assert!(
            index < self.raw.num_sectors as usize,
            "file header: byte {} beyond the sector list",
            offset
        );
        self.raw.data_sectors[index]
    }

    pub fn fetch_from(&mut self, disk: &SynchDisk, sector: u32) {
        let mut buf = [0u8; SECTOR_SIZE];
        disk.read_sector(sector as usize, &mut buf);
        self.raw = RawFileHeader::read_from(&buf);
    }

    pub fn write_back(&self, disk: &SynchDisk, sector: u32) {
        let mut buf = [0u8; SECTOR_SIZE];
        self.raw.write_to(&mut buf);
        disk.write_sector(sector as usize, &buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_rounds_up_to_sectors() {
        let mut free_map = Bitmap::new(64);
        let mut hdr = FileHeader::new();
        assert!(hdr.allocate(&mut free_map, SECTOR_SIZE as u32 + 1));
        assert_eq!(hdr.length(), SECTOR_SIZE as u32 + 1);
        assert_eq!(hdr.num_sectors(), 2);
        assert_eq!(free_map.count_clear(), 62);
    }

    #[test]
    fn allocate_refuses_oversized_file() {
        let mut free_map = Bitmap::new(fs_lib::NUM_SECTORS);
        let mut hdr = FileHeader::new();
        assert!(!hdr.allocate(&mut free_map, fs_lib::MAX_FILE_SIZE as u32 + 1));
        assert_eq!(free_map.count_clear(), fs_lib::NUM_SECTORS);
    }

    #[test]
    fn allocate_refuses_full_disk_untouched() {
        let mut free_map = Bitmap::new(4);
        let mut hdr = FileHeader::new();
        assert!(!hdr.allocate(&mut free_map, 5 * SECTOR_SIZE as u32));
        assert_eq!(free_map.count_clear(), 4);
    }

    #[test]
    fn extend_within_last_sector_adds_no_sectors() {
        let mut free_map = Bitmap::new(64);
        let mut hdr = FileHeader::new();
        assert!(hdr.allocate(&mut free_map, 10));
        let clear = free_map.count_clear();
        assert!(hdr.extend(&mut free_map, SECTOR_SIZE as u32 - 10));
        assert_eq!(hdr.num_sectors(), 1);
        assert_eq!(free_map.count_clear(), clear);
        assert!(hdr.extend(&mut free_map, 1));
        assert_eq!(hdr.num_sectors(), 2);
        assert_eq!(free_map.count_clear(), clear - 1);
    }

    #[test]
    fn deallocate_returns_data_sectors() {
        let mut free_map = Bitmap::new(64);
        let mut hdr = FileHeader::new();
        assert!(hdr.allocate(&mut free_map, 3 * SECTOR_SIZE as u32));
        hdr.deallocate(&mut free_map);
        assert_eq!(free_map.count_clear(), 64);
    }
}
