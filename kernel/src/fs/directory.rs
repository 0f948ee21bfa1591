use std::sync::Arc;

use array_macro::array;
use fs_lib::{RawDirEntry, DIRECTORY_FILE_SIZE, DIR_ENTRY_SIZE, FILE_NAME_MAX_LEN, NUM_DIR_ENTRIES};

use super::bitmap::Bitmap;
use super::header::FileHeader;
use super::open_file::OpenFile;
use crate::Kernel;

/// One in-use directory slot.
#[derive(Clone, Debug)]
pub struct DirEntry {
    pub name: String,
    pub sector: u32,
    pub is_dir: bool,
}

/// A directory: a fixed-capacity table of name → header-sector entries.
/// Names among in-use entries are unique. The table itself is stored as an
/// ordinary file.
pub struct Directory {
    entries: [Option<DirEntry>; NUM_DIR_ENTRIES],
}

impl Directory {
    pub fn new() -> Self {
        Self { entries: array![_ => None; NUM_DIR_ENTRIES] }
    }

    pub fn fetch_from(&mut self, file: &OpenFile) {
        let mut buf = vec![0u8; DIRECTORY_FILE_SIZE];
        file.read_at(&mut buf, 0);
        for (i, slot) in self.entries.iter_mut().enumerate() {
            let raw = RawDirEntry::read_from(&buf[i * DIR_ENTRY_SIZE..]);
            *slot = if raw.in_use {
                Some(DirEntry {
                    name: String::from_utf8_lossy(&raw.name[..raw.name_len()]).into_owned(),
                    sector: raw.sector as u32,
                    is_dir: raw.is_dir,
                })
            } else {
                None
            };
        }
    }

    pub fn write_back(&self, file: &OpenFile) {
        let mut buf = vec![0u8; DIRECTORY_FILE_SIZE];
        for (i, slot) in self.entries.iter().enumerate() {
            let mut raw = RawDirEntry::empty();
            if let Some(entry) = slot {
                raw.in_use = true;
                raw.is_dir = entry.is_dir;
                raw.sector = entry.sector as i32;
                raw.name[..entry.name.len()].copy_from_slice(entry.name.as_bytes());
            }
            raw.write_to(&mut buf[i * DIR_ENTRY_SIZE..]);
        }
        file.write_at(&buf, 0);
    }

    /// Header sector of the entry called `name`, restricted to files or to
    /// directories.
    pub fn find(&self, name: &str, want_dir: bool) -> Option<u32> {
        self.entries
            .iter()
            .flatten()
            .find(|e| e.is_dir == want_dir && e.name == name)
            .map(|e| e.sector)
    }

    /// Fill the first free slot. False when the table is full, the name is
    /// taken, or the name does not fit an entry.
    pub fn add(&mut self, name: &str, sector: u32, is_dir: bool) -> bool {
        if name.is_empty() || name.len() > FILE_NAME_MAX_LEN {
            return false;
        }
        if self.find(name, false).is_some() || self.find(name, true).is_some() {
            return false;
        }
        match self.entries.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(DirEntry { name: name.to_string(), sector, is_dir });
                true
            }
            None => false,
        }
    }

    /// Drop the entry called `name` and report which sector it occupied.
    pub fn remove(&mut self, name: &str) -> Option<u32> {
        for slot in self.entries.iter_mut() {
            if slot.as_ref().is_some_and(|e| e.name == name) {
                return slot.take().map(|e| e.sector);
            }
        }
        None
    }

    /// In-use entries in table order.
    pub fn list(&self) -> Vec<(String, bool)> {
        self.entries
            .iter()
            .flatten()
            .map(|e| (e.name.clone(), e.is_dir))
            .collect()
    }

    /// Release everything below this directory: recurse into
    /// subdirectories, then free each entry's data and header sectors.
    pub fn clean(&mut self, kernel: &Arc<Kernel>, free_map: &mut Bitmap) {
        for slot in self.entries.iter_mut() {
            let Some(entry) = slot.take() else { continue };
            log::debug!(target: "fs", "cleaning {} at sector {}", entry.name, entry.sector);
            if entry.is_dir {
                let file = OpenFile::new(kernel, entry.sector);
                let mut sub = Directory::new();
                sub.fetch_from(&file);
                sub.clean(kernel, free_map);
            }
            let mut header = FileHeader::new();
            header.fetch_from(&kernel.disk, entry.sector);
            header.deallocate(free_map);
            free_map.clear(entry.sector as usize);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_find_by_kind() {
        let mut dir = Directory::new();
        assert!(dir.add("a", 5, false));
        assert!(dir.add("d", 6, true));
        assert_eq!(dir.find("a", false), Some(5));
        assert_eq!(dir.find("a", true), None);
        assert_eq!(dir.find("d", true), Some(6));
    }

    #[test]
    fn duplicate_and_oversized_names_refused() {
        let mut dir = Directory::new();
        assert!(dir.add("a", 5, false));
        assert!(!dir.add("a", 6, false));
        assert!(!dir.add("a", 6, true));
        assert!(!dir.add("longername", 7, false));
    }

    #[test]
    fn table_capacity_is_bounded() {
        let mut dir = Directory::new();
        for i in 0..NUM_DIR_ENTRIES {
            assert!(dir.add(&format!("f{}", i), i as u32 + 2, false));
        }
        assert!(!dir.add("extra", 99, false));
    }

    #[test]
    fn remove_reports_the_sector() {
        let mut dir = Directory::new();
        dir.add("a", 5, false);
        assert_eq!(dir.remove("a"), Some(5));
        assert_eq!(dir.remove("a"), None);
        assert_eq!(dir.find("a", false), None);
    }
}
