//! A handle on an open file: the header sector, a cached copy of the
//! header, and a seek position. Reads and writes move whole sectors
//! through the disk driver and copy out the requested byte window;
//! transfers on a shared file are ordered by the file node's gates.

use std::cmp::min;
use std::sync::{Arc, Weak};

use fs_lib::SECTOR_SIZE;
use spin::Mutex;

use super::header::FileHeader;
use crate::Kernel;

pub struct OpenFile {
    kernel: Weak<Kernel>,
    sector: u32,
    hdr: Mutex<FileHeader>,
    pos: Mutex<u32>,
}

impl OpenFile {
    /// Open the file whose header lives at `sector`, bringing the header
    /// into memory.
    pub(crate) fn new(kernel: &Arc<Kernel>, sector: u32) -> Arc<OpenFile> {
        log::trace!(target: "fs", "opening handle on sector {}", sector);
        let mut hdr = FileHeader::new();
        hdr.fetch_from(&kernel.disk, sector);
        Arc::new(Self {
            kernel: Arc::downgrade(kernel),
            sector,
            hdr: Mutex::new(hdr),
            pos: Mutex::new(0),
        })
    }

    fn kernel(&self) -> Arc<Kernel> {
        self.kernel.upgrade().expect("open file outlived the kernel")
    }

    pub fn sector(&self) -> u32 {
        self.sector
    }

    /// Move the cursor; no bounds check, reads clamp later.
    pub fn seek(&self, position: u32) {
        *self.pos.lock() = position;
    }

    pub fn tell(&self) -> u32 {
        *self.pos.lock()
    }

    /// Read at the cursor and advance it by the bytes transferred.
    pub fn read(&self, into: &mut [u8]) -> usize {
        let position = *self.pos.lock();
        let n = self.read_at(into, position);
        *self.pos.lock() = position + n as u32;
        n
    }

    /// Write at the cursor and advance it by the bytes transferred.
    pub fn write(&self, from: &[u8]) -> usize {
        let position = *self.pos.lock();
        let n = self.write_at(from, position);
        *self.pos.lock() = position + n as u32;
        n
    }

    /// The file's current length. Re-fetched from disk: another writer may
    /// have extended the file since the header was cached.
    pub fn length(&self) -> u32 {
        self.fetch_hdr();
        self.hdr.lock().length()
    }

    /// Read up to `into.len()` bytes starting at `position`. Returns the
    /// bytes transferred; zero at or past end of file.
    pub fn read_at(&self, into: &mut [u8], position: u32) -> usize {
        let kernel = self.kernel();
        self.fetch_hdr();
        let node = kernel.try_fs().and_then(|fs| fs.table.find(self.sector));
        if let Some(node) = &node {
            node.reader_enter();
        }
        let n = self.inner_read_at(&kernel, into, position);
        if let Some(node) = &node {
            node.reader_leave();
        }
        n
    }

    /// Write `from` starting at `position`, extending the file when the
    /// write runs past the end. If the extension fails the write is
    /// truncated to the current length. Returns the bytes transferred.
    pub fn write_at(&self, from: &[u8], position: u32) -> usize {
        if from.is_empty() {
            return 0;
        }
        let kernel = self.kernel();
        let mut n = from.len() as u32;
        let length = self.length();
        if position + n > length {
            let missing = position + n - length;
            let grown = kernel
                .try_fs()
                .map(|fs| fs.expand(self.sector, missing).is_ok())
                .unwrap_or(false);
            if !grown {
                if position >= length {
                    return 0;
                }
                n = length - position;
            }
        }
        self.fetch_hdr();
        let node = kernel.try_fs().and_then(|fs| fs.table.find(self.sector));
        if let Some(node) = &node {
            node.writer_enter();
        }
        let n = self.inner_write_at(&kernel, &from[..n as usize], position);
        if let Some(node) = &node {
            node.writer_leave();
        }
        n
    }

    /// Refresh the cached header from disk.
    fn fetch_hdr(&self) {
        let kernel = self.kernel();
        let mut hdr = FileHeader::new();
        hdr.fetch_from(&kernel.disk, self.sector);
        *self.hdr.lock() = hdr;
    }

    fn inner_read_at(&self, kernel: &Kernel, into: &mut [u8], position: u32) -> usize {
        if into.is_empty() {
            return 0;
        }
        let hdr = self.hdr.lock().clone();
        let length = hdr.length();
        if position >= length {
            return 0;
        }
        let n = min(into.len() as u32, length - position);
        let sector_size = SECTOR_SIZE as u32;
        let first = position / sector_size;
        let last = (position + n - 1) / sector_size;
        log::trace!(target: "fs", "reading {} bytes at {} of a {} byte file", n, position, length);

        // Read every whole sector touched, then copy out the window.
        let mut staging = vec![0u8; ((last - first + 1) as usize) * SECTOR_SIZE];
        for i in first..=last {
            let sector = hdr.byte_to_sector(i * sector_size) as usize;
            let at = ((i - first) as usize) * SECTOR_SIZE;
            kernel.disk.read_sector(sector, &mut staging[at..at + SECTOR_SIZE]);
        }
        let skip = (position - first * sector_size) as usize;
        into[..n as usize].copy_from_slice(&staging[skip..skip + n as usize]);
        n as usize
    }

    fn inner_write_at(&self, kernel: &Kernel, from: &[u8], position: u32) -> usize {
        if from.is_empty() {
            return 0;
        }
        let hdr = self.hdr.lock().clone();
        let length = hdr.length();
        if position >= length {
            return 0;
        }
        let n = min(from.len() as u32, length - position);
        let sector_size = SECTOR_SIZE as u32;
        let first = position / sector_size;
        let last = (position + n - 1) / sector_size;
        log::trace!(target: "fs", "writing {} bytes at {} of a {} byte file", n, position, length);

        let mut staging = vec![0u8; ((last - first + 1) as usize) * SECTOR_SIZE];
        let first_aligned = position == first * sector_size;
        let last_aligned = position + n == (last + 1) * sector_size;

        // Unaligned edge sectors keep bytes we must not clobber, so they
        // are read before being modified in place.
        if !first_aligned {
            self.inner_read_at(kernel, &mut staging[..SECTOR_SIZE], first * sector_size);
        }
        if !last_aligned && (first != last || first_aligned) {
            let at = ((last - first) as usize) * SECTOR_SIZE;
            self.inner_read_at(kernel, &mut staging[at..at + SECTOR_SIZE], last * sector_size);
        }

        let skip = (position - first * sector_size) as usize;
        staging[skip..skip + n as usize].copy_from_slice(&from[..n as usize]);

        for i in first..=last {
            let sector = hdr.byte_to_sector(i * sector_size) as usize;
            let at = ((i - first) as usize) * SECTOR_SIZE;
            kernel.disk.write_sector(sector, &staging[at..at + SECTOR_SIZE]);
        }
        n as usize
    }
}

impl Drop for OpenFile {
    /// Closing a handle releases its claim on the shared file node; the
    /// last close of a file with a pending remove deletes it.
    fn drop(&mut self) {
        let Some(kernel) = self.kernel.upgrade() else { return };
        let Some(fs) = kernel.try_fs() else { return };
        fs.close_sector(self.sector);
    }
}
