//! Simulated sector-addressed disk. The interface is asynchronous: a
//! request moves the data and queues a completion interrupt, and the
//! caller is expected to wait for that interrupt before issuing another
//! request (the synchronous wrapper in `driver` does exactly this).

use fs_lib::{NUM_SECTORS, SECTOR_SIZE};
use spin::Mutex;

use super::interrupt::Interrupt;

pub struct Disk {
    image: Mutex<Vec<u8>>,
}

impl Disk {
    /// A blank disk, or one seeded from a previously snapshotted image.
    pub fn new(image: Option<Vec<u8>>) -> Self {
        let image = match image {
            Some(image) => {
                assert_eq!(image.len(), NUM_SECTORS * SECTOR_SIZE, "disk: bad image size");
                image
            }
            None => vec![0; NUM_SECTORS * SECTOR_SIZE],
        };
        Self { image: Mutex::new(image) }
    }

    pub fn read_request(
        &self,
        sector: usize,
        data: &mut [u8],
        interrupt: &Interrupt,
        done: Box<dyn FnOnce() + Send>,
    ) {
        assert!(sector < NUM_SECTORS, "disk: sector {} out of range", sector);
        assert_eq!(data.len(), SECTOR_SIZE);
        let image = self.image.lock();
        data.copy_from_slice(&image[sector * SECTOR_SIZE..(sector + 1) * SECTOR_SIZE]);
        drop(image);
        log::trace!(target: "disk", "read sector {}", sector);
        interrupt.schedule(done);
    }

    pub fn write_request(
        &self,
        sector: usize,
        data: &[u8],
        interrupt: &Interrupt,
        done: Box<dyn FnOnce() + Send>,
    ) {
        assert!(sector < NUM_SECTORS, "disk: sector {} out of range", sector);
        assert_eq!(data.len(), SECTOR_SIZE);
        let mut image = self.image.lock();
        image[sector * SECTOR_SIZE..(sector + 1) * SECTOR_SIZE].copy_from_slice(data);
        drop(image);
        log::trace!(target: "disk", "write sector {}", sector);
        interrupt.schedule(done);
    }

    /// Copy of the whole disk image, e.g. to carry over to a later boot.
    pub fn snapshot(&self) -> Vec<u8> {
        self.image.lock().clone()
    }
}
