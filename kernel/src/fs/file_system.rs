//! Top-level file system operations. The free-sector map and the root
//! directory are ordinary files whose headers sit in well-known sectors;
//! both are kept open for the life of the kernel. Operations that modify
//! the disk work on in-memory copies and flush them only once every
//! allocation has succeeded, so a failed operation leaves the disk
//! untouched. All operations are serialised under one lock.

use std::sync::{Arc, Weak};

use fs_lib::{
    DIRECTORY_FILE_SIZE, DIRECTORY_SECTOR, FREE_MAP_FILE_SIZE, FREE_MAP_SECTOR, NUM_SECTORS,
    SECTOR_SIZE,
};

use super::bitmap::Bitmap;
use super::directory::Directory;
use super::file_table::FileTable;
use super::header::FileHeader;
use super::open_file::OpenFile;
use super::path::{absolute, file_name};
use crate::lock::SleepLock;
use crate::Kernel;

pub struct FileSystem {
    kernel: Weak<Kernel>,
    free_map_file: Arc<OpenFile>,
    directory_file: Arc<OpenFile>,
    pub(crate) table: FileTable,
    /// Serialises every file-system operation; concurrent mutation of the
    /// shared bitmap and directories is otherwise unordered.
    op_lock: SleepLock<()>,
}

impl FileSystem {
    /// Bring up the file system. With `format` the disk is assumed blank:
    /// lay down headers for the free map and the root directory, then
    /// write out their initial contents. Otherwise just open both.
    pub fn new(kernel: &Arc<Kernel>, format: bool) -> Arc<FileSystem> {
        let weak = Arc::downgrade(kernel);
        if format {
            log::debug!(target: "fs", "formatting the file system");
            let mut free_map = Bitmap::new(NUM_SECTORS);
            let directory = Directory::new();
            let mut map_hdr = FileHeader::new();
            let mut dir_hdr = FileHeader::new();

            // The two well-known header sectors go first so nothing else
            // can claim them.
            free_map.mark(FREE_MAP_SECTOR as usize);
            free_map.mark(DIRECTORY_SECTOR as usize);
            assert!(
                map_hdr.allocate(&mut free_map, FREE_MAP_FILE_SIZE as u32),
                "no space for the free map"
            );
            assert!(
                dir_hdr.allocate(&mut free_map, DIRECTORY_FILE_SIZE as u32),
                "no space for the root directory"
            );

            // Headers must hit the disk before the files can be opened;
            // open reads the header back from its sector.
            map_hdr.write_back(&kernel.disk, FREE_MAP_SECTOR);
            dir_hdr.write_back(&kernel.disk, DIRECTORY_SECTOR);

            let free_map_file = OpenFile::new(kernel, FREE_MAP_SECTOR);
            let directory_file = OpenFile::new(kernel, DIRECTORY_SECTOR);
            free_map.write_back(&free_map_file);
            directory.write_back(&directory_file);

            Arc::new(Self {
                kernel: weak.clone(),
                free_map_file,
                directory_file,
                table: FileTable::new(weak.clone()),
                op_lock: SleepLock::new(weak, (), "file system"),
            })
        } else {
            Arc::new(Self {
                kernel: weak.clone(),
                free_map_file: OpenFile::new(kernel, FREE_MAP_SECTOR),
                directory_file: OpenFile::new(kernel, DIRECTORY_SECTOR),
                table: FileTable::new(weak.clone()),
                op_lock: SleepLock::new(weak, (), "file system"),
            })
        }
    }

    fn kernel(&self) -> Arc<Kernel> {
        self.kernel.upgrade().expect("file system outlived the kernel")
    }

    /// Create a file of `initial_size` bytes at `path`.
    pub fn create(&self, path: &str, initial_size: u32) -> Result<(), &'static str> {
        let kernel = self.kernel();
        let path = absolute(&kernel, path);
        let _guard = self.op_lock.lock();
        self.create_locked(&kernel, &path, initial_size)
    }

    fn create_locked(&self, kernel: &Arc<Kernel>, path: &str, initial_size: u32) -> Result<(), &'static str> {
        let name = file_name(path);
        log::debug!(target: "fs", "creating file {} with size {}", path, initial_size);
        let (mut directory, dir_sector) = self.open_path(kernel, path).ok_or("no such directory")?;
        if directory.find(name, false).is_some() || directory.find(name, true).is_some() {
            return Err("name already exists");
        }
        let mut free_map = Bitmap::new(NUM_SECTORS);
        free_map.fetch_from(&self.free_map_file);
        let sector = free_map.find().ok_or("no free sector for the file header")? as u32;
        if !directory.add(name, sector, false) {
            return Err("no directory entry available");
        }
        let mut header = FileHeader::new();
        if !header.allocate(&mut free_map, initial_size) {
            return Err("no space for data blocks");
        }
        // Everything worked; flush the changes.
        header.write_back(&kernel.disk, sector);
        free_map.write_back(&self.free_map_file);
        self.write_dir(kernel, &directory, dir_sector);
        Ok(())
    }

    /// Open `path` for reading and writing. Nothing is returned for a
    /// missing file, a directory, or a file whose removal is pending.
    pub fn open(&self, path: &str) -> Option<Arc<OpenFile>> {
        let kernel = self.kernel();
        let path = absolute(&kernel, path);
        let _guard = self.op_lock.lock();
        let name = file_name(&path);
        log::debug!(target: "fs", "opening {}", path);
        let (directory, _) = self.open_path(&kernel, &path)?;
        let sector = directory.find(name, false)?;
        let node = match self.table.find(sector) {
            Some(node) => node,
            None => self.table.add_file(&path, sector),
        };
        if node.remove_pending() {
            return None;
        }
        node.add_user();
        Some(OpenFile::new(&kernel, sector))
    }

    /// Unlink `path`. A directory is removed recursively. A file still
    /// held open is only marked; the space comes back on the last close.
    pub fn remove(&self, path: &str) -> Result<(), &'static str> {
        let kernel = self.kernel();
        let path = absolute(&kernel, path);
        let _guard = self.op_lock.lock();
        self.remove_locked(&kernel, &path)
    }

    fn remove_locked(&self, kernel: &Arc<Kernel>, path: &str) -> Result<(), &'static str> {
        let name = file_name(path);
        let (mut directory, dir_sector) = self.open_path(kernel, path).ok_or("no such directory")?;
        let sector = match directory.find(name, false) {
            Some(sector) => sector,
            None => {
                directory.find(name, true).ok_or("no such file or directory")?;
                return self.remove_dir_locked(kernel, path);
            }
        };
        if let Some(node) = self.table.find(sector) {
            if node.users() != 0 {
                log::debug!(target: "fs", "{} is in use, deferring the remove", path);
                node.set_remove_pending();
                return Ok(());
            }
        }
        log::debug!(target: "fs", "removing {}", path);
        directory.remove(name);
        let mut free_map = Bitmap::new(NUM_SECTORS);
        free_map.fetch_from(&self.free_map_file);
        let mut header = FileHeader::new();
        header.fetch_from(&kernel.disk, sector);
        header.deallocate(&mut free_map);
        free_map.clear(sector as usize);
        free_map.write_back(&self.free_map_file);
        self.write_dir(kernel, &directory, dir_sector);
        self.table.remove(sector);
        Ok(())
    }

    /// Grow the file whose header is at `sector` by `extra` bytes.
    pub fn expand(&self, sector: u32, extra: u32) -> Result<(), &'static str> {
        let kernel = self.kernel();
        let _guard = self.op_lock.lock();
        log::debug!(target: "fs", "extending sector {} by {} bytes", sector, extra);
        let mut header = FileHeader::new();
        header.fetch_from(&kernel.disk, sector);
        let mut free_map = Bitmap::new(NUM_SECTORS);
        free_map.fetch_from(&self.free_map_file);
        if !header.extend(&mut free_map, extra) {
            return Err("no space to extend");
        }
        free_map.write_back(&self.free_map_file);
        header.write_back(&kernel.disk, sector);
        Ok(())
    }

    /// Create an empty directory at `path`.
    pub fn make_dir(&self, path: &str) -> Result<(), &'static str> {
        let kernel = self.kernel();
        let path = absolute(&kernel, path);
        let _guard = self.op_lock.lock();
        let name = file_name(&path);
        log::debug!(target: "fs", "creating directory {}", path);
        let (mut directory, dir_sector) = self.open_path(&kernel, &path).ok_or("no such directory")?;
        if directory.find(name, false).is_some() || directory.find(name, true).is_some() {
            return Err("name already exists");
        }
        let mut free_map = Bitmap::new(NUM_SECTORS);
        free_map.fetch_from(&self.free_map_file);
        let sector = free_map.find().ok_or("no free sector for the directory header")? as u32;
        if !directory.add(name, sector, true) {
            return Err("no directory entry available");
        }
        let mut header = FileHeader::new();
        if !header.allocate(&mut free_map, DIRECTORY_FILE_SIZE as u32) {
            return Err("no space for the directory");
        }
        // The new table must parse as all-free entries.
        for i in 0..header.num_sectors() {
            kernel.disk.clear_sector(header.byte_to_sector(i * SECTOR_SIZE as u32) as usize);
        }
        header.write_back(&kernel.disk, sector);
        free_map.write_back(&self.free_map_file);
        self.write_dir(&kernel, &directory, dir_sector);
        Ok(())
    }

    /// Remove the directory at `path` and everything below it.
    pub fn remove_dir(&self, path: &str) -> Result<(), &'static str> {
        let kernel = self.kernel();
        let path = absolute(&kernel, path);
        let _guard = self.op_lock.lock();
        self.remove_dir_locked(&kernel, &path)
    }

    fn remove_dir_locked(&self, kernel: &Arc<Kernel>, path: &str) -> Result<(), &'static str> {
        if path.trim_matches('/').is_empty() {
            return Err("cannot remove the root directory");
        }
        let name = file_name(path);
        log::debug!(target: "fs", "removing directory {} and its contents", path);
        let (mut directory, dir_sector) = self.open_path(kernel, path).ok_or("no such directory")?;
        let folder_sector = directory.find(name, true).ok_or("no such directory")?;
        directory.remove(name);

        let mut free_map = Bitmap::new(NUM_SECTORS);
        free_map.fetch_from(&self.free_map_file);

        let folder_file = OpenFile::new(kernel, folder_sector);
        let mut folder = Directory::new();
        folder.fetch_from(&folder_file);
        folder.clean(kernel, &mut free_map);

        let mut header = FileHeader::new();
        header.fetch_from(&kernel.disk, folder_sector);
        header.deallocate(&mut free_map);
        free_map.clear(folder_sector as usize);

        self.write_dir(kernel, &directory, dir_sector);
        free_map.write_back(&self.free_map_file);
        Ok(())
    }

    /// In-use entries of the directory at `path`, in table order.
    pub fn list(&self, path: &str) -> Option<Vec<(String, bool)>> {
        let kernel = self.kernel();
        let path = absolute(&kernel, path);
        let _guard = self.op_lock.lock();
        Some(self.open_dir(&kernel, &path)?.list())
    }

    /// Whether `path` resolves to a directory.
    pub fn check_path(&self, path: &str) -> bool {
        let kernel = self.kernel();
        let path = absolute(&kernel, path);
        let _guard = self.op_lock.lock();
        self.open_dir(&kernel, &path).is_some()
    }

    /// Called when the last strong reference to a handle goes away.
    pub(crate) fn close_sector(&self, sector: u32) {
        if let Some(node) = self.table.find(sector) {
            let remaining = node.drop_user();
            if remaining == 0 && node.remove_pending() {
                log::debug!(target: "fs", "last close of {}, removing it now", node.name);
                let _ = self.remove(&node.name);
            }
        }
    }

    /// Walk the directories leading to `path`'s last component. Returns
    /// the containing directory and the sector its table lives at; every
    /// intermediate component must name a directory.
    fn open_path(&self, kernel: &Arc<Kernel>, path: &str) -> Option<(Directory, u32)> {
        let mut directory = Directory::new();
        directory.fetch_from(&self.directory_file);
        let mut sector = DIRECTORY_SECTOR;
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        for &component in components.iter().take(components.len().saturating_sub(1)) {
            let next = directory.find(component, true)?;
            let file = OpenFile::new(kernel, next);
            directory.fetch_from(&file);
            sector = next;
        }
        Some((directory, sector))
    }

    /// Walk the whole of `path` as a directory chain.
    fn open_dir(&self, kernel: &Arc<Kernel>, path: &str) -> Option<Directory> {
        let mut directory = Directory::new();
        directory.fetch_from(&self.directory_file);
        for component in path.split('/').filter(|c| !c.is_empty()) {
            let next = directory.find(component, true)?;
            let file = OpenFile::new(kernel, next);
            directory.fetch_from(&file);
        }
        Some(directory)
    }

    /// Flush a directory back to whichever file holds its table.
    fn write_dir(&self, kernel: &Arc<Kernel>, directory: &Directory, sector: u32) {
        if sector == DIRECTORY_SECTOR {
            directory.write_back(&self.directory_file);
        } else {
            let file = OpenFile::new(kernel, sector);
            directory.write_back(&file);
        }
    }

    /// Raw free-map contents, for consistency checks.
    pub fn free_map_bytes(&self) -> Vec<u8> {
        let _guard = self.op_lock.lock();
        let mut bytes = vec![0u8; FREE_MAP_FILE_SIZE];
        self.free_map_file.read_at(&mut bytes, 0);
        bytes
    }
}
