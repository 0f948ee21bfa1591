//! Shared per-file state for open files, keyed by header sector: how many
//! handles are out, whether a remove is pending, and the reader/writer
//! gates that order concurrent transfers.

use std::sync::{Arc, Weak};

use spin::Mutex;

use crate::lock::Semaphore;
use crate::Kernel;

struct NodeState {
    users: usize,
    remove_pending: bool,
}

/// State shared by every handle open on one file.
pub struct Filenode {
    /// Absolute path, so a deferred remove does not depend on whichever
    /// thread happens to close last.
    pub name: String,
    pub sector: u32,
    state: Mutex<NodeState>,
    can_read: Semaphore,
    can_write: Semaphore,
    readers: Mutex<usize>,
}

impl Filenode {
    fn new(kernel: Weak<Kernel>, name: &str, sector: u32) -> Self {
        Self {
            name: name.to_string(),
            sector,
            state: Mutex::new(NodeState { users: 0, remove_pending: false }),
            can_read: Semaphore::new(kernel.clone(), "file readers", 1),
            can_write: Semaphore::new(kernel, "file writer", 1),
            readers: Mutex::new(0),
        }
    }

    pub fn users(&self) -> usize {
        self.state.lock().users
    }

    pub fn add_user(&self) {
        self.state.lock().users += 1;
    }

    /// Drop one user; returns how many remain.
    pub fn drop_user(&self) -> usize {
        let mut state = self.state.lock();
        assert!(state.users > 0, "file node: user count underflow");
        state.users -= 1;
        state.users
    }

    pub fn remove_pending(&self) -> bool {
        self.state.lock().remove_pending
    }

    pub fn set_remove_pending(&self) {
        self.state.lock().remove_pending = true;
    }

    /// Readers prefer: the first reader in locks writers out, the last
    /// reader out lets them back in.
    pub fn reader_enter(&self) {
        self.can_read.p();
        let first = {
            let mut readers = self.readers.lock();
            *readers += 1;
            *readers == 1
        };
        if first {
            self.can_write.p();
        }
        self.can_read.v();
    }

    pub fn reader_leave(&self) {
        self.can_read.p();
        let last = {
            let mut readers = self.readers.lock();
            *readers -= 1;
            *readers == 0
        };
        if last {
            self.can_write.v();
        }
        self.can_read.v();
    }

    pub fn writer_enter(&self) {
        self.can_write.p();
    }

    pub fn writer_leave(&self) {
        self.can_write.v();
    }
}

/// Process-wide map from header sector to its node.
pub struct FileTable {
    kernel: Weak<Kernel>,
    nodes: Mutex<Vec<Arc<Filenode>>>,
}

impl FileTable {
    pub fn new(kernel: Weak<Kernel>) -> Self {
        Self { kernel, nodes: Mutex::new(Vec::new()) }
    }

    pub fn add_file(&self, name: &str, sector: u32) -> Arc<Filenode> {
        let node = Arc::new(Filenode::new(self.kernel.clone(), name, sector));
        self.nodes.lock().push(node.clone());
        node
    }

    pub fn find(&self, sector: u32) -> Option<Arc<Filenode>> {
        self.nodes.lock().iter().find(|n| n.sector == sector).cloned()
    }

    pub fn remove(&self, sector: u32) {
        self.nodes.lock().retain(|n| n.sector != sector);
    }
}
