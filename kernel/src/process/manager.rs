use std::collections::BTreeMap;
use std::sync::Arc;

use spin::Mutex;

use super::thread::Thread;

/// Live threads by process id. Entries are added at fork and removed once
/// the thread is gone and, for joinable threads, its exit value consumed.
pub struct ProcTable {
    table: Mutex<BTreeMap<usize, Arc<Thread>>>,
}

impl ProcTable {
    pub fn new() -> Self {
        Self { table: Mutex::new(BTreeMap::new()) }
    }

    pub fn add(&self, thread: Arc<Thread>) {
        let previous = self.table.lock().insert(thread.pid(), thread);
        assert!(previous.is_none(), "process table: pid reused");
    }

    pub fn get(&self, pid: usize) -> Option<Arc<Thread>> {
        self.table.lock().get(&pid).cloned()
    }

    pub fn has_key(&self, pid: usize) -> bool {
        self.table.lock().contains_key(&pid)
    }

    pub fn remove(&self, pid: usize) -> Option<Arc<Thread>> {
        self.table.lock().remove(&pid)
    }
}
