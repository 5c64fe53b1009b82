/*!
 * Shared backends for the VFS suites
 */

use std::sync::Arc;
use tempfile::TempDir;

use cloudfs::vfs::cloud::MemoryRemote;
use cloudfs::{CloudFS, FileSystem, FileSystemBuilder, LocalFS, VfsResult};

/// A backend under test; keeps its scratch directory alive
pub struct Backend {
    pub name: &'static str,
    pub fs: Arc<dyn FileSystem>,
    _temp: Option<TempDir>,
}

pub fn local(capacity: u64) -> Backend {
    let temp = TempDir::new().unwrap();
    let fs = LocalFS::builder(temp.path()).capacity(capacity).build().unwrap();
    Backend {
        name: "local",
        fs: Arc::new(fs),
        _temp: Some(temp),
    }
}

pub fn cloud(capacity: u64) -> Backend {
    let remote = Arc::new(MemoryRemote::with_allocation(capacity));
    let fs = CloudFS::builder(remote).build().unwrap();
    Backend {
        name: "cloud",
        fs: Arc::new(fs),
        _temp: None,
    }
}

/// One instance of every backend
pub fn backends(capacity: u64) -> Vec<Backend> {
    vec![local(capacity), cloud(capacity)]
}

/// Staged write of `data` committed at `path`; a rejected upload is flushed
pub fn put(fs: &dyn FileSystem, path: &str, data: &[u8]) -> VfsResult<()> {
    let id = fs.create_new_file()?;
    let written = fs
        .write_to_new_file(id, data)
        .and_then(|_| fs.commit_new_file(id, path));
    if written.is_err() {
        let _ = fs.flush_new_file(id);
    }
    written
}
