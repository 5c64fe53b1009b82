/*!
 * Local Filesystem Backend
 * Maps the virtual tree onto a private directory on the host disk
 *
 * Layout under the base directory:
 * - `root/`    the committed virtual tree
 * - `staging/` one `<id>.part` file per pending upload
 *
 * Space accounting is a backend-local counter rather than real disk usage, so
 * quota behaviour is deterministic: it starts at the size of the existing tree
 * and moves with every write, copy, overwrite and delete.
 */

mod entry_ops;
mod staging;

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};

use super::paths;
use super::traits::{FileSystem, FileSystemBuilder};
use super::types::*;
use staging::PendingFile;

/// Default quota, 1 GB
pub const DEFAULT_CAPACITY: u64 = 1_000_000_000;

const ROOT_DIR: &str = "root";
const STAGING_DIR: &str = "staging";

/// Local filesystem implementation using std::fs
pub struct LocalFS {
    root: PathBuf,
    staging: PathBuf,
    capacity: u64,
    lock: ReentrantMutex<()>,
    state: Mutex<LocalState>,
}

/// Mutable bookkeeping. Only touched while `lock` is held, the mutex exists
/// for interior mutability and is never held across calls to other methods.
#[derive(Default)]
struct LocalState {
    space_used: u64,
    ids: NewFileIdGenerator,
    pending: HashMap<NewFileId, PendingFile>,
}

impl LocalFS {
    /// Start building a backend rooted at `base_dir`
    pub fn builder<P: Into<PathBuf>>(base_dir: P) -> LocalFSBuilder {
        LocalFSBuilder::new(base_dir)
    }

    /// Total quota in bytes
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Host directory holding the committed tree
    pub fn root_dir(&self) -> &Path {
        &self.root
    }

    /// Number of uploads that were created but neither committed nor flushed
    pub fn pending_count(&self) -> usize {
        let _guard = self.lock.lock();
        self.state.lock().pending.len()
    }

    /// Map a virtual path to its host path. Normalization happens first, so
    /// ".." can never climb out of the root directory.
    pub(super) fn real_path(&self, path: &str) -> PathBuf {
        let normalized = paths::normalize(path);
        let mut real = self.root.clone();
        for segment in normalized.split('/').filter(|s| !s.is_empty()) {
            real.push(segment);
        }
        real
    }

    /// Stat a virtual path; a missing entry is `InvalidPath`, including one
    /// whose ancestor is a file
    pub(super) fn stat(&self, path: &str) -> VfsResult<fs::Metadata> {
        match fs::metadata(self.real_path(path)) {
            Ok(md) => Ok(md),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
                ) =>
            {
                Err(VfsError::invalid_path(path))
            }
            Err(e) => Err(VfsError::from_io(e, format!("stat {}", path))),
        }
    }

    /// Stat that reports absence as `None` instead of an error
    pub(super) fn try_stat(&self, path: &str) -> VfsResult<Option<fs::Metadata>> {
        match self.stat(path) {
            Ok(md) => Ok(Some(md)),
            Err(VfsError::InvalidPath(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Parent of `path` must exist and be a directory
    pub(super) fn ensure_parent_dir(&self, path: &str) -> VfsResult<()> {
        let parent = paths::parent(path).ok_or_else(|| VfsError::invalid_target(path))?;
        match self.try_stat(parent)? {
            None => Err(VfsError::invalid_path(format!(
                "parent directory not found: {}",
                parent
            ))),
            Some(md) if !md.is_dir() => Err(VfsError::invalid_target(format!(
                "parent is not a directory: {}",
                parent
            ))),
            Some(_) => Ok(()),
        }
    }

    pub(super) fn convert_metadata(path: &str, md: &fs::Metadata) -> FileMetadata {
        let modified = md.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let created = md.created().unwrap_or(modified);
        let accessed = md.accessed().unwrap_or(modified);
        let (kind, size) = if md.is_dir() {
            (FileKind::Directory, 0)
        } else {
            (FileKind::File, md.len())
        };

        FileMetadata {
            path: path.to_string(),
            kind,
            size,
            created,
            modified,
            accessed,
        }
    }

    fn free_space_locked(&self, state: &LocalState) -> u64 {
        self.capacity.saturating_sub(state.space_used)
    }
}

/// Total bytes of the regular files beneath `path` (or of `path` itself)
pub(super) fn tree_size(path: &Path) -> io::Result<u64> {
    let md = fs::symlink_metadata(path)?;
    if !md.is_dir() {
        return Ok(md.len());
    }
    let mut total = 0;
    for entry in fs::read_dir(path)? {
        total += tree_size(&entry?.path())?;
    }
    Ok(total)
}

/// Recursive copy of a file or directory tree
pub(super) fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    if fs::symlink_metadata(from)?.is_dir() {
        fs::create_dir(to)?;
        for entry in fs::read_dir(from)? {
            let entry = entry?;
            copy_tree(&entry.path(), &to.join(entry.file_name()))?;
        }
        Ok(())
    } else {
        fs::copy(from, to).map(|_| ())
    }
}

/// Builder for [`LocalFS`]
#[derive(Debug, Clone)]
pub struct LocalFSBuilder {
    base_dir: PathBuf,
    capacity: u64,
    reset: bool,
}

impl LocalFSBuilder {
    pub fn new<P: Into<PathBuf>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.into(),
            capacity: DEFAULT_CAPACITY,
            reset: false,
        }
    }

    /// Quota in bytes
    pub fn capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }

    /// Wipe any existing tree before starting
    pub fn reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }
}

impl FileSystemBuilder for LocalFSBuilder {
    type Output = LocalFS;

    fn build(self) -> VfsResult<LocalFS> {
        let root = self.base_dir.join(ROOT_DIR);
        let staging = self.base_dir.join(STAGING_DIR);

        if self.reset && root.exists() {
            fs::remove_dir_all(&root)
                .map_err(|e| VfsError::from_io(e, format!("reset {}", root.display())))?;
        }
        // Leftover parts from a previous process can never be committed
        if staging.exists() {
            fs::remove_dir_all(&staging)
                .map_err(|e| VfsError::from_io(e, format!("clear {}", staging.display())))?;
        }
        fs::create_dir_all(&root)
            .map_err(|e| VfsError::from_io(e, format!("create {}", root.display())))?;
        fs::create_dir_all(&staging)
            .map_err(|e| VfsError::from_io(e, format!("create {}", staging.display())))?;

        let space_used = tree_size(&root)
            .map_err(|e| VfsError::from_io(e, format!("measure {}", root.display())))?;

        info!(
            root = %root.display(),
            capacity = self.capacity,
            space_used,
            "local filesystem ready"
        );

        Ok(LocalFS {
            root,
            staging,
            capacity: self.capacity,
            lock: ReentrantMutex::new(()),
            state: Mutex::new(LocalState {
                space_used,
                ..LocalState::default()
            }),
        })
    }
}

impl FileSystem for LocalFS {
    fn lock(&self) -> ReentrantMutexGuard<'_, ()> {
        self.lock.lock()
    }

    fn name(&self) -> &str {
        "local"
    }

    fn space_used(&self) -> VfsResult<u64> {
        let _guard = self.lock.lock();
        Ok(self.state.lock().space_used)
    }

    fn free_space(&self) -> VfsResult<u64> {
        let _guard = self.lock.lock();
        let state = self.state.lock();
        Ok(self.free_space_locked(&state))
    }

    fn exists(&self, path: &str) -> VfsResult<bool> {
        let _guard = self.lock.lock();
        Ok(self.try_stat(path)?.is_some())
    }

    fn list_dir(&self, path: &str) -> VfsResult<Vec<String>> {
        self.list_dir_impl(path)
    }

    fn is_dir(&self, path: &str) -> VfsResult<bool> {
        let _guard = self.lock.lock();
        Ok(self.stat(path)?.is_dir())
    }

    fn is_file(&self, path: &str) -> VfsResult<bool> {
        let _guard = self.lock.lock();
        Ok(self.stat(path)?.is_file())
    }

    fn get_size(&self, path: &str) -> VfsResult<u64> {
        let _guard = self.lock.lock();
        let md = self.stat(path)?;
        Ok(if md.is_dir() { 0 } else { md.len() })
    }

    fn get_metadata(&self, path: &str) -> VfsResult<FileMetadata> {
        let _guard = self.lock.lock();
        let path = paths::normalize(path);
        let md = self.stat(&path)?;
        Ok(Self::convert_metadata(&path, &md))
    }

    fn get_content_metadata(&self, path: &str) -> VfsResult<Vec<FileMetadata>> {
        self.content_metadata_impl(path)
    }

    fn make_dir(&self, path: &str) -> VfsResult<()> {
        self.make_dir_impl(path)
    }

    fn move_entry(&self, old_path: &str, new_path: &str) -> VfsResult<()> {
        self.move_impl(old_path, new_path)
    }

    fn copy(&self, path: &str, copy_path: &str) -> VfsResult<()> {
        self.copy_impl(path, copy_path)
    }

    fn delete(&self, path: &str) -> VfsResult<()> {
        self.delete_impl(path)
    }

    fn read(&self, path: &str, start_byte: u64, num_bytes: Option<u64>) -> VfsResult<Vec<u8>> {
        self.read_impl(path, start_byte, num_bytes)
    }

    fn create_new_file(&self) -> VfsResult<NewFileId> {
        self.create_new_file_impl()
    }

    fn write_to_new_file(&self, id: NewFileId, data: &[u8]) -> VfsResult<()> {
        self.write_to_new_file_impl(id, data)
    }

    fn commit_new_file(&self, id: NewFileId, path: &str) -> VfsResult<()> {
        self.commit_new_file_impl(id, path)
    }

    fn flush_new_file(&self, id: NewFileId) -> VfsResult<()> {
        self.flush_new_file_impl(id)
    }
}

impl std::fmt::Debug for LocalFS {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFS")
            .field("root", &self.root)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl Drop for LocalFS {
    fn drop(&mut self) {
        let pending = self.state.get_mut().pending.len();
        if pending > 0 {
            debug!(pending, "dropping local filesystem with uncommitted uploads");
        }
    }
}
