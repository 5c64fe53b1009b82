/*!
 * Filesystem View
 * Per-client working directory over a shared backend
 *
 * A view accepts relative or absolute paths, resolves them against its own
 * working directory and forwards to the backend unchanged. Backend errors
 * pass through as they are.
 */

use parking_lot::{ReentrantMutexGuard, RwLock};
use std::sync::Arc;
use std::time::SystemTime;

use super::paths;
use super::traits::FileSystem;
use super::types::*;

pub struct FileSystemView {
    fs: Arc<dyn FileSystem>,
    working_dir: RwLock<String>,
}

impl FileSystemView {
    /// New view rooted at "/"
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            working_dir: RwLock::new(paths::ROOT.to_string()),
        }
    }

    /// Independent view over the same backend, starting at "/"
    pub fn fresh_view(&self) -> Self {
        Self::new(Arc::clone(&self.fs))
    }

    pub fn file_system(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    /// Absolute, normalized form of `path` relative to the working directory
    pub fn get_abs_path(&self, path: &str) -> String {
        paths::resolve(&self.working_dir.read(), path)
    }

    pub fn working_dir(&self) -> String {
        self.working_dir.read().clone()
    }

    /// Change the working directory. The check and the switch happen under
    /// the backend lock, so a concurrent delete cannot leave it dangling.
    pub fn set_working_dir(&self, path: &str) -> VfsResult<()> {
        let _guard = self.fs.lock();
        let abs = self.get_abs_path(path);
        if !self.fs.exists(&abs)? {
            return Err(VfsError::invalid_path(abs));
        }
        if !self.fs.is_dir(&abs)? {
            return Err(VfsError::invalid_target(format!("not a directory: {}", abs)));
        }
        *self.working_dir.write() = abs;
        Ok(())
    }

    pub fn lock(&self) -> ReentrantMutexGuard<'_, ()> {
        self.fs.lock()
    }

    pub fn space_used(&self) -> VfsResult<u64> {
        self.fs.space_used()
    }

    pub fn free_space(&self) -> VfsResult<u64> {
        self.fs.free_space()
    }

    pub fn exists(&self, path: &str) -> VfsResult<bool> {
        self.fs.exists(&self.get_abs_path(path))
    }

    /// Entries of `path`, or of the working directory when `None`
    pub fn list_dir(&self, path: Option<&str>) -> VfsResult<Vec<String>> {
        let abs = match path {
            Some(path) => self.get_abs_path(path),
            None => self.working_dir(),
        };
        self.fs.list_dir(&abs)
    }

    pub fn is_dir(&self, path: &str) -> VfsResult<bool> {
        self.fs.is_dir(&self.get_abs_path(path))
    }

    pub fn is_file(&self, path: &str) -> VfsResult<bool> {
        self.fs.is_file(&self.get_abs_path(path))
    }

    pub fn get_size(&self, path: &str) -> VfsResult<u64> {
        self.fs.get_size(&self.get_abs_path(path))
    }

    pub fn get_metadata(&self, path: &str) -> VfsResult<FileMetadata> {
        self.fs.get_metadata(&self.get_abs_path(path))
    }

    pub fn get_content_metadata(&self, path: &str) -> VfsResult<Vec<FileMetadata>> {
        self.fs.get_content_metadata(&self.get_abs_path(path))
    }

    pub fn get_created_datetime(&self, path: &str) -> VfsResult<SystemTime> {
        self.fs.get_created_datetime(&self.get_abs_path(path))
    }

    pub fn get_modified_datetime(&self, path: &str) -> VfsResult<SystemTime> {
        self.fs.get_modified_datetime(&self.get_abs_path(path))
    }

    pub fn get_accessed_datetime(&self, path: &str) -> VfsResult<SystemTime> {
        self.fs.get_accessed_datetime(&self.get_abs_path(path))
    }

    pub fn make_dir(&self, path: &str) -> VfsResult<()> {
        self.fs.make_dir(&self.get_abs_path(path))
    }

    pub fn move_entry(&self, old_path: &str, new_path: &str) -> VfsResult<()> {
        self.fs.move_entry(&self.get_abs_path(old_path), &self.get_abs_path(new_path))
    }

    pub fn copy(&self, path: &str, copy_path: &str) -> VfsResult<()> {
        self.fs.copy(&self.get_abs_path(path), &self.get_abs_path(copy_path))
    }

    pub fn delete(&self, path: &str) -> VfsResult<()> {
        self.fs.delete(&self.get_abs_path(path))
    }

    pub fn read(&self, path: &str, start_byte: u64, num_bytes: Option<u64>) -> VfsResult<Vec<u8>> {
        self.fs.read(&self.get_abs_path(path), start_byte, num_bytes)
    }

    pub fn create_new_file(&self) -> VfsResult<NewFileId> {
        self.fs.create_new_file()
    }

    pub fn write_to_new_file(&self, id: NewFileId, data: &[u8]) -> VfsResult<()> {
        self.fs.write_to_new_file(id, data)
    }

    pub fn commit_new_file(&self, id: NewFileId, path: &str) -> VfsResult<()> {
        self.fs.commit_new_file(id, &self.get_abs_path(path))
    }

    pub fn flush_new_file(&self, id: NewFileId) -> VfsResult<()> {
        self.fs.flush_new_file(id)
    }
}

impl std::fmt::Debug for FileSystemView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystemView")
            .field("backend", &self.fs.name())
            .field("working_dir", &*self.working_dir.read())
            .finish()
    }
}
