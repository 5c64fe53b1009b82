/*!
 * VFS Traits
 * The capability set every storage backend implements
 */

use parking_lot::ReentrantMutexGuard;
use std::time::SystemTime;

use super::types::*;

/// Virtual filesystem trait
///
/// All paths are absolute virtual paths ("/" is the backend root). Backends
/// are shared between many client threads, so every operation runs under the
/// backend's single reentrant lock; callers may take the same lock through
/// [`FileSystem::lock`] to make a check-then-act sequence atomic.
///
/// Backends validate existence and kind before touching the medium: a missing
/// path is [`VfsError::InvalidPath`], a wrong kind [`VfsError::InvalidTarget`],
/// and only genuine medium failures surface as [`VfsError::AccessFailed`].
pub trait FileSystem: Send + Sync {
    /// Coarse reentrant lock guarding the whole backend
    fn lock(&self) -> ReentrantMutexGuard<'_, ()>;

    /// Backend type name, for logs
    fn name(&self) -> &str;

    /// Bytes currently used
    fn space_used(&self) -> VfsResult<u64>;

    /// Bytes still available
    fn free_space(&self) -> VfsResult<u64>;

    /// Whether a committed entry exists at `path`; pending files never do
    fn exists(&self, path: &str) -> VfsResult<bool>;

    /// Names of the entries of a directory, sorted, without "." or ".."
    fn list_dir(&self, path: &str) -> VfsResult<Vec<String>>;

    fn is_dir(&self, path: &str) -> VfsResult<bool>;

    fn is_file(&self, path: &str) -> VfsResult<bool>;

    /// Size in bytes; directories report 0
    fn get_size(&self, path: &str) -> VfsResult<u64>;

    fn get_metadata(&self, path: &str) -> VfsResult<FileMetadata>;

    /// Metadata of every child of a directory, sorted by name
    fn get_content_metadata(&self, path: &str) -> VfsResult<Vec<FileMetadata>>;

    fn get_created_datetime(&self, path: &str) -> VfsResult<SystemTime> {
        Ok(self.get_metadata(path)?.created)
    }

    fn get_modified_datetime(&self, path: &str) -> VfsResult<SystemTime> {
        Ok(self.get_metadata(path)?.modified)
    }

    fn get_accessed_datetime(&self, path: &str) -> VfsResult<SystemTime> {
        Ok(self.get_metadata(path)?.accessed)
    }

    /// Create a directory; the parent must exist and `path` must not
    fn make_dir(&self, path: &str) -> VfsResult<()>;

    /// Move or rename an entry. The destination must not exist and must not
    /// lie beneath the source.
    fn move_entry(&self, old_path: &str, new_path: &str) -> VfsResult<()>;

    /// Copy an entry (recursively for directories), same rules as `move_entry`
    fn copy(&self, path: &str, copy_path: &str) -> VfsResult<()>;

    /// Delete an entry, removing directory contents first
    fn delete(&self, path: &str) -> VfsResult<()>;

    /// Read up to `num_bytes` starting at `start_byte`, or the rest of the
    /// file when `num_bytes` is `None`. Empty when starting at or past EOF.
    fn read(&self, path: &str, start_byte: u64, num_bytes: Option<u64>) -> VfsResult<Vec<u8>>;

    /// Open a pending file and return its id
    fn create_new_file(&self) -> VfsResult<NewFileId>;

    /// Append a chunk to a pending file
    fn write_to_new_file(&self, id: NewFileId, data: &[u8]) -> VfsResult<()>;

    /// Publish a pending file at `path`, replacing an existing file there.
    /// An existing directory at `path` is rejected.
    fn commit_new_file(&self, id: NewFileId, path: &str) -> VfsResult<()>;

    /// Discard a pending file and release what it reserved
    fn flush_new_file(&self, id: NewFileId) -> VfsResult<()>;
}

/// Filesystem builder trait for configuration
pub trait FileSystemBuilder {
    type Output: FileSystem;

    /// Build the filesystem instance
    fn build(self) -> VfsResult<Self::Output>;
}
