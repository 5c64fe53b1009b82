/*!
 * Cloud Filesystem Backend
 * Virtual tree stored in a hosted storage account behind a [`RemoteApi`]
 *
 * Features:
 * - Listing cache so one directory listing answers a burst of per-entry
 *   queries (an FTP `LIST` followed by stat calls, for example)
 * - Uploads streamed through remote upload sessions
 * - 404s surface as `InvalidPath`, every other remote failure as `AccessFailed`
 */

pub mod cache;
pub mod http;
pub mod memory_remote;
pub mod remote;
mod staging;

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

use super::paths;
use super::traits::{FileSystem, FileSystemBuilder};
use super::types::*;
use cache::{CacheStats, ListingCache, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL};
use staging::PendingUpload;

pub use http::{HttpRemoteApi, HttpRemoteConfig};
pub use memory_remote::MemoryRemote;
pub use remote::{RemoteApi, RemoteEntry, RemoteError, RemoteResult, SpaceUsage};

/// Cloud filesystem implementation
pub struct CloudFS {
    remote: Arc<dyn RemoteApi>,
    lock: ReentrantMutex<()>,
    cache: ListingCache,
    state: Mutex<CloudState>,
}

#[derive(Default)]
struct CloudState {
    ids: NewFileIdGenerator,
    pending: HashMap<NewFileId, PendingUpload>,
}

impl CloudFS {
    pub fn builder(remote: Arc<dyn RemoteApi>) -> CloudFSBuilder {
        CloudFSBuilder::new(remote)
    }

    /// The remote this backend talks to, for token management
    pub fn remote(&self) -> &Arc<dyn RemoteApi> {
        &self.remote
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Metadata for `path`, served from a cached parent listing when possible
    fn lookup(&self, path: &str) -> VfsResult<Option<FileMetadata>> {
        if paths::is_root(path) {
            return Ok(Some(FileMetadata::directory(paths::ROOT, SystemTime::UNIX_EPOCH)));
        }
        if let Some(cached) = self.cache.lookup(path) {
            return Ok(cached);
        }
        let entry = self.remote.get_metadata(path)?;
        Ok(entry.map(|e| {
            let mut md = e.to_metadata();
            md.path = path.to_string();
            md
        }))
    }

    fn require(&self, path: &str) -> VfsResult<FileMetadata> {
        self.lookup(path)?
            .ok_or_else(|| VfsError::invalid_path(path))
    }

    fn ensure_parent_dir(&self, path: &str) -> VfsResult<()> {
        let parent = paths::parent(path).ok_or_else(|| VfsError::invalid_target(path))?;
        match self.lookup(parent)? {
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

    /// Children of a directory, sorted by name
    fn listing(&self, path: &str) -> VfsResult<Vec<FileMetadata>> {
        if let Some(children) = self.cache.get(path) {
            return Ok(children);
        }
        if !self.require(path)?.is_dir() {
            return Err(VfsError::invalid_target(format!("not a directory: {}", path)));
        }

        let mut children: Vec<FileMetadata> = self
            .remote
            .list_folder(path)?
            .into_iter()
            .map(|entry| {
                let mut md = entry.to_metadata();
                md.path = paths::join(path, md.name());
                md
            })
            .collect();
        children.sort_by(|a, b| a.name().cmp(b.name()));

        self.cache.put(path, children.clone());
        Ok(children)
    }

    fn usage(&self) -> VfsResult<SpaceUsage> {
        let usage = self.remote.space_usage()?;
        let reserved: u64 = self.state.lock().pending.values().map(|p| p.offset).sum();
        Ok(SpaceUsage {
            used: usage.used + reserved,
            allocated: usage.allocated,
        })
    }

    fn check_transfer(&self, from: &str, to: &str) -> VfsResult<(String, String)> {
        let from = paths::normalize(from);
        let to = paths::normalize(to);

        if paths::is_root(&from) {
            return Err(VfsError::forbidden("cannot move or copy the root directory"));
        }
        self.require(&from)?;
        if paths::is_within(&from, &to) {
            return Err(VfsError::forbidden(format!(
                "{} cannot be placed inside itself ({})",
                from, to
            )));
        }
        if self.lookup(&to)?.is_some() {
            return Err(VfsError::already_exists(to));
        }
        self.ensure_parent_dir(&to)?;
        Ok((from, to))
    }

    /// Run a mutating remote call; the listing cache is dropped either way
    fn mutate<T>(&self, what: &str, call: impl FnOnce() -> RemoteResult<T>) -> VfsResult<T> {
        let result = call();
        self.cache.clear();
        result.map_err(|e| {
            warn!(operation = what, error = %e, "remote mutation failed");
            VfsError::from(e)
        })
    }
}

/// Builder for [`CloudFS`]
pub struct CloudFSBuilder {
    remote: Arc<dyn RemoteApi>,
    cache_capacity: usize,
    cache_ttl: Duration,
}

impl CloudFSBuilder {
    pub fn new(remote: Arc<dyn RemoteApi>) -> Self {
        Self {
            remote,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }

    /// Number of directory listings kept; 0 disables the cache
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }
}

impl FileSystemBuilder for CloudFSBuilder {
    type Output = CloudFS;

    fn build(self) -> VfsResult<CloudFS> {
        Ok(CloudFS {
            remote: self.remote,
            lock: ReentrantMutex::new(()),
            cache: ListingCache::new(self.cache_capacity, self.cache_ttl),
            state: Mutex::new(CloudState::default()),
        })
    }
}

impl FileSystem for CloudFS {
    fn lock(&self) -> ReentrantMutexGuard<'_, ()> {
        self.lock.lock()
    }

    fn name(&self) -> &str {
        "cloud"
    }

    fn space_used(&self) -> VfsResult<u64> {
        let _guard = self.lock.lock();
        Ok(self.usage()?.used)
    }

    fn free_space(&self) -> VfsResult<u64> {
        let _guard = self.lock.lock();
        let usage = self.usage()?;
        Ok(usage.allocated.saturating_sub(usage.used))
    }

    fn exists(&self, path: &str) -> VfsResult<bool> {
        let _guard = self.lock.lock();
        Ok(self.lookup(&paths::normalize(path))?.is_some())
    }

    fn list_dir(&self, path: &str) -> VfsResult<Vec<String>> {
        let _guard = self.lock.lock();
        Ok(self
            .listing(&paths::normalize(path))?
            .iter()
            .map(|md| md.name().to_string())
            .collect())
    }

    fn is_dir(&self, path: &str) -> VfsResult<bool> {
        let _guard = self.lock.lock();
        Ok(self.require(&paths::normalize(path))?.is_dir())
    }

    fn is_file(&self, path: &str) -> VfsResult<bool> {
        let _guard = self.lock.lock();
        Ok(self.require(&paths::normalize(path))?.is_file())
    }

    fn get_size(&self, path: &str) -> VfsResult<u64> {
        let _guard = self.lock.lock();
        Ok(self.require(&paths::normalize(path))?.size)
    }

    fn get_metadata(&self, path: &str) -> VfsResult<FileMetadata> {
        let _guard = self.lock.lock();
        self.require(&paths::normalize(path))
    }

    fn get_content_metadata(&self, path: &str) -> VfsResult<Vec<FileMetadata>> {
        let _guard = self.lock.lock();
        self.listing(&paths::normalize(path))
    }

    fn make_dir(&self, path: &str) -> VfsResult<()> {
        let _guard = self.lock.lock();
        let path = paths::normalize(path);
        if self.lookup(&path)?.is_some() {
            return Err(VfsError::already_exists(path));
        }
        self.ensure_parent_dir(&path)?;

        self.mutate("make_dir", || self.remote.create_folder(&path))?;
        debug!(path = %path, "remote folder created");
        Ok(())
    }

    fn move_entry(&self, old_path: &str, new_path: &str) -> VfsResult<()> {
        let _guard = self.lock.lock();
        let (from, to) = self.check_transfer(old_path, new_path)?;

        self.mutate("move", || self.remote.move_entry(&from, &to))?;
        debug!(from = %from, to = %to, "remote entry moved");
        Ok(())
    }

    fn copy(&self, path: &str, copy_path: &str) -> VfsResult<()> {
        let _guard = self.lock.lock();
        let (from, to) = self.check_transfer(path, copy_path)?;

        self.mutate("copy", || self.remote.copy_entry(&from, &to))?;
        debug!(from = %from, to = %to, "remote entry copied");
        Ok(())
    }

    fn delete(&self, path: &str) -> VfsResult<()> {
        let _guard = self.lock.lock();
        let path = paths::normalize(path);
        if paths::is_root(&path) {
            return Err(VfsError::forbidden("cannot delete the root directory"));
        }
        self.require(&path)?;

        self.mutate("delete", || self.remote.delete(&path))?;
        debug!(path = %path, "remote entry deleted");
        Ok(())
    }

    fn read(&self, path: &str, start_byte: u64, num_bytes: Option<u64>) -> VfsResult<Vec<u8>> {
        let _guard = self.lock.lock();
        let path = paths::normalize(path);
        let md = self.require(&path)?;
        if md.is_dir() {
            return Err(VfsError::invalid_target(format!("is a directory: {}", path)));
        }
        let remaining = md.size.saturating_sub(start_byte);
        let len = num_bytes.map_or(remaining, |n| n.min(remaining));
        if len == 0 {
            return Ok(Vec::new());
        }
        Ok(self.remote.download(&path, start_byte, Some(len))?)
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
