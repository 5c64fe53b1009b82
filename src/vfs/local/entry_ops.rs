/*!
 * Entry Operations
 * Listing, directory creation, move, copy, delete and ranged reads
 */

use std::fs;
use std::io::{Read, Seek, SeekFrom};
use tracing::{debug, warn};

use super::super::paths;
use super::super::types::*;
use super::{copy_tree, tree_size, LocalFS};

impl LocalFS {
    pub(super) fn list_dir_impl(&self, path: &str) -> VfsResult<Vec<String>> {
        let _guard = self.lock.lock();
        let path = paths::normalize(path);
        self.require_dir(&path)?;

        let real = self.real_path(&path);
        let reader =
            fs::read_dir(&real).map_err(|e| VfsError::from_io(e, format!("list {}", path)))?;

        let mut names = Vec::new();
        for entry in reader {
            let entry = entry.map_err(|e| VfsError::from_io(e, format!("list {}", path)))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    pub(super) fn content_metadata_impl(&self, path: &str) -> VfsResult<Vec<FileMetadata>> {
        let _guard = self.lock.lock();
        let path = paths::normalize(path);
        let names = self.list_dir_impl(&path)?;

        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let child = paths::join(&path, &name);
            let md = self.stat(&child)?;
            out.push(Self::convert_metadata(&child, &md));
        }
        Ok(out)
    }

    pub(super) fn make_dir_impl(&self, path: &str) -> VfsResult<()> {
        let _guard = self.lock.lock();
        let path = paths::normalize(path);

        if self.try_stat(&path)?.is_some() {
            return Err(VfsError::already_exists(path));
        }
        self.ensure_parent_dir(&path)?;

        fs::create_dir(self.real_path(&path)).map_err(|e| {
            warn!(path = %path, error = %e, "mkdir failed");
            VfsError::from_io(e, format!("mkdir {}", path))
        })?;
        debug!(path = %path, "directory created");
        Ok(())
    }

    pub(super) fn move_impl(&self, old_path: &str, new_path: &str) -> VfsResult<()> {
        let _guard = self.lock.lock();
        let (old_path, new_path) = self.check_transfer(old_path, new_path)?;

        fs::rename(self.real_path(&old_path), self.real_path(&new_path)).map_err(|e| {
            warn!(from = %old_path, to = %new_path, error = %e, "move failed");
            VfsError::from_io(e, format!("move {} to {}", old_path, new_path))
        })?;
        debug!(from = %old_path, to = %new_path, "entry moved");
        Ok(())
    }

    pub(super) fn copy_impl(&self, path: &str, copy_path: &str) -> VfsResult<()> {
        let _guard = self.lock.lock();
        let (path, copy_path) = self.check_transfer(path, copy_path)?;

        let source = self.real_path(&path);
        let size =
            tree_size(&source).map_err(|e| VfsError::from_io(e, format!("measure {}", path)))?;

        {
            let state = self.state.lock();
            let available = self.free_space_locked(&state);
            if size > available {
                return Err(VfsError::InsufficientSpace {
                    requested: size,
                    available,
                });
            }
        }

        let target = self.real_path(&copy_path);
        if let Err(e) = copy_tree(&source, &target) {
            warn!(from = %path, to = %copy_path, error = %e, "copy failed");
            // Partial copies never stay visible
            let _ = if target.is_dir() {
                fs::remove_dir_all(&target)
            } else {
                fs::remove_file(&target)
            };
            return Err(VfsError::from_io(e, format!("copy {} to {}", path, copy_path)));
        }

        self.state.lock().space_used += size;
        debug!(from = %path, to = %copy_path, bytes = size, "entry copied");
        Ok(())
    }

    pub(super) fn delete_impl(&self, path: &str) -> VfsResult<()> {
        let _guard = self.lock.lock();
        let path = paths::normalize(path);
        if paths::is_root(&path) {
            return Err(VfsError::forbidden("cannot delete the root directory"));
        }

        let md = self.stat(&path)?;
        let real = self.real_path(&path);
        let size = tree_size(&real).map_err(|e| VfsError::from_io(e, format!("measure {}", path)))?;

        let removed = if md.is_dir() {
            fs::remove_dir_all(&real)
        } else {
            fs::remove_file(&real)
        };
        removed.map_err(|e| {
            warn!(path = %path, error = %e, "delete failed");
            VfsError::from_io(e, format!("delete {}", path))
        })?;

        let mut state = self.state.lock();
        state.space_used = state.space_used.saturating_sub(size);
        debug!(path = %path, bytes = size, "entry deleted");
        Ok(())
    }

    pub(super) fn read_impl(
        &self,
        path: &str,
        start_byte: u64,
        num_bytes: Option<u64>,
    ) -> VfsResult<Vec<u8>> {
        let _guard = self.lock.lock();
        let path = paths::normalize(path);
        if self.stat(&path)?.is_dir() {
            return Err(VfsError::invalid_target(format!("is a directory: {}", path)));
        }

        let mut file = fs::File::open(self.real_path(&path))
            .map_err(|e| VfsError::from_io(e, format!("open {}", path)))?;
        file.seek(SeekFrom::Start(start_byte))
            .map_err(|e| VfsError::from_io(e, format!("seek {}", path)))?;

        let mut buf = Vec::new();
        let result = match num_bytes {
            Some(limit) => file.take(limit).read_to_end(&mut buf),
            None => file.read_to_end(&mut buf),
        };
        result.map_err(|e| VfsError::from_io(e, format!("read {}", path)))?;
        Ok(buf)
    }

    /// Shared validation for move and copy; returns both paths normalized
    fn check_transfer(&self, from: &str, to: &str) -> VfsResult<(String, String)> {
        let from = paths::normalize(from);
        let to = paths::normalize(to);

        if paths::is_root(&from) {
            return Err(VfsError::forbidden("cannot move or copy the root directory"));
        }
        self.stat(&from)?;
        if paths::is_within(&from, &to) {
            return Err(VfsError::forbidden(format!(
                "{} cannot be placed inside itself ({})",
                from, to
            )));
        }
        if self.try_stat(&to)?.is_some() {
            return Err(VfsError::already_exists(to));
        }
        self.ensure_parent_dir(&to)?;
        Ok((from, to))
    }

    fn require_dir(&self, path: &str) -> VfsResult<()> {
        if self.stat(path)?.is_dir() {
            Ok(())
        } else {
            Err(VfsError::invalid_target(format!("not a directory: {}", path)))
        }
    }
}
