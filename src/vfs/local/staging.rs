/*!
 * Staged Writes
 * Pending uploads live as `<staging>/<id>.part` until commit or flush
 */

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::super::paths;
use super::super::types::*;
use super::LocalFS;

/// One open upload
pub(super) struct PendingFile {
    file: File,
    temp_path: PathBuf,
    written: u64,
}

impl LocalFS {
    fn part_path(&self, id: NewFileId) -> PathBuf {
        self.staging.join(format!("{}.part", id))
    }

    pub(super) fn create_new_file_impl(&self) -> VfsResult<NewFileId> {
        let _guard = self.lock.lock();
        let id = self.state.lock().ids.next();
        let temp_path = self.part_path(id);

        let file = File::create(&temp_path)
            .map_err(|e| VfsError::from_io(e, format!("create {}", temp_path.display())))?;

        self.state.lock().pending.insert(
            id,
            PendingFile {
                file,
                temp_path,
                written: 0,
            },
        );
        debug!(%id, "pending file created");
        Ok(id)
    }

    pub(super) fn write_to_new_file_impl(&self, id: NewFileId, data: &[u8]) -> VfsResult<()> {
        let _guard = self.lock.lock();
        let mut state = self.state.lock();

        let available = self.free_space_locked(&state);
        if !state.pending.contains_key(&id) {
            return Err(VfsError::IdNotFound(id));
        }
        let len = data.len() as u64;
        if len > available {
            return Err(VfsError::InsufficientSpace {
                requested: len,
                available,
            });
        }

        // Reserve first, roll back if the medium refuses the bytes
        state.space_used += len;
        let pending = state
            .pending
            .get_mut(&id)
            .ok_or(VfsError::IdNotFound(id))?;
        let result = pending.file.write_all(data);
        if result.is_ok() {
            pending.written += len;
        }
        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                state.space_used -= len;
                warn!(%id, error = %e, "write to pending file failed");
                Err(VfsError::from_io(e, format!("write pending file {}", id)))
            }
        }
    }

    pub(super) fn commit_new_file_impl(&self, id: NewFileId, path: &str) -> VfsResult<()> {
        let _guard = self.lock.lock();
        let path = paths::normalize(path);

        if !self.state.lock().pending.contains_key(&id) {
            return Err(VfsError::IdNotFound(id));
        }
        if paths::is_root(&path) {
            return Err(VfsError::invalid_target("cannot commit over the root directory"));
        }
        self.ensure_parent_dir(&path)?;
        let replaced = match self.try_stat(&path)? {
            Some(md) if md.is_dir() => {
                return Err(VfsError::invalid_target(format!("is a directory: {}", path)));
            }
            Some(md) => md.len(),
            None => 0,
        };

        let pending = self
            .state
            .lock()
            .pending
            .remove(&id)
            .ok_or(VfsError::IdNotFound(id))?;
        let PendingFile {
            file,
            temp_path,
            written,
        } = pending;
        if let Err(e) = file.sync_all() {
            debug!(%id, error = %e, "sync before commit failed");
        }
        drop(file);

        let target = self.real_path(&path);
        if let Err(e) = promote(&temp_path, &target) {
            warn!(%id, path = %path, error = %e, "commit failed");
            // Put the upload back so the caller can retry or flush it
            let file = OpenOptions::new()
                .append(true)
                .open(&temp_path)
                .map_err(|e| VfsError::from_io(e, format!("reopen pending file {}", id)))?;
            self.state.lock().pending.insert(
                id,
                PendingFile {
                    file,
                    temp_path,
                    written,
                },
            );
            return Err(VfsError::from_io(e, format!("commit {}", path)));
        }

        let mut state = self.state.lock();
        state.space_used = state.space_used.saturating_sub(replaced);
        debug!(%id, path = %path, bytes = written, replaced, "pending file committed");
        Ok(())
    }

    pub(super) fn flush_new_file_impl(&self, id: NewFileId) -> VfsResult<()> {
        let _guard = self.lock.lock();
        let pending = self
            .state
            .lock()
            .pending
            .remove(&id)
            .ok_or(VfsError::IdNotFound(id))?;
        let PendingFile {
            file,
            temp_path,
            written,
        } = pending;
        drop(file);

        {
            let mut state = self.state.lock();
            state.space_used = state.space_used.saturating_sub(written);
        }

        if let Err(e) = fs::remove_file(&temp_path) {
            warn!(%id, error = %e, "could not remove pending file");
        }
        debug!(%id, bytes = written, "pending file flushed");
        Ok(())
    }
}

/// Rename into place; across devices fall back to copy and remove
fn promote(from: &Path, to: &Path) -> std::io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}
