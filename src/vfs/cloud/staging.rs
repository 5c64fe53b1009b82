/*!
 * Cloud Staged Writes
 * Pending files map onto remote upload sessions, opened on the first chunk
 */

use tracing::{debug, warn};

use super::super::paths;
use super::super::types::*;
use super::CloudFS;

/// Local record of one upload
#[derive(Debug, Clone, Default)]
pub(super) struct PendingUpload {
    pub(super) session: Option<String>,
    /// Bytes accepted by the session so far
    pub(super) offset: u64,
}

impl CloudFS {
    fn pending(&self, id: NewFileId) -> VfsResult<PendingUpload> {
        self.state
            .lock()
            .pending
            .get(&id)
            .cloned()
            .ok_or(VfsError::IdNotFound(id))
    }

    pub(super) fn create_new_file_impl(&self) -> VfsResult<NewFileId> {
        let _guard = self.lock.lock();
        let mut state = self.state.lock();
        let id = state.ids.next();
        state.pending.insert(id, PendingUpload::default());
        debug!(%id, "pending upload created");
        Ok(id)
    }

    pub(super) fn write_to_new_file_impl(&self, id: NewFileId, data: &[u8]) -> VfsResult<()> {
        let _guard = self.lock.lock();
        let upload = self.pending(id)?;
        if data.is_empty() {
            return Ok(());
        }

        let usage = self.usage()?;
        let available = usage.allocated.saturating_sub(usage.used);
        let len = data.len() as u64;
        if len > available {
            return Err(VfsError::InsufficientSpace {
                requested: len,
                available,
            });
        }

        let session = match upload.session {
            Some(session) => {
                self.remote
                    .upload_session_append(&session, upload.offset, data)?;
                session
            }
            None => self.remote.upload_session_start(data)?,
        };

        let mut state = self.state.lock();
        if let Some(pending) = state.pending.get_mut(&id) {
            pending.session = Some(session);
            pending.offset += len;
        }
        Ok(())
    }

    pub(super) fn commit_new_file_impl(&self, id: NewFileId, path: &str) -> VfsResult<()> {
        let _guard = self.lock.lock();
        let path = paths::normalize(path);
        let upload = self.pending(id)?;

        if paths::is_root(&path) {
            return Err(VfsError::invalid_target("cannot commit over the root directory"));
        }
        self.ensure_parent_dir(&path)?;
        if let Some(existing) = self.lookup(&path)? {
            if existing.is_dir() {
                return Err(VfsError::invalid_target(format!("is a directory: {}", path)));
            }
        }

        let session = match upload.session {
            Some(session) => session,
            None => self.remote.upload_session_start(&[])?,
        };
        let finished = self.mutate("commit", || {
            self.remote
                .upload_session_finish(&session, upload.offset, &path)
        });
        if let Err(e) = finished {
            warn!(%id, path = %path, error = %e, "commit failed");
            if let Some(pending) = self.state.lock().pending.get_mut(&id) {
                pending.session = Some(session);
            }
            return Err(e);
        }

        self.state.lock().pending.remove(&id);
        debug!(%id, path = %path, bytes = upload.offset, "upload committed");
        Ok(())
    }

    pub(super) fn flush_new_file_impl(&self, id: NewFileId) -> VfsResult<()> {
        let _guard = self.lock.lock();
        let upload = self
            .state
            .lock()
            .pending
            .remove(&id)
            .ok_or(VfsError::IdNotFound(id))?;
        // Unfinished sessions expire on the remote side
        debug!(%id, bytes = upload.offset, "upload discarded");
        Ok(())
    }
}
