/*!
 * Remote API Seam
 * The calls the cloud backend makes against a hosted storage account
 */

use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use thiserror::Error;

use super::super::types::{FileMetadata, VfsError};

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Failure reported by a remote storage API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unexpected status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("authorization rejected: {0}")]
    Unauthorized(String),
}

impl From<RemoteError> for VfsError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::NotFound(path) => VfsError::invalid_path(path),
            other => VfsError::access_failed(other.to_string()),
        }
    }
}

/// One file or folder as the remote describes it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: SystemTime,
}

impl RemoteEntry {
    pub fn folder(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
            size: 0,
            modified: SystemTime::UNIX_EPOCH,
        }
    }

    pub fn file(path: impl Into<String>, size: u64, modified: SystemTime) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
            size,
            modified,
        }
    }

    /// Created and accessed times are not tracked remotely
    pub fn to_metadata(&self) -> FileMetadata {
        if self.is_dir {
            FileMetadata::directory(self.path.clone(), self.modified)
        } else {
            FileMetadata::file(self.path.clone(), self.size, self.modified)
        }
    }
}

/// Account quota
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceUsage {
    pub used: u64,
    pub allocated: u64,
}

/// Hosted storage API
///
/// Paths are absolute virtual paths. Implementations translate them to the
/// remote's conventions (for instance an empty string for the root folder).
#[cfg_attr(test, mockall::automock)]
pub trait RemoteApi: Send + Sync {
    fn set_access_token(&self, token: &str);

    /// URL the user visits to grant access and obtain a code
    fn authorize_url(&self) -> String;

    /// Trade an authorization code for an access token
    fn exchange_code(&self, code: &str) -> RemoteResult<String>;

    fn space_usage(&self) -> RemoteResult<SpaceUsage>;

    /// `None` when nothing exists at `path`
    fn get_metadata(&self, path: &str) -> RemoteResult<Option<RemoteEntry>>;

    fn list_folder(&self, path: &str) -> RemoteResult<Vec<RemoteEntry>>;

    fn create_folder(&self, path: &str) -> RemoteResult<()>;

    fn move_entry(&self, from: &str, to: &str) -> RemoteResult<()>;

    fn copy_entry(&self, from: &str, to: &str) -> RemoteResult<()>;

    fn delete(&self, path: &str) -> RemoteResult<()>;

    fn download(&self, path: &str, start: u64, len: Option<u64>) -> RemoteResult<Vec<u8>>;

    /// Open an upload session seeded with `data`, returning its id
    fn upload_session_start(&self, data: &[u8]) -> RemoteResult<String>;

    fn upload_session_append(&self, session: &str, offset: u64, data: &[u8]) -> RemoteResult<()>;

    /// Publish the session's bytes at `path`, overwriting a file there
    fn upload_session_finish(
        &self,
        session: &str,
        offset: u64,
        path: &str,
    ) -> RemoteResult<RemoteEntry>;
}
