/*!
 * VFS Error Types
 * Structured, type-safe error kinds shared by every backend
 */

use miette::Diagnostic;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use super::new_file_id::NewFileId;

/// VFS operation result
///
/// # Must Use
/// VFS operations can fail and must be handled to prevent data loss
#[must_use = "VFS operations can fail and must be handled"]
pub type VfsResult<T> = Result<T, VfsError>;

/// VFS errors
///
/// Backends validate existence and kind before touching the medium, so the
/// first six variants are deterministic. `AccessFailed` is the catch-all for
/// anything the medium reports that has no better classification.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum VfsError {
    #[error("Invalid path: {0}")]
    #[diagnostic(
        code(vfs::invalid_path),
        help("The path, or one of its parent directories, does not exist.")
    )]
    InvalidPath(#[serde(deserialize_with = "deserialize_nonempty_string")] String),

    #[error("Invalid target: {0}")]
    #[diagnostic(
        code(vfs::invalid_target),
        help("The path exists but is the wrong kind of entry for this operation.")
    )]
    InvalidTarget(#[serde(deserialize_with = "deserialize_nonempty_string")] String),

    #[error("Already exists: {0}")]
    #[diagnostic(code(vfs::already_exists))]
    AlreadyExists(#[serde(deserialize_with = "deserialize_nonempty_string")] String),

    #[error("No pending file with id {0}")]
    #[diagnostic(
        code(vfs::id_not_found),
        help("Pending file ids are consumed by commit or flush and are never reused.")
    )]
    IdNotFound(NewFileId),

    #[error("Insufficient space: {requested} bytes requested, {available} available")]
    #[diagnostic(code(vfs::insufficient_space))]
    InsufficientSpace { requested: u64, available: u64 },

    #[error("Forbidden operation: {0}")]
    #[diagnostic(code(vfs::forbidden_operation))]
    ForbiddenOperation(#[serde(deserialize_with = "deserialize_nonempty_string")] String),

    #[error("Access failed: {0}")]
    #[diagnostic(
        code(vfs::access_failed),
        help("The storage medium is unreachable or returned an unexpected failure.")
    )]
    AccessFailed(#[serde(deserialize_with = "deserialize_nonempty_string")] String),
}

impl VfsError {
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    pub fn invalid_target(path: impl Into<String>) -> Self {
        Self::InvalidTarget(path.into())
    }

    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::ForbiddenOperation(msg.into())
    }

    pub fn access_failed(msg: impl Into<String>) -> Self {
        Self::AccessFailed(msg.into())
    }

    /// Wrap a raw I/O failure with the operation it interrupted
    pub fn from_io(e: std::io::Error, context: impl std::fmt::Display) -> Self {
        Self::AccessFailed(format!("{}: {}", context, e))
    }
}

/// Deserialize and validate non-empty string for error messages
pub(super) fn deserialize_nonempty_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    if s.is_empty() {
        return Err(serde::de::Error::custom("error message must not be empty"));
    }
    Ok(s)
}
