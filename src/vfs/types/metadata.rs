/*!
 * VFS Metadata
 * Immutable description of one filesystem entry
 */

use super::file_kind::FileKind;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// File metadata
///
/// Built fresh for every query. Timestamps are serialized as microseconds
/// since UNIX epoch; a backend that cannot track creation or access time
/// reports the modification time in its place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct FileMetadata {
    pub path: String,
    pub kind: FileKind,
    #[serde(skip_serializing_if = "is_zero_u64", default)]
    pub size: u64,
    #[serde(with = "system_time_micros")]
    pub created: SystemTime,
    #[serde(with = "system_time_micros")]
    pub modified: SystemTime,
    #[serde(with = "system_time_micros")]
    pub accessed: SystemTime,
}

impl FileMetadata {
    /// Metadata for a directory; size is always zero
    pub fn directory(path: impl Into<String>, modified: SystemTime) -> Self {
        Self {
            path: path.into(),
            kind: FileKind::Directory,
            size: 0,
            created: modified,
            modified,
            accessed: modified,
        }
    }

    /// Metadata for a file whose backend only knows the modification time
    pub fn file(path: impl Into<String>, size: u64, modified: SystemTime) -> Self {
        Self {
            path: path.into(),
            kind: FileKind::File,
            size,
            created: modified,
            modified,
            accessed: modified,
        }
    }

    /// Last path segment, trailing slash stripped first
    pub fn name(&self) -> &str {
        let path = self.path.strip_suffix('/').unwrap_or(&self.path);
        path.rsplit('/').next().unwrap_or(path)
    }

    #[inline(always)]
    #[must_use]
    pub const fn is_dir(&self) -> bool {
        matches!(self.kind, FileKind::Directory)
    }

    #[inline(always)]
    #[must_use]
    pub const fn is_file(&self) -> bool {
        matches!(self.kind, FileKind::File)
    }
}

fn is_zero_u64(value: &u64) -> bool {
    *value == 0
}

/// Serialize SystemTime as microseconds since UNIX epoch
mod system_time_micros {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let duration = time
            .duration_since(UNIX_EPOCH)
            .map_err(serde::ser::Error::custom)?;
        serializer.serialize_u64(duration.as_micros() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let micros = u64::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + Duration::from_micros(micros))
    }
}
