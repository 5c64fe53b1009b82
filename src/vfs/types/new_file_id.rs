/*!
 * Pending File Identifier
 * Opaque handle for an upload that has not been committed yet
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one pending file inside the backend that issued it.
///
/// Ids are minted from a per-backend monotonic counter and never reused, so a
/// stale id always fails with `IdNotFound` instead of addressing a newer upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NewFileId(u64);

impl NewFileId {
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NewFileId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic id source, one per backend
#[derive(Debug, Default)]
pub(crate) struct NewFileIdGenerator {
    last: u64,
}

impl NewFileIdGenerator {
    pub(crate) fn next(&mut self) -> NewFileId {
        self.last += 1;
        NewFileId(self.last)
    }
}
