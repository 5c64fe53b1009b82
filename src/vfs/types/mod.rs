/*!
 * VFS Types
 * Shared types for filesystem operations
 */

mod errors;
mod file_kind;
mod metadata;
mod new_file_id;

pub use errors::{VfsError, VfsResult};
pub use file_kind::FileKind;
pub use metadata::FileMetadata;
pub use new_file_id::NewFileId;
pub(crate) use new_file_id::NewFileIdGenerator;
