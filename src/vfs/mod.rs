/*!
 * Virtual File System Module
 * Uniform filesystem contract over local and hosted storage
 */

pub mod cloud;
pub mod local;
pub mod paths;
pub mod traits;
pub mod types;
pub mod view;

// Re-exports
pub use cloud::{CloudFS, CloudFSBuilder};
pub use local::{LocalFS, LocalFSBuilder};
pub use traits::{FileSystem, FileSystemBuilder};
pub use types::{FileKind, FileMetadata, NewFileId, VfsError, VfsResult};
pub use view::FileSystemView;
