/*!
 * CloudFS Library
 * Virtual filesystem over file-hosting backends with shell and FTP managers
 */

pub mod account;
pub mod config;
pub mod managers;
pub mod monitoring;
pub mod settings;
pub mod vfs;

// Re-exports
pub use account::{Account, AccountError, CloudAccount, LocalAccount};
pub use config::{BuildContext, ConfigError, Configurator, Registry};
pub use managers::{FtpManager, Manager, ManagerError, ShellManager};
pub use monitoring::init_tracing;
pub use settings::{SettingsError, SettingsStore};
pub use vfs::{
    CloudFS, FileKind, FileMetadata, FileSystem, FileSystemBuilder, FileSystemView, LocalFS,
    NewFileId, VfsError, VfsResult,
};
