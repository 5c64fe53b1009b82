/*!
 * Managers
 * Client-protocol front ends that drive a file system view
 *
 * Each manager owns one view obtained from its account and serves its
 * clients on plain threads. Errors from the view are rendered per command;
 * a failed command never stops the manager.
 */

pub mod ftp;
pub mod shell;
pub mod transfer;
pub mod types;

pub use ftp::{FtpFsAdapter, FtpManager};
pub use shell::{ShellManager, ShellSession};
pub use types::{ManagerError, ManagerResult};

use crate::config::Registry;

/// A running front end over one file system view
pub trait Manager: Send + Sync {
    fn unique_id(&self) -> &str;

    /// Start serving. Calling it on a running manager is a no-op.
    fn run(&self) -> ManagerResult<()>;

    /// Stop serving and wait for the service thread. Idempotent.
    fn stop(&self);

    fn is_running(&self) -> bool;
}

/// Register the manager types of this module
pub fn register(registry: &mut Registry) {
    registry.register_manager(shell::MANAGER_TYPE, shell::from_params);
    registry.register_manager(ftp::MANAGER_TYPE, ftp::from_params);
}
