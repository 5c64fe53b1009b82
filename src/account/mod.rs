/*!
 * Accounts
 * One storage account per configured service, each owning one backend
 */

pub mod cloud;
pub mod local;
pub mod types;

use std::sync::Arc;

use crate::config::Registry;
use crate::vfs::{FileSystem, FileSystemView};

pub use cloud::{AuthorizationPrompt, CloudAccount, StdinPrompt};
pub use local::LocalAccount;
pub use types::{AccountError, AccountResult};

/// A file hosting account and the backend that reaches it
pub trait Account: Send + Sync {
    fn unique_id(&self) -> &str;

    /// Link to the real account. Does nothing once it has succeeded.
    fn authenticate(&self) -> AccountResult<()>;

    fn file_system(&self) -> Arc<dyn FileSystem>;

    /// New view at "/" over this account's backend
    fn new_view(&self) -> FileSystemView {
        FileSystemView::new(self.file_system())
    }
}

/// Register the account services of this module
pub fn register(registry: &mut Registry) {
    registry.register_account(local::SERVICE, local::from_params);
    registry.register_account(cloud::SERVICE, cloud::from_params);
}
