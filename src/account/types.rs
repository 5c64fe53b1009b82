/*!
 * Account Types
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::settings::SettingsError;
use crate::vfs::VfsError;

pub type AccountResult<T> = Result<T, AccountError>;

#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum AccountError {
    #[error("Authentication failed for account {account}: {reason}")]
    #[diagnostic(
        code(account::authentication_failed),
        help("Check the credentials or authorization code and try again.")
    )]
    AuthenticationFailed { account: String, reason: String },

    #[error("Account {account} is missing setting `{key}`")]
    #[diagnostic(code(account::missing_setting))]
    MissingSetting { account: String, key: String },

    #[error("Account {account} storage is unavailable: {source}")]
    #[diagnostic(code(account::storage))]
    Storage {
        account: String,
        #[source]
        source: VfsError,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Settings(#[from] SettingsError),
}

impl AccountError {
    pub fn authentication_failed(account: &str, reason: impl Into<String>) -> Self {
        Self::AuthenticationFailed {
            account: account.to_string(),
            reason: reason.into(),
        }
    }
}
