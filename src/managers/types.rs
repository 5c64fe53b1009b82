/*!
 * Manager Types
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type ManagerResult<T> = Result<T, ManagerError>;

#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum ManagerError {
    #[error("Manager {manager} is missing required attribute `{attribute}`")]
    #[diagnostic(
        code(manager::missing_attribute),
        help("Set the attribute in the manager's params section of the configuration.")
    )]
    MissingAttribute { manager: String, attribute: String },

    #[error("Manager {manager} failed to start: {reason}")]
    #[diagnostic(code(manager::startup_failed))]
    StartupFailed { manager: String, reason: String },
}

impl ManagerError {
    pub fn missing_attribute(manager: &str, attribute: &str) -> Self {
        Self::MissingAttribute {
            manager: manager.to_string(),
            attribute: attribute.to_string(),
        }
    }

    pub fn startup_failed(manager: &str, reason: impl std::fmt::Display) -> Self {
        Self::StartupFailed {
            manager: manager.to_string(),
            reason: reason.to_string(),
        }
    }
}
