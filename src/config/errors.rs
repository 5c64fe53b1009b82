/*!
 * Configuration Errors
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum ConfigError {
    #[error("Cannot read configuration {path}: {reason}")]
    #[diagnostic(code(config::io))]
    Io { path: String, reason: String },

    #[error("Malformed configuration: {0}")]
    #[diagnostic(
        code(config::parse),
        help("The file must be TOML with [[accounts]] and [[managers]] tables.")
    )]
    Parse(String),

    #[error("{section} entry {position} is missing `{attribute}`")]
    #[diagnostic(code(config::missing_attribute))]
    MissingAttribute {
        section: String,
        position: usize,
        attribute: String,
    },

    #[error("Account {account} uses unknown service `{service}`")]
    #[diagnostic(code(config::unknown_service))]
    UnknownService { account: String, service: String },

    #[error("Manager {manager} has unknown type `{kind}`")]
    #[diagnostic(code(config::unknown_manager_type))]
    UnknownManagerType { manager: String, kind: String },

    #[error("Manager {manager} refers to unknown account `{account}`")]
    #[diagnostic(code(config::unknown_account), help("Accounts must be declared before use."))]
    UnknownAccount { manager: String, account: String },

    #[error("Id `{0}` is used more than once")]
    #[diagnostic(code(config::duplicate_id), help("Account and manager ids share one namespace."))]
    DuplicateId(String),

    #[error("{owner} has unknown parameter `{key}`")]
    #[diagnostic(code(config::unknown_parameter))]
    UnknownParameter { owner: String, key: String },

    #[error("{owner} has invalid parameter `{key}`: {reason}")]
    #[diagnostic(code(config::invalid_parameter))]
    InvalidParameter {
        owner: String,
        key: String,
        reason: String,
    },

    #[error("{owner} requires parameter `{key}`")]
    #[diagnostic(code(config::missing_parameter))]
    MissingParameter { owner: String, key: String },

    #[error("Cannot construct {owner}: {reason}")]
    #[diagnostic(code(config::construction))]
    Construction { owner: String, reason: String },
}

impl ConfigError {
    pub fn construction(owner: &str, reason: impl std::fmt::Display) -> Self {
        Self::Construction {
            owner: owner.to_string(),
            reason: reason.to_string(),
        }
    }
}
