/*!
 * Factory Parameters
 * The `params` table of one configured entry, consumed key by key
 */

use std::collections::BTreeMap;
use std::str::FromStr;

use super::errors::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Default)]
pub struct Params {
    owner: String,
    values: BTreeMap<String, String>,
}

impl Params {
    /// `owner` names the entry in error messages
    pub fn new(owner: impl Into<String>, values: BTreeMap<String, String>) -> Self {
        Self {
            owner: owner.into(),
            values,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Remove and return a value
    pub fn take(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    pub fn require(&mut self, key: &str) -> ConfigResult<String> {
        self.take(key).ok_or_else(|| ConfigError::MissingParameter {
            owner: self.owner.clone(),
            key: key.to_string(),
        })
    }

    /// Remove and parse a value
    pub fn take_parsed<T>(&mut self, key: &str) -> ConfigResult<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let Some(raw) = self.take(key) else {
            return Ok(None);
        };
        raw.parse().map(Some).map_err(|e: T::Err| ConfigError::InvalidParameter {
            owner: self.owner.clone(),
            key: key.to_string(),
            reason: format!("{:?}: {}", raw, e),
        })
    }

    /// Fail on the first key no factory consumed
    pub fn finish(&self) -> ConfigResult<()> {
        match self.values.keys().next() {
            Some(key) => Err(ConfigError::UnknownParameter {
                owner: self.owner.clone(),
                key: key.clone(),
            }),
            None => Ok(()),
        }
    }
}
