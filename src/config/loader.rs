/*!
 * Configuration Loader
 * Builds accounts and managers from a TOML document
 *
 * ```toml
 * [[accounts]]
 * id = "local-1"
 * service = "local"
 * [accounts.params]
 * capacity = "1000000000"
 *
 * [[managers]]
 * id = "ftp-1"
 * type = "ftp"
 * account = "local-1"
 * [managers.params]
 * ftp_username = "user"
 * ftp_password = "secret"
 * ```
 *
 * Accounts are built first, in file order. Each manager then receives a
 * fresh view over the account it names.
 */

use ahash::RandomState;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::errors::{ConfigError, ConfigResult};
use super::params::Params;
use super::registry::{BuildContext, Registry};
use crate::account::Account;
use crate::managers::Manager;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Document {
    #[serde(default)]
    accounts: Vec<AccountSection>,
    #[serde(default)]
    managers: Vec<ManagerSection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AccountSection {
    id: Option<String>,
    service: Option<String>,
    #[serde(default)]
    params: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManagerSection {
    id: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    account: Option<String>,
    #[serde(default)]
    params: BTreeMap<String, toml::Value>,
}

/// Built accounts and managers, in configuration order
pub struct Configurator {
    accounts: Vec<Arc<dyn Account>>,
    managers: Vec<Arc<dyn Manager>>,
}

impl Configurator {
    pub fn from_path(
        path: impl AsRef<Path>,
        registry: &Registry,
        context: &BuildContext,
    ) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        info!(path = %path.display(), "loading configuration");
        Self::from_str(&text, registry, context)
    }

    pub fn from_str(text: &str, registry: &Registry, context: &BuildContext) -> ConfigResult<Self> {
        let document: Document =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let mut ids: HashSet<String, RandomState> = HashSet::default();

        let mut accounts: Vec<Arc<dyn Account>> = Vec::with_capacity(document.accounts.len());
        for (position, section) in document.accounts.into_iter().enumerate() {
            let id = attribute("accounts", position, "id", section.id)?;
            let service = attribute("accounts", position, "service", section.service)?;
            claim(&mut ids, &id)?;

            let factory = registry
                .account_factory(&service)
                .ok_or_else(|| ConfigError::UnknownService {
                    account: id.clone(),
                    service: service.clone(),
                })?;
            let mut params = params(&format!("account {}", id), section.params)?;
            let account = factory(&id, &mut params, context)?;
            debug!(account = %id, service = %service, "account built");
            accounts.push(account);
        }

        let mut managers: Vec<Arc<dyn Manager>> = Vec::with_capacity(document.managers.len());
        for (position, section) in document.managers.into_iter().enumerate() {
            let id = attribute("managers", position, "id", section.id)?;
            let kind = attribute("managers", position, "type", section.kind)?;
            let account_id = attribute("managers", position, "account", section.account)?;
            claim(&mut ids, &id)?;

            let factory = registry
                .manager_factory(&kind)
                .ok_or_else(|| ConfigError::UnknownManagerType {
                    manager: id.clone(),
                    kind: kind.clone(),
                })?;
            let account = accounts
                .iter()
                .find(|a| a.unique_id() == account_id)
                .ok_or_else(|| ConfigError::UnknownAccount {
                    manager: id.clone(),
                    account: account_id.clone(),
                })?;
            let mut params = params(&format!("manager {}", id), section.params)?;
            let manager = factory(&id, &mut params, account.new_view())?;
            debug!(manager = %id, kind = %kind, account = %account_id, "manager built");
            managers.push(manager);
        }

        info!(
            accounts = accounts.len(),
            managers = managers.len(),
            "configuration loaded"
        );
        Ok(Self { accounts, managers })
    }

    pub fn accounts(&self) -> &[Arc<dyn Account>] {
        &self.accounts
    }

    pub fn account(&self, id: &str) -> Option<&Arc<dyn Account>> {
        self.accounts.iter().find(|a| a.unique_id() == id)
    }

    pub fn managers(&self) -> &[Arc<dyn Manager>] {
        &self.managers
    }

    pub fn manager(&self, id: &str) -> Option<&Arc<dyn Manager>> {
        self.managers.iter().find(|m| m.unique_id() == id)
    }
}

/// Required, trimmed, non-empty attribute of a section
fn attribute(
    section: &str,
    position: usize,
    name: &str,
    value: Option<String>,
) -> ConfigResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingAttribute {
            section: section.to_string(),
            position,
            attribute: name.to_string(),
        })
}

fn claim(ids: &mut HashSet<String, RandomState>, id: &str) -> ConfigResult<()> {
    if ids.insert(id.to_string()) {
        Ok(())
    } else {
        Err(ConfigError::DuplicateId(id.to_string()))
    }
}

/// Scalars become trimmed strings; tables and arrays are rejected
fn params(owner: &str, raw: BTreeMap<String, toml::Value>) -> ConfigResult<Params> {
    let mut values = BTreeMap::new();
    for (key, value) in raw {
        let text = match value {
            toml::Value::String(s) => s.trim().to_string(),
            toml::Value::Integer(i) => i.to_string(),
            toml::Value::Float(f) => f.to_string(),
            toml::Value::Boolean(b) => b.to_string(),
            other => {
                return Err(ConfigError::InvalidParameter {
                    owner: owner.to_string(),
                    key,
                    reason: format!("expected a scalar, found {}", other.type_str()),
                })
            }
        };
        values.insert(key.trim().to_string(), text);
    }
    Ok(Params::new(owner, values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SettingsStore;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn context(temp: &TempDir) -> BuildContext {
        BuildContext::new(Arc::new(SettingsStore::in_memory()), temp.path())
    }

    fn load(text: &str) -> (TempDir, ConfigResult<Configurator>) {
        let temp = TempDir::new().unwrap();
        let result = Configurator::from_str(text, &Registry::with_defaults(), &context(&temp));
        (temp, result)
    }

    #[test]
    fn test_builds_accounts_and_managers() {
        let (_t, result) = load(
            r#"
            [[accounts]]
            id = " local-1 "
            service = "local"
            [accounts.params]
            capacity = 5000
            sample = "false"

            [[managers]]
            id = "shell-1"
            type = "shell"
            account = "local-1"
            "#,
        );
        let config = result.unwrap();
        assert_eq!(config.accounts().len(), 1);
        assert!(config.account("local-1").is_some());
        let manager = config.manager("shell-1").unwrap();
        assert!(!manager.is_running());
        assert_eq!(
            config.account("local-1").unwrap().file_system().free_space().unwrap(),
            5000
        );
    }

    #[test]
    fn test_ids_are_unique_across_sections() {
        let (_t, result) = load(
            r#"
            [[accounts]]
            id = "x"
            service = "local"
            [[managers]]
            id = "x"
            type = "shell"
            account = "x"
            "#,
        );
        assert_eq!(result.err(), Some(ConfigError::DuplicateId("x".into())));
    }

    #[test]
    fn test_reference_and_type_errors() {
        let (_t, result) = load(
            r#"
            [[accounts]]
            id = "a"
            service = "gdrive"
            "#,
        );
        assert!(matches!(result, Err(ConfigError::UnknownService { .. })));

        let (_t, result) = load(
            r#"
            [[managers]]
            id = "m"
            type = "shell"
            account = "ghost"
            "#,
        );
        assert!(matches!(result, Err(ConfigError::UnknownAccount { .. })));

        let (_t, result) = load(
            r#"
            [[accounts]]
            id = "a"
            service = "local"
            [[managers]]
            id = "m"
            type = "telnet"
            account = "a"
            "#,
        );
        assert!(matches!(result, Err(ConfigError::UnknownManagerType { .. })));
    }

    #[test]
    fn test_attribute_and_parameter_errors() {
        let (_t, result) = load("[[accounts]]\nservice = \"local\"\n");
        assert_eq!(
            result.err(),
            Some(ConfigError::MissingAttribute {
                section: "accounts".into(),
                position: 0,
                attribute: "id".into()
            })
        );

        let (_t, result) = load(
            r#"
            [[accounts]]
            id = "a"
            service = "local"
            [accounts.params]
            colour = "blue"
            "#,
        );
        assert!(matches!(
            result,
            Err(ConfigError::UnknownParameter { ref key, .. }) if key == "colour"
        ));

        let (_t, result) =
            load("[[accounts]]\nid = \"a\"\nservice = \"local\"\n[accounts.params]\nnested = [1]\n");
        assert!(matches!(result, Err(ConfigError::InvalidParameter { .. })));

        let (_t, result) = load("accounts = 3");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file() {
        let temp = TempDir::new().unwrap();
        let result = Configurator::from_path(
            temp.path().join("absent.toml"),
            &Registry::with_defaults(),
            &context(&temp),
        );
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
