/*!
 * Type Registry
 * Maps the service and manager type names used in configuration files to
 * the factories that build them
 */

use ahash::RandomState;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use super::errors::ConfigResult;
use super::params::Params;
use crate::account::{self, Account, AuthorizationPrompt, StdinPrompt};
use crate::managers::{self, Manager};
use crate::settings::SettingsStore;
use crate::vfs::FileSystemView;

/// Shared inputs every account factory may need
#[derive(Clone)]
pub struct BuildContext {
    pub settings: Arc<SettingsStore>,
    /// Relative data directories resolve against this
    pub base_dir: PathBuf,
    pub prompt: Arc<dyn AuthorizationPrompt>,
}

impl BuildContext {
    pub fn new(settings: Arc<SettingsStore>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            settings,
            base_dir: base_dir.into(),
            prompt: Arc::new(StdinPrompt),
        }
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn AuthorizationPrompt>) -> Self {
        self.prompt = prompt;
        self
    }
}

pub type AccountFactory = fn(&str, &mut Params, &BuildContext) -> ConfigResult<Arc<dyn Account>>;
pub type ManagerFactory = fn(&str, &mut Params, FileSystemView) -> ConfigResult<Arc<dyn Manager>>;

#[derive(Default)]
pub struct Registry {
    accounts: HashMap<String, AccountFactory, RandomState>,
    managers: HashMap<String, ManagerFactory, RandomState>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in service and manager type
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        account::register(&mut registry);
        managers::register(&mut registry);
        registry
    }

    pub fn register_account(&mut self, service: &str, factory: AccountFactory) {
        self.accounts.insert(service.to_string(), factory);
    }

    pub fn register_manager(&mut self, kind: &str, factory: ManagerFactory) {
        self.managers.insert(kind.to_string(), factory);
    }

    pub fn account_factory(&self, service: &str) -> Option<AccountFactory> {
        self.accounts.get(service).copied()
    }

    pub fn manager_factory(&self, kind: &str) -> Option<ManagerFactory> {
        self.managers.get(kind).copied()
    }

    /// Registered service names, sorted
    pub fn services(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.accounts.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Registered manager type names, sorted
    pub fn manager_types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.managers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
