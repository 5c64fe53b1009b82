/*!
 * Cloud Account
 * Hosted storage account authorized through an OAuth code flow
 *
 * A stored access token is tried first. When it is missing or rejected the
 * user is shown the authorization URL and asked for the code it yields; the
 * resulting token is stored for the next start.
 */

use parking_lot::Mutex;
use serde_json::Value;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing::{info, warn};

use super::types::{AccountError, AccountResult};
use super::Account;
use crate::config::{BuildContext, ConfigError, ConfigResult, Params};
use crate::settings::SettingsStore;
use crate::vfs::cloud::{HttpRemoteApi, HttpRemoteConfig, MemoryRemote, RemoteApi};
use crate::vfs::{CloudFS, FileSystem, FileSystemBuilder};

pub const SERVICE: &str = "cloud";
pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const APP_KEY: &str = "app_key";
pub const APP_SECRET: &str = "app_secret";
pub const MAX_AUTHORIZATION_ATTEMPTS: usize = 3;

/// Obtains an authorization code from the user
pub trait AuthorizationPrompt: Send + Sync {
    /// Show `authorize_url` and return the code the user pastes back, or
    /// `None` when the user gives up
    fn request_code(&self, account_id: &str, authorize_url: &str) -> Option<String>;
}

/// Prompt on the controlling terminal
#[derive(Debug, Default)]
pub struct StdinPrompt;

impl AuthorizationPrompt for StdinPrompt {
    fn request_code(&self, account_id: &str, authorize_url: &str) -> Option<String> {
        let mut stdout = io::stdout().lock();
        let _ = writeln!(stdout, "Account {}: open this URL in a browser", account_id);
        let _ = writeln!(stdout, "  {}", authorize_url);
        let _ = write!(stdout, "Allow access and enter the authorization code: ");
        let _ = stdout.flush();

        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => {
                let code = line.trim();
                (!code.is_empty()).then(|| code.to_string())
            }
        }
    }
}

pub struct CloudAccount {
    unique_id: String,
    fs: Arc<CloudFS>,
    settings: Arc<SettingsStore>,
    prompt: Arc<dyn AuthorizationPrompt>,
    authenticated: Mutex<bool>,
}

impl CloudAccount {
    pub fn new(unique_id: impl Into<String>, fs: CloudFS, settings: Arc<SettingsStore>) -> Self {
        Self {
            unique_id: unique_id.into(),
            fs: Arc::new(fs),
            settings,
            prompt: Arc::new(StdinPrompt),
            authenticated: Mutex::new(false),
        }
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn AuthorizationPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// A token works when the quota endpoint accepts it
    fn try_token(&self, token: &str) -> bool {
        let remote = self.fs.remote();
        remote.set_access_token(token);
        match remote.space_usage() {
            Ok(_) => true,
            Err(e) => {
                warn!(account = %self.unique_id, error = %e, "access token rejected");
                false
            }
        }
    }

    fn stored_token(&self) -> Option<String> {
        match self.settings.get_value(&self.unique_id, ACCESS_TOKEN_KEY)? {
            Value::String(token) if !token.is_empty() => Some(token),
            _ => None,
        }
    }

    fn authorize(&self) -> AccountResult<String> {
        let remote = self.fs.remote();
        let url = remote.authorize_url();

        for attempt in 1..=MAX_AUTHORIZATION_ATTEMPTS {
            let Some(code) = self.prompt.request_code(&self.unique_id, &url) else {
                return Err(AccountError::authentication_failed(
                    &self.unique_id,
                    "no authorization code given",
                ));
            };
            match remote.exchange_code(&code) {
                Ok(token) if self.try_token(&token) => return Ok(token),
                Ok(_) => warn!(account = %self.unique_id, attempt, "new token rejected"),
                Err(e) => {
                    warn!(account = %self.unique_id, attempt, error = %e, "code exchange failed")
                }
            }
        }

        Err(AccountError::authentication_failed(
            &self.unique_id,
            format!("no valid code after {} attempts", MAX_AUTHORIZATION_ATTEMPTS),
        ))
    }
}

impl Account for CloudAccount {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn authenticate(&self) -> AccountResult<()> {
        let mut authenticated = self.authenticated.lock();
        if *authenticated {
            return Ok(());
        }

        if let Some(token) = self.stored_token() {
            if self.try_token(&token) {
                info!(account = %self.unique_id, "authenticated with stored token");
                *authenticated = true;
                return Ok(());
            }
        }

        let token = self.authorize()?;
        self.settings
            .set_value(&self.unique_id, ACCESS_TOKEN_KEY, Value::String(token))?;
        info!(account = %self.unique_id, "authenticated");
        *authenticated = true;
        Ok(())
    }

    fn file_system(&self) -> Arc<dyn FileSystem> {
        self.fs.clone()
    }
}

/// Application credential from the params, falling back to the settings
/// store entry of the account
fn app_credential(
    unique_id: &str,
    params: &mut Params,
    settings: &SettingsStore,
    key: &str,
) -> AccountResult<String> {
    if let Some(value) = params.take(key).filter(|v| !v.is_empty()) {
        return Ok(value);
    }
    match settings.get_value(unique_id, key) {
        Some(Value::String(value)) if !value.is_empty() => Ok(value),
        _ => Err(AccountError::MissingSetting {
            account: unique_id.to_string(),
            key: key.to_string(),
        }),
    }
}

/// Registry factory. Recognised parameters: `remote` (`http` or `memory`),
/// `app_key` and `app_secret` (http only, may live in the settings store
/// instead), `api_url`, `content_url`, `max_retries`, `cache_ttl_ms` and
/// `cache_capacity`.
pub(crate) fn from_params(
    unique_id: &str,
    params: &mut Params,
    context: &BuildContext,
) -> ConfigResult<Arc<dyn Account>> {
    let owner = params.owner().to_string();
    let remote: Arc<dyn RemoteApi> = match params.take("remote").as_deref().unwrap_or("http") {
        "memory" => Arc::new(MemoryRemote::new()),
        "http" => {
            let app_key = app_credential(unique_id, params, &context.settings, APP_KEY)
                .map_err(|e| ConfigError::construction(&owner, e))?;
            let app_secret = app_credential(unique_id, params, &context.settings, APP_SECRET)
                .map_err(|e| ConfigError::construction(&owner, e))?;
            let mut config = HttpRemoteConfig::new(app_key, app_secret);
            if let Some(url) = params.take("api_url") {
                config.api_url = url;
            }
            if let Some(url) = params.take("content_url") {
                config.content_url = url;
            }
            if let Some(retries) = params.take_parsed("max_retries")? {
                config.max_retries = retries;
            }
            Arc::new(HttpRemoteApi::new(config).map_err(|e| ConfigError::construction(&owner, e))?)
        }
        other => {
            return Err(ConfigError::InvalidParameter {
                owner,
                key: "remote".to_string(),
                reason: format!("unknown remote {:?}", other),
            })
        }
    };

    let mut builder = CloudFS::builder(remote);
    if let Some(ms) = params.take_parsed::<u64>("cache_ttl_ms")? {
        builder = builder.cache_ttl(std::time::Duration::from_millis(ms));
    }
    if let Some(capacity) = params.take_parsed::<usize>("cache_capacity")? {
        builder = builder.cache_capacity(capacity);
    }
    params.finish()?;

    let fs = builder
        .build()
        .map_err(|e| ConfigError::construction(&owner, e))?;
    let account = CloudAccount::new(unique_id, fs, Arc::clone(&context.settings))
        .with_prompt(Arc::clone(&context.prompt));
    Ok(Arc::new(account))
}
