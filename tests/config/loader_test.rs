/*!
 * Configuration Loader Tests
 * End-to-end construction from TOML through to running managers
 */

use pretty_assertions::assert_eq;
use std::collections::VecDeque;
use std::sync::Arc;
use tempfile::TempDir;

use cloudfs::account::AuthorizationPrompt;
use cloudfs::{BuildContext, ConfigError, Configurator, Registry, SettingsStore};

/// Answers authorization prompts from a fixed list
struct CannedPrompt(parking_lot::Mutex<VecDeque<&'static str>>);

impl AuthorizationPrompt for CannedPrompt {
    fn request_code(&self, _account_id: &str, _authorize_url: &str) -> Option<String> {
        self.0.lock().pop_front().map(str::to_string)
    }
}

fn context(temp: &TempDir, settings: Arc<SettingsStore>) -> BuildContext {
    let prompt = Arc::new(CannedPrompt(parking_lot::Mutex::new(VecDeque::from(["code-1"]))));
    BuildContext::new(settings, temp.path()).with_prompt(prompt)
}

#[test]
fn test_bundled_config_parses() {
    let temp = TempDir::new().unwrap();
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml");
    let config = Configurator::from_path(
        path,
        &Registry::with_defaults(),
        &context(&temp, Arc::new(SettingsStore::in_memory())),
    )
    .unwrap();

    assert_eq!(config.accounts().len(), 1);
    let ids: Vec<&str> = config.managers().iter().map(|m| m.unique_id()).collect();
    assert_eq!(ids, vec!["shell-1", "ftp-1"]);
}

#[test]
fn test_local_and_memory_cloud_accounts() {
    let temp = TempDir::new().unwrap();
    let settings = Arc::new(SettingsStore::open(temp.path().join("settings.json")).unwrap());
    let text = r#"
        [[accounts]]
        id = "disk"
        service = "local"
        [accounts.params]
        capacity = "4096"
        sample = "true"

        [[accounts]]
        id = "sky"
        service = "cloud"
        [accounts.params]
        remote = "memory"
        cache_ttl_ms = "50"

        [[managers]]
        id = "ftp-disk"
        type = "ftp"
        account = "disk"
        [managers.params]
        ftp_username = "u"
        ftp_password = "p"
        port = 0
    "#;
    let config = Configurator::from_str(text, &Registry::with_defaults(), &context(&temp, settings.clone())).unwrap();

    for account in config.accounts() {
        account.authenticate().unwrap();
    }

    let disk = config.account("disk").unwrap().file_system();
    assert_eq!(disk.list_dir("/").unwrap(), vec!["dir1", "dir2", "file1.txt"]);
    assert_eq!(disk.space_used().unwrap() + disk.free_space().unwrap(), 4096);

    // The code flow stored a token for the cloud account
    assert_eq!(
        settings.get_value("sky", "access_token"),
        Some(serde_json::json!("token-code-1"))
    );
    let reopened = SettingsStore::open(temp.path().join("settings.json")).unwrap();
    assert!(reopened.get_value("sky", "access_token").is_some());

    let ftp = config.manager("ftp-disk").unwrap();
    ftp.run().unwrap();
    assert!(ftp.is_running());
    ftp.stop();
    assert!(!ftp.is_running());
}

#[test]
fn test_ftp_without_credentials_fails_at_run() {
    let temp = TempDir::new().unwrap();
    let text = r#"
        [[accounts]]
        id = "disk"
        service = "local"
        [[managers]]
        id = "ftp"
        type = "ftp"
        account = "disk"
        [managers.params]
        port = "0"
    "#;
    let config = Configurator::from_str(
        text,
        &Registry::with_defaults(),
        &context(&temp, Arc::new(SettingsStore::in_memory())),
    )
    .unwrap();
    let err = config.manager("ftp").unwrap().run().unwrap_err();
    assert_eq!(err, cloudfs::ManagerError::missing_attribute("ftp", "ftp_username"));
}

#[test]
fn test_invalid_port_is_reported() {
    let temp = TempDir::new().unwrap();
    let text = r#"
        [[accounts]]
        id = "disk"
        service = "local"
        [[managers]]
        id = "ftp"
        type = "ftp"
        account = "disk"
        [managers.params]
        port = "seventy"
    "#;
    let result = Configurator::from_str(
        text,
        &Registry::with_defaults(),
        &context(&temp, Arc::new(SettingsStore::in_memory())),
    );
    assert!(matches!(
        result,
        Err(ConfigError::InvalidParameter { ref key, .. }) if key == "port"
    ));
}
