/*!
 * Settings Store
 * Durable key-value settings owned by accounts and managers
 *
 * Values are JSON, grouped per owner id. The whole document is rewritten on
 * every change: written to a sibling temp file, then renamed over the target.
 */

use miette::Diagnostic;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

type Document = BTreeMap<String, BTreeMap<String, Value>>;

#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum SettingsError {
    #[error("Cannot access settings file {path}: {reason}")]
    #[diagnostic(code(settings::io))]
    Io { path: String, reason: String },

    #[error("Settings file {path} is not valid JSON: {reason}")]
    #[diagnostic(
        code(settings::corrupt),
        help("Fix or delete the file; it is recreated on the next change.")
    )]
    Corrupt { path: String, reason: String },
}

pub type SettingsResult<T> = Result<T, SettingsError>;

/// Thread-safe settings store, explicitly passed to whoever needs it
pub struct SettingsStore {
    path: Option<PathBuf>,
    document: Mutex<Document>,
}

impl SettingsStore {
    /// Open the store backed by `path`, starting empty when it does not exist
    pub fn open<P: Into<PathBuf>>(path: P) -> SettingsResult<Self> {
        let path = path.into();
        let document = match fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => Document::new(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| SettingsError::Corrupt {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Document::new(),
            Err(e) => return Err(io_error(&path, e)),
        };

        info!(path = %path.display(), owners = document.len(), "settings loaded");
        Ok(Self {
            path: Some(path),
            document: Mutex::new(document),
        })
    }

    /// Store that never touches the disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            document: Mutex::new(Document::new()),
        }
    }

    pub fn get_value(&self, owner_id: &str, key: &str) -> Option<Value> {
        self.document
            .lock()
            .get(owner_id)
            .and_then(|values| values.get(key))
            .cloned()
    }

    /// Set a value and persist the whole document. Memory only changes once
    /// the new document is on disk.
    pub fn set_value(&self, owner_id: &str, key: &str, value: Value) -> SettingsResult<()> {
        let mut document = self.document.lock();
        let mut updated = document.clone();
        updated
            .entry(owner_id.to_string())
            .or_default()
            .insert(key.to_string(), value);

        if let Some(path) = &self.path {
            persist(path, &updated)?;
        }
        *document = updated;
        debug!(owner = owner_id, key, "setting stored");
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

fn persist(path: &Path, document: &Document) -> SettingsResult<()> {
    let bytes = serde_json::to_vec_pretty(document).map_err(|e| SettingsError::Corrupt {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    let mut file = fs::File::create(&temp).map_err(|e| io_error(&temp, e))?;
    file.write_all(&bytes).map_err(|e| io_error(&temp, e))?;
    file.sync_all().map_err(|e| io_error(&temp, e))?;
    drop(file);
    fs::rename(&temp, path).map_err(|e| io_error(path, e))
}

fn io_error(path: &Path, e: std::io::Error) -> SettingsError {
    SettingsError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_values_survive_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");

        let store = SettingsStore::open(&path).unwrap();
        assert_eq!(store.get_value("dropbox-1", "access_token"), None);
        store
            .set_value("dropbox-1", "access_token", json!("abc"))
            .unwrap();
        store.set_value("ftp-1", "port", json!(2121)).unwrap();
        drop(store);

        let reopened = SettingsStore::open(&path).unwrap();
        assert_eq!(
            reopened.get_value("dropbox-1", "access_token"),
            Some(json!("abc"))
        );
        assert_eq!(reopened.get_value("ftp-1", "port"), Some(json!(2121)));
        assert_eq!(reopened.get_value("ftp-1", "access_token"), None);
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");
        fs::write(&path, b"{ not json").unwrap();
        assert!(matches!(
            SettingsStore::open(&path),
            Err(SettingsError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_in_memory_store() {
        let store = SettingsStore::in_memory();
        store.set_value("a", "k", json!({"x": 1})).unwrap();
        assert_eq!(store.get_value("a", "k"), Some(json!({"x": 1})));
        assert!(store.path().is_none());
    }

    #[test]
    fn test_failed_persist_keeps_old_value() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");
        let store = SettingsStore::open(&path).unwrap();
        store.set_value("a", "k", json!(1)).unwrap();

        // A directory in the temp file's place makes the write fail
        fs::create_dir(temp.path().join("settings.json.tmp")).unwrap();
        assert!(matches!(
            store.set_value("a", "k", json!(2)),
            Err(SettingsError::Io { .. })
        ));
        assert!(matches!(
            store.set_value("b", "k", json!(3)),
            Err(SettingsError::Io { .. })
        ));

        assert_eq!(store.get_value("a", "k"), Some(json!(1)));
        assert_eq!(store.get_value("b", "k"), None);
        let reopened = SettingsStore::open(&path).unwrap();
        assert_eq!(reopened.get_value("a", "k"), Some(json!(1)));
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");
        let store = SettingsStore::open(&path).unwrap();
        store.set_value("a", "k", json!(true)).unwrap();
        let names: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["settings.json"]);
    }
}
