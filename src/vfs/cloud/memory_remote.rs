/*!
 * In-Memory Remote
 * Self-contained stand-in for a hosted storage account
 *
 * Behaves like the HTTP API as far as the cloud backend can observe:
 * parent folders are created implicitly, uploads go through sessions,
 * a quota is enforced at publish time and missing paths are 404s. Every
 * call is counted per endpoint so tests can assert on round-trips.
 */

use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::SystemTime;

use super::super::paths;
use super::remote::{RemoteApi, RemoteEntry, RemoteError, RemoteResult, SpaceUsage};

/// Default quota of the emulated account, 2 GB
pub const DEFAULT_ALLOCATION: u64 = 2_000_000_000;

#[derive(Debug, Clone)]
enum Node {
    Folder { modified: SystemTime },
    File { data: Vec<u8>, modified: SystemTime },
}

impl Node {
    fn to_entry(&self, path: &str) -> RemoteEntry {
        match self {
            Node::Folder { modified } => RemoteEntry {
                path: path.to_string(),
                is_dir: true,
                size: 0,
                modified: *modified,
            },
            Node::File { data, modified } => {
                RemoteEntry::file(path, data.len() as u64, *modified)
            }
        }
    }
}

/// Authorization behaviour of the emulated account
#[derive(Debug, Clone)]
struct Authorization {
    code: String,
    token: String,
}

pub struct MemoryRemote {
    nodes: DashMap<String, Node, RandomState>,
    sessions: DashMap<String, Vec<u8>, RandomState>,
    calls: DashMap<&'static str, u64, RandomState>,
    next_session: AtomicU64,
    allocated: u64,
    offline: AtomicBool,
    failing: Mutex<Option<(&'static str, u64)>>,
    authorization: Option<Authorization>,
    token: Mutex<Option<String>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::with_allocation(DEFAULT_ALLOCATION)
    }

    pub fn with_allocation(allocated: u64) -> Self {
        let nodes = DashMap::with_hasher(RandomState::new());
        nodes.insert(
            paths::ROOT.to_string(),
            Node::Folder {
                modified: SystemTime::now(),
            },
        );

        Self {
            nodes,
            sessions: DashMap::with_hasher(RandomState::new()),
            calls: DashMap::with_hasher(RandomState::new()),
            next_session: AtomicU64::new(1),
            allocated,
            offline: AtomicBool::new(false),
            failing: Mutex::new(None),
            authorization: None,
            token: Mutex::new(None),
        }
    }

    /// Require `token` on every call; `code` is the only code that obtains it
    pub fn with_authorization(mut self, code: impl Into<String>, token: impl Into<String>) -> Self {
        self.authorization = Some(Authorization {
            code: code.into(),
            token: token.into(),
        });
        self
    }

    /// Make every call fail with a transport error
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Let `skip` more calls to `endpoint` succeed, fail the next one with a
    /// transport error, then behave normally again
    pub fn fail_endpoint(&self, endpoint: &'static str, skip: u64) {
        *self.failing.lock() = Some((endpoint, skip));
    }

    /// Number of calls made to one endpoint
    pub fn calls(&self, endpoint: &str) -> u64 {
        self.calls.get(endpoint).map(|c| *c).unwrap_or(0)
    }

    pub fn total_calls(&self) -> u64 {
        self.calls.iter().map(|c| *c.value()).sum()
    }

    pub fn reset_calls(&self) {
        self.calls.clear();
    }

    /// Seed a file directly, creating parents
    pub fn put_file(&self, path: &str, data: &[u8]) {
        let path = paths::normalize(path);
        self.create_parents(&path);
        self.nodes.insert(
            path,
            Node::File {
                data: data.to_vec(),
                modified: SystemTime::now(),
            },
        );
    }

    /// Open upload sessions that were never finished
    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    fn enter(&self, endpoint: &'static str) -> RemoteResult<()> {
        *self.calls.entry(endpoint).or_insert(0) += 1;
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("connection refused".into()));
        }
        {
            let mut failing = self.failing.lock();
            if let Some((target, skip)) = failing.as_mut() {
                if *target == endpoint {
                    if *skip == 0 {
                        *failing = None;
                        return Err(RemoteError::Transport("connection reset".into()));
                    }
                    *skip -= 1;
                }
            }
        }
        if let Some(auth) = &self.authorization {
            if self.token.lock().as_deref() != Some(auth.token.as_str()) {
                return Err(RemoteError::Unauthorized("invalid_access_token".into()));
            }
        }
        Ok(())
    }

    fn used(&self) -> u64 {
        self.nodes
            .iter()
            .map(|n| match n.value() {
                Node::File { data, .. } => data.len() as u64,
                Node::Folder { .. } => 0,
            })
            .sum()
    }

    fn create_parents(&self, path: &str) {
        let mut current = paths::parent(path);
        while let Some(dir) = current {
            if self.nodes.contains_key(dir) {
                break;
            }
            self.nodes.insert(
                dir.to_string(),
                Node::Folder {
                    modified: SystemTime::now(),
                },
            );
            current = paths::parent(dir);
        }
    }

    /// Every key at or beneath `path`
    fn subtree(&self, path: &str) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| paths::is_within(path, n.key()))
            .map(|n| n.key().clone())
            .collect()
    }

    fn require(&self, path: &str) -> RemoteResult<Node> {
        self.nodes
            .get(path)
            .map(|n| n.value().clone())
            .ok_or_else(|| RemoteError::NotFound(path.to_string()))
    }

    fn conflict(path: &str) -> RemoteError {
        RemoteError::Status {
            status: 409,
            message: format!("path/conflict: {}", path),
        }
    }
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteApi for MemoryRemote {
    fn set_access_token(&self, token: &str) {
        *self.token.lock() = Some(token.to_string());
    }

    fn authorize_url(&self) -> String {
        "memory://authorize".to_string()
    }

    fn exchange_code(&self, code: &str) -> RemoteResult<String> {
        *self.calls.entry("exchange_code").or_insert(0) += 1;
        match &self.authorization {
            Some(auth) if auth.code == code => Ok(auth.token.clone()),
            Some(_) => Err(RemoteError::Unauthorized("invalid_grant".into())),
            None => Ok(format!("token-{}", code)),
        }
    }

    fn space_usage(&self) -> RemoteResult<SpaceUsage> {
        self.enter("space_usage")?;
        Ok(SpaceUsage {
            used: self.used(),
            allocated: self.allocated,
        })
    }

    fn get_metadata(&self, path: &str) -> RemoteResult<Option<RemoteEntry>> {
        self.enter("get_metadata")?;
        Ok(self.nodes.get(path).map(|n| n.value().to_entry(path)))
    }

    fn list_folder(&self, path: &str) -> RemoteResult<Vec<RemoteEntry>> {
        self.enter("list_folder")?;
        match self.require(path)? {
            Node::Folder { .. } => {}
            Node::File { .. } => {
                return Err(RemoteError::Status {
                    status: 409,
                    message: format!("path/not_folder: {}", path),
                })
            }
        }

        let mut entries: Vec<RemoteEntry> = self
            .nodes
            .iter()
            .filter(|n| paths::parent(n.key()) == Some(path))
            .map(|n| n.value().to_entry(n.key()))
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    fn create_folder(&self, path: &str) -> RemoteResult<()> {
        self.enter("create_folder")?;
        if self.nodes.contains_key(path) {
            return Err(Self::conflict(path));
        }
        self.create_parents(path);
        self.nodes.insert(
            path.to_string(),
            Node::Folder {
                modified: SystemTime::now(),
            },
        );
        Ok(())
    }

    fn move_entry(&self, from: &str, to: &str) -> RemoteResult<()> {
        self.enter("move_entry")?;
        self.require(from)?;
        if self.nodes.contains_key(to) {
            return Err(Self::conflict(to));
        }
        self.create_parents(to);
        for key in self.subtree(from) {
            if let Some((_, node)) = self.nodes.remove(&key) {
                let moved = format!("{}{}", to, &key[from.len()..]);
                self.nodes.insert(moved, node);
            }
        }
        Ok(())
    }

    fn copy_entry(&self, from: &str, to: &str) -> RemoteResult<()> {
        self.enter("copy_entry")?;
        self.require(from)?;
        if self.nodes.contains_key(to) {
            return Err(Self::conflict(to));
        }

        let keys = self.subtree(from);
        let copied: u64 = keys
            .iter()
            .filter_map(|k| self.nodes.get(k))
            .map(|n| match n.value() {
                Node::File { data, .. } => data.len() as u64,
                Node::Folder { .. } => 0,
            })
            .sum();
        if self.used() + copied > self.allocated {
            return Err(RemoteError::Status {
                status: 507,
                message: "insufficient_space".into(),
            });
        }

        self.create_parents(to);
        for key in keys {
            let node = self.nodes.get(&key).map(|n| n.value().clone());
            if let Some(node) = node {
                let target = format!("{}{}", to, &key[from.len()..]);
                self.nodes.insert(target, node);
            }
        }
        Ok(())
    }

    fn delete(&self, path: &str) -> RemoteResult<()> {
        self.enter("delete")?;
        self.require(path)?;
        for key in self.subtree(path) {
            self.nodes.remove(&key);
        }
        Ok(())
    }

    fn download(&self, path: &str, start: u64, len: Option<u64>) -> RemoteResult<Vec<u8>> {
        self.enter("download")?;
        match self.require(path)? {
            Node::File { data, .. } => {
                let start = (start as usize).min(data.len());
                let end = match len {
                    Some(len) => start.saturating_add(len as usize).min(data.len()),
                    None => data.len(),
                };
                Ok(data[start..end].to_vec())
            }
            Node::Folder { .. } => Err(RemoteError::Status {
                status: 409,
                message: format!("path/not_file: {}", path),
            }),
        }
    }

    fn upload_session_start(&self, data: &[u8]) -> RemoteResult<String> {
        self.enter("upload_session_start")?;
        let id = format!("session-{}", self.next_session.fetch_add(1, Ordering::SeqCst));
        self.sessions.insert(id.clone(), data.to_vec());
        Ok(id)
    }

    fn upload_session_append(&self, session: &str, offset: u64, data: &[u8]) -> RemoteResult<()> {
        self.enter("upload_session_append")?;
        let mut buffer = self
            .sessions
            .get_mut(session)
            .ok_or_else(|| RemoteError::NotFound(format!("upload session {}", session)))?;
        if buffer.len() as u64 != offset {
            return Err(RemoteError::Status {
                status: 409,
                message: format!("incorrect_offset: expected {}", buffer.len()),
            });
        }
        buffer.extend_from_slice(data);
        Ok(())
    }

    fn upload_session_finish(
        &self,
        session: &str,
        offset: u64,
        path: &str,
    ) -> RemoteResult<RemoteEntry> {
        self.enter("upload_session_finish")?;
        let data = self
            .sessions
            .get(session)
            .map(|b| b.value().clone())
            .ok_or_else(|| RemoteError::NotFound(format!("upload session {}", session)))?;
        if data.len() as u64 != offset {
            return Err(RemoteError::Status {
                status: 409,
                message: format!("incorrect_offset: expected {}", data.len()),
            });
        }
        if let Some(node) = self.nodes.get(path) {
            if matches!(node.value(), Node::Folder { .. }) {
                return Err(Self::conflict(path));
            }
        }

        let replaced = match self.nodes.get(path).map(|n| n.value().clone()) {
            Some(Node::File { data, .. }) => data.len() as u64,
            _ => 0,
        };
        if self.used() - replaced + data.len() as u64 > self.allocated {
            return Err(RemoteError::Status {
                status: 507,
                message: "insufficient_space".into(),
            });
        }

        self.sessions.remove(session);
        self.create_parents(path);
        let modified = SystemTime::now();
        let size = data.len() as u64;
        self.nodes.insert(path.to_string(), Node::File { data, modified });
        Ok(RemoteEntry::file(path, size, modified))
    }
}
