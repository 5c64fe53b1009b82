/*!
 * HTTP Remote
 * Dropbox v2 style JSON RPC client on reqwest's blocking API
 *
 * RPC endpoints take a JSON body; content endpoints (upload and download)
 * carry their arguments in the `Dropbox-API-Arg` header. Read-only calls are
 * retried on transport errors and 5xx responses.
 */

use parking_lot::RwLock;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, SystemTime};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, warn};

use super::remote::{RemoteApi, RemoteEntry, RemoteError, RemoteResult, SpaceUsage};

pub const DEFAULT_API_URL: &str = "https://api.dropboxapi.com";
pub const DEFAULT_CONTENT_URL: &str = "https://content.dropboxapi.com";
pub const DEFAULT_AUTHORIZE_URL: &str = "https://www.dropbox.com/oauth2/authorize";
pub const DEFAULT_MAX_RETRIES: u32 = 2;

const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Connection settings
#[derive(Debug, Clone)]
pub struct HttpRemoteConfig {
    pub app_key: String,
    pub app_secret: String,
    pub api_url: String,
    pub content_url: String,
    pub authorize_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl HttpRemoteConfig {
    pub fn new(app_key: impl Into<String>, app_secret: impl Into<String>) -> Self {
        Self {
            app_key: app_key.into(),
            app_secret: app_secret.into(),
            api_url: DEFAULT_API_URL.to_string(),
            content_url: DEFAULT_CONTENT_URL.to_string(),
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            timeout: Duration::from_secs(30),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

pub struct HttpRemoteApi {
    client: Client,
    config: HttpRemoteConfig,
    token: RwLock<Option<String>>,
}

impl HttpRemoteApi {
    pub fn new(config: HttpRemoteConfig) -> RemoteResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("cloudfs/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            config,
            token: RwLock::new(None),
        })
    }

    fn bearer(&self) -> RemoteResult<String> {
        self.token
            .read()
            .clone()
            .ok_or_else(|| RemoteError::Unauthorized("no access token".into()))
    }

    /// Send a request, retrying idempotent ones on transient failures
    fn send<F>(&self, endpoint: &str, idempotent: bool, build: F) -> RemoteResult<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let attempts = if idempotent { self.config.max_retries + 1 } else { 1 };
        let mut last_error = RemoteError::Transport("no attempt made".into());

        for attempt in 0..attempts {
            if attempt > 0 {
                std::thread::sleep(RETRY_BACKOFF * attempt);
                debug!(endpoint, attempt, "retrying remote call");
            }

            match build().send() {
                Ok(response) if response.status().is_server_error() => {
                    last_error = status_error(endpoint, response);
                }
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => return Err(status_error(endpoint, response)),
                Err(e) => {
                    last_error = RemoteError::Transport(e.to_string());
                }
            }
            warn!(endpoint, attempt, error = %last_error, "remote call failed");
        }
        Err(last_error)
    }

    /// POST a JSON RPC call and decode the JSON reply
    fn rpc(&self, endpoint: &str, body: Value, idempotent: bool) -> RemoteResult<Value> {
        let token = self.bearer()?;
        let url = format!("{}/2/{}", self.config.api_url, endpoint);
        let response = self.send(endpoint, idempotent, || {
            let request = self.client.post(&url).bearer_auth(&token);
            if body.is_null() {
                request
            } else {
                request.json(&body)
            }
        })?;
        decode(response)
    }

    /// POST to a content endpoint with arguments in the API-Arg header
    fn content(
        &self,
        endpoint: &str,
        arg: Value,
        payload: Option<&[u8]>,
        range: Option<String>,
        idempotent: bool,
    ) -> RemoteResult<Response> {
        let token = self.bearer()?;
        let url = format!("{}/2/{}", self.config.content_url, endpoint);
        let arg = header_json(&arg);
        self.send(endpoint, idempotent, || {
            let mut request = self
                .client
                .post(&url)
                .bearer_auth(&token)
                .header("Dropbox-API-Arg", arg.as_str());
            if let Some(range) = &range {
                request = request.header(reqwest::header::RANGE, range.as_str());
            }
            if let Some(data) = payload {
                request = request
                    .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                    .body(data.to_vec());
            }
            request
        })
    }
}

impl RemoteApi for HttpRemoteApi {
    fn set_access_token(&self, token: &str) {
        *self.token.write() = Some(token.to_string());
    }

    fn authorize_url(&self) -> String {
        format!(
            "{}?client_id={}&response_type=code",
            self.config.authorize_url, self.config.app_key
        )
    }

    fn exchange_code(&self, code: &str) -> RemoteResult<String> {
        #[derive(Deserialize)]
        struct TokenReply {
            access_token: String,
        }

        let url = format!("{}/oauth2/token", self.config.api_url);
        let params = [
            ("code", code),
            ("grant_type", "authorization_code"),
            ("client_id", self.config.app_key.as_str()),
            ("client_secret", self.config.app_secret.as_str()),
        ];
        let response = self.send("oauth2/token", false, || self.client.post(&url).form(&params))?;
        let reply: TokenReply = serde_json::from_value(decode(response)?)
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(reply.access_token)
    }

    fn space_usage(&self) -> RemoteResult<SpaceUsage> {
        let reply = self.rpc("users/get_space_usage", Value::Null, true)?;
        let used = reply["used"]
            .as_u64()
            .ok_or_else(|| RemoteError::Decode("space usage without `used`".into()))?;
        let allocated = reply["allocation"]["allocated"]
            .as_u64()
            .ok_or_else(|| RemoteError::Decode("space usage without `allocated`".into()))?;
        Ok(SpaceUsage { used, allocated })
    }

    fn get_metadata(&self, path: &str) -> RemoteResult<Option<RemoteEntry>> {
        // The API has no metadata for the root folder
        if path == "/" {
            return Ok(Some(RemoteEntry::folder("/")));
        }
        match self.rpc("files/get_metadata", json!({ "path": path }), true) {
            Ok(reply) => Ok(parse_entry(reply)?),
            Err(RemoteError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn list_folder(&self, path: &str) -> RemoteResult<Vec<RemoteEntry>> {
        let mut reply = self.rpc(
            "files/list_folder",
            json!({ "path": remote_path(path), "recursive": false }),
            true,
        )?;

        let mut entries = Vec::new();
        loop {
            let page: ListFolderPage = serde_json::from_value(reply)
                .map_err(|e| RemoteError::Decode(e.to_string()))?;
            for raw in page.entries {
                if let Some(entry) = parse_entry(raw)? {
                    entries.push(entry);
                }
            }
            if !page.has_more {
                break;
            }
            reply = self.rpc(
                "files/list_folder/continue",
                json!({ "cursor": page.cursor }),
                true,
            )?;
        }
        Ok(entries)
    }

    fn create_folder(&self, path: &str) -> RemoteResult<()> {
        self.rpc(
            "files/create_folder_v2",
            json!({ "path": path, "autorename": false }),
            false,
        )
        .map(|_| ())
    }

    fn move_entry(&self, from: &str, to: &str) -> RemoteResult<()> {
        self.rpc(
            "files/move_v2",
            json!({ "from_path": from, "to_path": to, "autorename": false }),
            false,
        )
        .map(|_| ())
    }

    fn copy_entry(&self, from: &str, to: &str) -> RemoteResult<()> {
        self.rpc(
            "files/copy_v2",
            json!({ "from_path": from, "to_path": to, "autorename": false }),
            false,
        )
        .map(|_| ())
    }

    fn delete(&self, path: &str) -> RemoteResult<()> {
        self.rpc("files/delete_v2", json!({ "path": path }), false)
            .map(|_| ())
    }

    fn download(&self, path: &str, start: u64, len: Option<u64>) -> RemoteResult<Vec<u8>> {
        let Some(range) = range_header(start, len) else {
            return Ok(Vec::new());
        };
        match self.content("files/download", json!({ "path": path }), None, Some(range), true) {
            Ok(response) => response
                .bytes()
                .map(|b| b.to_vec())
                .map_err(|e| RemoteError::Transport(e.to_string())),
            // Range starting at or past the end of the file
            Err(RemoteError::Status { status: 416, .. }) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn upload_session_start(&self, data: &[u8]) -> RemoteResult<String> {
        let response = self.content(
            "files/upload_session/start",
            json!({ "close": false }),
            Some(data),
            None,
            false,
        )?;
        decode(response)?["session_id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| RemoteError::Decode("upload session without id".into()))
    }

    fn upload_session_append(&self, session: &str, offset: u64, data: &[u8]) -> RemoteResult<()> {
        self.content(
            "files/upload_session/append_v2",
            json!({ "cursor": { "session_id": session, "offset": offset }, "close": false }),
            Some(data),
            None,
            false,
        )
        .map(|_| ())
    }

    fn upload_session_finish(
        &self,
        session: &str,
        offset: u64,
        path: &str,
    ) -> RemoteResult<RemoteEntry> {
        let response = self.content(
            "files/upload_session/finish",
            json!({
                "cursor": { "session_id": session, "offset": offset },
                "commit": { "path": path, "mode": "overwrite", "autorename": false, "mute": true }
            }),
            Some(&[] as &[u8]),
            None,
            false,
        )?;
        parse_entry(decode(response)?)?
            .ok_or_else(|| RemoteError::Decode("upload finished without file metadata".into()))
    }
}

#[derive(Deserialize)]
struct ListFolderPage {
    entries: Vec<Value>,
    cursor: String,
    has_more: bool,
}

#[derive(Deserialize)]
#[serde(tag = ".tag", rename_all = "snake_case")]
enum WireMetadata {
    File {
        path_display: String,
        size: u64,
        server_modified: String,
    },
    Folder {
        path_display: String,
    },
    Deleted {},
}

/// Decode one metadata object; deleted entries are `None`
fn parse_entry(raw: Value) -> RemoteResult<Option<RemoteEntry>> {
    let wire: WireMetadata =
        serde_json::from_value(raw).map_err(|e| RemoteError::Decode(e.to_string()))?;
    Ok(match wire {
        WireMetadata::File {
            path_display,
            size,
            server_modified,
        } => Some(RemoteEntry::file(
            path_display,
            size,
            parse_timestamp(&server_modified)?,
        )),
        WireMetadata::Folder { path_display } => Some(RemoteEntry::folder(path_display)),
        WireMetadata::Deleted {} => None,
    })
}

fn parse_timestamp(raw: &str) -> RemoteResult<SystemTime> {
    OffsetDateTime::parse(raw, &Rfc3339)
        .map(SystemTime::from)
        .map_err(|e| RemoteError::Decode(format!("timestamp {:?}: {}", raw, e)))
}

fn decode(response: Response) -> RemoteResult<Value> {
    let body = response
        .bytes()
        .map_err(|e| RemoteError::Transport(e.to_string()))?;
    if body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&body).map_err(|e| RemoteError::Decode(e.to_string()))
}

/// Classify a non-success reply
fn status_error(endpoint: &str, response: Response) -> RemoteError {
    let status = response.status();
    let message = response.text().unwrap_or_default();
    classify(endpoint, status, message)
}

fn classify(endpoint: &str, status: StatusCode, message: String) -> RemoteError {
    match status {
        StatusCode::UNAUTHORIZED => RemoteError::Unauthorized(message),
        StatusCode::NOT_FOUND => RemoteError::NotFound(endpoint.to_string()),
        StatusCode::CONFLICT if message.contains("not_found") => RemoteError::NotFound(message),
        _ => RemoteError::Status {
            status: status.as_u16(),
            message,
        },
    }
}

/// `Range` header for `len` bytes from `start`; `None` when nothing is wanted
fn range_header(start: u64, len: Option<u64>) -> Option<String> {
    match len {
        Some(0) => None,
        Some(len) => Some(format!("bytes={}-{}", start, start.saturating_add(len - 1))),
        None => Some(format!("bytes={}-", start)),
    }
}

/// The API names the root folder with an empty path
fn remote_path(path: &str) -> &str {
    if path == "/" {
        ""
    } else {
        path
    }
}

/// JSON for an HTTP header: non-ASCII characters must be escaped
fn header_json(value: &Value) -> String {
    let raw = value.to_string();
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    out
}
