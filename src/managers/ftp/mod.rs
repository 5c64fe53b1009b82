/*!
 * FTP Manager
 * Minimal passive-mode FTP server over one account
 *
 * The accept loop polls a nonblocking listener so `stop` is honoured
 * promptly. Every connection gets its own thread, its own fresh view and
 * therefore its own working directory.
 */

mod adapter;
mod session;

pub use adapter::{AdapterError, AdapterResult, FtpFsAdapter};
pub use session::{Credentials, FtpSession, DATA_CONNECT_TIMEOUT};

use parking_lot::Mutex;
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::types::{ManagerError, ManagerResult};
use super::Manager;
use crate::config::{ConfigResult, Params};
use crate::vfs::FileSystemView;

pub const MANAGER_TYPE: &str = "ftp";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 2121;

const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// Connection parameters; credentials are checked when the manager starts
#[derive(Debug, Clone)]
pub struct FtpSettings {
    pub username: Option<String>,
    pub password: Option<String>,
    pub host: String,
    pub port: u16,
}

impl Default for FtpSettings {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

pub struct FtpManager {
    unique_id: String,
    view: FileSystemView,
    settings: FtpSettings,
    running: Arc<AtomicBool>,
    local_addr: Mutex<Option<SocketAddr>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl FtpManager {
    pub fn new(unique_id: impl Into<String>, view: FileSystemView, settings: FtpSettings) -> Self {
        Self {
            unique_id: unique_id.into(),
            view,
            settings,
            running: Arc::new(AtomicBool::new(false)),
            local_addr: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    /// Address the control listener is bound to while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    fn credentials(&self) -> ManagerResult<Credentials> {
        let username = self
            .settings
            .username
            .clone()
            .ok_or_else(|| ManagerError::missing_attribute(&self.unique_id, "ftp_username"))?;
        let password = self
            .settings
            .password
            .clone()
            .ok_or_else(|| ManagerError::missing_attribute(&self.unique_id, "ftp_password"))?;
        Ok(Credentials { username, password })
    }
}

impl Manager for FtpManager {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn run(&self) -> ManagerResult<()> {
        let mut handle = self.handle.lock();
        if self.running.load(Ordering::SeqCst) {
            debug!(manager = %self.unique_id, "ftp manager already running");
            return Ok(());
        }
        let credentials = Arc::new(self.credentials()?);

        let listener = TcpListener::bind((self.settings.host.as_str(), self.settings.port))
            .map_err(|e| ManagerError::startup_failed(&self.unique_id, e))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| ManagerError::startup_failed(&self.unique_id, e))?;
        let addr = listener
            .local_addr()
            .map_err(|e| ManagerError::startup_failed(&self.unique_id, e))?;

        self.running.store(true, Ordering::SeqCst);
        let server = AcceptLoop {
            manager_id: self.unique_id.clone(),
            listener,
            template: self.view.fresh_view(),
            credentials,
            running: Arc::clone(&self.running),
        };
        let spawned = thread::Builder::new()
            .name(format!("ftp-{}", self.unique_id))
            .spawn(move || server.run());

        match spawned {
            Ok(join) => {
                *handle = Some(join);
                *self.local_addr.lock() = Some(addr);
                info!(manager = %self.unique_id, %addr, "ftp manager started");
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(ManagerError::startup_failed(&self.unique_id, e))
            }
        }
    }

    fn stop(&self) {
        let mut handle = self.handle.lock();
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(join) = handle.take() {
            if join.join().is_err() {
                error!(manager = %self.unique_id, "ftp accept loop panicked");
            }
        }
        *self.local_addr.lock() = None;
        info!(manager = %self.unique_id, "ftp manager stopped");
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for FtpManager {
    fn drop(&mut self) {
        self.stop();
    }
}

struct AcceptLoop {
    manager_id: String,
    listener: TcpListener,
    template: FileSystemView,
    credentials: Arc<Credentials>,
    running: Arc<AtomicBool>,
}

impl AcceptLoop {
    fn run(self) {
        while self.running.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    debug!(manager = %self.manager_id, %peer, "ftp connection");
                    if let Err(e) = stream.set_nonblocking(false) {
                        warn!(
                            manager = %self.manager_id,
                            %peer,
                            error = %e,
                            "connection setup failed"
                        );
                        continue;
                    }
                    let adapter = FtpFsAdapter::new(self.template.fresh_view());
                    let credentials = Arc::clone(&self.credentials);
                    let running = Arc::clone(&self.running);
                    let manager_id = self.manager_id.clone();

                    let spawned = thread::Builder::new()
                        .name(format!("ftp-{}-{}", self.manager_id, peer))
                        .spawn(move || {
                            let served = FtpSession::new(&manager_id, adapter, credentials, stream)
                                .and_then(|session| session.serve(&running));
                            match served {
                                Ok(()) => {
                                    debug!(manager = %manager_id, %peer, "ftp connection closed")
                                }
                                Err(e) => {
                                    warn!(
                                        manager = %manager_id,
                                        %peer,
                                        error = %e,
                                        "ftp connection failed"
                                    )
                                }
                            }
                        });
                    if let Err(e) = spawned {
                        warn!(
                            manager = %self.manager_id,
                            error = %e,
                            "could not spawn session thread"
                        );
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(e) => {
                    warn!(manager = %self.manager_id, error = %e, "accept failed");
                    thread::sleep(ACCEPT_POLL);
                }
            }
        }
    }
}

/// Registry factory. Recognised parameters: `ftp_username`,
/// `ftp_password`, `host` and `port`.
pub(crate) fn from_params(
    unique_id: &str,
    params: &mut Params,
    view: FileSystemView,
) -> ConfigResult<Arc<dyn Manager>> {
    let defaults = FtpSettings::default();
    let settings = FtpSettings {
        username: params.take("ftp_username"),
        password: params.take("ftp_password"),
        host: params.take("host").unwrap_or(defaults.host),
        port: params.take_parsed("port")?.unwrap_or(defaults.port),
    };
    params.finish()?;
    Ok(Arc::new(FtpManager::new(unique_id, view, settings)))
}
