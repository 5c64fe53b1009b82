/*!
 * Shell Manager
 * Interactive line-oriented front end on the process terminal
 */

mod session;

pub use session::{Flow, ShellSession};

use parking_lot::Mutex;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{info, warn};

use super::types::{ManagerError, ManagerResult};
use super::Manager;
use crate::config::{ConfigResult, Params};
use crate::vfs::FileSystemView;

pub const MANAGER_TYPE: &str = "shell";

/// Opens the input and output a session runs on; called on the session thread
pub type Terminal = dyn Fn() -> (Box<dyn BufRead>, Box<dyn Write>) + Send + Sync;

fn process_terminal() -> (Box<dyn BufRead>, Box<dyn Write>) {
    (Box::new(io::stdin().lock()), Box::new(io::stdout()))
}

/// Flags of one started session
struct SessionRun {
    alive: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
}

impl SessionRun {
    fn is_active(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && !self.stop.load(Ordering::SeqCst)
    }
}

pub struct ShellManager {
    session: Arc<ShellSession>,
    unique_id: String,
    terminal: Arc<Terminal>,
    current: Mutex<Option<SessionRun>>,
}

impl ShellManager {
    /// Shell on the process terminal
    pub fn new(unique_id: impl Into<String>, view: FileSystemView) -> Self {
        Self::with_terminal(unique_id, view, Arc::new(process_terminal))
    }

    pub fn with_terminal(
        unique_id: impl Into<String>,
        view: FileSystemView,
        terminal: Arc<Terminal>,
    ) -> Self {
        let unique_id = unique_id.into();
        Self {
            session: Arc::new(ShellSession::new(unique_id.clone(), view)),
            unique_id,
            terminal,
            current: Mutex::new(None),
        }
    }

    pub fn session(&self) -> &ShellSession {
        &self.session
    }
}

impl Manager for ShellManager {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    /// Start a session thread. A previous session that was stopped while
    /// blocked on its terminal is left to exit on its own and never joined.
    fn run(&self) -> ManagerResult<()> {
        let mut current = self.current.lock();
        if current.as_ref().is_some_and(SessionRun::is_active) {
            return Ok(());
        }

        let run = SessionRun {
            alive: Arc::new(AtomicBool::new(true)),
            stop: Arc::new(AtomicBool::new(false)),
        };
        let session = Arc::clone(&self.session);
        let terminal = Arc::clone(&self.terminal);
        let alive = Arc::clone(&run.alive);
        let stop = Arc::clone(&run.stop);
        let id = self.unique_id.clone();

        let spawned = thread::Builder::new()
            .name(format!("shell-{}", self.unique_id))
            .spawn(move || {
                let (mut input, mut output) = terminal();
                if let Err(e) = session.run(&mut *input, &mut *output, &stop) {
                    warn!(manager = %id, error = %e, "shell terminal failed");
                }
                alive.store(false, Ordering::SeqCst);
                info!(manager = %id, "shell session ended");
            });

        match spawned {
            Ok(_detached) => {
                *current = Some(run);
                info!(manager = %self.unique_id, "shell started");
                Ok(())
            }
            Err(e) => Err(ManagerError::startup_failed(&self.unique_id, e)),
        }
    }

    /// The session notices the request once its pending read returns
    fn stop(&self) {
        if let Some(run) = self.current.lock().as_ref() {
            if run.is_active() {
                run.stop.store(true, Ordering::SeqCst);
                info!(manager = %self.unique_id, "shell stop requested");
            }
        }
    }

    fn is_running(&self) -> bool {
        self.current.lock().as_ref().is_some_and(SessionRun::is_active)
    }
}

/// Registry factory; the shell takes no parameters
pub(crate) fn from_params(
    unique_id: &str,
    params: &mut Params,
    view: FileSystemView,
) -> ConfigResult<Arc<dyn Manager>> {
    params.finish()?;
    Ok(Arc::new(ShellManager::new(unique_id, view)))
}
