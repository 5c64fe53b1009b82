/*!
 * FTP Session
 * Control-connection loop for one client, passive-mode data transfers
 */

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{IpAddr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use super::adapter::{AdapterError, FtpFsAdapter};
use crate::monitoring::{span_operation, OperationSpan};
use crate::vfs::FileMetadata;

/// How long a passive listener waits for the client's data connection
pub const DATA_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Control reads wake up this often to notice a stop request
const POLL_INTERVAL: Duration = Duration::from_millis(250);

const MAX_LINE: usize = 4096;

const FEATURES: &[&str] = &["EPSV", "MDTM", "PASV", "REST STREAM", "SIZE", "UTF8"];

/// Account a session accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

pub struct FtpSession {
    manager_id: String,
    adapter: FtpFsAdapter,
    credentials: Arc<Credentials>,
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    user: Option<String>,
    logged_in: bool,
    passive: Option<TcpListener>,
    restart: u64,
    rename_from: Option<String>,
}

enum Next {
    Continue,
    Close,
}

impl FtpSession {
    pub fn new(
        manager_id: &str,
        adapter: FtpFsAdapter,
        credentials: Arc<Credentials>,
        control: TcpStream,
    ) -> io::Result<Self> {
        control.set_read_timeout(Some(POLL_INTERVAL))?;
        let reader = BufReader::new(control.try_clone()?);
        Ok(Self {
            manager_id: manager_id.to_string(),
            adapter,
            credentials,
            reader,
            writer: control,
            user: None,
            logged_in: false,
            passive: None,
            restart: 0,
            rename_from: None,
        })
    }

    /// Serve the client until it quits, disconnects, or `running` clears
    pub fn serve(mut self, running: &AtomicBool) -> io::Result<()> {
        self.reply(220, "Service ready")?;

        let mut line = Vec::new();
        while running.load(Ordering::SeqCst) {
            // At most one byte past the limit is ever buffered
            let limit = (MAX_LINE + 1).saturating_sub(line.len()) as u64;
            match (&mut self.reader).take(limit).read_until(b'\n', &mut line) {
                Ok(0) => break,
                Ok(_) if line.ends_with(b"\n") => {
                    let command = String::from_utf8_lossy(&line).trim_end().to_string();
                    line.clear();
                    if let Next::Close = self.dispatch(&command)? {
                        break;
                    }
                }
                Ok(_) if line.len() > MAX_LINE => {
                    self.reply(500, "Command line too long")?;
                    break;
                }
                // EOF in the middle of a line
                Ok(_) => break,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }

        if !running.load(Ordering::SeqCst) {
            let _ = self.reply(421, "Service shutting down");
        }
        let _ = self.writer.shutdown(Shutdown::Both);
        Ok(())
    }

    fn reply(&mut self, code: u16, message: &str) -> io::Result<()> {
        write!(self.writer, "{} {}\r\n", code, message)?;
        self.writer.flush()
    }

    fn dispatch(&mut self, line: &str) -> io::Result<Next> {
        let (verb, arg) = match line.split_once(' ') {
            Some((verb, arg)) => (verb.to_ascii_uppercase(), arg.trim().to_string()),
            None => (line.to_ascii_uppercase(), String::new()),
        };
        if verb.is_empty() {
            return Ok(Next::Continue);
        }

        let span = span_operation(&self.manager_id, &verb);
        let _entered = span.enter();
        if verb == "PASS" {
            debug!(command = %verb, "ftp command");
        } else {
            debug!(command = %verb, arg = %arg, "ftp command");
        }

        if verb != "RNTO" && verb != "RNFR" {
            self.rename_from = None;
        }

        match verb.as_str() {
            "USER" => self.user(arg)?,
            "PASS" => self.pass(&arg, &span)?,
            "QUIT" => {
                self.reply(221, "Goodbye")?;
                return Ok(Next::Close);
            }
            "SYST" => self.reply(215, "UNIX Type: L8")?,
            "NOOP" => self.reply(200, "NOOP ok")?,
            "FEAT" => {
                let mut text = String::from("211-Features:\r\n");
                for feature in FEATURES {
                    text.push_str(&format!(" {}\r\n", feature));
                }
                text.push_str("211 End\r\n");
                self.writer.write_all(text.as_bytes())?;
                self.writer.flush()?;
            }
            "OPTS" if arg.eq_ignore_ascii_case("UTF8 ON") => {
                self.reply(200, "Always in UTF8 mode")?
            }
            _ if !self.logged_in => {
                span.record_result(false);
                self.reply(530, "Log in with USER and PASS first")?;
            }
            "PWD" | "XPWD" => {
                let cwd = self.adapter.cwd().replace('"', "\"\"");
                self.reply(257, &format!("\"{}\" is the current directory", cwd))?;
            }
            "CWD" | "XCWD" => {
                let result = self.adapter.chdir(&arg);
                self.answer(&span, result, 250, |_| "Directory changed".to_string())?;
            }
            "CDUP" | "XCUP" => {
                let result = self.adapter.chdir("..");
                self.answer(&span, result, 250, |_| "Directory changed".to_string())?;
            }
            "TYPE" => match arg.to_ascii_uppercase().as_str() {
                "A" | "A N" | "I" | "L 8" => self.reply(200, &format!("Type set to {}", arg))?,
                _ => self.reply(504, "Unsupported type")?,
            },
            "MODE" if arg.eq_ignore_ascii_case("S") => self.reply(200, "Mode set to S")?,
            "STRU" if arg.eq_ignore_ascii_case("F") => self.reply(200, "Structure set to F")?,
            "PASV" => self.pasv()?,
            "EPSV" => self.epsv()?,
            "LIST" => self.list(&arg, &span, true)?,
            "NLST" => self.list(&arg, &span, false)?,
            "RETR" => self.retr(&arg, &span)?,
            "STOR" => self.stor(&arg, &span)?,
            "REST" => match arg.parse::<u64>() {
                Ok(offset) => {
                    self.restart = offset;
                    self.reply(350, &format!("Restarting at {}", offset))?;
                }
                Err(_) => self.reply(501, "Invalid REST parameter")?,
            },
            "DELE" => {
                let result = self.adapter.remove(&arg);
                self.answer(&span, result, 250, |_| "File removed".to_string())?;
            }
            "RMD" | "XRMD" => {
                let result = self.adapter.rmdir(&arg);
                self.answer(&span, result, 250, |_| "Directory removed".to_string())?;
            }
            "MKD" | "XMKD" => {
                let result = self.adapter.mkdir(&arg);
                self.answer(&span, result, 257, |path| {
                    format!("\"{}\" directory created", path.replace('"', "\"\""))
                })?;
            }
            "RNFR" => match self.adapter.metadata(&arg) {
                Ok(meta) => {
                    self.rename_from = Some(meta.path);
                    self.reply(350, "Ready for destination name")?;
                }
                Err(e) => self.fail(&span, e)?,
            },
            "RNTO" => match self.rename_from.take() {
                None => self.reply(503, "Bad sequence of commands: use RNFR first")?,
                Some(from) => {
                    let result = self.adapter.rename(&from, &arg);
                    self.answer(&span, result, 250, |_| "Renaming ok".to_string())?;
                }
            },
            "SIZE" => {
                let result = self.adapter.size(&arg);
                self.answer(&span, result, 213, |size| size.to_string())?;
            }
            "MDTM" => {
                let result = self.adapter.metadata(&arg);
                self.answer(&span, result, 213, mdtm)?;
            }
            _ => {
                span.record_result(false);
                self.reply(502, &format!("Command \"{}\" not implemented", verb))?;
            }
        }
        Ok(Next::Continue)
    }

    /// Reply `code` with the rendered value, or the adapter's failure
    fn answer<T>(
        &mut self,
        span: &OperationSpan,
        result: Result<T, AdapterError>,
        code: u16,
        render: impl FnOnce(&T) -> String,
    ) -> io::Result<()> {
        match result {
            Ok(value) => {
                span.record_result(true);
                self.reply(code, &render(&value))
            }
            Err(e) => self.fail(span, e),
        }
    }

    fn fail(&mut self, span: &OperationSpan, error: AdapterError) -> io::Result<()> {
        span.record_error(&error);
        let code = match error {
            AdapterError::Failed(_) => 550,
            AdapterError::StorageFull(_) => 552,
            AdapterError::Transfer(_) => 426,
        };
        self.reply(code, &error.to_string())
    }

    fn user(&mut self, name: String) -> io::Result<()> {
        if self.logged_in {
            return self.reply(503, "Already logged in");
        }
        self.user = Some(name);
        self.reply(331, "Username ok, send password")
    }

    fn pass(&mut self, password: &str, span: &OperationSpan) -> io::Result<()> {
        if self.logged_in {
            return self.reply(503, "Already logged in");
        }
        let Some(user) = self.user.take() else {
            return self.reply(503, "Login with USER first");
        };
        if user == self.credentials.username && password == self.credentials.password {
            self.logged_in = true;
            span.record_result(true);
            info!(manager = %self.manager_id, user = %user, "ftp login");
            self.reply(230, "Login successful")
        } else {
            span.record_result(false);
            warn!(manager = %self.manager_id, user = %user, "ftp login rejected");
            self.reply(530, "Authentication failed")
        }
    }

    fn open_passive(&mut self) -> io::Result<Option<SocketAddr>> {
        let ip = self.writer.local_addr()?.ip();
        match TcpListener::bind((ip, 0)) {
            Ok(listener) => {
                let addr = listener.local_addr()?;
                self.passive = Some(listener);
                Ok(Some(addr))
            }
            Err(e) => {
                warn!(manager = %self.manager_id, error = %e, "passive listener failed");
                self.reply(425, "Can't open data connection")?;
                Ok(None)
            }
        }
    }

    fn pasv(&mut self) -> io::Result<()> {
        if !self.writer.local_addr()?.is_ipv4() {
            return self.reply(522, "Use EPSV on IPv6 connections");
        }
        let Some(addr) = self.open_passive()? else {
            return Ok(());
        };
        let IpAddr::V4(ip) = addr.ip() else {
            return self.reply(425, "Can't open data connection");
        };
        let [a, b, c, d] = ip.octets();
        let port = addr.port();
        self.reply(
            227,
            &format!(
                "Entering Passive Mode ({},{},{},{},{},{})",
                a,
                b,
                c,
                d,
                port >> 8,
                port & 0xff
            ),
        )
    }

    fn epsv(&mut self) -> io::Result<()> {
        let Some(addr) = self.open_passive()? else {
            return Ok(());
        };
        self.reply(229, &format!("Entering Extended Passive Mode (|||{}|)", addr.port()))
    }

    /// Accept the client's data connection on the pending passive listener
    fn data_connection(&mut self) -> io::Result<Option<TcpStream>> {
        let Some(listener) = self.passive.take() else {
            self.reply(425, "Use PASV or EPSV first")?;
            return Ok(None);
        };
        listener.set_nonblocking(true)?;
        let deadline = Instant::now() + DATA_CONNECT_TIMEOUT;
        loop {
            match listener.accept() {
                Ok((stream, _)) => {
                    stream.set_nonblocking(false)?;
                    return Ok(Some(stream));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock && Instant::now() < deadline => {
                    thread::sleep(Duration::from_millis(10));
                }
                Err(e) => {
                    warn!(
                        manager = %self.manager_id,
                        error = %e,
                        "data connection not established"
                    );
                    self.reply(425, "Can't open data connection")?;
                    return Ok(None);
                }
            }
        }
    }

    fn list(&mut self, arg: &str, span: &OperationSpan, long: bool) -> io::Result<()> {
        // Clients send ls-style flags along with the path
        let path = arg
            .split_whitespace()
            .filter(|part| !part.starts_with('-'))
            .collect::<Vec<_>>()
            .join(" ");
        let entries = match self.adapter.list(if path.is_empty() { "." } else { path.as_str() }) {
            Ok(entries) => entries,
            Err(e) => return self.fail(span, e),
        };

        let now = OffsetDateTime::now_utc();
        let mut text = String::new();
        for entry in &entries {
            if long {
                text.push_str(&list_line(entry, now));
            } else {
                text.push_str(entry.name());
            }
            text.push_str("\r\n");
        }

        let Some(mut data) = self.data_connection()? else {
            return Ok(());
        };
        self.reply(150, "Here comes the directory listing")?;
        match data.write_all(text.as_bytes()).and_then(|_| data.flush()) {
            Ok(()) => {
                drop(data);
                span.record_result(true);
                self.reply(226, "Transfer complete")
            }
            Err(e) => self.fail(span, AdapterError::Transfer(e.to_string())),
        }
    }

    fn retr(&mut self, arg: &str, span: &OperationSpan) -> io::Result<()> {
        let offset = std::mem::take(&mut self.restart);
        let size = match self.adapter.size(arg) {
            Ok(size) => size,
            Err(e) => return self.fail(span, e),
        };
        if offset > size {
            return self.reply(554, "Invalid REST parameter");
        }

        let Some(mut data) = self.data_connection()? else {
            return Ok(());
        };
        self.reply(150, "Opening data connection")?;
        let result = self.adapter.retrieve(arg, offset, &mut data);
        drop(data);
        match result {
            Ok(bytes) => {
                span.record_bytes(bytes);
                span.record_result(true);
                self.reply(226, "Transfer complete")
            }
            Err(e) => self.fail(span, e),
        }
    }

    fn stor(&mut self, arg: &str, span: &OperationSpan) -> io::Result<()> {
        if std::mem::take(&mut self.restart) != 0 {
            return self.reply(554, "Resuming uploads is not supported");
        }
        let abs = self.adapter.abs(arg);
        if let Err(e) = self.adapter.check_store_target(&abs) {
            return self.fail(span, e);
        }

        let Some(mut data) = self.data_connection()? else {
            return Ok(());
        };
        self.reply(150, "Ok to send data")?;
        let result = self.adapter.store(&abs, &mut data);
        drop(data);
        match result {
            Ok(bytes) => {
                span.record_bytes(bytes);
                span.record_result(true);
                self.reply(226, "Transfer complete")
            }
            Err(e) => self.fail(span, e),
        }
    }
}

/// One `ls -l` style line
fn list_line(meta: &FileMetadata, now: OffsetDateTime) -> String {
    let modified = OffsetDateTime::from(meta.modified);
    let recent = (now - modified).whole_days().abs() < 180;
    let date = if recent {
        modified.format(format_description!(
            "[month repr:short] [day padding:space] [hour]:[minute]"
        ))
    } else {
        modified.format(format_description!("[month repr:short] [day padding:space]  [year]"))
    };
    let date = date.unwrap_or_default();
    let mode = if meta.is_dir() { "drwxr-xr-x" } else { "-rw-r--r--" };
    format!("{} 1 owner group {:>13} {} {}", mode, meta.size, date, meta.name())
}

fn mdtm(meta: &FileMetadata) -> String {
    OffsetDateTime::from(meta.modified)
        .format(format_description!("[year][month][day][hour][minute][second]"))
        .unwrap_or_default()
}
