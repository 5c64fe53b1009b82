/*!
 * Shell Session
 * Parses and executes one command line against a view
 */

use std::fs::File;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::debug;

use crate::managers::transfer::{self, TransferError};
use crate::monitoring::span_operation;
use crate::vfs::{FileSystemView, VfsResult};

const HELP: &str = "\
- pwd
    prints the current working directory
- cd [PATH]
    changes the current working directory
- space_used
    prints the number of bytes used on the file system
- free_space
    prints the number of bytes of free space on the file system
- ls [PATH]
    lists the contents of PATH, or of the working directory
- type PATH
    prints \"directory\" or \"file\"
- size [PATH]
    prints the size of PATH in bytes
- created_dt [PATH]
    prints the creation datetime of PATH
- modified_dt [PATH]
    prints the last modification datetime of PATH
- accessed_dt [PATH]
    prints the last access datetime of PATH
- mkdir PATH
    creates a new directory at PATH
- mv CURRENT-PATH NEW-PATH
    moves CURRENT-PATH to NEW-PATH
- cp PATH COPY-PATH
    copies PATH to COPY-PATH
- rm PATH
    deletes the file or directory at PATH
- cat PATH
    prints the contents of the file at PATH
- download REMOTE-PATH LOCAL-PATH
    downloads a file to the local hard drive
- upload LOCAL-PATH REMOTE-PATH
    uploads a file from the local hard drive
- help
    shows this list
- exit
    ends the session";

/// What the loop should do after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

#[derive(Debug)]
enum Outcome {
    Done,
    Usage(&'static str),
    Failed(String),
}

impl From<crate::vfs::VfsError> for Outcome {
    fn from(e: crate::vfs::VfsError) -> Self {
        Outcome::Failed(e.to_string())
    }
}

impl From<TransferError> for Outcome {
    fn from(e: TransferError) -> Self {
        Outcome::Failed(e.to_string())
    }
}

pub struct ShellSession {
    manager_id: String,
    view: FileSystemView,
}

impl ShellSession {
    pub fn new(manager_id: impl Into<String>, view: FileSystemView) -> Self {
        Self {
            manager_id: manager_id.into(),
            view,
        }
    }

    pub fn view(&self) -> &FileSystemView {
        &self.view
    }

    pub fn prompt(&self) -> String {
        format!(">{}:", self.view.working_dir())
    }

    /// Read lines from `input` until end of input, `exit`, or `stop` is set
    pub fn run(
        &self,
        input: &mut dyn BufRead,
        out: &mut dyn Write,
        stop: &AtomicBool,
    ) -> io::Result<()> {
        let mut line = String::new();
        while !stop.load(Ordering::SeqCst) {
            write!(out, "{}", self.prompt())?;
            out.flush()?;

            line.clear();
            if input.read_line(&mut line)? == 0 {
                break;
            }
            // Stopped while blocked on the read
            if stop.load(Ordering::SeqCst) {
                break;
            }
            if self.execute(&line, out)? == Flow::Exit {
                break;
            }
        }
        Ok(())
    }

    /// Execute one command line, writing its output and any error to `out`
    pub fn execute(&self, line: &str, out: &mut dyn Write) -> io::Result<Flow> {
        let args = split_args(line);
        let Some((command, rest)) = args.split_first() else {
            return Ok(Flow::Continue);
        };
        let rest: Vec<&str> = rest.iter().map(String::as_str).collect();

        let span = span_operation(&self.manager_id, command);
        let _entered = span.enter();

        let outcome = match command.as_str() {
            "exit" | "quit" => return Ok(Flow::Exit),
            "help" => {
                writeln!(out, "{}", HELP)?;
                Outcome::Done
            }
            "pwd" => {
                writeln!(out, "{}", self.view.working_dir())?;
                Outcome::Done
            }
            "cd" => self.cd(&rest),
            "space_used" => self.print_number(out, self.view.space_used())?,
            "free_space" => self.print_number(out, self.view.free_space())?,
            "ls" => self.ls(&rest, out)?,
            "type" => self.kind(&rest, out)?,
            "size" => {
                let path = rest.first().copied().unwrap_or(".");
                self.print_number(out, self.view.get_size(path))?
            }
            "created_dt" => self.datetime(&rest, out, |v, p| v.get_created_datetime(p))?,
            "modified_dt" => self.datetime(&rest, out, |v, p| v.get_modified_datetime(p))?,
            "accessed_dt" => self.datetime(&rest, out, |v, p| v.get_accessed_datetime(p))?,
            "mkdir" => match rest.as_slice() {
                [path] => self.view.make_dir(path).map_or_else(Outcome::from, |_| Outcome::Done),
                _ => Outcome::Usage("mkdir PATH"),
            },
            "mv" => match rest.as_slice() {
                [from, to] => self
                    .view
                    .move_entry(from, to)
                    .map_or_else(Outcome::from, |_| Outcome::Done),
                _ => Outcome::Usage("mv CURRENT-PATH NEW-PATH"),
            },
            "cp" => match rest.as_slice() {
                [from, to] => self
                    .view
                    .copy(from, to)
                    .map_or_else(Outcome::from, |_| Outcome::Done),
                _ => Outcome::Usage("cp PATH COPY-PATH"),
            },
            "rm" => match rest.as_slice() {
                [path] => self.view.delete(path).map_or_else(Outcome::from, |_| Outcome::Done),
                _ => Outcome::Usage("rm PATH"),
            },
            "cat" => self.cat(&rest, out)?,
            "download" => self.download(&rest, &span),
            "upload" => self.upload(&rest, &span),
            other => {
                writeln!(out, "Command \"{}\" not recognised", other)?;
                Outcome::Done
            }
        };

        match outcome {
            Outcome::Done => span.record_result(true),
            Outcome::Usage(usage) => {
                span.record_result(false);
                writeln!(out, "Usage: {}", usage)?;
            }
            Outcome::Failed(message) => {
                span.record_error(&message);
                writeln!(out, "Error: {}", message)?;
            }
        }
        Ok(Flow::Continue)
    }

    fn cd(&self, args: &[&str]) -> Outcome {
        match args.first() {
            None => Outcome::Done,
            Some(path) => self
                .view
                .set_working_dir(path)
                .map_or_else(Outcome::from, |_| Outcome::Done),
        }
    }

    fn print_number(&self, out: &mut dyn Write, value: VfsResult<u64>) -> io::Result<Outcome> {
        Ok(match value {
            Ok(n) => {
                writeln!(out, "{}", n)?;
                Outcome::Done
            }
            Err(e) => e.into(),
        })
    }

    fn ls(&self, args: &[&str], out: &mut dyn Write) -> io::Result<Outcome> {
        Ok(match self.view.list_dir(args.first().copied()) {
            Ok(names) => {
                for name in names {
                    writeln!(out, "{}", name)?;
                }
                Outcome::Done
            }
            Err(e) => e.into(),
        })
    }

    fn kind(&self, args: &[&str], out: &mut dyn Write) -> io::Result<Outcome> {
        let [path] = args else {
            return Ok(Outcome::Usage("type PATH"));
        };
        Ok(match self.view.get_metadata(path) {
            Ok(meta) => {
                writeln!(out, "{}", if meta.is_dir() { "directory" } else { "file" })?;
                Outcome::Done
            }
            Err(e) => e.into(),
        })
    }

    fn datetime(
        &self,
        args: &[&str],
        out: &mut dyn Write,
        get: impl Fn(&FileSystemView, &str) -> VfsResult<SystemTime>,
    ) -> io::Result<Outcome> {
        let path = args.first().copied().unwrap_or(".");
        Ok(match get(&self.view, path) {
            Ok(when) => {
                writeln!(out, "{}", format_datetime(when))?;
                Outcome::Done
            }
            Err(e) => e.into(),
        })
    }

    fn cat(&self, args: &[&str], out: &mut dyn Write) -> io::Result<Outcome> {
        let [path] = args else {
            return Ok(Outcome::Usage("cat PATH"));
        };
        Ok(match self.view.read(path, 0, None) {
            Ok(bytes) => {
                writeln!(out, "{}", String::from_utf8_lossy(&bytes))?;
                Outcome::Done
            }
            Err(e) => e.into(),
        })
    }

    fn download(&self, args: &[&str], span: &crate::monitoring::OperationSpan) -> Outcome {
        let [remote, local] = args else {
            return Outcome::Usage("download REMOTE-PATH LOCAL-PATH");
        };
        // Validate before touching the local disk
        match self.view.is_file(remote) {
            Ok(true) => {}
            Ok(false) => return Outcome::Failed(format!("{} is not a file", remote)),
            Err(e) => return e.into(),
        }
        let result = File::create(local)
            .map_err(TransferError::from)
            .and_then(|mut file| transfer::download(&self.view, remote, 0, &mut file));
        match result {
            Ok(bytes) => {
                span.record_bytes(bytes);
                debug!(remote, local, bytes, "download complete");
                Outcome::Done
            }
            Err(e) => e.into(),
        }
    }

    fn upload(&self, args: &[&str], span: &crate::monitoring::OperationSpan) -> Outcome {
        let [local, remote] = args else {
            return Outcome::Usage("upload LOCAL-PATH REMOTE-PATH");
        };
        let result = File::open(local)
            .map_err(TransferError::from)
            .and_then(|mut file| transfer::upload(&self.view, &mut file, remote));
        match result {
            Ok(bytes) => {
                span.record_bytes(bytes);
                debug!(local, remote, bytes, "upload complete");
                Outcome::Done
            }
            Err(e) => e.into(),
        }
    }
}

fn format_datetime(when: SystemTime) -> String {
    let when = OffsetDateTime::from(when);
    when.format(&Rfc3339).unwrap_or_else(|_| when.to_string())
}

/// Split on whitespace, keeping double-quoted runs together
fn split_args(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut pending = false;

    for c in line.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                pending = true;
            }
            c if c.is_whitespace() && !quoted => {
                if pending {
                    args.push(std::mem::take(&mut current));
                    pending = false;
                }
            }
            c => {
                current.push(c);
                pending = true;
            }
        }
    }
    if pending {
        args.push(current);
    }
    args
}
