/*!
 * FTP Manager Tests
 * Real TCP sessions against a manager bound to an ephemeral port
 */

use pretty_assertions::assert_eq;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use cloudfs::managers::ftp::FtpSettings;
use cloudfs::{FileSystem, FileSystemBuilder, FileSystemView, FtpManager, LocalFS, Manager};

struct Client {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Client {
    fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
        let mut client = Self {
            reader: BufReader::new(stream.try_clone().unwrap()),
            writer: stream,
        };
        assert!(client.read_reply().starts_with("220"));
        client
    }

    /// Read one reply, following multi-line replies to their last line
    fn read_reply(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).unwrap();
        if line.len() > 3 && line.as_bytes()[3] == b'-' {
            let end = format!("{} ", &line[..3]);
            let mut next = String::new();
            while !next.starts_with(&end) {
                next.clear();
                self.reader.read_line(&mut next).unwrap();
                line.push_str(&next);
            }
        }
        line
    }

    fn cmd(&mut self, command: &str) -> String {
        write!(self.writer, "{}\r\n", command).unwrap();
        self.writer.flush().unwrap();
        self.read_reply()
    }

    fn login(&mut self) {
        assert!(self.cmd("USER alice").starts_with("331"));
        assert!(self.cmd("PASS secret").starts_with("230"));
    }

    fn passive(&mut self) -> TcpStream {
        let reply = self.cmd("PASV");
        assert!(reply.starts_with("227"), "{}", reply);
        let inner = &reply[reply.find('(').unwrap() + 1..reply.find(')').unwrap()];
        let n: Vec<u16> = inner.split(',').map(|p| p.parse().unwrap()).collect();
        let addr = format!("{}.{}.{}.{}:{}", n[0], n[1], n[2], n[3], n[4] * 256 + n[5]);
        TcpStream::connect(addr).unwrap()
    }

    fn store(&mut self, path: &str, data: &[u8]) -> String {
        let mut data_conn = self.passive();
        let started = self.cmd(&format!("STOR {}", path));
        if !started.starts_with("150") {
            return started;
        }
        data_conn.write_all(data).unwrap();
        drop(data_conn);
        self.read_reply()
    }

    fn fetch(&mut self, command: &str) -> (String, Vec<u8>) {
        let mut data_conn = self.passive();
        let started = self.cmd(command);
        if !started.starts_with("150") {
            return (started, Vec::new());
        }
        let mut data = Vec::new();
        data_conn.read_to_end(&mut data).unwrap();
        (self.read_reply(), data)
    }
}

fn start() -> (TempDir, Arc<dyn FileSystem>, FtpManager) {
    let temp = TempDir::new().unwrap();
    let fs: Arc<dyn FileSystem> = Arc::new(LocalFS::builder(temp.path()).capacity(1_000).build().unwrap());
    let settings = FtpSettings {
        username: Some("alice".into()),
        password: Some("secret".into()),
        port: 0,
        ..FtpSettings::default()
    };
    let manager = FtpManager::new("ftp-1", FileSystemView::new(fs.clone()), settings);
    manager.run().unwrap();
    (temp, fs, manager)
}

#[test]
fn test_login_required() {
    let (_t, _fs, manager) = start();
    let mut client = Client::connect(manager.local_addr().unwrap());

    assert!(client.cmd("PWD").starts_with("530"));
    assert!(client.cmd("USER alice").starts_with("331"));
    assert!(client.cmd("PASS wrong").starts_with("530"));
    assert!(client.cmd("SYST").starts_with("215"));
    assert!(client.cmd("FEAT").contains("\r\n211 End"));
    client.login();
    assert_eq!(client.cmd("PWD"), "257 \"/\" is the current directory\r\n");
    assert!(client.cmd("QUIT").starts_with("221"));
    manager.stop();
}

#[test]
fn test_directory_commands() {
    let (_t, fs, manager) = start();
    let mut client = Client::connect(manager.local_addr().unwrap());
    client.login();

    assert_eq!(client.cmd("MKD docs"), "257 \"/docs\" directory created\r\n");
    assert_eq!(
        client.cmd("MKD docs"),
        "550 Can't create directory: File exists\r\n"
    );
    assert!(client.cmd("CWD docs").starts_with("250"));
    assert!(client.cmd("PWD").contains("\"/docs\""));
    assert!(client.cmd("CDUP").starts_with("250"));
    assert_eq!(client.cmd("CWD nowhere"), "550 No such file or directory\r\n");
    assert!(client.cmd("RMD docs").starts_with("250"));
    assert!(!fs.exists("/docs").unwrap());
    assert!(client.cmd("XYZZY").starts_with("502"));
    manager.stop();
}

#[test]
fn test_upload_download_and_rename() {
    let (_t, fs, manager) = start();
    let mut client = Client::connect(manager.local_addr().unwrap());
    client.login();
    assert!(client.cmd("TYPE I").starts_with("200"));

    assert!(client.store("hello.txt", b"hello over ftp").starts_with("226"));
    assert_eq!(fs.read("/hello.txt", 0, None).unwrap(), b"hello over ftp");
    assert_eq!(client.cmd("SIZE hello.txt"), "213 14\r\n");
    assert!(client.cmd("MDTM hello.txt").starts_with("213 2"));

    let (done, data) = client.fetch("RETR hello.txt");
    assert!(done.starts_with("226"), "{}", done);
    assert_eq!(data, b"hello over ftp");

    assert!(client.cmd("REST 6").starts_with("350"));
    let (done, data) = client.fetch("RETR hello.txt");
    assert!(done.starts_with("226"));
    assert_eq!(data, b"over ftp");

    let (done, listing) = client.fetch("NLST");
    assert!(done.starts_with("226"));
    assert_eq!(listing, b"hello.txt\r\n");

    let (done, listing) = client.fetch("LIST -la");
    assert!(done.starts_with("226"));
    let listing = String::from_utf8(listing).unwrap();
    assert!(listing.starts_with("-rw-r--r-- 1 owner group"), "{}", listing);
    assert!(listing.trim_end().ends_with(" hello.txt"));

    assert!(client.cmd("RNTO nothing").starts_with("503"));
    assert!(client.cmd("RNFR hello.txt").starts_with("350"));
    assert!(client.cmd("RNTO greeting.txt").starts_with("250"));
    assert!(fs.exists("/greeting.txt").unwrap());
    assert_eq!(client.cmd("RNFR hello.txt"), "550 No such file or directory\r\n");

    assert!(client.cmd("DELE greeting.txt").starts_with("250"));
    assert_eq!(fs.space_used().unwrap(), 0);
    manager.stop();
}

#[test]
fn test_upload_over_quota_is_discarded() {
    let (_t, fs, manager) = start();
    let mut client = Client::connect(manager.local_addr().unwrap());
    client.login();

    let reply = client.store("big.bin", &[0u8; 1_500]);
    assert!(reply.starts_with("552"), "{}", reply);
    assert!(!fs.exists("/big.bin").unwrap());
    assert_eq!(fs.space_used().unwrap(), 0);

    let reply = client.store("missing/dir/file", b"x");
    assert_eq!(reply, "550 No such file or directory\r\n");
    manager.stop();
}

#[test]
fn test_overlong_command_line_is_refused() {
    let (_t, _fs, manager) = start();
    let mut client = Client::connect(manager.local_addr().unwrap());

    // One byte past the 4096-byte limit and no newline
    client.writer.write_all(&[b'A'; 4_097]).unwrap();
    client.writer.flush().unwrap();
    assert_eq!(client.read_reply(), "500 Command line too long\r\n");

    let mut rest = String::new();
    let _ = client.reader.read_to_string(&mut rest);
    assert!(rest.is_empty(), "{}", rest);
    manager.stop();
}

#[test]
fn test_stop_closes_sessions() {
    let (_t, _fs, manager) = start();
    let mut client = Client::connect(manager.local_addr().unwrap());
    client.login();

    manager.stop();
    assert!(!manager.is_running());
    let mut rest = String::new();
    let _ = client.reader.read_to_string(&mut rest);
    assert!(rest.is_empty() || rest.starts_with("421"), "{}", rest);
}
