/*!
 * Shell Session Tests
 * Scripted sessions over a seeded local account
 */

use pretty_assertions::assert_eq;
use std::sync::atomic::AtomicBool;
use tempfile::TempDir;

use cloudfs::managers::ShellSession;
use cloudfs::{Account, FileSystemBuilder, LocalAccount, LocalFS};

fn seeded_session() -> (TempDir, ShellSession) {
    let temp = TempDir::new().unwrap();
    let fs = LocalFS::builder(temp.path()).build().unwrap();
    let account = LocalAccount::new("local-1", fs).with_sample_tree(true);
    account.authenticate().unwrap();
    (temp, ShellSession::new("shell-1", account.new_view()))
}

fn script(session: &ShellSession, lines: &str) -> String {
    let mut input = lines.as_bytes();
    let mut out = Vec::new();
    session
        .run(&mut input, &mut out, &AtomicBool::new(false))
        .unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn test_browse_sample_tree() {
    let (_t, session) = seeded_session();
    let out = script(&session, "ls\ncd dir2\nls\ntype subdir1\ntype file2.txt\n");
    assert_eq!(
        out,
        ">/:dir1\ndir2\nfile1.txt\n>/:>/dir2:file2.txt\nsubdir1\n>/dir2:directory\n>/dir2:file\n>/dir2:"
    );
}

#[test]
fn test_reorganise_tree() {
    let (_t, session) = seeded_session();
    script(
        &session,
        "mkdir archive\nmv file1.txt archive/zen.txt\ncp dir2 archive/dir2\nrm dir1\n",
    );
    let out = script(&session, "ls\nls archive\nls archive/dir2\n");
    assert_eq!(
        out,
        ">/:archive\ndir2\n>/:dir2\nzen.txt\n>/:file2.txt\nsubdir1\n>/:"
    );
}

#[test]
fn test_failures_keep_the_session_alive() {
    let (_t, session) = seeded_session();
    let out = script(&session, "cd file1.txt\nmkdir dir1\nbogus\npwd\n");
    let lines: Vec<&str> = out.split('\n').collect();
    assert!(lines[0].starts_with(">/:Error: "), "{}", out);
    assert!(lines[1].starts_with(">/:Error: "), "{}", out);
    assert_eq!(lines[2], ">/:Command \"bogus\" not recognised");
    assert_eq!(lines[3], ">/:/");
}

#[test]
fn test_space_reporting() {
    let (_t, session) = seeded_session();
    let used: u64 = script(&session, "space_used\n")
        .trim_start_matches(">/:")
        .lines()
        .next()
        .unwrap()
        .parse()
        .unwrap();
    assert!(used > 0);

    script(&session, "rm file1.txt\nrm dir2\n");
    let out = script(&session, "space_used\n");
    assert_eq!(out, ">/:0\n>/:");
}
