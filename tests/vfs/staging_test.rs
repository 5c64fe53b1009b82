/*!
 * Staged Write Tests
 * create / write chunks / commit or flush on every backend
 */

use crate::fixtures::{backends, put};
use cloudfs::VfsError;

#[test]
fn test_chunks_are_concatenated() {
    for b in backends(1_000_000) {
        let fs = b.fs.as_ref();
        let id = fs.create_new_file().unwrap();
        fs.write_to_new_file(id, b"hello ").unwrap();
        fs.write_to_new_file(id, b"").unwrap();
        fs.write_to_new_file(id, b"world").unwrap();

        // Nothing is visible before the commit
        assert!(fs.list_dir("/").unwrap().is_empty(), "{}", b.name);

        fs.commit_new_file(id, "/greeting.txt").unwrap();
        assert_eq!(fs.read("/greeting.txt", 0, None).unwrap(), b"hello world", "{}", b.name);
        assert_eq!(fs.get_size("/greeting.txt").unwrap(), 11);
    }
}

#[test]
fn test_empty_commit_creates_empty_file() {
    for b in backends(1_000_000) {
        let fs = b.fs.as_ref();
        let id = fs.create_new_file().unwrap();
        fs.commit_new_file(id, "/empty").unwrap();
        assert!(fs.is_file("/empty").unwrap(), "{}", b.name);
        assert_eq!(fs.get_size("/empty").unwrap(), 0);
    }
}

#[test]
fn test_ids_are_single_use() {
    for b in backends(1_000_000) {
        let fs = b.fs.as_ref();
        let id = fs.create_new_file().unwrap();
        fs.write_to_new_file(id, b"data").unwrap();

        fs.flush_new_file(id).unwrap();
        assert_eq!(fs.flush_new_file(id), Err(VfsError::IdNotFound(id)), "{}", b.name);
        assert_eq!(fs.commit_new_file(id, "/late"), Err(VfsError::IdNotFound(id)));
        assert_eq!(fs.write_to_new_file(id, b"more"), Err(VfsError::IdNotFound(id)));
        assert!(!fs.exists("/late").unwrap());

        let other = fs.create_new_file().unwrap();
        assert_ne!(other, id, "{}", b.name);
        fs.commit_new_file(other, "/done").unwrap();
        assert_eq!(fs.commit_new_file(other, "/again"), Err(VfsError::IdNotFound(other)));
    }
}

#[test]
fn test_commit_validation_keeps_upload() {
    for b in backends(1_000_000) {
        let fs = b.fs.as_ref();
        fs.make_dir("/dir").unwrap();
        let id = fs.create_new_file().unwrap();
        fs.write_to_new_file(id, b"abc").unwrap();

        assert!(matches!(fs.commit_new_file(id, "/"), Err(VfsError::InvalidTarget(_))), "{}", b.name);
        assert!(matches!(fs.commit_new_file(id, "/dir"), Err(VfsError::InvalidTarget(_))), "{}", b.name);
        assert!(matches!(fs.commit_new_file(id, "/missing/f"), Err(VfsError::InvalidPath(_))), "{}", b.name);

        // Still pending after rejected commits
        fs.commit_new_file(id, "/dir/f").unwrap();
        assert_eq!(fs.read("/dir/f", 0, None).unwrap(), b"abc");
    }
}

#[test]
fn test_flush_after_failed_commit_releases_space() {
    for b in backends(1_000_000) {
        let fs = b.fs.as_ref();
        put(fs, "/kept", b"12345").unwrap();
        let before = fs.space_used().unwrap();

        let id = fs.create_new_file().unwrap();
        fs.write_to_new_file(id, b"pending").unwrap();
        assert!(matches!(fs.commit_new_file(id, "/missing/f"), Err(VfsError::InvalidPath(_))), "{}", b.name);
        assert_eq!(fs.space_used().unwrap(), before + 7, "{}", b.name);

        fs.flush_new_file(id).unwrap();
        assert_eq!(fs.space_used().unwrap(), before, "{}", b.name);
        assert!(!fs.exists("/missing").unwrap());

        // The same path through the helper leaves nothing reserved
        assert!(put(fs, "/missing/g", b"xyz").is_err());
        assert_eq!(fs.space_used().unwrap(), before, "{}", b.name);
    }
}

#[test]
fn test_overwrite_replaces_content() {
    for b in backends(1_000_000) {
        let fs = b.fs.as_ref();
        put(fs, "/doc", &[7u8; 860]).unwrap();
        assert_eq!(fs.get_size("/doc").unwrap(), 860);

        put(fs, "/doc", &[1u8; 10]).unwrap();
        assert_eq!(fs.get_size("/doc").unwrap(), 10, "{}", b.name);
        assert_eq!(fs.read("/doc", 0, None).unwrap(), vec![1u8; 10]);
        assert_eq!(fs.space_used().unwrap(), 10, "{}", b.name);
    }
}

#[test]
fn test_interleaved_uploads_are_independent() {
    for b in backends(1_000_000) {
        let fs = b.fs.as_ref();
        let first = fs.create_new_file().unwrap();
        let second = fs.create_new_file().unwrap();
        fs.write_to_new_file(first, b"one-").unwrap();
        fs.write_to_new_file(second, b"two-").unwrap();
        fs.write_to_new_file(first, b"1").unwrap();
        fs.write_to_new_file(second, b"2").unwrap();

        fs.commit_new_file(second, "/b").unwrap();
        fs.commit_new_file(first, "/a").unwrap();
        assert_eq!(fs.read("/a", 0, None).unwrap(), b"one-1", "{}", b.name);
        assert_eq!(fs.read("/b", 0, None).unwrap(), b"two-2", "{}", b.name);
    }
}
