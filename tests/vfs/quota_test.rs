/*!
 * Quota Accounting Tests
 */

use crate::fixtures::{backends, local, put};
use cloudfs::VfsError;

#[test]
fn test_used_and_free_move_together() {
    for b in backends(1_000) {
        let fs = b.fs.as_ref();
        assert_eq!(fs.space_used().unwrap(), 0, "{}", b.name);
        assert_eq!(fs.free_space().unwrap(), 1_000, "{}", b.name);

        put(fs, "/a", &[0u8; 300]).unwrap();
        assert_eq!(fs.space_used().unwrap(), 300, "{}", b.name);
        assert_eq!(fs.free_space().unwrap(), 700, "{}", b.name);

        fs.delete("/a").unwrap();
        assert_eq!(fs.space_used().unwrap(), 0, "{}", b.name);
        assert_eq!(fs.free_space().unwrap(), 1_000, "{}", b.name);
    }
}

#[test]
fn test_pending_bytes_are_reserved() {
    for b in backends(1_000) {
        let fs = b.fs.as_ref();
        let id = fs.create_new_file().unwrap();
        fs.write_to_new_file(id, &[0u8; 400]).unwrap();
        assert_eq!(fs.space_used().unwrap(), 400, "{}", b.name);

        fs.flush_new_file(id).unwrap();
        assert_eq!(fs.space_used().unwrap(), 0, "{}", b.name);
    }
}

#[test]
fn test_insufficient_space_changes_nothing() {
    for b in backends(1_000) {
        let fs = b.fs.as_ref();
        let id = fs.create_new_file().unwrap();
        fs.write_to_new_file(id, &[0u8; 900]).unwrap();

        let err = fs.write_to_new_file(id, &[0u8; 200]).unwrap_err();
        assert_eq!(
            err,
            VfsError::InsufficientSpace {
                requested: 200,
                available: 100
            },
            "{}",
            b.name
        );
        assert_eq!(fs.space_used().unwrap(), 900, "{}", b.name);
        assert_eq!(fs.free_space().unwrap(), 100, "{}", b.name);

        // The upload survives the rejected chunk
        fs.write_to_new_file(id, &[0u8; 100]).unwrap();
        fs.commit_new_file(id, "/full").unwrap();
        assert_eq!(fs.get_size("/full").unwrap(), 1_000);
        assert_eq!(fs.free_space().unwrap(), 0);
    }
}

#[test]
fn test_local_copy_is_charged() {
    let b = local(1_000);
    let fs = b.fs.as_ref();
    put(fs, "/a", &[0u8; 400]).unwrap();

    fs.copy("/a", "/b").unwrap();
    assert_eq!(fs.space_used().unwrap(), 800);

    assert!(matches!(fs.copy("/a", "/c"), Err(VfsError::InsufficientSpace { .. })));
    assert!(!fs.exists("/c").unwrap());
    assert_eq!(fs.space_used().unwrap(), 800);
}

#[test]
fn test_moves_are_free() {
    for b in backends(1_000) {
        let fs = b.fs.as_ref();
        fs.make_dir("/d").unwrap();
        put(fs, "/a", &[0u8; 250]).unwrap();
        fs.move_entry("/a", "/d/a").unwrap();
        assert_eq!(fs.space_used().unwrap(), 250, "{}", b.name);
    }
}
