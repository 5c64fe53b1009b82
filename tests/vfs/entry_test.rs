/*!
 * Entry Operation Tests
 * make_dir, move, copy, delete, listing and reads on every backend
 */

use pretty_assertions::assert_eq;

use crate::fixtures::{backends, put};
use cloudfs::{FileKind, VfsError};

#[test]
fn test_make_dir_scenario() {
    for b in backends(1_000_000) {
        let fs = b.fs.as_ref();
        assert_eq!(fs.exists("/docs").unwrap(), false, "{}", b.name);

        fs.make_dir("/docs").unwrap();
        assert!(fs.is_dir("/docs").unwrap(), "{}", b.name);
        assert!(matches!(fs.make_dir("/docs"), Err(VfsError::AlreadyExists(_))), "{}", b.name);
        assert!(matches!(fs.make_dir("/no/such"), Err(VfsError::InvalidPath(_))), "{}", b.name);

        put(fs, "/f", b"x").unwrap();
        assert!(matches!(fs.make_dir("/f/sub"), Err(VfsError::InvalidTarget(_))), "{}", b.name);

        fs.delete("/docs").unwrap();
        assert!(!fs.exists("/docs").unwrap(), "{}", b.name);
        assert!(matches!(fs.delete("/docs"), Err(VfsError::InvalidPath(_))), "{}", b.name);
    }
}

#[test]
fn test_listing_and_metadata() {
    for b in backends(1_000_000) {
        let fs = b.fs.as_ref();
        fs.make_dir("/d").unwrap();
        put(fs, "/d/b.txt", b"bbb").unwrap();
        put(fs, "/d/a.txt", b"a").unwrap();
        fs.make_dir("/d/sub").unwrap();

        assert_eq!(fs.list_dir("/d").unwrap(), vec!["a.txt", "b.txt", "sub"], "{}", b.name);

        let content = fs.get_content_metadata("/d").unwrap();
        let summary: Vec<(String, FileKind, u64)> = content
            .iter()
            .map(|m| (m.path.clone(), m.kind, m.size))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("/d/a.txt".to_string(), FileKind::File, 1),
                ("/d/b.txt".to_string(), FileKind::File, 3),
                ("/d/sub".to_string(), FileKind::Directory, 0),
            ],
            "{}",
            b.name
        );

        let meta = fs.get_metadata("/d/b.txt").unwrap();
        assert_eq!(meta.name(), "b.txt");
        assert_eq!(fs.get_size("/d/b.txt").unwrap(), 3);
        assert!(fs.get_modified_datetime("/d/b.txt").is_ok());

        assert!(matches!(fs.list_dir("/d/a.txt"), Err(VfsError::InvalidTarget(_))), "{}", b.name);
        assert!(matches!(fs.get_metadata("/nope"), Err(VfsError::InvalidPath(_))), "{}", b.name);
    }
}

#[test]
fn test_move_semantics() {
    for b in backends(1_000_000) {
        let fs = b.fs.as_ref();
        fs.make_dir("/src").unwrap();
        put(fs, "/src/file", b"payload").unwrap();
        fs.make_dir("/dst").unwrap();

        fs.move_entry("/src", "/dst/moved").unwrap();
        assert!(!fs.exists("/src").unwrap(), "{}", b.name);
        assert_eq!(fs.read("/dst/moved/file", 0, None).unwrap(), b"payload");

        // Nesting a directory inside itself changes nothing
        let err = fs.move_entry("/dst", "/dst/moved/inner").unwrap_err();
        assert!(matches!(err, VfsError::ForbiddenOperation(_)), "{}: {:?}", b.name, err);
        assert_eq!(fs.list_dir("/dst").unwrap(), vec!["moved"]);
        assert_eq!(fs.list_dir("/dst/moved").unwrap(), vec!["file"]);

        assert!(matches!(fs.move_entry("/", "/x"), Err(VfsError::ForbiddenOperation(_))));
        assert!(matches!(fs.move_entry("/ghost", "/x"), Err(VfsError::InvalidPath(_))));
        assert!(matches!(
            fs.move_entry("/dst/moved/file", "/dst/moved"),
            Err(VfsError::AlreadyExists(_))
        ));
    }
}

#[test]
fn test_copy_leaves_source() {
    for b in backends(1_000_000) {
        let fs = b.fs.as_ref();
        fs.make_dir("/tree").unwrap();
        put(fs, "/tree/leaf", b"12345").unwrap();

        fs.copy("/tree", "/tree2").unwrap();
        assert_eq!(fs.read("/tree/leaf", 0, None).unwrap(), b"12345");
        assert_eq!(fs.read("/tree2/leaf", 0, None).unwrap(), b"12345");
        assert!(matches!(fs.copy("/tree", "/tree/again"), Err(VfsError::ForbiddenOperation(_))));
    }
}

#[test]
fn test_ranged_reads() {
    for b in backends(1_000_000) {
        let fs = b.fs.as_ref();
        put(fs, "/r", b"0123456789").unwrap();

        assert_eq!(fs.read("/r", 0, None).unwrap(), b"0123456789", "{}", b.name);
        assert_eq!(fs.read("/r", 3, Some(4)).unwrap(), b"3456", "{}", b.name);
        assert_eq!(fs.read("/r", 8, Some(100)).unwrap(), b"89", "{}", b.name);
        assert!(fs.read("/r", 10, None).unwrap().is_empty(), "{}", b.name);
        assert!(matches!(fs.read("/", 0, None), Err(VfsError::InvalidTarget(_))), "{}", b.name);
    }
}

#[test]
fn test_root_is_protected() {
    for b in backends(1_000_000) {
        let fs = b.fs.as_ref();
        assert!(fs.is_dir("/").unwrap());
        assert!(matches!(fs.delete("/"), Err(VfsError::ForbiddenOperation(_))), "{}", b.name);
        assert!(matches!(fs.make_dir("/"), Err(VfsError::AlreadyExists(_))), "{}", b.name);
    }
}
