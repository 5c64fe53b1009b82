/*!
 * FileSystemView Tests
 * Working directories, relative paths and races with other views
 */

use std::sync::Arc;
use std::thread;

use crate::fixtures::{backends, local, put};
use cloudfs::{FileSystemView, VfsError};

#[test]
fn test_relative_paths_follow_working_dir() {
    for b in backends(1_000_000) {
        let view = FileSystemView::new(b.fs.clone());
        view.make_dir("music").unwrap();
        view.set_working_dir("music").unwrap();
        assert_eq!(view.working_dir(), "/music");

        view.make_dir("albums").unwrap();
        put(b.fs.as_ref(), "/music/albums/track", b"la").unwrap();
        assert_eq!(view.list_dir(None).unwrap(), vec!["albums"], "{}", b.name);
        assert_eq!(view.read("albums/track", 0, None).unwrap(), b"la");
        assert_eq!(view.get_abs_path("../x/./y"), "/x/y");

        view.set_working_dir("..").unwrap();
        assert_eq!(view.working_dir(), "/");
    }
}

#[test]
fn test_set_working_dir_rejections() {
    for b in backends(1_000_000) {
        let view = FileSystemView::new(b.fs.clone());
        put(b.fs.as_ref(), "/file", b"f").unwrap();

        assert!(matches!(view.set_working_dir("/nowhere"), Err(VfsError::InvalidPath(_))), "{}", b.name);
        assert!(matches!(view.set_working_dir("file"), Err(VfsError::InvalidTarget(_))), "{}", b.name);
        assert_eq!(view.working_dir(), "/");
    }
}

#[test]
fn test_views_are_independent() {
    let b = local(1_000_000);
    let first = FileSystemView::new(b.fs.clone());
    first.make_dir("/a").unwrap();
    first.set_working_dir("/a").unwrap();

    let second = first.fresh_view();
    assert_eq!(second.working_dir(), "/");
    assert_eq!(first.working_dir(), "/a");

    // Both share one backend
    second.make_dir("/a/shared").unwrap();
    assert_eq!(first.list_dir(None).unwrap(), vec!["shared"]);
}

#[test]
fn test_staged_write_through_view() {
    for b in backends(1_000_000) {
        let view = FileSystemView::new(b.fs.clone());
        view.make_dir("/up").unwrap();
        view.set_working_dir("/up").unwrap();

        let id = view.create_new_file().unwrap();
        view.write_to_new_file(id, b"b1").unwrap();
        view.write_to_new_file(id, b"b2").unwrap();
        view.commit_new_file(id, "blob").unwrap();
        assert_eq!(b.fs.read("/up/blob", 0, None).unwrap(), b"b1b2", "{}", b.name);
    }
}

#[test]
fn test_concurrent_cd_and_delete_never_dangles() {
    for round in 0..20 {
        let b = local(1_000_000);
        b.fs.make_dir("/target").unwrap();

        let walker = Arc::new(FileSystemView::new(b.fs.clone()));
        let remover = FileSystemView::new(b.fs.clone());

        let cd = {
            let walker = Arc::clone(&walker);
            thread::spawn(move || walker.set_working_dir("/target"))
        };
        let rm = thread::spawn(move || remover.delete("/target"));

        let cd_result = cd.join().unwrap();
        rm.join().unwrap().unwrap();

        match cd_result {
            // The switch happened first; the directory is gone now
            Ok(()) => assert_eq!(walker.working_dir(), "/target", "round {}", round),
            // The delete happened first; the view never moved
            Err(e) => {
                assert!(matches!(e, VfsError::InvalidPath(_)), "round {}: {:?}", round, e);
                assert_eq!(walker.working_dir(), "/");
            }
        }
        assert!(!b.fs.exists("/target").unwrap());
    }
}
