/*!
 * Tree Property Tests
 * Random operation sequences keep every backend's tree consistent
 */

use proptest::prelude::*;

use crate::fixtures::{backends, put};
use cloudfs::FileSystem;

const NAMES: &[&str] = &["a", "b", "c"];

#[derive(Debug, Clone)]
enum Op {
    MakeDir(String),
    Put(String, usize),
    Delete(String),
    Move(String, String),
    Copy(String, String),
}

fn path() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(NAMES), 1..4).prop_map(|parts| format!("/{}", parts.join("/")))
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        path().prop_map(Op::MakeDir),
        (path(), 0usize..64).prop_map(|(p, n)| Op::Put(p, n)),
        path().prop_map(Op::Delete),
        (path(), path()).prop_map(|(a, b)| Op::Move(a, b)),
        (path(), path()).prop_map(|(a, b)| Op::Copy(a, b)),
    ]
}

/// Every path the generator can name, plus the root
fn all_paths() -> Vec<String> {
    let mut out = vec!["/".to_string()];
    let mut frontier = vec![String::new()];
    for _ in 0..3 {
        let mut next = Vec::new();
        for prefix in &frontier {
            for name in NAMES {
                let p = format!("{}/{}", prefix, name);
                out.push(p.clone());
                next.push(p);
            }
        }
        frontier = next;
    }
    out
}

fn apply(fs: &dyn FileSystem, op: &Op) {
    // Rejections are expected; only consistency matters here
    let _ = match op {
        Op::MakeDir(p) => fs.make_dir(p),
        Op::Put(p, n) => put(fs, p, &vec![b'x'; *n]),
        Op::Delete(p) => fs.delete(p),
        Op::Move(a, b) => fs.move_entry(a, b),
        Op::Copy(a, b) => fs.copy(a, b),
    };
}

/// Total size of all files, found by walking the tree
fn walked_size(fs: &dyn FileSystem, dir: &str) -> u64 {
    fs.get_content_metadata(dir)
        .unwrap()
        .iter()
        .map(|m| if m.is_dir() { walked_size(fs, &m.path) } else { m.size })
        .sum()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_tree_stays_consistent(ops in prop::collection::vec(op(), 1..24)) {
        for b in backends(1_000_000) {
            let fs = b.fs.as_ref();
            for op in &ops {
                apply(fs, op);
            }

            for p in all_paths() {
                let exists = fs.exists(&p).unwrap();
                if exists {
                    let is_dir = fs.is_dir(&p).unwrap();
                    let is_file = fs.is_file(&p).unwrap();
                    prop_assert!(is_dir != is_file, "{}: {} is both or neither", b.name, p);

                    let listed = match fs.get_metadata(&p).unwrap().kind {
                        cloudfs::FileKind::Directory => fs.list_dir(&p).is_ok(),
                        cloudfs::FileKind::File => fs.list_dir(&p).is_err(),
                    };
                    prop_assert!(listed, "{}: listing disagrees with kind at {}", b.name, p);
                }
            }

            prop_assert_eq!(fs.space_used().unwrap(), walked_size(fs, "/"), "{}", b.name);
            prop_assert_eq!(fs.space_used().unwrap() + fs.free_space().unwrap(), 1_000_000);
        }
    }
}
