/*!
 * Path Resolution Tests
 */

use cloudfs::vfs::paths::{is_within, normalize, parent, resolve};
use proptest::prelude::*;

#[test]
fn test_resolution_examples() {
    assert_eq!(resolve("/fun/brine", "../../etc"), "/etc");
    assert_eq!(resolve("/", "../../x"), "/x");
    assert_eq!(resolve("/a/b", "c/./d"), "/a/b/c/d");
    assert_eq!(resolve("/a/b", "/z//y/"), "/z/y");
    assert_eq!(resolve("/a", ""), "/a");
    assert_eq!(normalize("/a/b/.."), "/a");
}

#[test]
fn test_parent_and_nesting() {
    assert_eq!(parent("/a/b"), Some("/a"));
    assert_eq!(parent("/a"), Some("/"));
    assert_eq!(parent("/"), None);

    assert!(is_within("/a", "/a/b"));
    assert!(is_within("/a", "/a"));
    assert!(!is_within("/a", "/ab"));
    assert!(is_within("/", "/anything"));
}

fn segment() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(".".to_string()),
        Just("..".to_string()),
        Just(String::new()),
        "[a-z]{1,4}",
    ]
}

fn raw_path() -> impl Strategy<Value = String> {
    (any::<bool>(), prop::collection::vec(segment(), 0..8)).prop_map(|(absolute, parts)| {
        let joined = parts.join("/");
        if absolute {
            format!("/{}", joined)
        } else {
            joined
        }
    })
}

proptest! {
    #[test]
    fn prop_resolved_paths_are_canonical(wd in raw_path(), path in raw_path()) {
        let wd = normalize(&wd);
        let abs = resolve(&wd, &path);

        prop_assert!(abs.starts_with('/'));
        prop_assert!(!abs.contains("//"));
        prop_assert!(abs == "/" || !abs.ends_with('/'));
        for part in abs.split('/').skip(1) {
            prop_assert!(part != "." && part != "..");
        }
        prop_assert_eq!(normalize(&abs), abs.clone());
    }

    #[test]
    fn prop_absolute_paths_ignore_working_dir(a in raw_path(), b in raw_path(), path in raw_path()) {
        let absolute = format!("/{}", path);
        prop_assert_eq!(resolve(&normalize(&a), &absolute), resolve(&normalize(&b), &absolute));
    }
}
