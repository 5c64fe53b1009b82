/*!
 * Virtual Paths
 * Resolution and manipulation of slash-separated backend paths
 *
 * A virtual path is always slash-separated, the root is "/", and only the
 * root carries a trailing slash. Resolution never escapes above the root:
 * a ".." at the top level is dropped, not rejected.
 */

pub const ROOT: &str = "/";

/// Resolve `path` against `working_dir` into a normalized absolute path.
///
/// An absolute input ignores the working directory. Each ".." pops one level
/// if any remain, "." and empty segments are skipped.
pub fn resolve(working_dir: &str, path: &str) -> String {
    let mut levels: Vec<&str> = Vec::with_capacity(8);

    let rest = match path.strip_prefix('/') {
        Some(rest) => rest,
        None => {
            levels.extend(working_dir.split('/').filter(|s| !s.is_empty()));
            path
        }
    };

    for segment in rest.split('/') {
        match segment {
            ".." => {
                levels.pop();
            }
            "." | "" => {}
            name => levels.push(name),
        }
    }

    join_levels(&levels)
}

/// Normalize an absolute path (collapses "//", ".", "..")
#[inline]
pub fn normalize(path: &str) -> String {
    resolve(ROOT, path)
}

fn join_levels(levels: &[&str]) -> String {
    if levels.is_empty() {
        return ROOT.to_string();
    }
    let mut out = String::with_capacity(levels.iter().map(|l| l.len() + 1).sum());
    for level in levels {
        out.push('/');
        out.push_str(level);
    }
    out
}

#[inline]
pub fn is_root(path: &str) -> bool {
    path == ROOT
}

/// Parent of a normalized absolute path; `None` for the root
pub fn parent(path: &str) -> Option<&str> {
    if is_root(path) {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Last segment of a normalized absolute path; empty for the root
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}

/// Append one child name to a normalized absolute directory path
pub fn join(dir: &str, name: &str) -> String {
    if is_root(dir) {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// True when `candidate` equals `ancestor` or lies somewhere beneath it.
///
/// Segment-aware: "/ab" is not nested under "/a".
pub fn is_within(ancestor: &str, candidate: &str) -> bool {
    if is_root(ancestor) {
        return true;
    }
    match candidate.strip_prefix(ancestor) {
        Some("") => true,
        Some(rest) => rest.starts_with('/'),
        None => false,
    }
}
