//! Catalog path helpers
//!
//! Catalog paths are absolute, slash-separated and the repository root is
//! written as `/`. When deriving segments the root acts as an empty prefix so
//! concatenation never produces `//`.

/// Path of the repository root
pub const ROOT_PATH: &str = "/";

/// Returns true if `path` equals `prefix` or lies below it.
///
/// Comparison is per component: `/ab` is not within `/a`.
pub fn is_within(path: &str, prefix: &str) -> bool {
    if prefix == ROOT_PATH {
        return path.starts_with('/');
    }
    match path.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest.starts_with('/'),
        None => false,
    }
}

/// Returns true if `path` lies strictly below `ancestor`.
pub fn is_strict_descendant(path: &str, ancestor: &str) -> bool {
    path != ancestor && is_within(path, ancestor)
}

/// Ordered segments strictly between `parent` and `child`, ending with `child`.
///
/// `segments("/", "/a/b/c")` is `["/a", "/a/b", "/a/b/c"]`. A child that does
/// not lie below the parent yields just the child itself, so the result is
/// never empty.
pub fn segments(parent: &str, child: &str) -> Vec<String> {
    let base = if parent == ROOT_PATH { "" } else { parent };

    if !is_strict_descendant(child, parent) {
        return vec![child.to_string()];
    }

    let relative = child[base.len()..].trim_start_matches('/');
    let mut current = base.to_string();
    let segments: Vec<String> = relative
        .split('/')
        .filter(|part| !part.is_empty())
        .map(|part| {
            current.push('/');
            current.push_str(part);
            current.clone()
        })
        .collect();

    if segments.is_empty() {
        vec![child.to_string()]
    } else {
        segments
    }
}

/// Normalise a user-supplied path: leading `/`, no trailing `/`.
pub fn normalize(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        ROOT_PATH.to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments_from_root() {
        assert_eq!(segments("/", "/a/b/c"), vec!["/a", "/a/b", "/a/b/c"]);
        assert_eq!(segments("/", "/x"), vec!["/x"]);
    }

    #[test]
    fn test_segments_from_nested_parent() {
        assert_eq!(segments("/a", "/a/b/c"), vec!["/a/b", "/a/b/c"]);
    }

    #[test]
    fn test_segments_unrelated_child() {
        assert_eq!(segments("/a", "/ab/c"), vec!["/ab/c"]);
        assert_eq!(segments("/a", "/a"), vec!["/a"]);
    }

    #[test]
    fn test_segments_never_empty() {
        assert_eq!(segments("/a", "/a/"), vec!["/a/"]);
        assert_eq!(segments("/a", "/a//"), vec!["/a//"]);
        assert_eq!(segments("/a", "/a//b"), vec!["/a/b"]);
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("/a/b", "/a"));
        assert!(is_within("/a", "/a"));
        assert!(!is_within("/ab", "/a"));
        assert!(is_within("/anything", "/"));
        assert!(is_strict_descendant("/a/b", "/a"));
        assert!(!is_strict_descendant("/a", "/a"));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("lib/var"), "/lib/var");
        assert_eq!(normalize("/lib/var/"), "/lib/var");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("/a/b//"), "/a/b");
    }
}
