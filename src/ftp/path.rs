//! Pure helpers over remote server paths, parameterised by [`PathType`].
//!
//! Paths are opaque byte strings to the rest of the engine; every place
//! that needs to compare, split, or join paths goes through here so the
//! path-type's separator, case rule and root syntax stay in one place.

use crate::ftp::types::PathType;
use std::cmp::Ordering;

/// Primary path separator for a path type. VMS/MVS-style systems don't use
/// a `/`-like separator at all; we fall back to `/` there since the core
/// only needs it for opaque join/split, not for talking to the server.
pub fn separator(path_type: PathType) -> char {
    match path_type {
        PathType::Windows | PathType::Os2 => '\\',
        PathType::Netware => '/',
        PathType::Unix
        | PathType::Openvms
        | PathType::Mvs
        | PathType::IbmZVm
        | PathType::As400
        | PathType::Tandem
        | PathType::Unknown
        | PathType::Empty => '/',
    }
}

/// Whether names on this path type are case-sensitive. Mirrors the
/// source's `FTPIsCaseSensitive`.
pub fn is_case_sensitive(path_type: PathType) -> bool {
    matches!(path_type, PathType::Unix | PathType::Netware)
}

/// Root path literal for a path type.
pub fn root(path_type: PathType) -> &'static str {
    match path_type {
        PathType::Windows | PathType::Os2 => "\\",
        PathType::Empty => "",
        _ => "/",
    }
}

/// Case-fold a name according to the path type's case rule, for use as a
/// comparison/sort key. Does not change the name that gets sent on the
/// wire.
pub fn fold_case(path_type: PathType, name: &str) -> String {
    if is_case_sensitive(path_type) {
        name.to_string()
    } else {
        name.to_lowercase()
    }
}

/// Compare two names per the path type's case rule (used for the upload
/// listing cache's sorted item vector, §4.5).
pub fn compare_names(path_type: PathType, a: &str, b: &str) -> Ordering {
    fold_case(path_type, a).cmp(&fold_case(path_type, b))
}

/// Whether two paths name the same directory under this path type's case
/// and separator rules.
pub fn paths_equal(path_type: PathType, a: &str, b: &str) -> bool {
    normalize(path_type, a) == normalize(path_type, b)
}

/// Normalise a path: collapse repeated separators, drop a trailing
/// separator (except for the root itself), and fold case for comparison.
pub fn normalize(path_type: PathType, path: &str) -> String {
    let sep = separator(path_type);
    let collapsed: String = path
        .split(sep)
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join(&sep.to_string());
    let with_root = if path.starts_with(sep) {
        format!("{}{}", sep, collapsed)
    } else {
        collapsed
    };
    let with_root = if with_root.is_empty() {
        root(path_type).to_string()
    } else {
        with_root
    };
    fold_case(path_type, &with_root)
}

/// Join a directory and a child name using this path type's separator.
pub fn join(path_type: PathType, dir: &str, name: &str) -> String {
    let sep = separator(path_type);
    if dir.is_empty() {
        return name.to_string();
    }
    if dir.ends_with(sep) {
        format!("{}{}", dir, name)
    } else {
        format!("{}{}{}", dir, sep, name)
    }
}

/// Split a path into (parent, last-component). Returns `None` for the
/// root path.
pub fn split_parent(path_type: PathType, path: &str) -> Option<(String, String)> {
    let sep = separator(path_type);
    let trimmed = path.trim_end_matches(sep);
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.rfind(sep) {
        Some(idx) => {
            let parent = if idx == 0 {
                sep.to_string()
            } else {
                trimmed[..idx].to_string()
            };
            Some((parent, trimmed[idx + 1..].to_string()))
        }
        None => Some((String::new(), trimmed.to_string())),
    }
}

/// Whether `path` denotes the root of this path type.
pub fn is_root(path_type: PathType, path: &str) -> bool {
    let sep = separator(path_type);
    path.is_empty() || path == root(path_type) || path.chars().all(|c| c == sep)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_case_sensitive() {
        assert!(is_case_sensitive(PathType::Unix));
        assert!(!paths_equal(PathType::Unix, "/Foo", "/foo"));
    }

    #[test]
    fn windows_case_insensitive() {
        assert!(!is_case_sensitive(PathType::Windows));
        assert!(paths_equal(PathType::Windows, "C:\\Foo", "C:\\foo"));
    }

    #[test]
    fn join_unix() {
        assert_eq!(join(PathType::Unix, "/home/user", "file.txt"), "/home/user/file.txt");
        assert_eq!(join(PathType::Unix, "/", "etc"), "/etc");
    }

    #[test]
    fn split_parent_unix() {
        assert_eq!(
            split_parent(PathType::Unix, "/home/user/file.txt"),
            Some(("/home/user".to_string(), "file.txt".to_string()))
        );
        assert_eq!(split_parent(PathType::Unix, "/"), None);
    }

    #[test]
    fn compare_names_case_insensitive_windows() {
        assert_eq!(
            compare_names(PathType::Windows, "Apple", "banana"),
            Ordering::Less
        );
    }
}
