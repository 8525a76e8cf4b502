//! POSIX remote-path helpers.
//!
//! Remote paths always use `/`, whatever the local platform separator is.

/// Appends `rel` to `base`, skipping empty and `.` segments.
///
/// A leading `/` on `rel` does not reset the result: `join("/a", "/b")`
/// is `/a/b`.
pub fn join(base: &str, rel: &str) -> String {
    let absolute = base.starts_with('/');
    let body = base
        .split('/')
        .chain(rel.split('/'))
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/");

    if absolute {
        format!("/{body}")
    } else if body.is_empty() {
        ".".into()
    } else {
        body
    }
}

/// Returns the last element of `path`, ignoring trailing slashes.
pub fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return if path.starts_with('/') { "/" } else { "." };
    }
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Resolves `.` and `..` in an absolute path.
///
/// Returns `None` when `..` climbs above `/`, or when `path` is relative.
pub fn normalize(path: &str) -> Option<String> {
    if !path.starts_with('/') {
        return None;
    }

    let mut stack: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                stack.pop()?;
            }
            s => stack.push(s),
        }
    }
    Some(format!("/{}", stack.join("/")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_appends_segments() {
        assert_eq!(join("/home/user", "docs"), "/home/user/docs");
        assert_eq!(join("/home/user/", "/docs/a.txt"), "/home/user/docs/a.txt");
        assert_eq!(join("/", "a"), "/a");
        assert_eq!(join("/srv", ""), "/srv");
    }

    #[test]
    fn join_relative_base() {
        assert_eq!(join("", "a/b"), "a/b");
        assert_eq!(join("x", "./y"), "x/y");
        assert_eq!(join("", ""), ".");
    }

    #[test]
    fn base_name_of_paths() {
        assert_eq!(base_name("/home/user/file.txt"), "file.txt");
        assert_eq!(base_name("/home/user/dir/"), "dir");
        assert_eq!(base_name("plain"), "plain");
        assert_eq!(base_name("/"), "/");
        assert_eq!(base_name(""), ".");
    }

    #[test]
    fn normalize_resolves_dots() {
        assert_eq!(normalize("/a/./b/../c").as_deref(), Some("/a/c"));
        assert_eq!(normalize("/").as_deref(), Some("/"));
        assert_eq!(normalize("//a//b/").as_deref(), Some("/a/b"));
    }

    #[test]
    fn normalize_rejects_escape_and_relative() {
        assert!(normalize("/..").is_none());
        assert!(normalize("/a/../../b").is_none());
        assert!(normalize("a/b").is_none());
    }
}
