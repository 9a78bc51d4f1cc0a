//! Pure POSIX path algebra shared by both runtime implementations (§4.1).
//!
//! Remote runtimes must use this and only this — never host-local
//! `std::path` logic — because the remote filesystem's path semantics are
//! always POSIX regardless of the host this assistant itself runs on.

/// Collapses `.` and `..` components of an already-absolute POSIX path.
/// A `..` at the root is absorbed (cannot go above `/`).
pub fn collapse_dot_dot(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    format!("/{}", out.join("/"))
}

/// Resolves `target` against `base`: if `target` is absolute, normalizes it
/// directly; otherwise joins it onto `base` first.
pub fn normalize(target: &str, base: &str) -> String {
    if target.starts_with('/') {
        collapse_dot_dot(target)
    } else {
        let joined = format!("{}/{}", base.trim_end_matches('/'), target);
        collapse_dot_dot(&joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_target_collapses_dot_segments() {
        assert_eq!(normalize("/a/./b/../c", "/workspace"), "/a/c");
    }

    #[test]
    fn relative_target_resolves_against_base() {
        assert_eq!(normalize("sub/file.rs", "/workspace"), "/workspace/sub/file.rs");
    }

    #[test]
    fn dot_dot_at_root_is_absorbed() {
        assert_eq!(normalize("/../../etc/passwd", "/workspace"), "/etc/passwd");
    }

    #[test]
    fn current_dir_resolves_to_base() {
        assert_eq!(normalize(".", "/workspace"), "/workspace");
    }
}
