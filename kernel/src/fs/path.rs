//! Path utilities. Paths are '/'-separated; a trailing '/' is tolerated.

use crate::Kernel;

/// The trailing component of `path`.
pub fn file_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(at) => &trimmed[at + 1..],
        None => trimmed,
    }
}

/// Everything up to and including the last '/'.
pub fn parent_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(at) => &path[..at + 1],
        None => path,
    }
}

/// Resolve `path` against the current thread's directory when it is not
/// already absolute.
pub fn absolute(kernel: &Kernel, path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        let cwd = kernel.cpu.current().path();
        format!("{}/{}", cwd.trim_end_matches('/'), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_takes_last_component() {
        assert_eq!(file_name("/a"), "a");
        assert_eq!(file_name("/d/x"), "x");
        assert_eq!(file_name("/d/x/"), "x");
        assert_eq!(file_name("plain"), "plain");
    }

    #[test]
    fn parent_keeps_trailing_slash() {
        assert_eq!(parent_path("/a"), "/");
        assert_eq!(parent_path("/d/x"), "/d/");
        assert_eq!(parent_path("/d/x/"), "/d/");
    }
}
