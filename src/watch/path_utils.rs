// src/watch/path_utils.rs

//! Utility functions for path handling in the watcher.

use std::path::Path;

/// Convert a path into a string with forward slashes.
pub fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Resolve `pattern` against `base` (when relative) and clean it up
/// lexically: `.` segments and duplicate separators are dropped and `..`
/// pops the previous segment.
///
/// No filesystem access happens here; `pattern` may contain wildcards.
pub fn absolutize(pattern: &str, base: &Path) -> String {
    let pattern = pattern.replace('\\', "/");
    let joined = if Path::new(&pattern).is_absolute() || pattern.starts_with('/') {
        pattern
    } else {
        format!("{}/{}", to_slash(base).trim_end_matches('/'), pattern)
    };
    clean(&joined)
}

fn clean(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() && !rooted {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }
    let body = segments.join("/");
    if rooted { format!("/{body}") } else { body }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_patterns_are_joined_to_base() {
        let base = Path::new("/work/project");
        assert_eq!(absolutize("src/**/*.rs", base), "/work/project/src/**/*.rs");
        assert_eq!(absolutize("./a/../b.txt", base), "/work/project/b.txt");
        assert_eq!(absolutize("/etc/hosts", base), "/etc/hosts");
    }

    #[test]
    fn clean_collapses_separators() {
        assert_eq!(clean("/a//b/./c/"), "/a/b/c");
        assert_eq!(clean("/.."), "/");
    }
}
