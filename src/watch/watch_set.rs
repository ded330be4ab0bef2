// src/watch/watch_set.rs

//! Computation of the directories handed to the event source.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::fs::FileSystem;
use crate::watch::path_utils::to_slash;
use crate::watch::Rule;

/// Compute the set of directories to watch.
///
/// The set always holds `root` and `config_dir`. The tree under `root` is
/// then walked once, and the parent directory of every regular file that
/// any rule's match pattern accepts is added (ignore patterns and
/// operation filters are not consulted).
///
/// Symbolic links to directories are not followed, so a link back to an
/// ancestor cannot make the walk loop.
///
/// This is a snapshot: directories created after the walk are only picked
/// up by the next reload.
pub fn compute_watch_set(
    fs: &dyn FileSystem,
    root: &Path,
    config_dir: &Path,
    rules: &[Arc<Rule>],
) -> BTreeSet<PathBuf> {
    let mut dirs = BTreeSet::new();
    dirs.insert(root.to_path_buf());
    dirs.insert(config_dir.to_path_buf());

    let active: Vec<&Arc<Rule>> = rules.iter().filter(|r| r.is_active()).collect();
    if active.is_empty() {
        return dirs;
    }

    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match fs.read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(?dir, error = %err, "skipping unreadable directory");
                continue;
            }
        };

        for path in entries {
            if fs.is_dir(&path) {
                if fs.is_symlink(&path) {
                    debug!(?path, "not following directory symlink");
                    continue;
                }
                stack.push(path);
            } else if fs.is_file(&path) && !dirs.contains(&dir) {
                let candidate = to_slash(&path);
                if active.iter().any(|r| r.may_match(&candidate)) {
                    debug!(?dir, file = %candidate, "directory added to watch set");
                    dirs.insert(dir.clone());
                }
            }
        }
    }

    dirs
}
