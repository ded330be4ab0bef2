// src/watch/watcher.rs

use std::collections::BTreeSet;
use std::path::PathBuf;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::EngineEvent;
use crate::errors::Result;
use crate::watch::event::{ops_from_kind, FsEvent};
use crate::watch::path_utils::to_slash;

/// Handle for the filesystem watcher.
///
/// This exists mainly so the underlying `RecommendedWatcher` is kept alive for
/// as long as needed. Dropping this handle will stop file watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
    dirs: BTreeSet<PathBuf>,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle")
            .field("dirs", &self.dirs.len())
            .finish()
    }
}

impl WatcherHandle {
    /// Directories that were successfully subscribed.
    pub fn dirs(&self) -> &BTreeSet<PathBuf> {
        &self.dirs
    }
}

/// Spawn a filesystem watcher observing each directory in `dirs`
/// (non-recursively) and forwarding every change as
/// [`EngineEvent::Fs`] on `events_tx`. Watch errors are forwarded as
/// [`EngineEvent::WatchError`].
///
/// A directory that cannot be watched (e.g. removed since the walk) is
/// logged and skipped.
pub fn spawn_watcher(
    dirs: &BTreeSet<PathBuf>,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
) -> Result<WatcherHandle> {
    // Closure called synchronously by notify whenever an event arrives.
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let ops = ops_from_kind(&event.kind);
                if ops.is_empty() {
                    return;
                }
                for path in &event.paths {
                    let _ = events_tx.send(EngineEvent::Fs(FsEvent::new(to_slash(path), ops)));
                }
            }
            Err(err) => {
                let _ = events_tx.send(EngineEvent::WatchError(err.to_string()));
            }
        },
        Config::default(),
    )?;

    let mut watched = BTreeSet::new();
    for dir in dirs {
        match watcher.watch(dir, RecursiveMode::NonRecursive) {
            Ok(()) => {
                debug!(?dir, "watching directory");
                watched.insert(dir.clone());
            }
            Err(err) => warn!(?dir, error = %err, "cannot watch directory"),
        }
    }

    info!(dirs = watched.len(), "file watcher started");

    Ok(WatcherHandle {
        _inner: watcher,
        dirs: watched,
    })
}
