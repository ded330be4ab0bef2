// src/engine/mod.rs

//! Orchestration engine for watchrun.
//!
//! This module ties together:
//! - the event dispatcher (rule matching + single-flight admission)
//! - the active-task counter shared with the restart supervisor
//! - the main runtime loop that reacts to:
//!   - filesystem events
//!   - virtual events synthesised by `:event`
//!   - reload / shutdown requests
//!
//! Dispatching is implemented in [`dispatcher`]; the load/watch/reload loop
//! in [`runtime`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::watch::FsEvent;

pub mod dispatcher;
pub mod runtime;

pub use dispatcher::Dispatcher;
pub use runtime::{Runtime, RuntimeOptions};

/// Events flowing into the runtime from the watcher, pipelines and signals.
#[derive(Debug)]
pub enum EngineEvent {
    /// A filesystem change reported by the event source.
    Fs(FsEvent),
    /// A virtual event (`:event NAME`). `done` fires once every pipeline
    /// admitted for it has finished.
    Virtual {
        name: String,
        done: Option<oneshot::Sender<()>>,
    },
    /// Non-fatal error from the event source.
    WatchError(String),
    /// End the current watch loop and reload the configuration.
    ReloadRequested,
    /// Orderly shutdown (Ctrl-C or `:exit`).
    ShutdownRequested,
}

/// Number of rule pipelines currently executing.
///
/// Cloning shares the counter. The restart supervisor polls it and only
/// cycles the managed process while it reads zero.
#[derive(Debug, Clone, Default)]
pub struct ActiveTasks(Arc<AtomicUsize>);

impl ActiveTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn increment(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn decrement(&self) {
        let prev = self.0.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(prev > 0, "active task counter underflow");
    }

    /// Hold the counter up for the lifetime of the returned guard. Useful to
    /// keep the supervisor gated from outside a pipeline.
    pub fn hold(&self) -> ActiveTaskGuard {
        self.increment();
        ActiveTaskGuard(self.clone())
    }
}

/// Decrements the counter on drop. See [`ActiveTasks::hold`].
#[derive(Debug)]
pub struct ActiveTaskGuard(ActiveTasks);

impl Drop for ActiveTaskGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}
