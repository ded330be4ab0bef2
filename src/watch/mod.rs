// src/watch/mod.rs

//! File watching and path matching.
//!
//! This module is responsible for:
//! - Compiling glob-like `match` / `ignore` patterns (`patterns`).
//! - Holding per-task rules with their single-flight flag (`rule`).
//! - Computing which directories need to be observed (`watch_set`).
//! - Wiring up a cross-platform filesystem watcher (`notify`).
//!
//! It does **not** run anything; it only turns filesystem changes into
//! [`FsEvent`]s.

pub mod event;
pub mod path_utils;
pub mod patterns;
pub mod rule;
pub mod watch_set;
pub mod watcher;

pub use event::FsEvent;
pub use patterns::Pattern;
pub use rule::{Rule, VIRTUAL_EVENT_PREFIX};
pub use watch_set::compute_watch_set;
pub use watcher::{spawn_watcher, WatcherHandle};
