// src/config/mod.rs

//! Configuration loading for watchrun.
//!
//! Responsibilities:
//! - Define the serde-backed data model (`model.rs`).
//! - Load a config file from disk, retrying transient read failures (`loader.rs`).
//! - Compile tasks into rules, tolerating bad entries (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load, load_or_empty, parse_config, resolve_config_path, DEFAULT_CONFIG_FILE};
pub use model::{ConfigFile, RawConfigFile, RawTask};
