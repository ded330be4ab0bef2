// src/config/loader.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, WatchrunError};
use crate::fs::FileSystem;
use crate::watch::path_utils::absolutize;

/// Conventional configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "watchrun.yml";

/// How many times a read is attempted before the load fails.
pub const READ_ATTEMPTS: usize = 3;

/// Pause between read attempts; editors often replace the file in two steps.
pub const READ_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Resolve `path` to an absolute, slash-normalised path (no symlink
/// resolution, the file may not exist yet).
pub fn resolve_config_path(path: impl AsRef<Path>) -> Result<PathBuf> {
    let base = std::env::current_dir()?;
    Ok(PathBuf::from(absolutize(&path.as_ref().to_string_lossy(), &base)))
}

/// Parse file contents. `.toml` files are TOML; everything else is YAML
/// (which also covers JSON).
pub fn parse_config(path: &Path, contents: &str) -> Result<RawConfigFile> {
    if contents.trim().is_empty() {
        return Ok(RawConfigFile::default());
    }

    let is_toml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"));

    let raw = if is_toml {
        toml::from_str(contents)?
    } else {
        serde_yaml::from_str(contents)?
    };
    Ok(raw)
}

/// Read `path` with a bounded retry loop for transient failures.
pub async fn read_with_retry(fs: &dyn FileSystem, path: &Path) -> Result<String> {
    let mut last_err = None;
    for attempt in 1..=READ_ATTEMPTS {
        match fs.read_to_string(path) {
            Ok(contents) => return Ok(contents),
            Err(err) => {
                debug!(?path, attempt, error = %err, "config read failed");
                last_err = Some(err);
                if attempt < READ_ATTEMPTS {
                    tokio::time::sleep(READ_RETRY_DELAY).await;
                }
            }
        }
    }

    let err = last_err.map(|e| e.to_string()).unwrap_or_default();
    Err(WatchrunError::ConfigError(format!(
        "could not read {path:?} after {READ_ATTEMPTS} attempts: {err}"
    )))
}

/// Load and compile the configuration at `path` (already absolute),
/// resolving relative patterns against `base`.
pub async fn load(fs: &dyn FileSystem, path: &Path, base: &Path) -> Result<ConfigFile> {
    let contents = read_with_retry(fs, path).await?;
    let raw = parse_config(path, &contents)?;
    Ok(ConfigFile::compile(raw, path.to_path_buf(), base))
}

/// Like [`load`], but a failure is logged and yields an empty configuration
/// for `path`, so the caller can keep watching the file.
pub async fn load_or_empty(fs: &dyn FileSystem, path: &Path, base: &Path) -> ConfigFile {
    match load(fs, path, base).await {
        Ok(cfg) => cfg,
        Err(err) => {
            warn!(?path, error = %err, "failed to load configuration");
            ConfigFile::empty(path)
        }
    }
}
