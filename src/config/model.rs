// src/config/model.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::types::ReloadPolicy;
use crate::watch::Rule;

/// Top-level configuration as read from disk.
///
/// ```yaml
/// command: ./server --port 8080
/// livereload: :35729
/// tasks:
/// - match: './assets/*.js'
///   commands:
///   - uglifyjs -o ${WATCHRUN_TARGET_DIR}/min/${WATCHRUN_TARGET_NAME}.min.js $WATCHRUN_TARGET_FILE
/// - match: '**/*.go'
///   ignore: 'vendor/**/*.go'
///   ops: [write, create]
///   commands:
///   - go build
///   - :restart
/// ```
///
/// Every key is optional; unknown keys are ignored.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    /// Shell command line of the managed (supervised) process.
    #[serde(default)]
    pub command: Option<String>,

    /// Listen address of the LiveReload side-channel (e.g. `:35729`).
    #[serde(default)]
    pub livereload: Option<String>,

    /// When pipelines poke the LiveReload side-channel.
    #[serde(default)]
    pub reload_policy: ReloadPolicy,

    #[serde(default)]
    pub tasks: Vec<RawTask>,
}

/// One entry of `tasks:`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawTask {
    /// Glob (or `%regex`) selecting paths; `:name` makes the task reachable
    /// by name through `:event`. A task without it is inactive.
    #[serde(default, rename = "match")]
    pub match_pattern: Option<String>,

    #[serde(default)]
    pub ignore: Option<String>,

    #[serde(default)]
    pub commands: Vec<String>,

    /// Case-insensitive operation names (`create`, `write`, `remove`,
    /// `rename`, `chmod`). Empty means every operation.
    #[serde(default)]
    pub ops: Vec<String>,
}

/// A loaded, compiled configuration. Replaced wholesale on every reload.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
    command: Option<String>,
    livereload: Option<String>,
    reload_policy: ReloadPolicy,
    rules: Vec<Arc<Rule>>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        path: PathBuf,
        command: Option<String>,
        livereload: Option<String>,
        reload_policy: ReloadPolicy,
        rules: Vec<Arc<Rule>>,
    ) -> Self {
        Self {
            path,
            command,
            livereload,
            reload_policy,
            rules,
        }
    }

    /// An empty configuration, used when loading fails so that the config
    /// file itself is still watched and a fix triggers a reload.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self::new_unchecked(path.into(), None, None, ReloadPolicy::default(), Vec::new())
    }

    /// Absolute path of the file this configuration came from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory containing the configuration file.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or(&self.path)
    }

    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    /// Normalised socket address for the LiveReload listener.
    pub fn livereload(&self) -> Option<&str> {
        self.livereload.as_deref()
    }

    pub fn reload_policy(&self) -> ReloadPolicy {
        self.reload_policy
    }

    /// Rules in configuration order, inactive ones included.
    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }
}
