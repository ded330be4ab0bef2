#![allow(dead_code)]

use std::path::{Path, PathBuf};

use watchrun::config::{ConfigFile, RawConfigFile, RawTask};
use watchrun::types::ReloadPolicy;

/// Builder for configurations, either compiled in memory or rendered to
/// YAML for tests that go through the loader.
pub struct ConfigBuilder {
    raw: RawConfigFile,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            raw: RawConfigFile::default(),
        }
    }

    pub fn command(mut self, command: &str) -> Self {
        self.raw.command = Some(command.to_string());
        self
    }

    pub fn livereload(mut self, addr: &str) -> Self {
        self.raw.livereload = Some(addr.to_string());
        self
    }

    pub fn reload_policy(mut self, policy: ReloadPolicy) -> Self {
        self.raw.reload_policy = policy;
        self
    }

    pub fn task(mut self, task: TaskBuilder) -> Self {
        self.raw.tasks.push(task.task);
        self
    }

    pub fn raw(&self) -> &RawConfigFile {
        &self.raw
    }

    /// Compile against `base`, as if loaded from `base/watchrun.yml`.
    pub fn build_in(self, base: impl AsRef<Path>) -> ConfigFile {
        let base = base.as_ref();
        ConfigFile::compile(self.raw, base.join("watchrun.yml"), base)
    }

    /// Render as a YAML document the loader accepts.
    pub fn to_yaml(&self) -> String {
        let mut out = String::new();
        if let Some(command) = &self.raw.command {
            out.push_str(&format!("command: {}\n", quote(command)));
        }
        if let Some(addr) = &self.raw.livereload {
            out.push_str(&format!("livereload: {}\n", quote(addr)));
        }
        let policy = match self.raw.reload_policy {
            ReloadPolicy::Always => "always",
            ReloadPolicy::OnSuccess => "on_success",
            ReloadPolicy::Never => "never",
        };
        out.push_str(&format!("reload_policy: {policy}\n"));
        out.push_str("tasks:\n");
        for task in &self.raw.tasks {
            match &task.match_pattern {
                Some(pattern) => out.push_str(&format!("- match: {}\n", quote(pattern))),
                None => out.push_str("- commands: []\n"),
            }
            if let Some(ignore) = &task.ignore {
                out.push_str(&format!("  ignore: {}\n", quote(ignore)));
            }
            if !task.ops.is_empty() {
                out.push_str("  ops:\n");
                for op in &task.ops {
                    out.push_str(&format!("  - {}\n", quote(op)));
                }
            }
            if task.match_pattern.is_some() && !task.commands.is_empty() {
                out.push_str("  commands:\n");
                for command in &task.commands {
                    out.push_str(&format!("  - {}\n", quote(command)));
                }
            }
        }
        out
    }

    /// Write [`Self::to_yaml`] to `path` and return it.
    pub fn write_to(&self, path: impl Into<PathBuf>) -> PathBuf {
        let path = path.into();
        std::fs::write(&path, self.to_yaml()).expect("failed to write test config");
        path
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for a single `tasks:` entry.
pub struct TaskBuilder {
    task: RawTask,
}

impl TaskBuilder {
    pub fn matching(pattern: &str) -> Self {
        Self {
            task: RawTask {
                match_pattern: Some(pattern.to_string()),
                ..RawTask::default()
            },
        }
    }

    /// A task with no `match` key at all.
    pub fn unmatched() -> Self {
        Self {
            task: RawTask::default(),
        }
    }

    pub fn ignore(mut self, pattern: &str) -> Self {
        self.task.ignore = Some(pattern.to_string());
        self
    }

    pub fn op(mut self, op: &str) -> Self {
        self.task.ops.push(op.to_string());
        self
    }

    pub fn command(mut self, command: &str) -> Self {
        self.task.commands.push(command.to_string());
        self
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
