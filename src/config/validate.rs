// src/config/validate.rs

//! Turn a [`RawConfigFile`] into a compiled [`ConfigFile`].
//!
//! Nothing in here fails the whole load: a task with a bad pattern becomes an
//! inactive rule, unknown operation names are dropped, and an unusable
//! `livereload` address disables the side-channel. Each of these is logged.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::model::{ConfigFile, RawConfigFile, RawTask};
use crate::exec::Command;
use crate::types::{Op, OpMask};
use crate::watch::Rule;

impl ConfigFile {
    /// Compile `raw` (loaded from `path`), resolving relative patterns
    /// against `base`.
    pub fn compile(raw: RawConfigFile, path: PathBuf, base: &Path) -> Self {
        let rules = raw
            .tasks
            .iter()
            .enumerate()
            .map(|(index, task)| Arc::new(compile_task(index, task, base)))
            .collect::<Vec<_>>();

        let active = rules.iter().filter(|r| r.is_active()).count();
        debug!(total = rules.len(), active, "compiled rules");

        let command = raw.command.filter(|c| !c.trim().is_empty());
        let livereload = raw.livereload.as_deref().and_then(normalize_listen_addr);

        ConfigFile::new_unchecked(path, command, livereload, raw.reload_policy, rules)
    }
}

fn compile_task(index: usize, task: &RawTask, base: &Path) -> Rule {
    let match_source = task.match_pattern.clone().unwrap_or_default();
    if match_source.is_empty() {
        warn!(task = index, "task has no `match`; it will never run");
    }

    let ops = parse_ops(index, &task.ops);
    let commands = task.commands.iter().map(|c| Command::classify(c)).collect();

    Rule::new(match_source, task.ignore.clone(), ops, commands, base)
}

/// Parse operation names, logging and skipping unknown ones.
pub fn parse_ops(index: usize, names: &[String]) -> OpMask {
    let mut mask = OpMask::EMPTY;
    for name in names {
        match name.parse::<Op>() {
            Ok(op) => mask |= op,
            Err(err) => warn!(task = index, error = %err, "ignoring operation"),
        }
    }
    mask
}

/// Accept `host:port`, `:port` (all interfaces) or a bare port.
pub fn normalize_listen_addr(addr: &str) -> Option<String> {
    let addr = addr.trim();
    if addr.is_empty() {
        return None;
    }

    let candidate = if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else if addr.chars().all(|c| c.is_ascii_digit()) {
        format!("0.0.0.0:{addr}")
    } else if addr.starts_with("localhost:") {
        addr.replacen("localhost", "127.0.0.1", 1)
    } else {
        addr.to_string()
    };

    match candidate.parse::<SocketAddr>() {
        Ok(parsed) => Some(parsed.to_string()),
        Err(err) => {
            warn!(address = %addr, error = %err, "invalid livereload address; side-channel disabled");
            None
        }
    }
}
