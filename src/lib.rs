// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod livereload;
pub mod logging;
pub mod types;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, load_or_empty, resolve_config_path};
use crate::engine::{ActiveTasks, EngineEvent, Runtime, RuntimeOptions};
use crate::exec::{ShellLauncher, ShellRunner, Supervisor, SupervisorOptions};
use crate::fs::{FileSystem, RealFileSystem};
use crate::watch::compute_watch_set;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config path resolution
/// - the restart supervisor (its own task)
/// - the load / watch / dispatch runtime
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let root = std::env::current_dir()?;
    let config_path = resolve_config_path(&args.config)?;
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);

    if args.dry_run {
        let cfg = load_or_empty(fs.as_ref(), &config_path, &root).await;
        print_dry_run(fs.as_ref(), &root, &cfg, args.command_line());
        return Ok(());
    }

    let active = ActiveTasks::new();

    // The supervisor starts idle; the runtime hands it the effective command
    // on every load.
    let (supervisor, supervisor_handle) = Supervisor::new(
        None,
        Arc::new(ShellLauncher),
        active.clone(),
        SupervisorOptions::default(),
    );
    let supervisor_task = tokio::spawn(supervisor.run());

    let mut options = RuntimeOptions::new(root, config_path);
    options.command_override = args.command_line();

    let runtime = Runtime::new(options, fs, Arc::new(ShellRunner), active)
        .with_supervisor(supervisor_handle.clone());

    // Ctrl-C → graceful shutdown.
    {
        let tx = runtime.sender();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("interrupt received");
            let _ = tx.send(EngineEvent::ShutdownRequested);
        });
    }

    let result = runtime.run().await;

    supervisor_handle.shutdown();
    if let Err(err) = supervisor_task.await {
        warn!(error = %err, "supervisor task ended abnormally");
    }
    debug!("watchrun finished");
    result.map_err(Into::into)
}

/// Print the compiled configuration and the directories that would be
/// watched.
fn print_dry_run(fs: &dyn FileSystem, root: &Path, cfg: &ConfigFile, command_override: Option<String>) {
    println!("watchrun dry-run");
    println!("  config = {}", cfg.path().display());

    let command = command_override.or_else(|| cfg.command().map(str::to_string));
    if let Some(command) = command {
        println!("  command = {command}");
    }
    if let Some(addr) = cfg.livereload() {
        println!("  livereload = {addr}");
    }
    println!("  reload_policy = {:?}", cfg.reload_policy());
    println!();

    println!("rules ({}):", cfg.rules().len());
    for rule in cfg.rules() {
        let state = if rule.is_active() { "" } else { " (inactive)" };
        println!("  - match: {}{state}", rule.match_source());
        if let Some(pattern) = rule.matcher() {
            println!("      regex: {}", pattern.as_regex());
        }
        if let Some(ignore) = rule.ignore_source() {
            println!("      ignore: {ignore}");
        }
        if !rule.ops().is_empty() {
            println!("      ops: {}", rule.ops());
        }
        for command in rule.commands() {
            println!("      cmd: {command}");
        }
    }
    println!();

    let dirs: Vec<PathBuf> = compute_watch_set(fs, root, cfg.dir(), cfg.rules())
        .into_iter()
        .collect();
    println!("watching ({}):", dirs.len());
    for dir in dirs {
        println!("  {}", dir.display());
    }

    debug!("dry-run complete (no execution)");
}
