// src/engine/runtime.rs

use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{ConfigFile, load_or_empty};
use crate::errors::Result;
use crate::exec::{CommandRunner, Pipeline, SupervisorHandle};
use crate::fs::FileSystem;
use crate::livereload::{LiveReloadHub, ReloadNotifier, spawn_server};
use crate::watch::path_utils::to_slash;
use crate::watch::{FsEvent, WatcherHandle, compute_watch_set, spawn_watcher};

use super::{ActiveTasks, Dispatcher, EngineEvent};

/// Static inputs of a runtime.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Tree to walk for the watch set; relative patterns resolve against it.
    pub root: PathBuf,
    /// Absolute path of the configuration file.
    pub config_path: PathBuf,
    /// Managed command from the command line. Wins over the config's
    /// `command` when set.
    pub command_override: Option<String>,
    /// Pause before retrying after the event source or the livereload
    /// listener fails.
    pub backoff: Duration,
}

impl RuntimeOptions {
    pub fn new(root: impl Into<PathBuf>, config_path: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            config_path: config_path.into(),
            command_override: None,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Why a watch loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    Reload,
    Shutdown,
}

/// The load / watch / dispatch loop.
///
/// Each iteration loads the configuration, computes the watch set, starts
/// the event source and consumes events until the configuration file
/// changes (or `:reload` is requested), then starts over with a fresh rule
/// set. Pipelines from the previous generation keep running against their
/// own rules.
pub struct Runtime {
    options: RuntimeOptions,
    fs: Arc<dyn FileSystem>,
    runner: Arc<dyn CommandRunner>,
    notifier: Arc<dyn ReloadNotifier>,
    hub: Option<LiveReloadHub>,
    active: ActiveTasks,
    supervisor: Option<SupervisorHandle>,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
    events_rx: mpsc::UnboundedReceiver<EngineEvent>,
    backlog: VecDeque<EngineEvent>,
    livereload: Option<(String, JoinHandle<()>)>,
    managed_command: Option<Option<String>>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("options", &self.options)
            .field("active", &self.active.get())
            .field("supervised", &self.supervisor.is_some())
            .field("backlog", &self.backlog.len())
            .finish_non_exhaustive()
    }
}

impl Runtime {
    /// A runtime whose notifications go to a [`LiveReloadHub`], served on
    /// the configured `livereload` address.
    pub fn new(
        options: RuntimeOptions,
        fs: Arc<dyn FileSystem>,
        runner: Arc<dyn CommandRunner>,
        active: ActiveTasks,
    ) -> Self {
        let hub = LiveReloadHub::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            options,
            fs,
            runner,
            notifier: Arc::new(hub.clone()),
            hub: Some(hub),
            active,
            supervisor: None,
            events_tx,
            events_rx,
            backlog: VecDeque::new(),
            livereload: None,
            managed_command: None,
        }
    }

    /// Send notifications to `notifier` instead. No livereload listener is
    /// started.
    pub fn with_notifier(mut self, notifier: Arc<dyn ReloadNotifier>) -> Self {
        self.notifier = notifier;
        self.hub = None;
        self
    }

    /// Drive this supervisor: every load hands it the effective managed
    /// command, and `:restart` reaches it.
    pub fn with_supervisor(mut self, supervisor: SupervisorHandle) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    /// Handle for injecting events (Ctrl-C, tests).
    pub fn sender(&self) -> mpsc::UnboundedSender<EngineEvent> {
        self.events_tx.clone()
    }

    pub fn active_tasks(&self) -> &ActiveTasks {
        &self.active
    }

    /// Main loop. Returns after a shutdown request, with the supervisor told
    /// to stop and the livereload listener aborted.
    pub async fn run(mut self) -> Result<()> {
        let config_key = to_slash(&self.options.config_path);
        info!(root = ?self.options.root, config = %config_key, "watchrun runtime started");

        loop {
            let cfg = load_or_empty(
                self.fs.as_ref(),
                &self.options.config_path,
                &self.options.root,
            )
            .await;
            self.apply_managed_command(&cfg);
            self.apply_livereload(&cfg);

            let dirs = {
                let fs = Arc::clone(&self.fs);
                let root = self.options.root.clone();
                let config_dir = cfg.dir().to_path_buf();
                let rules = cfg.rules().to_vec();
                tokio::task::spawn_blocking(move || {
                    compute_watch_set(fs.as_ref(), &root, &config_dir, &rules)
                })
                .await
                .map_err(anyhow::Error::from)?
            };

            let watcher = match spawn_watcher(&dirs, self.events_tx.clone()) {
                Ok(handle) => handle,
                Err(err) => {
                    warn!(error = %err, "cannot start file watcher; retrying");
                    if self.pause().await == LoopExit::Shutdown {
                        break;
                    }
                    continue;
                }
            };

            let dispatcher = self.dispatcher_for(&cfg);
            info!(
                config = %config_key,
                rules = cfg.rules().len(),
                dirs = watcher.dirs().len(),
                "configuration loaded"
            );

            let exit = self.watch_loop(&dispatcher, &config_key).await;
            drop(watcher);
            match exit {
                LoopExit::Reload => {
                    self.defer_pending(&config_key);
                    info!(config = %config_key, "reloading configuration");
                }
                LoopExit::Shutdown => break,
            }
        }

        info!("shutting down");
        if let Some(supervisor) = &self.supervisor {
            supervisor.shutdown();
        }
        if let Some((_, server)) = self.livereload.take() {
            server.abort();
        }
        Ok(())
    }

    fn dispatcher_for(&self, cfg: &ConfigFile) -> Dispatcher {
        let mut pipeline = Pipeline::new(
            Arc::clone(&self.runner),
            Arc::clone(&self.notifier),
            cfg.reload_policy(),
            self.events_tx.clone(),
        );
        if let Some(supervisor) = &self.supervisor {
            pipeline = pipeline.with_supervisor(supervisor.clone());
        }
        Dispatcher::new(cfg.rules().to_vec(), Arc::new(pipeline), self.active.clone())
    }

    async fn watch_loop(&mut self, dispatcher: &Dispatcher, config_key: &str) -> LoopExit {
        loop {
            let Some(event) = self.next_event().await else {
                return LoopExit::Shutdown;
            };

            match event {
                EngineEvent::Fs(event) => {
                    if event.path == config_key {
                        info!(ops = %event.ops, "configuration file changed");
                        return LoopExit::Reload;
                    }
                    dispatcher.dispatch(&event);
                }
                EngineEvent::Virtual { name, done } => {
                    let handles = dispatcher.dispatch(&FsEvent::virtual_event(name));
                    if let Some(done) = done {
                        tokio::spawn(async move {
                            for handle in handles {
                                let _ = handle.await;
                            }
                            let _ = done.send(());
                        });
                    }
                }
                EngineEvent::WatchError(err) => warn!(error = %err, "file watcher error"),
                EngineEvent::ReloadRequested => return LoopExit::Reload,
                EngineEvent::ShutdownRequested => return LoopExit::Shutdown,
            }
        }
    }

    async fn next_event(&mut self) -> Option<EngineEvent> {
        match self.backlog.pop_front() {
            Some(event) => Some(event),
            None => self.events_rx.recv().await,
        }
    }

    /// Move everything already queued into the backlog, minus further
    /// notifications for the configuration file itself: one save usually
    /// produces several, and the reload about to happen covers them all.
    fn defer_pending(&mut self, config_key: &str) {
        while let Ok(event) = self.events_rx.try_recv() {
            match &event {
                EngineEvent::Fs(fs_event) if fs_event.path == config_key => {
                    debug!(ops = %fs_event.ops, "coalescing configuration change");
                }
                EngineEvent::ReloadRequested => {}
                _ => self.backlog.push_back(event),
            }
        }
    }

    /// Sleep for the backoff, staying responsive to shutdown.
    async fn pause(&mut self) -> LoopExit {
        let sleep = tokio::time::sleep(self.options.backoff);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return LoopExit::Reload,
                event = self.events_rx.recv() => match event {
                    Some(EngineEvent::ShutdownRequested) | None => return LoopExit::Shutdown,
                    Some(event) => self.backlog.push_back(event),
                },
            }
        }
    }

    fn apply_managed_command(&mut self, cfg: &ConfigFile) {
        let Some(supervisor) = &self.supervisor else {
            return;
        };
        let command = self
            .options
            .command_override
            .clone()
            .or_else(|| cfg.command().map(str::to_string));

        if self.managed_command.as_ref() == Some(&command) {
            supervisor.restart();
        } else {
            info!(cmd = ?command, "managed command configured");
            supervisor.replace(command.clone());
            self.managed_command = Some(command);
        }
    }

    fn apply_livereload(&mut self, cfg: &ConfigFile) {
        let Some(hub) = &self.hub else {
            return;
        };
        let wanted = cfg.livereload();
        if self.livereload.as_ref().map(|(addr, _)| addr.as_str()) == wanted {
            return;
        }
        if let Some((addr, server)) = self.livereload.take() {
            info!(%addr, "stopping livereload server");
            server.abort();
        }
        if let Some(addr) = wanted {
            let server = spawn_server(addr.to_string(), hub.clone(), self.options.backoff);
            self.livereload = Some((addr.to_string(), server));
        }
    }
}
