// src/exec/pipeline.rs

//! Command pipeline executor.
//!
//! Runs a rule's command list in order for one triggering path and stops at
//! the first command that fails. Failures end the pipeline only; they are
//! logged and never propagate to the dispatcher.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::engine::EngineEvent;
use crate::exec::backend::{CommandRunner, ExternalCommand};
use crate::exec::command::Command;
use crate::exec::supervisor::SupervisorHandle;
use crate::livereload::ReloadNotifier;
use crate::types::ReloadPolicy;
use crate::watch::Rule;

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Every command succeeded.
    Completed,
    /// Command `index` failed; the rest were skipped.
    Stopped { index: usize, command: String },
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Completed)
    }
}

/// Per-invocation state threaded through the commands of one run.
struct Invocation<'a> {
    target: &'a str,
    quiet: bool,
}

/// Everything a pipeline run needs to reach outside itself. One instance is
/// shared by all pipelines of a configuration generation.
pub struct Pipeline {
    runner: Arc<dyn CommandRunner>,
    notifier: Arc<dyn ReloadNotifier>,
    policy: ReloadPolicy,
    engine_tx: mpsc::UnboundedSender<EngineEvent>,
    supervisor: Option<SupervisorHandle>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("policy", &self.policy)
            .field("supervised", &self.supervisor.is_some())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        notifier: Arc<dyn ReloadNotifier>,
        policy: ReloadPolicy,
        engine_tx: mpsc::UnboundedSender<EngineEvent>,
    ) -> Self {
        Self {
            runner,
            notifier,
            policy,
            engine_tx,
            supervisor: None,
        }
    }

    /// Route `:restart` to this supervisor.
    pub fn with_supervisor(mut self, supervisor: SupervisorHandle) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    /// Run `rule`'s commands for `target`.
    pub async fn run(&self, rule: &Rule, target: &str) -> PipelineOutcome {
        let mut inv = Invocation {
            target,
            quiet: false,
        };
        let mut outcome = PipelineOutcome::Completed;

        for (index, command) in rule.commands().iter().enumerate() {
            if inv.quiet {
                debug!(%command, path = target, "running command");
            } else {
                info!(%command, path = target, "running command");
            }

            let ok = match command {
                Command::Internal {
                    name,
                    args,
                    fire_and_forget,
                } => self.internal(name, args, *fire_and_forget, &mut inv).await,
                Command::External(line) => self.external(line, &inv).await,
            };

            if !ok {
                warn!(
                    rule = %rule.match_source(),
                    %command,
                    path = target,
                    "command failed; skipping the rest of the pipeline"
                );
                outcome = PipelineOutcome::Stopped {
                    index,
                    command: command.to_string(),
                };
                break;
            }
        }

        if outcome.is_success() && !inv.quiet {
            info!(rule = %rule.match_source(), path = target, "pipeline finished");
        }

        let notify = match self.policy {
            ReloadPolicy::Always => true,
            ReloadPolicy::OnSuccess => outcome.is_success(),
            ReloadPolicy::Never => false,
        };
        if notify {
            self.notifier.reload(target);
        }

        outcome
    }

    async fn external(&self, line: &str, inv: &Invocation<'_>) -> bool {
        let command = ExternalCommand {
            line: line.to_string(),
            target: inv.target.to_string(),
            quiet: inv.quiet,
        };
        match self.runner.run(&command).await {
            Ok(success) => success,
            Err(err) => {
                error!(cmd = %line, error = %err, "command could not be run");
                false
            }
        }
    }

    async fn internal(
        &self,
        name: &str,
        args: &[String],
        fire_and_forget: bool,
        inv: &mut Invocation<'_>,
    ) -> bool {
        match name {
            "reload" => self.send(EngineEvent::ReloadRequested),
            "quiet" => {
                inv.quiet = true;
                true
            }
            "event" => self.fire_events(args, fire_and_forget).await,
            "restart" => {
                match &self.supervisor {
                    Some(supervisor) => supervisor.restart(),
                    None => debug!("no managed process to restart"),
                }
                true
            }
            "sleep" => match args.first().map(|a| a.parse::<u64>()) {
                Some(Ok(ms)) => {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    true
                }
                _ => {
                    warn!(?args, "`:sleep` expects a duration in milliseconds");
                    false
                }
            },
            "exit" => self.send(EngineEvent::ShutdownRequested),
            other => {
                warn!(command = other, "unknown internal command");
                false
            }
        }
    }

    /// Synthesise one virtual event per argument. Unless `fire_and_forget`,
    /// wait until the pipelines each event started have finished.
    async fn fire_events(&self, names: &[String], fire_and_forget: bool) -> bool {
        if names.is_empty() {
            warn!("`:event` expects at least one rule name");
            return false;
        }

        for name in names {
            if fire_and_forget {
                if !self.send(EngineEvent::Virtual {
                    name: name.clone(),
                    done: None,
                }) {
                    return false;
                }
                continue;
            }

            let (done_tx, done_rx) = oneshot::channel();
            if !self.send(EngineEvent::Virtual {
                name: name.clone(),
                done: Some(done_tx),
            }) {
                return false;
            }
            // A dropped sender means the event was discarded (e.g. reload);
            // either way there is nothing left to wait for.
            let _ = done_rx.await;
        }
        true
    }

    fn send(&self, event: EngineEvent) -> bool {
        match self.engine_tx.send(event) {
            Ok(()) => true,
            Err(err) => {
                warn!(event = ?err.0, "runtime is gone; internal command dropped");
                false
            }
        }
    }
}
