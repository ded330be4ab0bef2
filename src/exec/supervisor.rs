// src/exec/supervisor.rs

//! Restart supervisor for the managed (long-lived) process.
//!
//! The supervisor owns at most one live process. It cycles it
//! (terminate, then spawn) only while the shared [`ActiveTasks`] counter
//! reads zero, so a restart never overlaps a running pipeline:
//!
//! ```text
//!        ┌──────────── restart / replace / unexpected exit ─────────────┐
//!        v                                                              │
//!      Idle ──(counter == 0)──> Terminating ──> Spawning ──> Running ───┘
//! ```
//!
//! A shutdown request terminates the process from any state and ends the
//! loop.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::process::Child;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::engine::ActiveTasks;
use crate::errors::Result;
use crate::exec::backend::shell_command;

/// Observable supervisor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Spawning,
    Running,
    Terminating,
    /// The loop has ended after a shutdown request.
    Stopped,
}

/// Requests accepted by a running supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorCommand {
    /// Cycle the current process once no task is active.
    Restart,
    /// Switch to a new command line (or none) and cycle.
    Replace(Option<String>),
    /// Terminate the process and stop supervising.
    Shutdown,
}

/// Timing knobs.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorOptions {
    /// How often the active-task counter is re-checked while gated.
    pub poll_interval: Duration,
    /// Pause after a failed spawn or an unexpected exit.
    pub backoff: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            backoff: Duration::from_secs(1),
        }
    }
}

/// A live managed process.
pub trait ManagedProcess: Send {
    /// Resolve once the process has exited, with its exit code if any.
    fn wait(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<i32>>> + Send + '_>>;

    /// Stop the process. Must succeed if it has already exited.
    fn terminate(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Starts managed processes.
pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, command_line: &str) -> Result<Box<dyn ManagedProcess>>;
}

/// Launches the command line through the platform shell with inherited
/// stdout/stderr.
#[derive(Debug, Clone, Default)]
pub struct ShellLauncher;

/// How long the process group gets to exit after `SIGTERM` before it is
/// killed outright.
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

impl ProcessLauncher for ShellLauncher {
    fn launch(&self, command_line: &str) -> Result<Box<dyn ManagedProcess>> {
        let mut command = shell_command(command_line);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        // The shell and everything it starts share one group, so terminate
        // reaches grandchildren too.
        #[cfg(unix)]
        command.process_group(0);

        let child = command
            .spawn()
            .with_context(|| format!("spawning managed command `{command_line}`"))?;
        let group = child.id();
        Ok(Box::new(ShellProcess { child, group }))
    }
}

struct ShellProcess {
    child: Child,
    /// Process group id, equal to the shell's pid.
    #[cfg_attr(not(unix), allow(dead_code))]
    group: Option<u32>,
}

impl ShellProcess {
    #[cfg(unix)]
    fn signal_group(&self, signal: nix::sys::signal::Signal) {
        use nix::errno::Errno;
        use nix::sys::signal::killpg;
        use nix::unistd::Pid;

        let Some(group) = self.group else { return };
        match killpg(Pid::from_raw(group as i32), signal) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(err) => warn!(group, ?signal, error = %err, "signalling process group failed"),
        }
    }
}

impl ManagedProcess for ShellProcess {
    fn wait(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<i32>>> + Send + '_>> {
        Box::pin(async move {
            let status = self.child.wait().await?;
            Ok(status.code())
        })
    }

    fn terminate(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if self.child.try_wait()?.is_some() {
                #[cfg(unix)]
                self.signal_group(nix::sys::signal::Signal::SIGKILL);
                return Ok(());
            }

            #[cfg(unix)]
            {
                use nix::sys::signal::Signal;

                self.signal_group(Signal::SIGTERM);
                if tokio::time::timeout(TERMINATE_GRACE, self.child.wait())
                    .await
                    .is_err()
                {
                    debug!(group = ?self.group, "process group ignored SIGTERM");
                }
                // Sweep anything left in the group, even if the shell is gone.
                self.signal_group(Signal::SIGKILL);
            }

            if self.child.try_wait()?.is_none() {
                self.child.kill().await?;
            }
            Ok(())
        })
    }
}

/// Cheap, cloneable control handle for a [`Supervisor`].
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    tx: mpsc::UnboundedSender<SupervisorCommand>,
    state: watch::Receiver<SupervisorState>,
}

impl SupervisorHandle {
    pub fn restart(&self) {
        self.send(SupervisorCommand::Restart);
    }

    pub fn replace(&self, command_line: Option<String>) {
        self.send(SupervisorCommand::Replace(command_line));
    }

    pub fn shutdown(&self) {
        self.send(SupervisorCommand::Shutdown);
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    /// A receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.state.clone()
    }

    fn send(&self, command: SupervisorCommand) {
        if self.tx.send(command).is_err() {
            debug!("supervisor already stopped");
        }
    }
}

pub struct Supervisor {
    command: Option<String>,
    launcher: Arc<dyn ProcessLauncher>,
    active: ActiveTasks,
    options: SupervisorOptions,
    current: Option<Box<dyn ManagedProcess>>,
    rx: mpsc::UnboundedReceiver<SupervisorCommand>,
    state: watch::Sender<SupervisorState>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("command", &self.command)
            .field("state", &*self.state.borrow())
            .field("running", &self.current.is_some())
            .finish_non_exhaustive()
    }
}

/// What to do after waiting on something interruptible.
enum Wake {
    Proceed,
    Shutdown,
}

impl Supervisor {
    pub fn new(
        command: Option<String>,
        launcher: Arc<dyn ProcessLauncher>,
        active: ActiveTasks,
        options: SupervisorOptions,
    ) -> (Self, SupervisorHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SupervisorState::Idle);
        let supervisor = Self {
            command,
            launcher,
            active,
            options,
            current: None,
            rx,
            state: state_tx,
        };
        let handle = SupervisorHandle {
            tx,
            state: state_rx,
        };
        (supervisor, handle)
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    fn set_state(&self, state: SupervisorState) {
        self.state.send_replace(state);
    }

    /// Terminate the current process, if any. Calling this with no live
    /// process is a no-op.
    pub async fn terminate(&mut self) -> Result<()> {
        let Some(mut process) = self.current.take() else {
            return Ok(());
        };
        self.set_state(SupervisorState::Terminating);
        info!("terminating managed process");
        process.terminate().await
    }

    /// Main supervision loop. Returns after a shutdown request (or when every
    /// handle has been dropped), with the process terminated.
    pub async fn run(mut self) {
        loop {
            self.set_state(SupervisorState::Idle);

            if self.command.is_none() {
                // Nothing to supervise until a command line shows up.
                if let Err(err) = self.terminate().await {
                    warn!(error = %err, "failed to terminate managed process");
                }
                self.set_state(SupervisorState::Idle);
                match self.rx.recv().await {
                    Some(SupervisorCommand::Replace(command)) => self.command = command,
                    Some(SupervisorCommand::Restart) => {}
                    Some(SupervisorCommand::Shutdown) | None => break,
                }
                continue;
            }

            if let Wake::Shutdown = self.wait_until_idle().await {
                break;
            }
            let Some(command) = self.command.clone() else {
                continue;
            };

            if let Err(err) = self.terminate().await {
                warn!(error = %err, "failed to terminate managed process");
            }

            self.set_state(SupervisorState::Spawning);
            match self.launcher.launch(&command) {
                Ok(process) => {
                    info!(cmd = %command, "managed process started");
                    self.current = Some(process);
                }
                Err(err) => {
                    error!(cmd = %command, error = %err, "failed to start managed process");
                    if let Wake::Shutdown = self.backoff().await {
                        break;
                    }
                    continue;
                }
            }

            self.set_state(SupervisorState::Running);
            if let Wake::Shutdown = self.supervise_running().await {
                break;
            }
        }

        if let Err(err) = self.terminate().await {
            warn!(error = %err, "failed to terminate managed process");
        }
        self.set_state(SupervisorState::Stopped);
        info!("supervisor stopped");
    }

    /// Block until the active-task counter reads zero, polling.
    async fn wait_until_idle(&mut self) -> Wake {
        loop {
            let active = self.active.get();
            if active == 0 {
                return Wake::Proceed;
            }
            debug!(active, "tasks in flight; holding restart");
            tokio::select! {
                _ = tokio::time::sleep(self.options.poll_interval) => {}
                command = self.rx.recv() => match command {
                    Some(SupervisorCommand::Replace(command)) => self.command = command,
                    Some(SupervisorCommand::Restart) => {}
                    Some(SupervisorCommand::Shutdown) | None => return Wake::Shutdown,
                },
            }
        }
    }

    /// Wait while the process runs, until it exits or a request arrives.
    async fn supervise_running(&mut self) -> Wake {
        let Some(process) = self.current.as_mut() else {
            return Wake::Proceed;
        };

        let outcome = tokio::select! {
            status = process.wait() => Err(status),
            command = self.rx.recv() => Ok(command),
        };

        match outcome {
            Err(status) => {
                match status {
                    Ok(code) => warn!(exit_code = ?code, "managed process exited; restarting"),
                    Err(err) => warn!(error = %err, "lost track of managed process; restarting"),
                }
                self.current = None;
                self.backoff().await
            }
            Ok(Some(SupervisorCommand::Restart)) => {
                info!("restart requested");
                Wake::Proceed
            }
            Ok(Some(SupervisorCommand::Replace(command))) => {
                info!(cmd = ?command, "managed command replaced");
                self.command = command;
                Wake::Proceed
            }
            Ok(Some(SupervisorCommand::Shutdown)) | Ok(None) => Wake::Shutdown,
        }
    }

    async fn backoff(&mut self) -> Wake {
        tokio::select! {
            _ = tokio::time::sleep(self.options.backoff) => Wake::Proceed,
            command = self.rx.recv() => match command {
                Some(SupervisorCommand::Replace(command)) => {
                    self.command = command;
                    Wake::Proceed
                }
                Some(SupervisorCommand::Restart) => Wake::Proceed,
                Some(SupervisorCommand::Shutdown) | None => Wake::Shutdown,
            },
        }
    }
}
