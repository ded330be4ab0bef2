#![allow(dead_code)]

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{oneshot, Semaphore};
use watchrun::errors::Result;
use watchrun::exec::{CommandRunner, ExternalCommand, ManagedProcess, ProcessLauncher};
use watchrun::livereload::ReloadNotifier;

/// A fake command runner that:
/// - records every external command it is asked to run
/// - fails the command lines registered with [`RecordingRunner::failing`]
/// - optionally sleeps, or blocks until released, to hold pipelines open
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<ExternalCommand>>,
    failing: Mutex<HashSet<String>>,
    delay: Option<Duration>,
    gate: Option<Semaphore>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl RecordingRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    /// Every command blocks until [`RecordingRunner::release`] hands out a
    /// permit.
    pub fn gated() -> Arc<Self> {
        Arc::new(Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        })
    }

    pub fn failing(&self, line: &str) {
        self.failing.lock().unwrap().insert(line.to_string());
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn calls(&self) -> Vec<ExternalCommand> {
        self.calls.lock().unwrap().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.line).collect()
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Commands currently inside `run`.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Highest number of commands ever inside `run` at once.
    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

impl CommandRunner for RecordingRunner {
    fn run<'a>(
        &'a self,
        command: &'a ExternalCommand,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(command.clone());
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);

            if let Some(gate) = &self.gate {
                gate.acquire().await.expect("gate closed").forget();
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(!self.failing.lock().unwrap().contains(&command.line))
        })
    }
}

/// Records every reload notification.
#[derive(Debug, Default)]
pub struct CountingNotifier {
    paths: Mutex<Vec<String>>,
}

impl CountingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.paths.lock().unwrap().len()
    }

    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }
}

impl ReloadNotifier for CountingNotifier {
    fn reload(&self, path: &str) {
        self.paths.lock().unwrap().push(path.to_string());
    }
}

#[derive(Default)]
struct LauncherState {
    launched: Vec<String>,
    exits: Vec<oneshot::Sender<Option<i32>>>,
    live: usize,
    max_live: usize,
    terminations: usize,
    fail_next: usize,
}

/// A fake process launcher. Processes live until terminated or until
/// [`FakeLauncher::crash`] makes the newest one exit.
#[derive(Clone, Default)]
pub struct FakeLauncher {
    state: Arc<Mutex<LauncherState>>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` launches fail.
    pub fn fail_next(&self, n: usize) {
        self.state.lock().unwrap().fail_next = n;
    }

    pub fn launched(&self) -> Vec<String> {
        self.state.lock().unwrap().launched.clone()
    }

    pub fn launches(&self) -> usize {
        self.state.lock().unwrap().launched.len()
    }

    pub fn live(&self) -> usize {
        self.state.lock().unwrap().live
    }

    pub fn max_live(&self) -> usize {
        self.state.lock().unwrap().max_live
    }

    pub fn terminations(&self) -> usize {
        self.state.lock().unwrap().terminations
    }

    /// Make the most recently launched live process exit with `code`.
    pub fn crash(&self, code: i32) {
        let sender = self.state.lock().unwrap().exits.pop();
        if let Some(sender) = sender {
            let _ = sender.send(Some(code));
        }
    }
}

impl ProcessLauncher for FakeLauncher {
    fn launch(&self, command_line: &str) -> Result<Box<dyn ManagedProcess>> {
        let mut state = self.state.lock().unwrap();
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(anyhow::anyhow!("refusing to launch `{command_line}`").into());
        }
        let (tx, rx) = oneshot::channel();
        state.launched.push(command_line.to_string());
        state.exits.push(tx);
        state.live += 1;
        state.max_live = state.max_live.max(state.live);
        Ok(Box::new(FakeProcess {
            state: Arc::clone(&self.state),
            exit: rx,
            alive: true,
        }))
    }
}

struct FakeProcess {
    state: Arc<Mutex<LauncherState>>,
    exit: oneshot::Receiver<Option<i32>>,
    alive: bool,
}

impl FakeProcess {
    fn mark_dead(&mut self) {
        if self.alive {
            self.alive = false;
            self.state.lock().unwrap().live -= 1;
        }
    }
}

impl ManagedProcess for FakeProcess {
    fn wait(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<i32>>> + Send + '_>> {
        Box::pin(async move {
            let code = (&mut self.exit).await.unwrap_or(None);
            self.mark_dead();
            Ok(code)
        })
    }

    fn terminate(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            // Like a real process: stopping one that already exited is a no-op.
            if self.alive {
                self.state.lock().unwrap().terminations += 1;
                self.mark_dead();
            }
            Ok(())
        })
    }
}
