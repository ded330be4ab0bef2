// src/exec/backend.rs

//! Pluggable runner for external commands.
//!
//! The pipeline talks to a `CommandRunner` instead of spawning processes
//! itself. Production code uses [`ShellRunner`]; tests can provide their own
//! runner that, for example, records command lines and returns canned exit
//! statuses.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, info};

use crate::errors::Result;

/// Environment variables exported to every external command.
pub const ENV_TARGET_FILE: &str = "WATCHRUN_TARGET_FILE";
pub const ENV_TARGET_DIR: &str = "WATCHRUN_TARGET_DIR";
pub const ENV_TARGET_BASE: &str = "WATCHRUN_TARGET_BASE";
pub const ENV_TARGET_NAME: &str = "WATCHRUN_TARGET_NAME";
pub const ENV_TARGET_EXT: &str = "WATCHRUN_TARGET_EXT";

/// An external command about to run for a triggering path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    /// The command line, passed verbatim to the shell.
    pub line: String,
    /// Path (or virtual `:name`) that triggered the pipeline.
    pub target: String,
    /// Forward output at debug level instead of info.
    pub quiet: bool,
}

impl ExternalCommand {
    /// `(name, value)` pairs describing the target, exported as env vars.
    pub fn target_env(&self) -> Vec<(&'static str, String)> {
        let path = Path::new(&self.target);
        let ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let lossy = |p: Option<&std::ffi::OsStr>| {
            p.map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
        };

        vec![
            (ENV_TARGET_FILE, self.target.clone()),
            (
                ENV_TARGET_DIR,
                path.parent()
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            ),
            (ENV_TARGET_BASE, lossy(path.file_name())),
            (ENV_TARGET_NAME, lossy(path.file_stem())),
            (ENV_TARGET_EXT, ext),
        ]
    }
}

/// Trait abstracting how external commands are executed.
pub trait CommandRunner: Send + Sync {
    /// Run `command` to completion. `Ok(true)` means it succeeded; `Ok(false)`
    /// that it ran and failed; `Err` that it could not be run at all.
    fn run<'a>(
        &'a self,
        command: &'a ExternalCommand,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;
}

/// Build a shell command appropriate for the platform.
pub fn shell_command(line: &str) -> tokio::process::Command {
    if cfg!(windows) {
        let mut c = tokio::process::Command::new("cmd");
        c.arg("/C").arg(line);
        c
    } else {
        let mut c = tokio::process::Command::new("sh");
        c.arg("-c").arg(line);
        c
    }
}

/// Runs commands through `sh -c` (`cmd /C` on Windows), forwarding their
/// output to the log line by line.
#[derive(Debug, Clone, Default)]
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run<'a>(
        &'a self,
        command: &'a ExternalCommand,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            let mut cmd = shell_command(&command.line);
            cmd.envs(command.target_env())
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            let mut child = cmd
                .spawn()
                .with_context(|| format!("spawning `{}`", command.line))?;

            let stdout = child.stdout.take().map(|s| forward_lines(s, "stdout", command.quiet));
            let stderr = child.stderr.take().map(|s| forward_lines(s, "stderr", command.quiet));

            let status = child
                .wait()
                .await
                .with_context(|| format!("waiting for `{}`", command.line))?;

            // Drain the forwarders so output is logged before the verdict.
            for handle in [stdout, stderr].into_iter().flatten() {
                let _ = handle.await;
            }

            debug!(cmd = %command.line, exit_code = status.code().unwrap_or(-1), "command exited");
            Ok(status.success())
        })
    }
}

fn forward_lines<R>(reader: R, stream: &'static str, quiet: bool) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if quiet {
                debug!(stream, "{}", line);
            } else {
                info!(stream, "{}", line);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn external(target: &str) -> ExternalCommand {
        ExternalCommand {
            line: "true".into(),
            target: target.into(),
            quiet: false,
        }
    }

    #[test]
    fn target_env_describes_the_path() {
        let env = external("/src/app/main.go").target_env();
        let get = |k: &str| env.iter().find(|(n, _)| *n == k).map(|(_, v)| v.as_str());
        assert_eq!(get(ENV_TARGET_FILE), Some("/src/app/main.go"));
        assert_eq!(get(ENV_TARGET_DIR), Some("/src/app"));
        assert_eq!(get(ENV_TARGET_BASE), Some("main.go"));
        assert_eq!(get(ENV_TARGET_NAME), Some("main"));
        assert_eq!(get(ENV_TARGET_EXT), Some(".go"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shell_runner_reports_exit_status_and_exports_target() {
        let runner = ShellRunner;
        let ok = ExternalCommand {
            line: format!("test \"${ENV_TARGET_BASE}\" = note.txt"),
            target: "/tmp/note.txt".into(),
            quiet: true,
        };
        assert!(runner.run(&ok).await.unwrap());

        let failing = ExternalCommand {
            line: "exit 3".into(),
            ..ok
        };
        assert!(!runner.run(&failing).await.unwrap());
    }
}
