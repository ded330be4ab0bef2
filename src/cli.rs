// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::config::DEFAULT_CONFIG_FILE;

/// Command-line arguments for `watchrun`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "watchrun",
    version,
    about = "Run commands when files change, and keep a long-lived process restarted.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (YAML, JSON or TOML).
    #[arg(short, long, value_name = "PATH", default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `WATCHRUN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Load the config, print rules and watched directories, run nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Command to supervise. Overrides the config's `command`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl CliArgs {
    /// The trailing command joined back into one shell line.
    pub fn command_line(&self) -> Option<String> {
        if self.command.is_empty() {
            None
        } else {
            Some(self.command.join(" "))
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_conventional_config_file() {
        let args = CliArgs::parse_from(["watchrun"]);
        assert_eq!(args.config, DEFAULT_CONFIG_FILE);
        assert!(args.command_line().is_none());
        assert!(!args.dry_run);
    }

    #[test]
    fn trailing_args_become_the_managed_command() {
        let args = CliArgs::parse_from(["watchrun", "-c", "dev.yml", "--", "cargo", "run", "--release"]);
        assert_eq!(args.config, "dev.yml");
        assert_eq!(args.command_line().as_deref(), Some("cargo run --release"));
    }
}
