// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`command`] classifies a command line as internal (`:name`) or
//!   external (shell).
//! - [`backend`] provides the `CommandRunner` trait and the `ShellRunner`
//!   used in production, which tests replace with a recording fake.
//! - [`pipeline`] runs a rule's command list in order, stopping at the
//!   first failure.
//! - [`supervisor`] keeps the single managed process alive and cycles it
//!   only while no pipeline is running.

pub mod backend;
pub mod command;
pub mod pipeline;
pub mod supervisor;

pub use backend::{CommandRunner, ExternalCommand, ShellRunner};
pub use command::Command;
pub use pipeline::{Pipeline, PipelineOutcome};
pub use supervisor::{
    ManagedProcess, ProcessLauncher, ShellLauncher, Supervisor, SupervisorCommand,
    SupervisorHandle, SupervisorOptions, SupervisorState,
};
