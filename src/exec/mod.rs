// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`command`] splits command strings into argv and resolves the engine
//!   alias.
//! - [`launcher`] writes the log header and owns the real process backend,
//!   which spawns detached children with `tokio::process::Command` and
//!   reports their exits as `TaskEvent`s.
//! - [`backend`] provides the `ProcessBackend` trait that the task manager
//!   uses, and which tests replace with a fake implementation.

pub mod backend;
pub mod command;
pub mod launcher;

pub use backend::{LaunchRequest, LaunchedProcess, ProcessBackend};
pub use command::{ParsedCommand, resolve_command, split_command};
pub use launcher::RealProcessBackend;
