// src/exec/backend.rs

//! Pluggable process backend abstraction.
//!
//! The task manager talks to a `ProcessBackend` instead of spawning
//! processes itself. Production uses [`RealProcessBackend`]; tests can plug
//! in a fake that records launches and emits exit events on demand.
//!
//! [`RealProcessBackend`]: super::launcher::RealProcessBackend

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;

use crate::types::TaskId;

/// Everything needed to start one render process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub task_id: TaskId,
    pub program: String,
    pub args: Vec<String>,
    /// Working directory of the child; already exists.
    pub work_dir: PathBuf,
    /// Append-only sink for the child's stdout and stderr.
    pub log_file: PathBuf,
}

/// A successfully spawned process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchedProcess {
    pub pid: u32,
}

/// Trait abstracting how render processes are started and signalled.
///
/// Implementations must report every process exit as a
/// [`TaskEvent::Exited`](crate::engine::TaskEvent::Exited) on the event
/// channel they were built with.
pub trait ProcessBackend: Send + Sync {
    /// Start the process without waiting for it to finish.
    fn launch(
        &self,
        request: LaunchRequest,
    ) -> Pin<Box<dyn Future<Output = io::Result<LaunchedProcess>> + Send + '_>>;

    /// Ask the OS to terminate `pid`. Resolves once the signal is sent.
    ///
    /// Implementations must not signal a pid whose process has already been
    /// reaped; that case is reported as [`io::ErrorKind::NotFound`].
    fn terminate(&self, pid: u32) -> Pin<Box<dyn Future<Output = io::Result<()>> + Send + '_>>;
}
