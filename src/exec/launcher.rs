// src/exec/launcher.rs

//! Starting render processes and watching them exit.

use std::collections::HashMap;
use std::fs::OpenOptions as StdOpenOptions;
use std::future::Future;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::engine::TaskEvent;
use crate::exec::backend::{LaunchRequest, LaunchedProcess, ProcessBackend};
use crate::types::{TaskId, TaskOutcome};

/// First line of every task log, written when the task is created.
pub const LOG_PREAMBLE: &str = "start task\n";

/// Create (or truncate) a task's log file with the preamble line.
pub async fn init_log(log_file: &Path) -> io::Result<()> {
    tokio::fs::write(log_file, LOG_PREAMBLE).await
}

/// Append the `Command:` and `Args:` diagnostic lines.
///
/// The `Args:` line holds the argument vector as a JSON array; the progress
/// parser reads the frame range back out of it.
pub async fn append_launch_header(log_file: &Path, program: &str, args: &[String]) -> io::Result<()> {
    let args_json = serde_json::to_string(args).map_err(io::Error::other)?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .await?;
    file.write_all(format!("Command: {program}\nArgs: {args_json}\n").as_bytes())
        .await?;
    file.flush().await?;
    Ok(())
}

/// Reply channel for one termination request.
type KillRequest = oneshot::Sender<io::Result<()>>;

/// Process backend that spawns real OS processes with `tokio::process`.
///
/// Each child:
/// - runs in the task's work dir, with stdout and stderr both appended to
///   the task log;
/// - is placed in its own process group and never killed on drop, so it
///   outlives the request that started it and a Ctrl-C of the server;
/// - is owned by a dedicated watcher task that reports its exit as a
///   [`TaskEvent::Exited`] and serves termination requests.
///
/// Only the watcher touches the `Child`, so a signal is sent only while
/// `try_wait` still reports the process as unreaped and its pid cannot have
/// been reused.
#[derive(Debug, Clone)]
pub struct RealProcessBackend {
    events: mpsc::Sender<TaskEvent>,
    watchers: Arc<Mutex<HashMap<u32, mpsc::Sender<KillRequest>>>>,
}

impl RealProcessBackend {
    pub fn new(events: mpsc::Sender<TaskEvent>) -> Self {
        Self {
            events,
            watchers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Pids whose processes have not been reaped yet.
    pub fn live_pids(&self) -> Vec<u32> {
        self.watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    fn spawn_child(&self, request: &LaunchRequest) -> io::Result<LaunchedProcess> {
        let stdout_sink = StdOpenOptions::new()
            .create(true)
            .append(true)
            .open(&request.log_file)?;
        let stderr_sink = stdout_sink.try_clone()?;

        let mut std_cmd = std::process::Command::new(&request.program);
        std_cmd
            .args(&request.args)
            .current_dir(&request.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_sink))
            .stderr(Stdio::from(stderr_sink));

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            std_cmd.process_group(0);
        }

        let mut cmd = Command::from(std_cmd);
        cmd.kill_on_drop(false);

        let child = cmd.spawn()?;
        let pid = child
            .id()
            .ok_or_else(|| io::Error::other("spawned process reported no pid"))?;

        info!(
            task_id = %request.task_id,
            pid,
            program = %request.program,
            "render process started"
        );

        let (kill_tx, kill_rx) = mpsc::channel(1);
        self.watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pid, kill_tx);

        tokio::spawn(watch_child(
            child,
            request.task_id,
            pid,
            kill_rx,
            Arc::clone(&self.watchers),
            self.events.clone(),
        ));

        Ok(LaunchedProcess { pid })
    }

    async fn request_kill(&self, pid: u32) -> io::Result<()> {
        let watcher = {
            let watchers = self.watchers.lock().unwrap_or_else(PoisonError::into_inner);
            watchers.get(&pid).cloned()
        };
        let watcher = watcher.ok_or_else(|| already_exited(pid))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        watcher
            .send(reply_tx)
            .await
            .map_err(|_| already_exited(pid))?;
        reply_rx.await.map_err(|_| already_exited(pid))?
    }
}

impl ProcessBackend for RealProcessBackend {
    fn launch(
        &self,
        request: LaunchRequest,
    ) -> Pin<Box<dyn Future<Output = io::Result<LaunchedProcess>> + Send + '_>> {
        Box::pin(async move { self.spawn_child(&request) })
    }

    fn terminate(&self, pid: u32) -> Pin<Box<dyn Future<Output = io::Result<()>> + Send + '_>> {
        Box::pin(self.request_kill(pid))
    }
}

/// Owns `child` until it exits: serves kill requests, then reaps it and
/// reports the outcome.
async fn watch_child(
    mut child: Child,
    task_id: TaskId,
    pid: u32,
    mut kill_rx: mpsc::Receiver<KillRequest>,
    watchers: Arc<Mutex<HashMap<u32, mpsc::Sender<KillRequest>>>>,
    events: mpsc::Sender<TaskEvent>,
) {
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            Some(reply) = kill_rx.recv() => {
                let result = signal_child(&mut child, pid);
                debug!(%task_id, pid, ok = result.is_ok(), "termination requested");
                let _ = reply.send(result);
            }
        }
    };

    // Requests still queued are dropped with the receiver and report the
    // process as gone.
    watchers
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&pid);
    drop(kill_rx);

    let outcome = match status {
        Ok(status) if status.success() => TaskOutcome::Success,
        Ok(status) => TaskOutcome::Failed(status.code().unwrap_or(-1)),
        Err(e) => TaskOutcome::WaitError(e.to_string()),
    };

    debug!(%task_id, pid, ?outcome, "render process exited");

    if events
        .send(TaskEvent::Exited {
            task_id,
            pid,
            outcome,
        })
        .await
        .is_err()
    {
        warn!(%task_id, pid, "event loop closed; exit not recorded");
    }
}

fn already_exited(pid: u32) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("process {pid} has already exited"),
    )
}

/// Signal `child` unless it has already been reaped.
fn signal_child(child: &mut Child, pid: u32) -> io::Result<()> {
    if child.try_wait()?.is_some() {
        return Err(already_exited(pid));
    }

    #[cfg(unix)]
    {
        send_sigterm(pid)
    }
    #[cfg(not(unix))]
    {
        child.start_kill()
    }
}

#[cfg(unix)]
fn send_sigterm(pid: u32) -> io::Result<()> {
    // pid 0 would signal our own process group.
    let pid = match i32::try_from(pid) {
        Ok(p) if p > 0 => p,
        _ => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("refusing to signal pid {pid}"),
            ));
        }
    };

    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}
