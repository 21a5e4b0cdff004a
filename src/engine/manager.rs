// src/engine/manager.rs

//! Render task manager: the entry point for creating, querying and
//! terminating tasks.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::StorageSection;
use crate::engine::core::{StepOutcome, Transition, apply};
use crate::errors::{RenderError, Result};
use crate::exec::launcher::{append_launch_header, init_log};
use crate::exec::{LaunchRequest, ParsedCommand, ProcessBackend};
use crate::outputs::{self, Frame, VideoFile};
use crate::progress::{self, ParseOptions, ProgressReport};
use crate::registry::{Task, TaskRegistry, TaskSnapshot};
use crate::types::{TaskId, TaskStatus};

/// Where a task's files live on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskLayout {
    pub tasks_dir: PathBuf,
    pub log_file_name: String,
    pub output_dir_name: String,
    pub video_file_name: String,
}

impl TaskLayout {
    pub fn from_storage(storage: &StorageSection) -> Self {
        Self {
            tasks_dir: storage.tasks_dir.clone(),
            log_file_name: storage.log_file_name.clone(),
            output_dir_name: storage.output_dir_name.clone(),
            video_file_name: storage.video_file_name.clone(),
        }
    }

    pub fn work_dir(&self, id: &TaskId) -> PathBuf {
        self.tasks_dir.join(id.to_string())
    }

    pub fn log_file(&self, work_dir: &Path) -> PathBuf {
        work_dir.join(&self.log_file_name)
    }

    pub fn output_dir(&self, work_dir: &Path) -> PathBuf {
        work_dir.join(&self.output_dir_name)
    }

    pub fn video_file(&self, work_dir: &Path) -> PathBuf {
        work_dir.join(&self.video_file_name)
    }
}

/// Orchestrates task creation, process launch, queries and termination.
///
/// The manager writes to the registry on the creation and termination
/// paths; process exits reach the registry through the
/// [`EventLoop`](crate::engine::EventLoop). All three go through
/// [`apply`], so the forward-only status rule holds no matter which path
/// gets there first.
pub struct RenderTaskManager<B: ProcessBackend> {
    registry: TaskRegistry,
    backend: B,
    layout: TaskLayout,
    parse: ParseOptions,
}

impl<B: ProcessBackend> fmt::Debug for RenderTaskManager<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderTaskManager")
            .field("layout", &self.layout)
            .field("parse", &self.parse)
            .field("tasks", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl<B: ProcessBackend> RenderTaskManager<B> {
    pub fn new(registry: TaskRegistry, backend: B, layout: TaskLayout, parse: ParseOptions) -> Self {
        Self {
            registry,
            backend,
            layout,
            parse,
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn layout(&self) -> &TaskLayout {
        &self.layout
    }

    /// Create a task for `command` and start its process.
    ///
    /// Returns as soon as the process has been spawned (status `running`)
    /// without waiting for it to finish. A command with no program is a
    /// validation error and creates nothing. Any failure after the task is
    /// registered (work dir, log, spawn) marks it `failed` and is returned
    /// as [`RenderError::Launch`].
    pub async fn create_task(&self, command: &str) -> Result<Task> {
        let parsed = ParsedCommand::parse(command)?;

        let id = TaskId::generate();
        let work_dir = self.layout.work_dir(&id);
        let log_file = self.layout.log_file(&work_dir);

        self.registry.insert(Task::pending(
            id,
            command.to_string(),
            work_dir.clone(),
            log_file.clone(),
        ));
        debug!(task_id = %id, cmd = %command, "task created");

        if let Err(source) = prepare_task_files(&work_dir, &log_file, &parsed).await {
            return Err(self.fail_launch(id, source));
        }

        let request = LaunchRequest {
            task_id: id,
            program: parsed.program,
            args: parsed.args,
            work_dir,
            log_file,
        };

        match self.backend.launch(request).await {
            Ok(launched) => {
                let step = self.registry.update(&id, |task| {
                    apply(
                        task,
                        Transition::Started {
                            pid: launched.pid,
                            at: Utc::now(),
                        },
                    )
                });
                if let Some(StepOutcome::Ignored { status }) = step {
                    debug!(task_id = %id, %status, "process exited before start was recorded");
                }
            }
            Err(source) => return Err(self.fail_launch(id, source)),
        }

        self.registry
            .get(&id)
            .ok_or_else(|| RenderError::NotFound(format!("task {id}")))
    }

    fn fail_launch(&self, task_id: TaskId, source: io::Error) -> RenderError {
        error!(%task_id, error = %source, "failed to launch render process");
        self.registry.update(&task_id, |task| {
            apply(task, Transition::LaunchFailed { at: Utc::now() })
        });
        RenderError::Launch { task_id, source }
    }

    /// Current record of a task plus its freshly read log.
    pub async fn get_task(&self, id: &TaskId) -> Result<TaskSnapshot> {
        let task = self.lookup(id)?;
        let logs = progress::read_log(&task.log_file).await?;
        Ok(TaskSnapshot { task, logs })
    }

    /// Every known task, in no particular order.
    pub fn get_all_tasks(&self) -> Vec<Task> {
        self.registry.snapshot()
    }

    /// Send a termination signal to a running task's process.
    ///
    /// Returns `false` when the id is unknown, the task is not `running`,
    /// or the signal could not be delivered. On success the task is marked
    /// `failed` right away; the manager does not wait for the process to
    /// exit and does not signal its descendants.
    ///
    /// The backend refuses to signal a process that has already been
    /// reaped, even if its exit has not reached the registry yet.
    pub async fn terminate_task(&self, id: &TaskId) -> bool {
        let pid = match self.registry.get(id) {
            Some(task) => match (task.status, task.pid) {
                (TaskStatus::Running, Some(pid)) => pid,
                (status, _) => {
                    warn!(task_id = %id, %status, "task not terminated: not running");
                    return false;
                }
            },
            None => {
                debug!(task_id = %id, "terminate requested for unknown task");
                return false;
            }
        };

        if let Err(e) = self.backend.terminate(pid).await {
            warn!(task_id = %id, pid, error = %e, "task not terminated: signal failed");
            return false;
        }

        let step = self.registry.update(id, |task| {
            apply(task, Transition::Terminated { at: Utc::now() })
        });
        match step {
            Some(StepOutcome::Ignored { status }) => {
                debug!(task_id = %id, pid, %status, "exit recorded while terminating");
            }
            _ => info!(task_id = %id, pid, "task terminated"),
        }
        true
    }

    /// Progress parsed from the task's log.
    ///
    /// Paths come from the task directory layout, so tasks from an earlier
    /// server run are still readable. A missing log reports zeros.
    pub async fn task_progress(&self, id: &TaskId) -> Result<ProgressReport> {
        let log_file = self.layout.log_file(&self.layout.work_dir(id));
        progress::read_progress(&log_file, &self.parse).await
    }

    /// Frame images written so far, read from the task directory.
    pub async fn list_frames(&self, id: &TaskId) -> Result<Vec<String>> {
        outputs::list_frames(&self.output_dir(id)).await
    }

    pub async fn frame(&self, id: &TaskId, file_name: &str) -> Result<Frame> {
        outputs::read_frame(&self.output_dir(id), file_name).await
    }

    /// Whether an assembled video exists in the task's work dir.
    pub async fn video_exists(&self, id: &TaskId) -> bool {
        outputs::video_exists(&self.video_file(id)).await
    }

    /// Size of the assembled video, or `NotFound`.
    pub async fn video(&self, id: &TaskId) -> Result<VideoFile> {
        outputs::video_file(&self.video_file(id)).await
    }

    fn output_dir(&self, id: &TaskId) -> PathBuf {
        self.layout.output_dir(&self.layout.work_dir(id))
    }

    fn video_file(&self, id: &TaskId) -> PathBuf {
        self.layout.video_file(&self.layout.work_dir(id))
    }

    fn lookup(&self, id: &TaskId) -> Result<Task> {
        self.registry
            .get(id)
            .ok_or_else(|| RenderError::NotFound(format!("task {id}")))
    }
}

/// Create the work dir and write the log preamble and launch header.
async fn prepare_task_files(work_dir: &Path, log_file: &Path, parsed: &ParsedCommand) -> io::Result<()> {
    tokio::fs::create_dir_all(work_dir).await?;
    init_log(log_file).await?;
    append_launch_header(log_file, &parsed.program, &parsed.args).await
}
