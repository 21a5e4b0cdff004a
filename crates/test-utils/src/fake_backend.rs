use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use rendertask::engine::TaskEvent;
use rendertask::exec::{LaunchRequest, LaunchedProcess, ProcessBackend};
use rendertask::types::{TaskId, TaskOutcome};
use tokio::sync::mpsc;

#[derive(Debug, Default)]
struct FakeState {
    launches: Mutex<Vec<(LaunchRequest, u32)>>,
    terminated: Mutex<Vec<u32>>,
    exited: Mutex<Vec<u32>>,
    next_pid: AtomicU32,
    fail_launch: AtomicBool,
    fail_terminate: AtomicBool,
}

/// A fake process backend that:
/// - records every launch and hands out increasing fake pids
/// - records terminate calls instead of signalling anything
/// - only reports an exit when the test calls [`FakeBackend::finish`], after
///   which terminating that pid fails with `NotFound`.
///
/// Clones share state, so a test can keep one while the manager owns another.
#[derive(Debug, Clone)]
pub struct FakeBackend {
    state: Arc<FakeState>,
    events: mpsc::Sender<TaskEvent>,
}

impl FakeBackend {
    pub fn new(events: mpsc::Sender<TaskEvent>) -> Self {
        let state = FakeState {
            next_pid: AtomicU32::new(1000),
            ..FakeState::default()
        };
        Self {
            state: Arc::new(state),
            events,
        }
    }

    /// Make subsequent launches fail with `NotFound`.
    pub fn fail_launches(&self, fail: bool) {
        self.state.fail_launch.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent terminate calls fail with `PermissionDenied`.
    pub fn fail_terminations(&self, fail: bool) {
        self.state.fail_terminate.store(fail, Ordering::SeqCst);
    }

    pub fn launches(&self) -> Vec<LaunchRequest> {
        self.state
            .launches
            .lock()
            .unwrap()
            .iter()
            .map(|(req, _)| req.clone())
            .collect()
    }

    pub fn terminated(&self) -> Vec<u32> {
        self.state.terminated.lock().unwrap().clone()
    }

    pub fn pid_of(&self, task_id: &TaskId) -> Option<u32> {
        self.state
            .launches
            .lock()
            .unwrap()
            .iter()
            .find(|(req, _)| req.task_id == *task_id)
            .map(|(_, pid)| *pid)
    }

    /// Report that the process for `task_id` exited with `outcome`.
    pub async fn finish(&self, task_id: TaskId, outcome: TaskOutcome) {
        let pid = self.pid_of(&task_id).expect("task was never launched");
        self.state.exited.lock().unwrap().push(pid);
        self.events
            .send(TaskEvent::Exited {
                task_id,
                pid,
                outcome,
            })
            .await
            .expect("event loop is running");
    }
}

impl ProcessBackend for FakeBackend {
    fn launch(
        &self,
        request: LaunchRequest,
    ) -> Pin<Box<dyn Future<Output = io::Result<LaunchedProcess>> + Send + '_>> {
        Box::pin(async move {
            if self.state.fail_launch.load(Ordering::SeqCst) {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("fake: no such program {}", request.program),
                ));
            }

            let pid = self.state.next_pid.fetch_add(1, Ordering::SeqCst);
            self.state.launches.lock().unwrap().push((request, pid));
            Ok(LaunchedProcess { pid })
        })
    }

    fn terminate(&self, pid: u32) -> Pin<Box<dyn Future<Output = io::Result<()>> + Send + '_>> {
        Box::pin(async move {
            if self.state.exited.lock().unwrap().contains(&pid) {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("fake: process {pid} has already exited"),
                ));
            }
            if self.state.fail_terminate.load(Ordering::SeqCst) {
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    "fake: not permitted",
                ));
            }
            self.state.terminated.lock().unwrap().push(pid);
            Ok(())
        })
    }
}
