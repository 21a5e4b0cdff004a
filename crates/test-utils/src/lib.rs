pub mod builders;
pub mod fake_backend;

use std::path::Path;
use std::sync::{Arc, Once};
use std::time::Duration;

use rendertask::engine::{EventLoop, RenderTaskManager, TaskEvent, TaskLayout};
use rendertask::exec::ProcessBackend;
use rendertask::progress::ParseOptions;
use rendertask::registry::{Task, TaskRegistry};
use rendertask::types::{TaskId, TaskStatus};
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt};

use crate::fake_backend::FakeBackend;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Default layout rooted at `tasks_dir`.
pub fn layout_in(tasks_dir: &Path) -> TaskLayout {
    TaskLayout {
        tasks_dir: tasks_dir.to_path_buf(),
        log_file_name: "render.log".to_string(),
        output_dir_name: "output".to_string(),
        video_file_name: "output.mp4".to_string(),
    }
}

/// A manager wired to a running event loop.
pub struct Harness<B: ProcessBackend> {
    pub manager: Arc<RenderTaskManager<B>>,
    pub events: mpsc::Sender<TaskEvent>,
    pub event_loop: tokio::task::JoinHandle<()>,
}

/// Build a manager over the backend produced by `make_backend`, with its
/// event loop already spawned. Must be called inside a Tokio runtime.
pub fn harness<B, F>(tasks_dir: &Path, make_backend: F) -> Harness<B>
where
    B: ProcessBackend + 'static,
    F: FnOnce(mpsc::Sender<TaskEvent>) -> B,
{
    let (tx, rx) = mpsc::channel::<TaskEvent>(64);
    let registry = TaskRegistry::new();
    let event_loop = tokio::spawn(EventLoop::new(registry.clone(), rx).run());

    let manager = Arc::new(RenderTaskManager::new(
        registry,
        make_backend(tx.clone()),
        layout_in(tasks_dir),
        ParseOptions::default(),
    ));

    Harness {
        manager,
        events: tx,
        event_loop,
    }
}

/// Harness over a [`FakeBackend`], returning a handle to the fake too.
pub fn fake_harness(tasks_dir: &Path) -> (Harness<FakeBackend>, FakeBackend) {
    let mut fake = None;
    let h = harness(tasks_dir, |tx| {
        let backend = FakeBackend::new(tx);
        fake = Some(backend.clone());
        backend
    });
    (h, fake.expect("backend was constructed"))
}

/// Poll the registry until the task reaches `status`, panicking after 5s.
pub async fn wait_for_status<B: ProcessBackend>(
    manager: &RenderTaskManager<B>,
    id: &TaskId,
    status: TaskStatus,
) -> Task {
    with_timeout(async {
        loop {
            if let Some(task) = manager.registry().get(id) {
                if task.status == status {
                    return task;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
}
