// src/lib.rs

pub mod api;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod outputs;
pub mod progress;
pub mod registry;
pub mod types;
pub mod uploads;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::api::Router;
use crate::cli::CliArgs;
use crate::config::{ConfigFile, load_or_default};
use crate::engine::{EventLoop, RenderTaskManager, TaskEvent, TaskLayout};
use crate::exec::RealProcessBackend;
use crate::progress::ParseOptions;
use crate::registry::TaskRegistry;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the task registry and its exit-event loop
/// - the real process backend
/// - the HTTP server
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let mut cfg = load_or_default(args.config.as_deref().map(Path::new))?;
    if let Some(bind) = args.bind {
        cfg.override_bind(bind)?;
    }

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let upload_dir = absolute(&cfg.storage.upload_dir)?;
    let tasks_dir = absolute(&cfg.storage.tasks_dir)?;
    tokio::fs::create_dir_all(&tasks_dir)
        .await
        .with_context(|| format!("creating tasks dir {}", tasks_dir.display()))?;

    let (event_tx, event_rx) = mpsc::channel::<TaskEvent>(64);
    let registry = TaskRegistry::new();

    let event_loop = EventLoop::new(registry.clone(), event_rx);
    let event_loop_handle = tokio::spawn(event_loop.run());

    let mut layout = TaskLayout::from_storage(&cfg.storage);
    layout.tasks_dir = tasks_dir;

    let manager = Arc::new(RenderTaskManager::new(
        registry,
        RealProcessBackend::new(event_tx.clone()),
        layout,
        ParseOptions::from(&cfg.progress),
    ));

    let router = Router::new(manager, cfg.engine.clone(), upload_dir)
        .with_upload_limit(cfg.storage.max_upload_bytes);
    let server = api::serve(&cfg.server.bind, router, tokio::runtime::Handle::current())?;

    info!(
        bind = %cfg.server.bind,
        engine = %cfg.engine.path,
        "rendertask ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("listening for Ctrl+C")?;
    info!("shutdown requested; running render processes are left alive");

    tokio::task::spawn_blocking(move || server.shutdown()).await?;

    if event_tx.send(TaskEvent::Shutdown).await.is_err() {
        warn!("event loop already stopped");
    }
    event_loop_handle.await?;

    Ok(())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("resolving {}", path.display()))
}

/// Simple dry-run output: print the resolved configuration.
fn print_dry_run(cfg: &ConfigFile) {
    println!("rendertask dry-run");
    println!("  server.bind            = {}", cfg.server.bind);
    println!("  storage.upload_dir     = {}", cfg.storage.upload_dir.display());
    println!("  storage.tasks_dir      = {}", cfg.storage.tasks_dir.display());
    println!("  storage.log_file_name  = {}", cfg.storage.log_file_name);
    println!("  storage.output_dir     = {}", cfg.storage.output_dir_name);
    println!("  storage.video_file     = {}", cfg.storage.video_file_name);
    println!("  storage.max_upload     = {}", cfg.storage.max_upload_bytes);
    println!("  engine.path            = {}", cfg.engine.path);
    println!("  engine.alias           = {}", cfg.engine.alias);
    println!("  progress.tail_lines    = {}", cfg.progress.tail_lines);
    println!("  progress.args_lookahead = {}", cfg.progress.args_lookahead);
}
