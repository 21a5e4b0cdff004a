// src/engine/mod.rs

//! Render task lifecycle engine.
//!
//! This module ties together:
//! - the pure transition table ([`core`])
//! - the event loop that applies process-exit events ([`runtime`])
//! - the task manager that creates, queries and terminates tasks
//!   ([`manager`])

use crate::types::{TaskId, TaskOutcome};

/// Events flowing into the event loop from process watchers.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    /// A render process exited.
    Exited {
        task_id: TaskId,
        pid: u32,
        outcome: TaskOutcome,
    },
    /// Stop the event loop.
    Shutdown,
}

pub mod core;
pub mod manager;
pub mod runtime;

pub use self::core::{StepOutcome, Transition};
pub use manager::{RenderTaskManager, TaskLayout};
pub use runtime::EventLoop;
