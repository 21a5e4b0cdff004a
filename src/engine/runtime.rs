// src/engine/runtime.rs

use std::fmt;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::TaskEvent;
use crate::engine::core::{StepOutcome, Transition, apply};
use crate::registry::TaskRegistry;

/// Applies asynchronous process events to the registry.
///
/// Exit watchers never touch task records themselves; they send
/// [`TaskEvent`]s here, and this loop is the only consumer. Each event is
/// applied through [`apply`] under the registry's write lock.
pub struct EventLoop {
    registry: TaskRegistry,
    event_rx: mpsc::Receiver<TaskEvent>,
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("tasks", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl EventLoop {
    pub fn new(registry: TaskRegistry, event_rx: mpsc::Receiver<TaskEvent>) -> Self {
        Self { registry, event_rx }
    }

    /// Main event loop. Returns when the channel closes or on `Shutdown`.
    pub async fn run(mut self) {
        info!("task event loop started");

        while let Some(event) = self.event_rx.recv().await {
            debug!(?event, "event loop received event");
            if !self.handle_event(event) {
                break;
            }
        }

        info!("task event loop exiting");
    }

    /// Apply one event. Returns whether the loop should keep running.
    pub fn handle_event(&self, event: TaskEvent) -> bool {
        match event {
            TaskEvent::Exited {
                task_id,
                pid,
                outcome,
            } => {
                let transition = Transition::Exited {
                    pid,
                    outcome: outcome.clone(),
                    at: Utc::now(),
                };
                match self.registry.update(&task_id, |task| apply(task, transition)) {
                    Some(StepOutcome::Applied { to, .. }) => {
                        info!(
                            %task_id,
                            pid,
                            exit_code = ?outcome.exit_code(),
                            status = %to,
                            "task finished"
                        );
                    }
                    Some(StepOutcome::Ignored { status }) => {
                        debug!(
                            %task_id,
                            pid,
                            %status,
                            "exit event for task already in a final state; ignored"
                        );
                    }
                    None => {
                        warn!(%task_id, pid, "exit event for unknown task");
                    }
                }
                true
            }
            TaskEvent::Shutdown => false,
        }
    }
}
