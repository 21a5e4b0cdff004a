// src/engine/core.rs

//! Pure task state machine.
//!
//! Every status change of a [`Task`] goes through [`apply`], whichever
//! context it originates from (creation path, exit watcher, termination).
//! The function is synchronous and IO-free so the transition table can be
//! unit tested directly.
//!
//! ```text
//! Pending --Started--> Running --Exited(ok)--> Completed
//!    |                    |
//!    |                    +--Exited(err)/Terminated--> Failed
//!    +--LaunchFailed / Exited---------------------------> Failed|Completed
//! ```

use chrono::{DateTime, Utc};

use crate::registry::Task;
use crate::types::{TaskOutcome, TaskStatus};

/// A requested change to a task's lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The process was spawned.
    Started { pid: u32, at: DateTime<Utc> },
    /// The process could not be spawned (or its directory/log prepared).
    LaunchFailed { at: DateTime<Utc> },
    /// The exit watcher observed the process end.
    Exited {
        pid: u32,
        outcome: TaskOutcome,
        at: DateTime<Utc>,
    },
    /// A termination signal was delivered.
    Terminated { at: DateTime<Utc> },
}

/// Result of applying a [`Transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Applied { from: TaskStatus, to: TaskStatus },
    /// The transition is not valid from the task's current status; the
    /// task was left untouched.
    Ignored { status: TaskStatus },
}

impl StepOutcome {
    pub fn is_applied(self) -> bool {
        matches!(self, StepOutcome::Applied { .. })
    }
}

/// Apply `transition` to `task` if it is legal from the current status.
///
/// Status only moves forward and terminal states are final, so a late exit
/// event for a terminated task, or a `Started` arriving after the exit was
/// already recorded, is ignored.
pub fn apply(task: &mut Task, transition: Transition) -> StepOutcome {
    let from = task.status;

    match (from, transition) {
        (TaskStatus::Pending, Transition::Started { pid, at }) => {
            task.pid = Some(pid);
            task.start_time = at;
            task.status = TaskStatus::Running;
        }
        (TaskStatus::Pending, Transition::LaunchFailed { at }) => {
            finish(task, TaskStatus::Failed, at);
        }
        // The exit watcher can win the race against the creation path
        // recording `Started`; the process did run, so keep its pid. The
        // spawn time was never recorded, so the run is reported as ending
        // where it started.
        (TaskStatus::Pending, Transition::Exited { pid, outcome, at }) => {
            task.pid = Some(pid);
            task.start_time = at;
            finish(task, exit_status(&outcome), at);
        }
        (TaskStatus::Running, Transition::Exited { outcome, at, .. }) => {
            finish(task, exit_status(&outcome), at);
        }
        (TaskStatus::Running, Transition::Terminated { at }) => {
            finish(task, TaskStatus::Failed, at);
        }
        (status, _) => return StepOutcome::Ignored { status },
    }

    StepOutcome::Applied {
        from,
        to: task.status,
    }
}

fn finish(task: &mut Task, status: TaskStatus, at: DateTime<Utc>) {
    task.status = status;
    task.end_time = Some(at);
}

fn exit_status(outcome: &TaskOutcome) -> TaskStatus {
    if outcome.is_success() {
        TaskStatus::Completed
    } else {
        TaskStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::types::TaskId;

    fn pending() -> Task {
        Task::pending(
            TaskId::generate(),
            "engine".to_string(),
            PathBuf::from("/w"),
            PathBuf::from("/w/render.log"),
        )
    }

    fn running(pid: u32) -> Task {
        let mut t = pending();
        apply(&mut t, Transition::Started { pid, at: Utc::now() });
        t
    }

    #[test]
    fn start_sets_pid_and_overwrites_start_time() {
        let mut t = pending();
        let created = t.start_time;
        let at = created + chrono::Duration::seconds(1);

        let step = apply(&mut t, Transition::Started { pid: 42, at });

        assert_eq!(
            step,
            StepOutcome::Applied {
                from: TaskStatus::Pending,
                to: TaskStatus::Running
            }
        );
        assert_eq!(t.pid, Some(42));
        assert_eq!(t.start_time, at);
        assert!(t.end_time.is_none());
    }

    #[test]
    fn launch_failure_ends_pending_task() {
        let mut t = pending();
        assert!(apply(&mut t, Transition::LaunchFailed { at: Utc::now() }).is_applied());
        assert_eq!(t.status, TaskStatus::Failed);
        assert!(t.end_time.is_some());
        assert!(t.pid.is_none());
    }

    #[test]
    fn exit_code_decides_terminal_status() {
        let mut ok = running(1);
        apply(
            &mut ok,
            Transition::Exited {
                pid: 1,
                outcome: TaskOutcome::Success,
                at: Utc::now(),
            },
        );
        assert_eq!(ok.status, TaskStatus::Completed);

        let mut bad = running(2);
        apply(
            &mut bad,
            Transition::Exited {
                pid: 2,
                outcome: TaskOutcome::Failed(3),
                at: Utc::now(),
            },
        );
        assert_eq!(bad.status, TaskStatus::Failed);

        let mut err = running(3);
        apply(
            &mut err,
            Transition::Exited {
                pid: 3,
                outcome: TaskOutcome::WaitError("boom".into()),
                at: Utc::now(),
            },
        );
        assert_eq!(err.status, TaskStatus::Failed);
    }

    #[test]
    fn exit_after_termination_is_ignored() {
        let mut t = running(7);
        apply(&mut t, Transition::Terminated { at: Utc::now() });
        let end = t.end_time;

        let step = apply(
            &mut t,
            Transition::Exited {
                pid: 7,
                outcome: TaskOutcome::Success,
                at: Utc::now(),
            },
        );

        assert_eq!(
            step,
            StepOutcome::Ignored {
                status: TaskStatus::Failed
            }
        );
        assert_eq!(t.end_time, end);
    }

    #[test]
    fn exit_before_start_keeps_pid_and_drops_late_start() {
        let mut t = pending();
        let at = t.start_time + chrono::Duration::seconds(2);
        apply(
            &mut t,
            Transition::Exited {
                pid: 9,
                outcome: TaskOutcome::Success,
                at,
            },
        );
        assert_eq!(t.status, TaskStatus::Completed);
        assert_eq!(t.pid, Some(9));
        assert_eq!(t.start_time, at);
        assert_eq!(t.end_time, Some(at));

        let step = apply(&mut t, Transition::Started { pid: 9, at: Utc::now() });
        assert!(!step.is_applied());
        assert_eq!(t.status, TaskStatus::Completed);
    }

    #[test]
    fn pending_task_cannot_be_terminated() {
        let mut t = pending();
        assert!(!apply(&mut t, Transition::Terminated { at: Utc::now() }).is_applied());
        assert_eq!(t.status, TaskStatus::Pending);
    }

    #[test]
    fn terminal_states_are_final() {
        let mut t = running(5);
        apply(
            &mut t,
            Transition::Exited {
                pid: 5,
                outcome: TaskOutcome::Success,
                at: Utc::now(),
            },
        );
        for transition in [
            Transition::Started { pid: 6, at: Utc::now() },
            Transition::LaunchFailed { at: Utc::now() },
            Transition::Terminated { at: Utc::now() },
        ] {
            assert!(!apply(&mut t, transition).is_applied());
        }
        assert_eq!(t.status, TaskStatus::Completed);
        assert_eq!(t.pid, Some(5));
    }
}
