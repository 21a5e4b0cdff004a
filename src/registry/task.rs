// src/registry/task.rs

//! The task record and its public snapshot shapes.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{TaskId, TaskStatus};

/// One render job and its tracked metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    /// Fully resolved command line.
    pub command: String,
    pub status: TaskStatus,
    /// Record creation time, overwritten when the process starts.
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub work_dir: PathBuf,
    pub log_file: PathBuf,
    /// Set once the process is spawned; kept after exit but only used for
    /// termination while `Running`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl Task {
    /// A freshly created task, not yet started.
    pub fn pending(id: TaskId, command: String, work_dir: PathBuf, log_file: PathBuf) -> Self {
        Self {
            id,
            command,
            status: TaskStatus::Pending,
            start_time: Utc::now(),
            end_time: None,
            work_dir,
            log_file,
            pid: None,
        }
    }
}

/// A task together with the log content read at query time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSnapshot {
    #[serde(flatten)]
    pub task: Task,
    /// Full log text; absent when the log file does not exist.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_task_serializes_without_optional_fields() {
        let task = Task::pending(
            TaskId::generate(),
            "engine -b x".to_string(),
            PathBuf::from("/tmp/t"),
            PathBuf::from("/tmp/t/render.log"),
        );
        let json = serde_json::to_value(&task).unwrap();

        assert_eq!(json["status"], "pending");
        assert_eq!(json["workDir"], "/tmp/t");
        assert_eq!(json["logFile"], "/tmp/t/render.log");
        assert!(json.get("startTime").is_some());
        assert!(json.get("endTime").is_none());
        assert!(json.get("pid").is_none());
    }

    #[test]
    fn snapshot_flattens_task_fields() {
        let task = Task::pending(
            TaskId::generate(),
            "engine".to_string(),
            PathBuf::from("/w"),
            PathBuf::from("/w/render.log"),
        );
        let snap = TaskSnapshot {
            task,
            logs: Some("start task\n".to_string()),
        };
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["command"], "engine");
        assert_eq!(json["logs"], "start task\n");
    }
}
