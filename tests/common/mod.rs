#![allow(dead_code)]

pub use rendertask_test_utils::builders;
pub use rendertask_test_utils::{
    fake_harness, harness, init_tracing, layout_in, wait_for_status, with_timeout,
};

use std::path::{Path, PathBuf};

/// Tasks root inside a temp dir, created on demand by the manager.
pub fn tasks_dir(root: &Path) -> PathBuf {
    root.join("tasks")
}

/// Log text of a task as it is on disk right now.
pub fn read_log(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_default()
}
