// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [server]
/// bind = "127.0.0.1:3000"
///
/// [storage]
/// upload_dir = "uploads"
/// tasks_dir = "uploads/tasks"
///
/// [engine]
/// path = "/opt/blender/blender"
///
/// [progress]
/// tail_lines = 50
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub progress: ProgressSection,
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    /// Socket address the HTTP API listens on.
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// `[storage]` section: where uploads and task directories live.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSection {
    /// Directory that `/uploads/` in submitted commands is rewritten to.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Parent of every per-task working directory.
    #[serde(default = "default_tasks_dir")]
    pub tasks_dir: PathBuf,

    #[serde(default = "default_log_file_name")]
    pub log_file_name: String,

    /// Subdirectory of a task's work dir where the engine writes frames.
    #[serde(default = "default_output_dir_name")]
    pub output_dir_name: String,

    #[serde(default = "default_video_file_name")]
    pub video_file_name: String,

    /// Largest accepted upload, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_tasks_dir() -> PathBuf {
    PathBuf::from("uploads").join("tasks")
}

fn default_log_file_name() -> String {
    "render.log".to_string()
}

fn default_output_dir_name() -> String {
    "output".to_string()
}

fn default_video_file_name() -> String {
    "output.mp4".to_string()
}

fn default_max_upload_bytes() -> u64 {
    crate::uploads::DEFAULT_MAX_UPLOAD_BYTES
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            tasks_dir: default_tasks_dir(),
            log_file_name: default_log_file_name(),
            output_dir_name: default_output_dir_name(),
            video_file_name: default_video_file_name(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    /// Absolute path of the render engine binary.
    ///
    /// When unset, a per-platform default is used (see
    /// [`crate::exec::command::default_engine_path`]).
    #[serde(default)]
    pub path: Option<String>,

    /// Leading command word replaced by `path` on submission.
    #[serde(default = "default_engine_alias")]
    pub alias: String,
}

fn default_engine_alias() -> String {
    "blender".to_string()
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            path: None,
            alias: default_engine_alias(),
        }
    }
}

/// `[progress]` section: log parsing knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProgressSection {
    /// How many trailing log lines a progress query returns.
    #[serde(default = "default_tail_lines")]
    pub tail_lines: usize,

    /// How many leading log lines are searched for the `Args:` marker.
    #[serde(default = "default_args_lookahead")]
    pub args_lookahead: usize,
}

fn default_tail_lines() -> usize {
    50
}

fn default_args_lookahead() -> usize {
    5
}

impl Default for ProgressSection {
    fn default() -> Self {
        Self {
            tail_lines: default_tail_lines(),
            args_lookahead: default_args_lookahead(),
        }
    }
}

/// Engine settings after the binary path has been resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub path: String,
    pub alias: String,
}

/// Validated configuration.
///
/// Only constructible through `TryFrom<RawConfigFile>` (see `validate.rs`)
/// or [`ConfigFile::new_unchecked`] for tests and builders.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub server: ServerSection,
    pub storage: StorageSection,
    pub engine: EngineConfig,
    pub progress: ProgressSection,
}

impl ConfigFile {
    pub fn new_unchecked(
        server: ServerSection,
        storage: StorageSection,
        engine: EngineConfig,
        progress: ProgressSection,
    ) -> Self {
        Self {
            server,
            storage,
            engine,
            progress,
        }
    }
}
