// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

use crate::types::TaskId;

#[derive(Error, Debug)]
pub enum RenderError {
    /// Missing or malformed request input; nothing was created.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The render process could not be started. The task (if one was
    /// registered) has already been marked failed.
    #[error("Failed to launch task {task_id}: {source}")]
    Launch {
        task_id: TaskId,
        #[source]
        source: std::io::Error,
    },

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RenderError {
    /// HTTP status the API layer reports for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            RenderError::Validation(_) | RenderError::Json(_) => 400,
            RenderError::NotFound(_) => 404,
            _ => 500,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, RenderError>;
