// src/progress/mod.rs

//! Render progress derived from task logs.
//!
//! [`parser`] is pure; this module adds the (uncached) file read around it.

pub mod parser;

use std::io;
use std::path::Path;

use crate::errors::Result;

pub use parser::{ParseOptions, ProgressReport, parse_log};

/// Read a log file as text, tolerating invalid UTF-8.
///
/// Returns `Ok(None)` when the file does not exist yet.
pub async fn read_log(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Re-read the log at `path` and parse it.
///
/// A missing log yields an all-zero report rather than an error.
pub async fn read_progress(path: &Path, opts: &ParseOptions) -> Result<ProgressReport> {
    Ok(read_log(path)
        .await?
        .map(|text| parse_log(&text, opts))
        .unwrap_or_default())
}
