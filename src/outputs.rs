// src/outputs.rs

//! Read-only access to artifacts the render engine leaves in a task's
//! work dir: frame images and an optional assembled video.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::config::validate::is_plain_file_name;
use crate::errors::{RenderError, Result};

static FIRST_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("number regex is valid"));

const FRAME_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// A frame image and the content type to serve it with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

/// Frame image names in `output_dir`, ordered by the first number in each
/// name (names without one sort as 0). A missing directory is empty.
pub async fn list_frames(output_dir: &Path) -> Result<Vec<String>> {
    let mut entries = match tokio::fs::read_dir(output_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut frames = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_frame_name(&name) {
            frames.push(name);
        }
    }

    frames.sort_by(|a, b| {
        frame_number(a)
            .cmp(&frame_number(b))
            .then_with(|| a.cmp(b))
    });
    Ok(frames)
}

/// Read one frame from `output_dir`.
///
/// `file_name` must be a bare file name; anything that could leave the
/// directory is rejected.
pub async fn read_frame(output_dir: &Path, file_name: &str) -> Result<Frame> {
    if !is_plain_file_name(file_name) || file_name.contains("..") {
        return Err(RenderError::Validation(format!(
            "invalid frame file name: {file_name:?}"
        )));
    }

    match tokio::fs::read(output_dir.join(file_name)).await {
        Ok(bytes) => Ok(Frame {
            bytes,
            content_type: content_type_for(file_name),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(RenderError::NotFound(format!("frame {file_name}")))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn video_exists(video_path: &Path) -> bool {
    tokio::fs::try_exists(video_path).await.unwrap_or(false)
}

/// An assembled video on disk, served by streaming from `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFile {
    pub path: PathBuf,
    pub size: u64,
}

pub async fn video_file(video_path: &Path) -> Result<VideoFile> {
    match tokio::fs::metadata(video_path).await {
        Ok(meta) if meta.is_file() => Ok(VideoFile {
            path: video_path.to_path_buf(),
            size: meta.len(),
        }),
        Ok(_) => Err(RenderError::NotFound("video".to_string())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(RenderError::NotFound("video".to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Inclusive byte range within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// How a `Range` header applies to a file of `size` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    /// No usable single range; serve the whole file.
    Full,
    Partial(ByteRange),
    /// Syntactically valid but outside the file.
    Unsatisfiable,
}

/// Interpret a `Range: bytes=...` header.
///
/// Supports `start-`, `start-end` and the suffix form `-n`. The end is
/// clamped to the file. Multi-range and malformed headers fall back to the
/// full file.
pub fn parse_range(header: Option<&str>, size: u64) -> RangeRequest {
    let Some(ranges) = header.and_then(|h| h.trim().strip_prefix("bytes=")) else {
        return RangeRequest::Full;
    };
    if ranges.contains(',') {
        return RangeRequest::Full;
    }
    let Some((start, end)) = ranges.trim().split_once('-') else {
        return RangeRequest::Full;
    };

    let (start, end) = match (start.trim(), end.trim()) {
        ("", "") => return RangeRequest::Full,
        ("", suffix) => match suffix.parse::<u64>() {
            Ok(0) => return RangeRequest::Unsatisfiable,
            Ok(n) => (size.saturating_sub(n), size.saturating_sub(1)),
            Err(_) => return RangeRequest::Full,
        },
        (start, "") => match start.parse::<u64>() {
            Ok(s) => (s, size.saturating_sub(1)),
            Err(_) => return RangeRequest::Full,
        },
        (start, end) => match (start.parse::<u64>(), end.parse::<u64>()) {
            (Ok(s), Ok(e)) if s <= e => (s, e.min(size.saturating_sub(1))),
            _ => return RangeRequest::Full,
        },
    };

    if size == 0 || start >= size {
        return RangeRequest::Unsatisfiable;
    }
    RangeRequest::Partial(ByteRange { start, end })
}

fn is_frame_name(name: &str) -> bool {
    extension(name).is_some_and(|ext| FRAME_EXTENSIONS.contains(&ext.as_str()))
}

fn extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

fn frame_number(name: &str) -> u64 {
    FIRST_NUMBER
        .find(name)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

fn content_type_for(name: &str) -> &'static str {
    match extension(name).as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}
