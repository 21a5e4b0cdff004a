// src/uploads.rs

//! Scene files uploaded ahead of a render submission.
//!
//! Uploads are stored flat in the upload dir as `<millis>-<name>`. The
//! returned `/uploads/<savedAs>` path is what clients put in render
//! commands; submission rewrites it to the absolute upload dir.

use std::io;
use std::path::Path;

use chrono::Utc;
use serde::Serialize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::config::validate::is_plain_file_name;
use crate::errors::{RenderError, Result};

/// Default cap on a single upload (1 GiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 1024 * 1024 * 1024;

/// Response body for a stored upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredUpload {
    pub message: String,
    /// Name as sent by the client.
    pub file_name: String,
    /// Name on disk.
    pub saved_as: String,
    /// Path to use in a render command.
    pub path: String,
}

/// Write `bytes` to `upload_dir` under a timestamped name.
///
/// Never overwrites an existing upload: a name collision bumps the
/// timestamp until a free name is found.
pub async fn save_upload(upload_dir: &Path, file_name: &str, bytes: &[u8]) -> Result<StoredUpload> {
    if bytes.is_empty() {
        return Err(RenderError::Validation("No file uploaded".to_string()));
    }
    if !is_plain_file_name(file_name) {
        return Err(RenderError::Validation(format!(
            "invalid upload file name: {file_name:?}"
        )));
    }

    tokio::fs::create_dir_all(upload_dir).await?;

    let mut stamp = Utc::now().timestamp_millis();
    loop {
        let saved_as = format!("{stamp}-{file_name}");
        let target = upload_dir.join(&saved_as);

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await
        {
            Ok(mut file) => {
                file.write_all(bytes).await?;
                file.flush().await?;
                info!(file = %saved_as, bytes = bytes.len(), "upload stored");
                return Ok(StoredUpload {
                    message: "File uploaded successfully".to_string(),
                    file_name: file_name.to_string(),
                    path: format!("/uploads/{saved_as}"),
                    saved_as,
                });
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => stamp += 1,
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_is_stored_with_timestamp_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = dir.path().join("uploads");

        let stored = save_upload(&uploads, "scene.blend", b"BLENDER").await.unwrap();

        assert_eq!(stored.file_name, "scene.blend");
        assert!(stored.saved_as.ends_with("-scene.blend"));
        assert_eq!(stored.path, format!("/uploads/{}", stored.saved_as));
        assert_eq!(std::fs::read(uploads.join(&stored.saved_as)).unwrap(), b"BLENDER");
    }

    #[tokio::test]
    async fn same_name_twice_does_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();

        let a = save_upload(dir.path(), "s.blend", b"a").await.unwrap();
        let b = save_upload(dir.path(), "s.blend", b"b").await.unwrap();

        assert_ne!(a.saved_as, b.saved_as);
        assert_eq!(std::fs::read(dir.path().join(&a.saved_as)).unwrap(), b"a");
        assert_eq!(std::fs::read(dir.path().join(&b.saved_as)).unwrap(), b"b");
    }

    #[tokio::test]
    async fn rejects_empty_body_and_unsafe_names() {
        let dir = tempfile::tempdir().unwrap();

        let err = save_upload(dir.path(), "s.blend", b"").await.unwrap_err();
        assert!(matches!(err, RenderError::Validation(_)));

        for bad in ["../s.blend", "a/b.blend", "..", ""] {
            let err = save_upload(dir.path(), bad, b"x").await.unwrap_err();
            assert!(matches!(err, RenderError::Validation(_)), "{bad:?}");
        }
    }
}
