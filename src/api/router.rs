// src/api/router.rs

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};

use crate::api::{ApiRequest, ApiResponse, Method};
use crate::config::EngineConfig;
use crate::engine::RenderTaskManager;
use crate::errors::{RenderError, Result};
use crate::exec::{ProcessBackend, resolve_command};
use crate::outputs::{RangeRequest, parse_range};
use crate::progress::ProgressReport;
use crate::types::TaskId;
use crate::uploads::{DEFAULT_MAX_UPLOAD_BYTES, save_upload};

#[derive(Debug, Deserialize)]
struct SubmitBody {
    command: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TerminateBody {
    task_id: Option<String>,
}

const UPLOAD_ROUTE: &str = "/api/upload";

/// Everything except uploads takes a small JSON body, if any.
const MAX_JSON_BODY_BYTES: u64 = 64 * 1024;

const VIDEO_CONTENT_TYPE: &str = "video/mp4";

const ROUTES: [&str; 8] = [
    "/api/render",
    "/api/render/terminate",
    "/api/render/log",
    "/api/render/frames",
    "/api/render/image",
    "/api/render/video/check",
    "/api/render/video/stream",
    UPLOAD_ROUTE,
];

/// Maps API requests to task manager operations.
pub struct Router<B: ProcessBackend> {
    manager: Arc<RenderTaskManager<B>>,
    engine: EngineConfig,
    upload_dir: PathBuf,
    max_upload_bytes: u64,
}

impl<B: ProcessBackend> Clone for Router<B> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            engine: self.engine.clone(),
            upload_dir: self.upload_dir.clone(),
            max_upload_bytes: self.max_upload_bytes,
        }
    }
}

impl<B: ProcessBackend> fmt::Debug for Router<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("engine", &self.engine)
            .field("upload_dir", &self.upload_dir)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish_non_exhaustive()
    }
}

impl<B: ProcessBackend> Router<B> {
    /// `upload_dir` should be absolute; uploads are stored there and it
    /// replaces `/uploads/` in submitted commands.
    pub fn new(manager: Arc<RenderTaskManager<B>>, engine: EngineConfig, upload_dir: PathBuf) -> Self {
        Self {
            manager,
            engine,
            upload_dir,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_upload_limit(mut self, max_upload_bytes: u64) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    pub fn manager(&self) -> &RenderTaskManager<B> {
        &self.manager
    }

    /// Largest request body accepted for `path`.
    pub fn body_limit(&self, path: &str) -> u64 {
        if path == UPLOAD_ROUTE {
            self.max_upload_bytes
        } else {
            MAX_JSON_BODY_BYTES
        }
    }

    pub async fn handle(&self, req: ApiRequest) -> ApiResponse {
        debug!(method = ?req.method, path = %req.path, "api request");

        let result = match (req.method, req.path.as_str()) {
            (Method::Post, "/api/render") => self.submit(&req).await,
            (Method::Get, "/api/render") => self.query(&req).await,
            (Method::Post, "/api/render/terminate") => self.terminate(&req).await,
            (Method::Get, "/api/render/log") => self.log(&req).await,
            (Method::Get, "/api/render/frames") => self.frames(&req).await,
            (Method::Get, "/api/render/image") => self.image(&req).await,
            (Method::Get, "/api/render/video/check") => self.video_check(&req).await,
            (Method::Get, "/api/render/video/stream") => self.video_stream(&req).await,
            (Method::Post, UPLOAD_ROUTE) => self.upload(&req).await,
            (_, path) if ROUTES.contains(&path) => {
                Ok(ApiResponse::error(405, "Method not allowed"))
            }
            _ => Ok(ApiResponse::error(404, "Not found")),
        };

        result.unwrap_or_else(|e| {
            let status = e.http_status();
            if status >= 500 {
                error!(path = %req.path, error = %e, "api request failed");
            } else {
                debug!(path = %req.path, error = %e, "api request rejected");
            }
            ApiResponse::error(status, &e.to_string())
        })
    }

    async fn submit(&self, req: &ApiRequest) -> Result<ApiResponse> {
        let body: SubmitBody = serde_json::from_slice(&req.body)?;
        let command = body
            .command
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| RenderError::Validation("Command is required".to_string()))?;

        let resolved = resolve_command(&command, &self.engine, &self.upload_dir);
        debug!(cmd = %resolved, "resolved render command");

        let task = self.manager.create_task(&resolved).await?;
        Ok(ApiResponse::json(200, &task))
    }

    async fn query(&self, req: &ApiRequest) -> Result<ApiResponse> {
        match req.param("taskId") {
            Some(raw) => {
                let id = known_id(raw)?;
                let snapshot = self.manager.get_task(&id).await?;
                Ok(ApiResponse::json(200, &snapshot))
            }
            None => Ok(ApiResponse::json(200, &self.manager.get_all_tasks())),
        }
    }

    async fn terminate(&self, req: &ApiRequest) -> Result<ApiResponse> {
        let body: TerminateBody = serde_json::from_slice(&req.body)?;
        let raw = body
            .task_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RenderError::Validation("Task ID is required".to_string()))?;

        let terminated = match raw.parse::<TaskId>() {
            Ok(id) => self.manager.terminate_task(&id).await,
            Err(_) => false,
        };

        if terminated {
            Ok(ApiResponse::json(200, &json!({ "success": true })))
        } else {
            Ok(ApiResponse::error(404, "Failed to terminate task"))
        }
    }

    async fn log(&self, req: &ApiRequest) -> Result<ApiResponse> {
        let raw = required(req, "taskId")?;
        let report = match raw.parse::<TaskId>() {
            Ok(id) => self.manager.task_progress(&id).await?,
            Err(_) => ProgressReport::default(),
        };
        Ok(ApiResponse::json(200, &report))
    }

    async fn frames(&self, req: &ApiRequest) -> Result<ApiResponse> {
        let raw = required(req, "taskId")?;
        let frames = match raw.parse::<TaskId>() {
            Ok(id) => self.manager.list_frames(&id).await?,
            Err(_) => Vec::new(),
        };
        Ok(ApiResponse::json(200, &json!({ "frames": frames })))
    }

    async fn image(&self, req: &ApiRequest) -> Result<ApiResponse> {
        let (raw, file_name) = match (req.param("taskId"), req.param("fileName")) {
            (Some(id), Some(name)) => (id, name),
            _ => {
                return Err(RenderError::Validation(
                    "Task ID and filename are required".to_string(),
                ));
            }
        };
        let id = known_id(raw)?;
        let frame = self.manager.frame(&id, file_name).await?;
        Ok(ApiResponse::bytes(frame.content_type, frame.bytes))
    }

    async fn video_check(&self, req: &ApiRequest) -> Result<ApiResponse> {
        let raw = required(req, "taskId")?;
        let exists = match raw.parse::<TaskId>() {
            Ok(id) => self.manager.video_exists(&id).await,
            Err(_) => false,
        };
        Ok(ApiResponse::json(200, &json!({ "exists": exists })))
    }

    /// Serve the assembled video, honouring a single-range `Range` header.
    async fn video_stream(&self, req: &ApiRequest) -> Result<ApiResponse> {
        let id = known_id(required(req, "taskId")?)?;
        let video = self.manager.video(&id).await?;

        let response = match parse_range(req.header("range"), video.size) {
            RangeRequest::Full => ApiResponse::file(200, VIDEO_CONTENT_TYPE, video.path, 0, video.size)
                .with_header("Accept-Ranges", "bytes".to_string()),
            RangeRequest::Partial(range) => ApiResponse::file(
                206,
                VIDEO_CONTENT_TYPE,
                video.path,
                range.start,
                range.length(),
            )
            .with_header("Accept-Ranges", "bytes".to_string())
            .with_header(
                "Content-Range",
                format!("bytes {}-{}/{}", range.start, range.end, video.size),
            ),
            RangeRequest::Unsatisfiable => ApiResponse::error(416, "Range not satisfiable")
                .with_header("Content-Range", format!("bytes */{}", video.size)),
        };
        Ok(response)
    }

    /// Store a raw request body as an upload named by `?fileName=`.
    async fn upload(&self, req: &ApiRequest) -> Result<ApiResponse> {
        if req.body.len() as u64 > self.max_upload_bytes {
            return Err(RenderError::Validation(format!(
                "File size exceeds the {} byte upload limit",
                self.max_upload_bytes
            )));
        }
        let file_name = req
            .param("fileName")
            .ok_or_else(|| RenderError::Validation("No file uploaded".to_string()))?;

        let stored = save_upload(&self.upload_dir, file_name, &req.body).await?;
        Ok(ApiResponse::json(200, &stored))
    }
}

fn required<'a>(req: &'a ApiRequest, key: &str) -> Result<&'a str> {
    req.param(key)
        .ok_or_else(|| RenderError::Validation(format!("{key} is required")))
}

/// Parse an id that must refer to an existing task; malformed ids are
/// reported as not found.
fn known_id(raw: &str) -> Result<TaskId> {
    raw.parse()
        .map_err(|_| RenderError::NotFound(format!("task {raw}")))
}
