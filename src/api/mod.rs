// src/api/mod.rs

//! HTTP API over the task manager.
//!
//! - [`router`] maps requests to manager operations. It works on plain
//!   [`ApiRequest`]/[`ApiResponse`] values so it can be tested without a
//!   socket.
//! - [`server`] runs the `tiny_http` accept loop on its own thread and
//!   hands each request to the Tokio runtime.
//! - [`query`] parses request targets.
//!
//! Large files (videos) are returned as [`ResponseBody::File`] and streamed
//! by the server.

pub mod query;
pub mod router;
pub mod server;

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::json;

pub use router::Router;
pub use server::{ServerHandle, serve};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Other,
}

/// A request as seen by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    /// Header names are lowercased.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl ApiRequest {
    /// Build a request from a raw target such as `/api/render?taskId=x`.
    pub fn new(method: Method, target: &str, body: Vec<u8>) -> Self {
        let (path, query) = query::split_target(target);
        Self {
            method,
            path,
            query,
            headers: HashMap::new(),
            body,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Non-empty query parameter.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Payload of an [`ApiResponse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    Bytes(Vec<u8>),
    /// `len` bytes of the file at `path`, starting at `offset`; streamed
    /// by the server instead of being loaded into memory.
    File {
        path: PathBuf,
        offset: u64,
        len: u64,
    },
}

/// A response produced by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: &'static str,
    /// Extra headers besides `Content-Type` and `Content-Length`.
    pub headers: Vec<(&'static str, String)>,
    pub body: ResponseBody,
}

impl ApiResponse {
    pub fn json(status: u16, value: &impl Serialize) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::bytes_with_status(status, "application/json", body),
            Err(e) => Self::error(500, &format!("failed to encode response: {e}")),
        }
    }

    /// `{"error": message}` with the given status.
    pub fn error(status: u16, message: &str) -> Self {
        Self::bytes_with_status(
            status,
            "application/json",
            json!({ "error": message }).to_string().into_bytes(),
        )
    }

    pub fn bytes(content_type: &'static str, body: Vec<u8>) -> Self {
        Self::bytes_with_status(200, content_type, body)
    }

    fn bytes_with_status(status: u16, content_type: &'static str, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type,
            headers: Vec::new(),
            body: ResponseBody::Bytes(body),
        }
    }

    pub fn file(status: u16, content_type: &'static str, path: PathBuf, offset: u64, len: u64) -> Self {
        Self {
            status,
            content_type,
            headers: Vec::new(),
            body: ResponseBody::File { path, offset, len },
        }
    }

    pub fn with_header(mut self, name: &'static str, value: String) -> Self {
        self.headers.push((name, value));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// In-memory body; `None` for streamed files.
    pub fn body_bytes(&self) -> Option<&[u8]> {
        match &self.body {
            ResponseBody::Bytes(bytes) => Some(bytes.as_slice()),
            ResponseBody::File { .. } => None,
        }
    }

    /// Decode the body as JSON (for tests and clients).
    pub fn json_body(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_slice(self.body_bytes().unwrap_or_default())
    }
}
