// src/api/server.rs

//! `tiny_http` front end.
//!
//! `tiny_http` is blocking, so the accept loop runs on a dedicated OS
//! thread. Each request body is read there, then the request is handed to
//! the Tokio runtime so slow handlers never hold up accepting the next
//! connection.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::anyhow;
use tiny_http::{Header, Request, Response, Server, StatusCode};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::api::{ApiRequest, ApiResponse, Method, ResponseBody, Router, query};
use crate::errors::Result;
use crate::exec::ProcessBackend;

/// Running HTTP server. Dropping it without calling
/// [`ServerHandle::shutdown`] leaves the accept thread running.
pub struct ServerHandle {
    server: Arc<Server>,
    addr: Option<SocketAddr>,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}

impl ServerHandle {
    /// Actual bound address (useful with port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    /// Stop accepting requests and wait for the accept thread to finish.
    pub fn shutdown(mut self) {
        self.server.unblock();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("http accept thread panicked");
            }
        }
        info!("http server stopped");
    }
}

/// Bind `bind` and start serving `router` on a background thread.
///
/// Handlers run on `runtime`.
pub fn serve<B>(bind: &str, router: Router<B>, runtime: Handle) -> Result<ServerHandle>
where
    B: ProcessBackend + 'static,
{
    let server = Server::http(bind).map_err(|e| anyhow!("binding http server to {bind}: {e}"))?;
    let server = Arc::new(server);
    let addr = server.server_addr().to_ip();

    info!(addr = ?addr, "http server listening");

    let accept_server = Arc::clone(&server);
    let thread = std::thread::Builder::new()
        .name("http-accept".to_string())
        .spawn(move || accept_loop(&accept_server, router, runtime))?;

    Ok(ServerHandle {
        server,
        addr,
        thread: Some(thread),
    })
}

fn accept_loop<B>(server: &Server, router: Router<B>, runtime: Handle)
where
    B: ProcessBackend + 'static,
{
    for mut request in server.incoming_requests() {
        let api_request = match read_request(&mut request, &router) {
            Ok(r) => r,
            Err(response) => {
                respond(request, response);
                continue;
            }
        };

        let router = router.clone();
        runtime.spawn(async move {
            let response = router.handle(api_request).await;
            if let Err(e) = tokio::task::spawn_blocking(move || respond(request, response)).await {
                warn!(error = %e, "http response task failed");
            }
        });
    }

    debug!("http accept loop finished");
}

/// Read method, target, headers and body. Bodies over the route's limit
/// are rejected with 413 without being buffered in full.
fn read_request<B: ProcessBackend>(
    request: &mut Request,
    router: &Router<B>,
) -> std::result::Result<ApiRequest, ApiResponse> {
    let method = match request.method() {
        tiny_http::Method::Get => Method::Get,
        tiny_http::Method::Post => Method::Post,
        _ => Method::Other,
    };

    let (path, _) = query::split_target(request.url());
    let limit = router.body_limit(&path);
    let too_large = || ApiResponse::error(413, "Request body too large");

    if request.body_length().is_some_and(|len| len as u64 > limit) {
        return Err(too_large());
    }

    let mut body = Vec::new();
    request
        .as_reader()
        .take(limit.saturating_add(1))
        .read_to_end(&mut body)
        .map_err(|e| ApiResponse::error(400, &format!("failed to read request body: {e}")))?;

    if body.len() as u64 > limit {
        return Err(too_large());
    }

    let mut api_request = ApiRequest::new(method, request.url(), body);
    for header in request.headers() {
        api_request = api_request.with_header(header.field.as_str().as_str(), header.value.as_str());
    }
    Ok(api_request)
}

fn respond(request: Request, response: ApiResponse) {
    let status = response.status;
    let mut headers = Vec::with_capacity(response.headers.len() + 1);
    let extra = response.headers.iter().map(|(n, v)| (*n, v.as_str()));
    for (name, value) in std::iter::once(("Content-Type", response.content_type)).chain(extra) {
        match Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            Ok(header) => headers.push(header),
            Err(()) => debug!(header = name, "dropping invalid response header"),
        }
    }

    let result = match response.body {
        ResponseBody::Bytes(bytes) => {
            let len = bytes.len();
            request.respond(Response::new(
                StatusCode(status),
                headers,
                bytes.as_slice(),
                Some(len),
                None,
            ))
        }
        ResponseBody::File { path, offset, len } => match open_at(&path, offset) {
            Ok(file) => request.respond(Response::new(
                StatusCode(status),
                headers,
                file.take(len),
                usize::try_from(len).ok(),
                None,
            )),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to open file for response");
                let fallback = ApiResponse::error(500, "Failed to read file");
                let body = fallback.body_bytes().unwrap_or_default().to_vec();
                request.respond(Response::from_data(body).with_status_code(500))
            }
        },
    };

    if let Err(e) = result {
        debug!(status, error = %e, "failed to write http response");
    }
}

fn open_at(path: &std::path::Path, offset: u64) -> std::io::Result<File> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    Ok(file)
}
