//! Request routing dispatch module
//!
//! Entry point for HTTP request processing: route resolution, method
//! checks, body collection and dispatch to the arithmetic handlers.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::{CONTENT_LENGTH, REFERER, USER_AGENT};
use hyper::{Method, Request, Response, StatusCode};

use crate::calc::{self, CalcError, Operation, OperationResult, StatusResponse};
use crate::config::{AppState, HttpConfig};
use crate::http;
use crate::logger::{self, AccessLogEntry};

const STATUS_ALLOW: &str = "GET, HEAD, OPTIONS";
const OPERATION_ALLOW: &str = "POST, OPTIONS";

/// Known routes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Status,
    Operation(Operation),
}

impl Route {
    pub fn resolve(path: &str) -> Option<Self> {
        if path == "/" {
            return Some(Self::Status);
        }
        Operation::from_path(path).map(Self::Operation)
    }

    const fn allow(self) -> &'static str {
        match self {
            Self::Status => STATUS_ALLOW,
            Self::Operation(_) => OPERATION_ALLOW,
        }
    }
}

/// Why a request body could not be used
enum BodyError {
    TooLarge,
    Unreadable,
}

/// Main entry point for HTTP request handling
pub async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    peer_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    let mut entry = state
        .access_log()
        .then(|| access_entry(&req, peer_addr));

    let http_config = &state.config.http;
    let method = req.method().clone();
    let route = Route::resolve(req.uri().path());

    let response = match route {
        None => http::build_404_response(http_config),
        Some(route) if method == Method::OPTIONS => {
            http::build_options_response(route.allow(), http_config)
        }
        Some(Route::Status) if method == Method::GET || method == Method::HEAD => {
            status_response(http_config, method == Method::HEAD)
        }
        Some(Route::Operation(op)) if method == Method::POST => {
            match read_body(req, http_config.max_body_size).await {
                Ok(body) => handle_operation(op, &body, http_config),
                Err(BodyError::TooLarge) => http::build_413_response(http_config),
                Err(BodyError::Unreadable) => {
                    calc_error_response(CalcError::MalformedBody, http_config)
                }
            }
        }
        Some(route) => {
            logger::log_debug(&format!("Method not allowed: {method}"));
            http::build_405_response(route.allow(), http_config)
        }
    };

    if let Some(entry) = entry.as_mut() {
        entry.status = response.status().as_u16();
        entry.body_bytes = usize::try_from(response.body().size_hint().exact().unwrap_or(0))
            .unwrap_or(usize::MAX);
        entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        logger::log_access(entry, &state.config.logging.access_log_format);
    }

    Ok(response)
}

/// Evaluate one arithmetic request body and shape the response.
pub fn handle_operation(op: Operation, body: &[u8], http_config: &HttpConfig) -> Response<Full<Bytes>> {
    respond_with(op, http_config, || calc::evaluate(op, body))
}

/// Run `evaluate` and map its outcome to a response.
///
/// A panic while evaluating is reported as a 500 instead of tearing down
/// the connection.
fn respond_with(
    op: Operation,
    http_config: &HttpConfig,
    evaluate: impl FnOnce() -> Result<OperationResult, CalcError>,
) -> Response<Full<Bytes>> {
    match std::panic::catch_unwind(AssertUnwindSafe(evaluate)) {
        Ok(Ok(result)) => http::json_response(StatusCode::OK, &result, http_config),
        Ok(Err(err)) => {
            logger::log_debug(&format!("Rejected /{} request: {err}", op.name()));
            calc_error_response(err, http_config)
        }
        Err(_) => {
            logger::log_error(&format!("Handler for /{} panicked", op.name()));
            http::build_500_response(http_config)
        }
    }
}

fn calc_error_response(err: CalcError, http_config: &HttpConfig) -> Response<Full<Bytes>> {
    http::error_response(err.status(), &err.to_string(), http_config)
}

fn status_response(http_config: &HttpConfig, is_head: bool) -> Response<Full<Bytes>> {
    let response = http::json_response(StatusCode::OK, &StatusResponse::current(), http_config);
    if !is_head {
        return response;
    }
    let len = usize::try_from(response.body().size_hint().exact().unwrap_or(0)).unwrap_or(0);
    http::strip_body(response, len)
}

/// Collect the request body, enforcing the configured size limit
///
/// A declared `Content-Length` over the limit is rejected before reading.
async fn read_body(
    req: Request<hyper::body::Incoming>,
    max_body_size: u64,
) -> Result<Bytes, BodyError> {
    let declared = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|size| size > max_body_size) {
        logger::log_warning(&format!(
            "Request body too large: {} bytes (max: {max_body_size})",
            declared.unwrap_or_default()
        ));
        return Err(BodyError::TooLarge);
    }

    let limit = usize::try_from(max_body_size).unwrap_or(usize::MAX);
    match Limited::new(req.into_body(), limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            logger::log_warning(&format!("Streamed request body exceeded {max_body_size} bytes"));
            Err(BodyError::TooLarge)
        }
        Err(e) => {
            logger::log_debug(&format!("Failed to read request body: {e}"));
            Err(BodyError::Unreadable)
        }
    }
}

fn access_entry(req: &Request<hyper::body::Incoming>, peer_addr: SocketAddr) -> AccessLogEntry {
    let header = |name: hyper::header::HeaderName| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    };

    let mut entry = AccessLogEntry::new(
        peer_addr.ip().to_string(),
        req.method().to_string(),
        req.uri().path().to_string(),
    );
    entry.query = req.uri().query().map(ToString::to_string);
    entry.http_version = match req.version() {
        hyper::Version::HTTP_10 => "1.0",
        hyper::Version::HTTP_2 => "2",
        _ => "1.1",
    }
    .to_string();
    entry.referer = header(REFERER);
    entry.user_agent = header(USER_AGENT);
    entry
}
