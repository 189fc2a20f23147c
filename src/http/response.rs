//! HTTP response building module
//!
//! JSON response builders shared by every route. Each builder falls back to a
//! bare response if the builder itself fails, so callers never see an error.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, ALLOW, CONTENT_LENGTH, CONTENT_TYPE,
    SERVER,
};
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::calc::ErrorResponse;
use crate::config::HttpConfig;

const JSON_CONTENT_TYPE: &str = "application/json";
const INTERNAL_ERROR_BODY: &str = r#"{"error":"Internal server error"}"#;

/// Build a JSON response; serialization failure becomes a 500
pub fn json_response<T: Serialize>(
    status: StatusCode,
    body: &T,
    http: &HttpConfig,
) -> Response<Full<Bytes>> {
    match serde_json::to_vec(body) {
        Ok(json) => build_json(status, Bytes::from(json), http),
        Err(e) => {
            crate::logger::log_error(&format!("Failed to serialize response: {e}"));
            build_500_response(http)
        }
    }
}

/// Build `{"error": message}` with the given status
pub fn error_response(
    status: StatusCode,
    message: &str,
    http: &HttpConfig,
) -> Response<Full<Bytes>> {
    json_response(status, &ErrorResponse::new(message), http)
}

/// Build 404 Not Found response
pub fn build_404_response(http: &HttpConfig) -> Response<Full<Bytes>> {
    error_response(StatusCode::NOT_FOUND, "Not Found", http)
}

/// Build 405 Method Not Allowed response listing the allowed methods
pub fn build_405_response(allow: &'static str, http: &HttpConfig) -> Response<Full<Bytes>> {
    let mut response = error_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed", http);
    response
        .headers_mut()
        .insert(ALLOW, HeaderValue::from_static(allow));
    response
}

/// Build 413 Payload Too Large response
pub fn build_413_response(http: &HttpConfig) -> Response<Full<Bytes>> {
    error_response(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large", http)
}

/// Build 500 Internal Server Error response
pub fn build_500_response(http: &HttpConfig) -> Response<Full<Bytes>> {
    build_json(
        StatusCode::INTERNAL_SERVER_ERROR,
        Bytes::from_static(INTERNAL_ERROR_BODY.as_bytes()),
        http,
    )
}

/// Build OPTIONS response (preflight request)
pub fn build_options_response(allow: &'static str, http: &HttpConfig) -> Response<Full<Bytes>> {
    let mut builder = Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header(ALLOW, allow)
        .header(SERVER, &http.server_name);

    if http.enable_cors {
        builder = builder
            .header(ACCESS_CONTROL_ALLOW_ORIGIN, "*")
            .header(ACCESS_CONTROL_ALLOW_METHODS, allow)
            .header(ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type")
            .header(ACCESS_CONTROL_MAX_AGE, "86400");
    }

    builder.body(Full::new(Bytes::new())).unwrap_or_else(|e| {
        log_build_error("OPTIONS", &e);
        Response::new(Full::new(Bytes::new()))
    })
}

/// Drop the body of a response to a HEAD request, keeping its length header
pub fn strip_body(response: Response<Full<Bytes>>, body_len: usize) -> Response<Full<Bytes>> {
    let (mut parts, _) = response.into_parts();
    parts.headers.insert(CONTENT_LENGTH, HeaderValue::from(body_len));
    Response::from_parts(parts, Full::new(Bytes::new()))
}

fn build_json(status: StatusCode, body: Bytes, http: &HttpConfig) -> Response<Full<Bytes>> {
    let mut builder = Response::builder()
        .status(status)
        .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
        .header(SERVER, &http.server_name);

    if http.enable_cors {
        builder = builder.header(ACCESS_CONTROL_ALLOW_ORIGIN, "*");
    }

    builder.body(Full::new(body)).unwrap_or_else(|e| {
        log_build_error(status.as_str(), &e);
        let mut fallback = Response::new(Full::new(Bytes::from_static(
            INTERNAL_ERROR_BODY.as_bytes(),
        )));
        *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        fallback
    })
}

/// Log response build error
fn log_build_error(status: &str, error: &hyper::http::Error) {
    crate::logger::log_error(&format!("Failed to build {status} response: {error}"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    fn http_config(enable_cors: bool) -> HttpConfig {
        HttpConfig {
            server_name: "calc-test".to_string(),
            enable_cors,
            max_body_size: 1024,
        }
    }

    async fn body_json(response: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_error_response_shape() {
        let response = error_response(
            StatusCode::BAD_REQUEST,
            "Division by zero is not allowed",
            &http_config(false),
        );
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()[SERVER], "calc-test");
        assert!(response.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"error": "Division by zero is not allowed"})
        );
    }

    #[tokio::test]
    async fn test_500_body() {
        let response = build_500_response(&http_config(false));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"error": "Internal server error"})
        );
    }

    #[test]
    fn test_cors_header() {
        let response = build_404_response(&http_config(true));
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[test]
    fn test_405_allow_header() {
        let response = build_405_response("POST, OPTIONS", &http_config(false));
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "POST, OPTIONS");
    }

    #[test]
    fn test_options_preflight() {
        let response = build_options_response("POST, OPTIONS", &http_config(true));
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_METHODS], "POST, OPTIONS");
        assert_eq!(response.headers()[ACCESS_CONTROL_MAX_AGE], "86400");

        let response = build_options_response("POST, OPTIONS", &http_config(false));
        assert!(response.headers().get(ACCESS_CONTROL_ALLOW_METHODS).is_none());
    }

    #[tokio::test]
    async fn test_strip_body() {
        let response = strip_body(build_404_response(&http_config(false)), 21);
        assert_eq!(response.headers()[CONTENT_LENGTH], "21");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.is_empty());
    }
}
