// Server loop module
// Accepts connections until shutdown, then drains in-flight connections

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use super::connection::accept_connection;
use super::signal::{wait_for_shutdown, Shutdown};
use crate::config::AppState;
use crate::logger;

/// How long open connections may keep running after shutdown is requested
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Run the accept loop until `shutdown` triggers.
///
/// The listener is closed as soon as shutdown is requested; connections
/// already accepted get up to [`SHUTDOWN_GRACE`] to finish.
pub async fn start_server_loop(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: &Shutdown,
) -> Result<(), Box<dyn std::error::Error>> {
    let active_connections = Arc::new(AtomicUsize::new(0));
    let mut stop = shutdown.subscribe();

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        accept_connection(
                            stream,
                            peer_addr,
                            &state,
                            &active_connections,
                            shutdown.subscribe(),
                        );
                    }
                    Err(e) => {
                        logger::log_error(&format!("Failed to accept connection: {e}"));
                    }
                }
            }

            () = wait_for_shutdown(&mut stop) => break,
        }
    }

    drop(listener);
    drain_connections(&active_connections).await;
    Ok(())
}

async fn drain_connections(active_connections: &AtomicUsize) {
    let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;

    loop {
        let remaining = active_connections.load(Ordering::SeqCst);
        if remaining == 0 {
            logger::log_info("[SHUTDOWN] All connections closed");
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            logger::log_warning(&format!(
                "[SHUTDOWN] Grace period elapsed with {remaining} connection(s) still open"
            ));
            return;
        }
        tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::server::create_listener;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    struct TestServer {
        addr: std::net::SocketAddr,
        shutdown: Shutdown,
        handle: tokio::task::JoinHandle<()>,
    }

    impl TestServer {
        async fn start(configure: impl FnOnce(&mut Config)) -> Self {
            let mut config = Config::defaults().unwrap();
            config.server.host = "127.0.0.1".to_string();
            config.server.port = 0;
            config.logging.access_log = false;
            configure(&mut config);

            let listener = create_listener(config.socket_addr().unwrap()).unwrap();
            let addr = listener.local_addr().unwrap();
            let state = Arc::new(AppState::new(config));
            let shutdown = Shutdown::new();
            let loop_shutdown = shutdown.clone();
            let handle = tokio::spawn(async move {
                start_server_loop(listener, state, &loop_shutdown)
                    .await
                    .unwrap();
            });

            Self {
                addr,
                shutdown,
                handle,
            }
        }

        async fn request(&self, method: &str, path: &str, body: Option<&str>) -> (u16, String) {
            let mut raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n");
            if let Some(body) = body {
                raw.push_str(&format!(
                    "Content-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
                    body.len()
                ));
            } else {
                raw.push_str("\r\n");
            }
            self.send_raw(&raw).await
        }

        /// POST `body` as a single chunk with `Transfer-Encoding: chunked`
        async fn post_chunked(&self, path: &str, body: &str) -> (u16, String) {
            let raw = format!(
                "POST {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\
                 Content-Type: application/json\r\nTransfer-Encoding: chunked\r\n\r\n\
                 {:x}\r\n{body}\r\n0\r\n\r\n",
                body.len()
            );
            self.send_raw(&raw).await
        }

        async fn send_raw(&self, raw: &str) -> (u16, String) {
            let mut stream = TcpStream::connect(self.addr).await.unwrap();
            stream.write_all(raw.as_bytes()).await.unwrap();
            read_response(&mut stream).await
        }

        async fn stop(self) {
            self.shutdown.trigger();
            tokio::time::timeout(Duration::from_secs(2), self.handle)
                .await
                .unwrap()
                .unwrap();
        }
    }

    async fn read_response(stream: &mut TcpStream) -> (u16, String) {
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        let status = response[9..12].parse().unwrap();
        let body = response
            .split_once("\r\n\r\n")
            .map(|(_, b)| b.to_string())
            .unwrap_or_default();
        (status, body)
    }

    fn json(body: &str) -> serde_json::Value {
        serde_json::from_str(body).unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_routes() {
        let server = TestServer::start(|_| {}).await;

        let (status, body) = server.request("GET", "/", None).await;
        assert_eq!(status, 200);
        assert_eq!(
            json(&body)["features"],
            serde_json::json!(["add", "subtract", "multiply", "divide"])
        );

        let (status, body) = server.request("POST", "/add", Some(r#"{"a":10,"b":5}"#)).await;
        assert_eq!(status, 200);
        assert_eq!(json(&body), serde_json::json!({"operation": "add", "result": 15}));

        let (status, body) = server.request("POST", "/divide", Some(r#"{"a":10,"b":0}"#)).await;
        assert_eq!(status, 400);
        assert_eq!(
            json(&body),
            serde_json::json!({"error": "Division by zero is not allowed"})
        );

        let (status, body) = server.request("POST", "/add", Some(r#"{"a":5}"#)).await;
        assert_eq!(status, 400);
        assert_eq!(
            json(&body),
            serde_json::json!({"error": "Fields 'a' and 'b' are required"})
        );

        let (status, body) = server.request("POST", "/subtract", None).await;
        assert_eq!(status, 400);
        assert_eq!(json(&body), serde_json::json!({"error": "Invalid request body"}));

        server.stop().await;
    }

    #[tokio::test]
    async fn test_unknown_route_and_wrong_method() {
        let server = TestServer::start(|_| {}).await;

        let (status, body) = server.request("GET", "/modulo", None).await;
        assert_eq!(status, 404);
        assert_eq!(json(&body), serde_json::json!({"error": "Not Found"}));

        let (status, _) = server.request("GET", "/add", None).await;
        assert_eq!(status, 405);

        let (status, _) = server.request("POST", "/", Some("{}")).await;
        assert_eq!(status, 405);

        let (status, body) = server.request("OPTIONS", "/multiply", None).await;
        assert_eq!(status, 204);
        assert!(body.is_empty());

        server.stop().await;
    }

    #[tokio::test]
    async fn test_body_limit() {
        let server = TestServer::start(|config| config.http.max_body_size = 16).await;

        let (status, body) = server
            .request("POST", "/add", Some(r#"{"a":10,"b":5,"padding":"xxxxxxxx"}"#))
            .await;
        assert_eq!(status, 413);
        assert_eq!(json(&body), serde_json::json!({"error": "Payload Too Large"}));

        let (status, _) = server.request("POST", "/add", Some(r#"{"a":1,"b":2}"#)).await;
        assert_eq!(status, 200);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_shutdown_closes_listener() {
        let server = TestServer::start(|_| {}).await;
        let addr = server.addr;
        server.stop().await;
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_chunked_body_limit() {
        let server = TestServer::start(|config| config.http.max_body_size = 16).await;

        let (status, body) = server
            .post_chunked("/add", r#"{"a":10,"b":5,"padding":"xxxxxxxxxxxxxx"}"#)
            .await;
        assert_eq!(status, 413);
        assert_eq!(json(&body), serde_json::json!({"error": "Payload Too Large"}));

        let (status, body) = server.post_chunked("/add", r#"{"a":1,"b":2}"#).await;
        assert_eq!(status, 200);
        assert_eq!(json(&body), serde_json::json!({"operation": "add", "result": 3}));

        server.stop().await;
    }

    #[tokio::test]
    async fn test_max_connections_rejects_extra_connection() {
        let server =
            TestServer::start(|config| config.performance.max_connections = Some(1)).await;

        // Idle connection that occupies the only slot
        let held = TcpStream::connect(server.addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // The extra connection is accepted and closed without a response
        let mut rejected = TcpStream::connect(server.addr).await.unwrap();
        let mut response = String::new();
        let read = tokio::time::timeout(
            Duration::from_secs(2),
            rejected.read_to_string(&mut response),
        )
        .await
        .unwrap();
        assert_eq!(read.unwrap_or(0), 0);
        assert!(response.is_empty());

        drop(held);
        server.stop().await;
    }

    #[tokio::test]
    async fn test_in_flight_request_completes_after_shutdown() {
        let server = TestServer::start(|_| {}).await;
        let body = r#"{"a":1,"b":2}"#;

        let mut stream = TcpStream::connect(server.addr).await.unwrap();
        let head = format!(
            "POST /add HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n",
            body.len()
        );
        stream.write_all(head.as_bytes()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        server.shutdown.trigger();
        tokio::time::sleep(Duration::from_millis(50)).await;
        stream.write_all(body.as_bytes()).await.unwrap();

        let (status, response) = read_response(&mut stream).await;
        assert_eq!(status, 200);
        assert_eq!(
            json(&response),
            serde_json::json!({"operation": "add", "result": 3})
        );

        tokio::time::timeout(SHUTDOWN_GRACE, server.handle)
            .await
            .unwrap()
            .unwrap();
    }
}
