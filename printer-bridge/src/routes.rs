//! HTTP routes
//!
//! - `GET /health` → `{ "ok": true }`
//! - `POST /print` `{ ip, port?, data, timeoutMs? }` → raw TCP write to the printer
//! - `OPTIONS *` → 204 with CORS headers
//! - anything else → 404

use crate::config::Config;
use crate::error::{BridgeError, BridgeResult};
use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, State, rejection::BytesRejection},
    http::{HeaderValue, Method, Request, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::Engine;
use pos_printer::{BridgeResponse, DEFAULT_RAW_PORT, NetworkPrinter, Printer};
use serde::Deserialize;
use serde_json::Value;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

/// Loosely typed request body; fields are validated one by one
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PrintRequest {
    ip: Value,
    port: Value,
    data: Value,
    timeout_ms: Value,
}

/// Non-negative integer from a JSON number or numeric string
fn as_integer(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_ip(value: &Value) -> BridgeResult<Ipv4Addr> {
    value
        .as_str()
        .and_then(|s| s.trim().parse().ok())
        .ok_or(BridgeError::InvalidIp)
}

/// Missing, empty or zero means 9100
fn parse_port(value: &Value) -> BridgeResult<u16> {
    match value {
        Value::Null => return Ok(DEFAULT_RAW_PORT),
        Value::String(s) if s.trim().is_empty() => return Ok(DEFAULT_RAW_PORT),
        _ => {}
    }
    match as_integer(value) {
        Some(0) => Ok(DEFAULT_RAW_PORT),
        Some(port) => u16::try_from(port).map_err(|_| BridgeError::InvalidPort),
        None => Err(BridgeError::InvalidPort),
    }
}

fn parse_timeout(value: &Value, default_ms: u64) -> Duration {
    let ms = as_integer(value).filter(|ms| *ms > 0).unwrap_or(default_ms);
    Duration::from_millis(ms)
}

fn parse_data(value: &Value) -> BridgeResult<Vec<u8>> {
    let encoded = value.as_str().unwrap_or_default().trim();
    let data = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| BridgeError::InvalidData(e.to_string()))?;
    if data.is_empty() {
        return Err(BridgeError::EmptyData);
    }
    Ok(data)
}

async fn health() -> Json<BridgeResponse> {
    Json(BridgeResponse::ok())
}

async fn print(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> BridgeResult<Json<BridgeResponse>> {
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            BridgeError::BodyTooLarge
        } else {
            BridgeError::BadRequest(rejection.body_text())
        }
    })?;

    let request: PrintRequest = if body.iter().all(u8::is_ascii_whitespace) {
        PrintRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|_| BridgeError::BadRequest("Invalid JSON".into()))?
    };

    let ip = parse_ip(&request.ip)?;
    let port = parse_port(&request.port)?;
    let data = parse_data(&request.data)?;
    let timeout = parse_timeout(&request.timeout_ms, state.config.default_timeout_ms);

    NetworkPrinter::new(ip, port)
        .with_timeout(timeout)
        .print(&data)
        .await?;

    Ok(Json(BridgeResponse::ok()))
}

async fn not_found() -> BridgeError {
    BridgeError::NotFound
}

/// Answers preflight requests and stamps CORS headers on every response
async fn cors(request: Request<Body>, next: Next) -> Response {
    let origin = request.headers().get(header::ORIGIN).cloned();

    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    if origin.is_some() {
        headers.insert(header::VARY, HeaderValue::from_static("Origin"));
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        origin.unwrap_or_else(|| HeaderValue::from_static("*")),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("86400"),
    );
    response
}

async fn log_request(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    tracing::info!(target: "http_access", "{} {} {}", method, uri, response.status());

    response
}

pub fn build_router(state: AppState) -> Router {
    let max_body = state.config.max_body;

    Router::new()
        .route("/health", get(health).fallback(not_found))
        .route("/print", post(print).fallback(not_found))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(max_body))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(log_request))
        .layer(middleware::from_fn(cors))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tower::ServiceExt;

    fn app() -> Router {
        build_router(AppState::new(Config::default()))
    }

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, Response) {
        let response = app.oneshot(request).await.unwrap();
        (response.status(), response)
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/print")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn encode(data: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(data)
    }

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port(&Value::Null).unwrap(), 9100);
        assert_eq!(parse_port(&serde_json::json!("")).unwrap(), 9100);
        assert_eq!(parse_port(&serde_json::json!(0)).unwrap(), 9100);
        assert_eq!(parse_port(&serde_json::json!("9101")).unwrap(), 9101);
        assert_eq!(parse_port(&serde_json::json!(65535)).unwrap(), 65535);
        assert!(parse_port(&serde_json::json!(65536)).is_err());
        assert!(parse_port(&serde_json::json!(-1)).is_err());
        assert!(parse_port(&serde_json::json!("abc")).is_err());
        assert!(parse_port(&serde_json::json!(91.5)).is_err());
    }

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout(&Value::Null, 2000), Duration::from_millis(2000));
        assert_eq!(parse_timeout(&serde_json::json!(0), 2000), Duration::from_millis(2000));
        assert_eq!(parse_timeout(&serde_json::json!("x"), 2000), Duration::from_millis(2000));
        assert_eq!(parse_timeout(&serde_json::json!(500), 2000), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_health() {
        let request = Request::get("/health").body(Body::empty()).unwrap();
        let (status, response) = call(app(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!({ "ok": true }));
    }

    #[tokio::test]
    async fn test_print_writes_to_printer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let printer = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            socket.read_to_end(&mut received).await.unwrap();
            received
        });

        let request = post_json(serde_json::json!({
            "ip": "127.0.0.1",
            "port": port,
            "data": encode(b"\x1b@hello"),
            "timeoutMs": 1000,
        }));
        let (status, response) = call(app(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!({ "ok": true }));
        assert_eq!(printer.await.unwrap(), b"\x1b@hello");
    }

    #[tokio::test]
    async fn test_print_invalid_ip() {
        let request = post_json(serde_json::json!({ "ip": "printer.local", "data": encode(b"x") }));
        let (status, response) = call(app(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({ "ok": false, "error": "Invalid ip" })
        );
    }

    #[tokio::test]
    async fn test_print_invalid_port() {
        let request = post_json(serde_json::json!({
            "ip": "127.0.0.1",
            "port": 70000,
            "data": encode(b"x"),
        }));
        let (status, response) = call(app(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "Invalid port");
    }

    #[tokio::test]
    async fn test_print_empty_data() {
        let request = post_json(serde_json::json!({ "ip": "127.0.0.1", "data": "" }));
        let (status, response) = call(app(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "Empty data");
    }

    #[tokio::test]
    async fn test_print_empty_body() {
        let request = Request::post("/print").body(Body::empty()).unwrap();
        let (status, response) = call(app(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "Invalid ip");
    }

    #[tokio::test]
    async fn test_print_refused_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let request = post_json(serde_json::json!({
            "ip": "127.0.0.1",
            "port": port,
            "data": encode(b"x"),
        }));
        let (status, response) = call(app(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["ok"], false);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_body_too_large() {
        let config = Config {
            max_body: 16,
            ..Config::default()
        };
        let app = build_router(AppState::new(config));
        let request = post_json(serde_json::json!({
            "ip": "127.0.0.1",
            "data": encode(&[0u8; 64]),
        }));
        let (status, response) = call(app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "Body too large");
    }

    #[tokio::test]
    async fn test_not_found() {
        let request = Request::get("/nope").body(Body::empty()).unwrap();
        let (status, response) = call(app(), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({ "ok": false, "error": "Not found" })
        );

        let request = Request::get("/print").body(Body::empty()).unwrap();
        let (status, _) = call(app(), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_preflight() {
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/print")
            .header(header::ORIGIN, "https://pos.example")
            .body(Body::empty())
            .unwrap();
        let (status, response) = call(app(), request).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://pos.example");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "GET, POST, OPTIONS");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type");
        assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "86400");
    }

    #[tokio::test]
    async fn test_cors_on_plain_response() {
        let request = Request::get("/health").body(Body::empty()).unwrap();
        let (_, response) = call(app(), request).await;
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }
}
