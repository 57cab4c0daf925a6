//! Shared fixtures: an in-process mock collector and agent builders.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use fieldlink_agent::{Agent, FieldlinkConfig};
use fieldlink_agent_framework::Shutdown;

pub const REGISTER: &str = "/devices";
pub const METRICS: &str = "/metrics";
pub const STATUS: &str = "/devices/status";

#[derive(Default)]
struct Script {
    sequence: VecDeque<u16>,
    fallback: Option<u16>,
}

#[derive(Default)]
struct MockState {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<HashMap<String, usize>>,
    api_keys: Mutex<HashMap<String, Vec<String>>>,
    bodies: Mutex<HashMap<String, Vec<Value>>>,
    delays: Mutex<HashMap<String, Duration>>,
    registration_bodies: Mutex<VecDeque<Value>>,
    issued_tokens: Mutex<usize>,
}

impl MockState {
    fn next_status(&self, path: &str) -> u16 {
        let mut scripts = self.scripts.lock();
        match scripts.get_mut(path) {
            Some(script) => script
                .sequence
                .pop_front()
                .or(script.fallback)
                .unwrap_or(201),
            None => 201,
        }
    }

    fn record(&self, path: &str, headers: &HeaderMap, body: Value) {
        *self.calls.lock().entry(path.to_string()).or_default() += 1;
        let key = headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        self.api_keys
            .lock()
            .entry(path.to_string())
            .or_default()
            .push(key);
        self.bodies
            .lock()
            .entry(path.to_string())
            .or_default()
            .push(body);
    }
}

/// Collector stand-in with scripted per-route statuses.
///
/// Every route answers 201 unless scripted otherwise. Successful
/// registrations hand out `token-1`, `token-2`, ... unless a body was queued
/// with [`MockCollector::registration_bodies`].
pub struct MockCollector {
    addr: SocketAddr,
    state: Arc<MockState>,
    server: JoinHandle<()>,
}

impl MockCollector {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new()
            .route(REGISTER, post(register))
            .route(METRICS, post(ingest))
            .route(STATUS, post(ingest))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            server,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Answer `path` with `sequence` first, then `fallback` forever.
    pub fn script(&self, path: &str, sequence: &[u16], fallback: u16) {
        self.state.scripts.lock().insert(
            path.to_string(),
            Script {
                sequence: sequence.iter().copied().collect(),
                fallback: Some(fallback),
            },
        );
    }

    /// Answer `path` with `status` forever.
    pub fn always(&self, path: &str, status: u16) {
        self.script(path, &[], status);
    }

    /// Hold every response on `path` for `delay`.
    pub fn delay(&self, path: &str, delay: Duration) {
        self.state.delays.lock().insert(path.to_string(), delay);
    }

    /// Answer the next successful registrations with these bodies, in order.
    pub fn registration_bodies(&self, bodies: &[Value]) {
        self.state
            .registration_bodies
            .lock()
            .extend(bodies.iter().cloned());
    }

    pub fn calls(&self, path: &str) -> usize {
        self.state.calls.lock().get(path).copied().unwrap_or(0)
    }

    pub fn api_keys(&self, path: &str) -> Vec<String> {
        self.state
            .api_keys
            .lock()
            .get(path)
            .cloned()
            .unwrap_or_default()
    }

    pub fn bodies(&self, path: &str) -> Vec<Value> {
        self.state
            .bodies
            .lock()
            .get(path)
            .cloned()
            .unwrap_or_default()
    }
}

impl Drop for MockCollector {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn register(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.record(REGISTER, &headers, body);
    let status = state.next_status(REGISTER);
    let code = StatusCode::from_u16(status).unwrap();

    if status == 200 || status == 201 {
        if let Some(body) = state.registration_bodies.lock().pop_front() {
            return (code, Json(body)).into_response();
        }
        let mut issued = state.issued_tokens.lock();
        *issued += 1;
        (code, Json(json!({ "token": format!("token-{}", *issued) }))).into_response()
    } else {
        (code, Json(json!({ "error": "registration refused" }))).into_response()
    }
}

async fn ingest(
    State(state): State<Arc<MockState>>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let path = uri.path().to_string();
    state.record(&path, &headers, body);
    let status = state.next_status(&path);
    let code = StatusCode::from_u16(status).unwrap();

    let delay = state.delays.lock().get(&path).copied();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    if status == 201 {
        (code, Json(json!({ "ok": true }))).into_response()
    } else {
        (code, Json(json!({ "error": format!("scripted {}", status) }))).into_response()
    }
}

/// Configuration pointing at `url` with millisecond-scale retry timing.
pub fn test_config(url: &str, queue_path: &Path) -> FieldlinkConfig {
    let mut config: FieldlinkConfig = json5::from_str("{}").unwrap();
    config.collector.host = url.to_string();
    config.collector.request_timeout_secs = 2;
    config.device.id = "test-device-001".to_string();
    config.device.token = "initial-token".to_string();
    config.queue.path = queue_path.to_path_buf();
    config.retry.attempt_pause_ms = 10;
    config.registration.backoff_secs = 1;
    config
}

/// Agent over a fresh queue in `dir`.
pub fn test_agent(url: &str, dir: &Path, shutdown: Shutdown) -> Agent {
    let config = test_config(url, &dir.join("queue.redb"));
    Agent::new(config, shutdown).unwrap()
}

/// A URL nothing listens on.
pub async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}
