//! Shared test harness: in-process stand-ins for the transcription service
//! and the sentiment collaborator.

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Json, State};
use axum::http::{HeaderMap, header};
use axum::response::IntoResponse;
use axum::routing::{any, post};
use futures_util::SinkExt;
use tokio::net::TcpListener;

/// Build a Results frame the way the service serializes them.
pub fn results_frame(text: &str, is_final: bool, confidence: f32) -> String {
    serde_json::json!({
        "type": "Results",
        "is_final": is_final,
        "channel": {
            "alternatives": [{"transcript": text, "confidence": confidence}]
        }
    })
    .to_string()
}

pub fn interim_frame(text: &str) -> String {
    results_frame(text, false, 0.5)
}

pub fn final_frame(text: &str) -> String {
    results_frame(text, true, 0.95)
}

struct ProviderShared {
    frames: Vec<String>,
    close_after_frames: bool,
    binary_frames: AtomicUsize,
    binary_bytes: AtomicUsize,
    authorization: Mutex<Option<String>>,
}

/// In-process WebSocket server speaking the live recognition protocol.
///
/// Connections receive the scripted frames immediately, then either close
/// (when configured) or sit counting binary audio frames until the client
/// closes.
pub struct FakeProvider {
    addr: SocketAddr,
    shared: Arc<ProviderShared>,
}

#[derive(Default)]
pub struct FakeProviderBuilder {
    frames: Vec<String>,
    close_after_frames: bool,
}

impl FakeProviderBuilder {
    pub fn frame(mut self, json: impl Into<String>) -> Self {
        self.frames.push(json.into());
        self
    }

    pub fn interim(self, text: &str) -> Self {
        self.frame(interim_frame(text))
    }

    pub fn final_result(self, text: &str) -> Self {
        self.frame(final_frame(text))
    }

    /// Close the connection from the server side once all frames are sent.
    pub fn close_after_frames(mut self) -> Self {
        self.close_after_frames = true;
        self
    }

    pub async fn spawn(self) -> FakeProvider {
        let shared = Arc::new(ProviderShared {
            frames: self.frames,
            close_after_frames: self.close_after_frames,
            binary_frames: AtomicUsize::new(0),
            binary_bytes: AtomicUsize::new(0),
            authorization: Mutex::new(None),
        });

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake provider");
        let addr = listener.local_addr().expect("fake provider addr");

        let app = Router::new()
            .route("/v1/listen", any(ws_handler))
            .with_state(shared.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        FakeProvider { addr, shared }
    }
}

impl FakeProvider {
    pub fn builder() -> FakeProviderBuilder {
        FakeProviderBuilder::default()
    }

    pub fn url(&self) -> String {
        format!("ws://{}/v1/listen", self.addr)
    }

    pub fn binary_frames(&self) -> usize {
        self.shared.binary_frames.load(Ordering::SeqCst)
    }

    pub fn binary_bytes(&self) -> usize {
        self.shared.binary_bytes.load(Ordering::SeqCst)
    }

    /// Authorization header of the most recent connection.
    pub fn authorization(&self) -> Option<String> {
        self.shared
            .authorization
            .lock()
            .expect("authorization lock")
            .clone()
    }

    /// Poll until the server has seen at least `count` binary frames.
    pub async fn wait_for_binary_frames(&self, count: usize) {
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
        while self.binary_frames() < count {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {count} binary frames (saw {})",
                self.binary_frames()
            );
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }
}

async fn ws_handler(
    State(shared): State<Arc<ProviderShared>>,
    headers: HeaderMap,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    *shared.authorization.lock().expect("authorization lock") = auth;

    upgrade.on_upgrade(move |socket| serve_connection(shared, socket))
}

async fn serve_connection(shared: Arc<ProviderShared>, mut socket: WebSocket) {
    for frame in &shared.frames {
        if socket
            .send(Message::Text(frame.clone().into()))
            .await
            .is_err()
        {
            return;
        }
    }
    if shared.close_after_frames {
        socket.send(Message::Close(None)).await.ok();
        return;
    }

    while let Some(Ok(message)) = socket.recv().await {
        match message {
            Message::Binary(data) => {
                shared.binary_frames.fetch_add(1, Ordering::SeqCst);
                shared.binary_bytes.fetch_add(data.len(), Ordering::SeqCst);
            }
            Message::Close(_) => {
                // tungstenite queues the close reply during recv, so the
                // explicit send is rejected; flush pushes the queued reply
                // to the wire before the socket drops
                socket.send(Message::Close(None)).await.ok();
                socket.flush().await.ok();
                return;
            }
            _ => {}
        }
    }
}

struct AnalysisShared {
    reports: Mutex<VecDeque<serde_json::Value>>,
    requests: Mutex<Vec<String>>,
}

/// In-process HTTP server standing in for the sentiment collaborator.
///
/// Each `POST /process_text` pops the next scripted report; when the
/// script runs dry an empty report is returned.
pub struct FakeAnalysis {
    addr: SocketAddr,
    shared: Arc<AnalysisShared>,
}

impl FakeAnalysis {
    pub async fn spawn(reports: Vec<serde_json::Value>) -> Self {
        let shared = Arc::new(AnalysisShared {
            reports: Mutex::new(reports.into()),
            requests: Mutex::new(Vec::new()),
        });

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake analysis");
        let addr = listener.local_addr().expect("fake analysis addr");

        let app = Router::new()
            .route("/process_text", post(analysis_handler))
            .with_state(shared.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self { addr, shared }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Texts received so far, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.shared.requests.lock().expect("requests lock").clone()
    }

    /// Poll until the collaborator has been consulted `count` times.
    pub async fn wait_for_requests(&self, count: usize) {
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
        while self.requests().len() < count {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {count} analysis requests (saw {})",
                self.requests().len()
            );
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }
}

#[derive(serde::Deserialize)]
struct AnalysisRequest {
    text: String,
}

async fn analysis_handler(
    State(shared): State<Arc<AnalysisShared>>,
    Json(request): Json<AnalysisRequest>,
) -> impl IntoResponse {
    shared
        .requests
        .lock()
        .expect("requests lock")
        .push(request.text);
    let report = shared
        .reports
        .lock()
        .expect("reports lock")
        .pop_front()
        .unwrap_or_else(|| serde_json::json!({}));
    Json(report)
}
