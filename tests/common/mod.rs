//! Shared harness for integration tests
//!
//! - `MockRealtimeServer`: an OpenAI Realtime style WebSocket endpoint that
//!   records client events and lets tests push server events
//! - `TestServer`: the bridge's routers served on an ephemeral port
//! - `TelephonyClient`: plays the telephony provider's side of a media stream

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, accept_hdr_async, connect_async};

use voice_bridge::{ServerConfig, routes, state::AppState};

pub const WAIT: Duration = Duration::from_secs(5);

/// Poll `condition` every 10ms until it holds or `WAIT` elapses.
pub async fn eventually<F>(what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// =============================================================================
// Mock realtime provider
// =============================================================================

/// Upgrade request as seen by the mock.
#[derive(Debug, Clone)]
pub struct Handshake {
    pub uri: String,
    pub authorization: Option<String>,
    pub beta: Option<String>,
    pub protocol: Option<String>,
}

#[derive(Default)]
struct MockState {
    messages: Mutex<Vec<Value>>,
    handshakes: Mutex<Vec<Handshake>>,
    pushers: Mutex<Vec<mpsc::UnboundedSender<Message>>>,
    hold_session_created: AtomicBool,
    reject_status: Mutex<Option<u16>>,
}

pub struct MockRealtimeServer {
    addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockRealtimeServer {
    /// Replies `session.created` as soon as a `session.update` arrives.
    pub async fn start() -> Self {
        Self::spawn(Arc::new(MockState::default())).await
    }

    /// Never replies `session.created` on its own; use [`Self::push`].
    pub async fn start_holding_session() -> Self {
        let state = MockState::default();
        state.hold_session_created.store(true, Ordering::SeqCst);
        Self::spawn(Arc::new(state)).await
    }

    /// Rejects every upgrade with `status`.
    pub async fn start_rejecting(status: u16) -> Self {
        let state = MockState::default();
        *state.reject_status.lock() = Some(status);
        Self::spawn(Arc::new(state)).await
    }

    async fn spawn(state: Arc<MockState>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept_state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(handle_connection(stream, Arc::clone(&accept_state)));
            }
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/v1/realtime", self.addr)
    }

    pub fn handshakes(&self) -> Vec<Handshake> {
        self.state.handshakes.lock().clone()
    }

    pub fn connection_count(&self) -> usize {
        self.state.handshakes.lock().len()
    }

    /// Client events of the given `type`, in arrival order.
    pub fn messages(&self, event_type: &str) -> Vec<Value> {
        self.state
            .messages
            .lock()
            .iter()
            .filter(|m| m["type"] == event_type)
            .cloned()
            .collect()
    }

    /// Wait until at least `count` events of `event_type` have arrived.
    pub async fn wait_for(&self, event_type: &str, count: usize) -> Vec<Value> {
        eventually(&format!("{count} {event_type} event(s)"), || {
            self.messages(event_type).len() >= count
        })
        .await;
        self.messages(event_type)
    }

    /// Send a server event on the most recent connection.
    pub async fn push(&self, event: Value) {
        eventually("a realtime connection", || !self.state.pushers.lock().is_empty()).await;
        let sender = self.state.pushers.lock().last().cloned().unwrap();
        sender
            .send(Message::Text(event.to_string().into()))
            .expect("mock connection closed");
    }

    /// Close the most recent connection from the server side.
    pub async fn close_latest(&self) {
        eventually("a realtime connection", || !self.state.pushers.lock().is_empty()).await;
        let sender = self.state.pushers.lock().last().cloned().unwrap();
        let _ = sender.send(Message::Close(None));
    }
}

pub fn session_created() -> Value {
    json!({
        "type": "session.created",
        "event_id": "evt_1",
        "session": {"id": "sess_mock", "object": "realtime.session", "model": "gpt-4o-realtime-preview"}
    })
}

async fn handle_connection(stream: TcpStream, state: Arc<MockState>) {
    let handshake_state = Arc::clone(&state);
    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let header = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        handshake_state.handshakes.lock().push(Handshake {
            uri: req.uri().to_string(),
            authorization: header("authorization"),
            beta: header("openai-beta"),
            protocol: header("sec-websocket-protocol"),
        });

        if let Some(status) = *handshake_state.reject_status.lock() {
            let mut rejection = ErrorResponse::new(Some("rejected".to_string()));
            *rejection.status_mut() = StatusCode::from_u16(status).unwrap();
            return Err(rejection);
        }
        Ok(resp)
    };

    let Ok(ws) = accept_hdr_async(stream, callback).await else {
        return;
    };
    let (mut write, mut read) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    state.pushers.lock().push(tx);

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let value: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
                    let is_update = value["type"] == "session.update";
                    state.messages.lock().push(value);
                    if is_update && !state.hold_session_created.load(Ordering::SeqCst) {
                        let _ = write
                            .send(Message::Text(session_created().to_string().into()))
                            .await;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            out = rx.recv() => match out {
                Some(message) => {
                    let close = matches!(message, Message::Close(_));
                    let _ = write.send(message).await;
                    if close {
                        break;
                    }
                }
                None => break,
            },
        }
    }
}

// =============================================================================
// Bridge server
// =============================================================================

/// Config pointing the AI leg at `realtime_url`.
pub fn test_config(realtime_url: &str, results_url: Option<String>) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.host = "127.0.0.1".to_string();
    config.openai_api_key = Some("sk-test".to_string());
    config.realtime_url = realtime_url.to_string();
    config.results_url = results_url;
    config
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<AppState>,
}

impl TestServer {
    pub async fn start(config: ServerConfig) -> Self {
        let state = AppState::new(config).await;
        let app = routes::api::create_api_router()
            .merge(routes::api::create_sessions_router(None).unwrap())
            .merge(routes::media_stream::create_media_stream_router())
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// `POST /sessions` and return the new id.
    pub async fn create_session(&self, body: Value) -> String {
        let response = reqwest::Client::new()
            .post(self.http_url("/sessions"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let json: Value = response.json().await.unwrap();
        json["sessionId"].as_str().unwrap().to_string()
    }

    pub async fn twiml_status(&self, session_id: &str) -> u16 {
        reqwest::get(self.http_url(&format!("/twiml?sessionId={session_id}")))
            .await
            .unwrap()
            .status()
            .as_u16()
    }

    pub async fn telephony(&self, session_id: Option<&str>) -> TelephonyClient {
        let url = match session_id {
            Some(id) => format!("ws://{}/media-stream?sessionId={id}", self.addr),
            None => format!("ws://{}/media-stream", self.addr),
        };
        let (ws, _) = connect_async(url).await.unwrap();
        TelephonyClient { ws }
    }
}

// =============================================================================
// Telephony provider side
// =============================================================================

pub struct TelephonyClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TelephonyClient {
    pub async fn send(&mut self, value: Value) {
        self.ws
            .send(Message::Text(value.to_string().into()))
            .await
            .unwrap();
    }

    pub async fn connected(&mut self) {
        self.send(json!({"event": "connected", "protocol": "Call", "version": "1.0.0"}))
            .await;
    }

    pub async fn start(&mut self, stream_sid: &str, call_sid: &str, session_id: Option<&str>) {
        let params = match session_id {
            Some(id) => json!({ "sessionId": id }),
            None => json!({}),
        };
        self.send(json!({
            "event": "start",
            "sequenceNumber": "1",
            "start": {
                "streamSid": stream_sid,
                "callSid": call_sid,
                "accountSid": "AC123",
                "tracks": ["inbound"],
                "customParameters": params,
                "mediaFormat": {"encoding": "audio/x-mulaw", "sampleRate": 8000, "channels": 1}
            },
            "streamSid": stream_sid
        }))
        .await;
    }

    pub async fn media(&mut self, stream_sid: &str, payload: &str) {
        self.send(json!({
            "event": "media",
            "streamSid": stream_sid,
            "media": {"track": "inbound", "chunk": "1", "timestamp": "5", "payload": payload}
        }))
        .await;
    }

    pub async fn stop(&mut self, stream_sid: &str) {
        self.send(json!({"event": "stop", "streamSid": stream_sid, "stop": {"callSid": "CA123"}}))
            .await;
    }

    /// Next JSON frame from the bridge, or `None` once the socket closes.
    pub async fn next_json(&mut self) -> Option<Value> {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            let msg = tokio::time::timeout_at(deadline, self.ws.next())
                .await
                .expect("timed out waiting for a telephony frame");
            match msg {
                Some(Ok(Message::Text(text))) => return Some(serde_json::from_str(&text).unwrap()),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
                Some(Ok(_)) => continue,
            }
        }
    }

    /// Wait for the bridge to close the socket, skipping any frames.
    pub async fn expect_closed(&mut self) {
        while self.next_json().await.is_some() {}
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}
