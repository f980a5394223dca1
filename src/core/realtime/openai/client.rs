//! OpenAI Realtime API client implementation.
//!
//! # API Reference
//!
//! - Endpoint: `wss://api.openai.com/v1/realtime?model=<model>`
//! - Protocol: WebSocket with JSON events
//! - Audio: G.711 u-law, 8kHz, base64 encoded in both directions
//!
//! # Handshake
//!
//! 1. Open the socket with `Authorization: Bearer <key>` and `OpenAI-Beta: realtime=v1`
//! 2. Send `session.update` (voice, instructions, formats, transcription, VAD)
//! 3. On `session.created`, mark the leg ready and send `response.create` so
//!    the assistant opens the conversation
//!
//! There is no reconnection: a dropped AI leg stays closed for the rest of the call.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode, header};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};

use super::config::{
    DEFAULT_REALTIME_MODEL, DEFAULT_TRANSCRIPTION_MODEL, OPENAI_REALTIME_URL,
    OpenAIRealtimeVoice, TELEPHONY_AUDIO_FORMAT,
};
use super::messages::{ClientEvent, InputAudioTranscription, ServerEvent, SessionConfig, TurnDetection};
use crate::core::realtime::base::{
    BaseRealtime, BoxedRealtime, ConnectionState, RealtimeAudioData, RealtimeConfig,
    RealtimeConnector, RealtimeError, RealtimeEvent, RealtimeEventSender, RealtimeResult,
    TranscriptResult, TranscriptRole, TurnDetectionConfig,
};

/// Channel capacity for WebSocket message sending.
const WS_CHANNEL_CAPACITY: usize = 256;

/// How long `disconnect` waits for the socket task to send its close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

// =============================================================================
// OpenAI Realtime Client
// =============================================================================

/// OpenAI Realtime API client implementation.
///
/// State shared with the socket task lives behind `Arc`s; the `ready` flag is
/// an `AtomicBool` so the audio path can check it without locking.
pub struct OpenAIRealtime {
    /// Configuration
    config: RealtimeConfig,
    /// Model query parameter
    model: String,
    /// Parsed voice
    voice: OpenAIRealtimeVoice,
    /// Connection state
    state: Arc<RwLock<ConnectionState>>,
    /// Set on `session.created`, cleared on close
    ready: Arc<AtomicBool>,
    /// Remote session ID
    session_id: Arc<RwLock<Option<String>>>,
    /// WebSocket sender channel
    ws_sender: Option<mpsc::Sender<ClientEvent>>,
    /// Where signals for the call bridge go
    events: RealtimeEventSender,
    /// Connection task handle
    connection_handle: Option<JoinHandle<()>>,
}

impl OpenAIRealtime {
    /// Create an unconnected client.
    pub fn new(config: RealtimeConfig, events: RealtimeEventSender) -> RealtimeResult<Self> {
        if config.api_key.is_empty() {
            return Err(RealtimeError::AuthenticationFailed(
                "API key is required".to_string(),
            ));
        }

        let model = match config.model.trim() {
            "" => DEFAULT_REALTIME_MODEL.to_string(),
            configured => configured.to_string(),
        };

        let voice = match config.voice.as_deref() {
            Some(v) => OpenAIRealtimeVoice::parse(v).unwrap_or_else(|| {
                warn!(voice = %v, "Unknown realtime voice, using default");
                OpenAIRealtimeVoice::default()
            }),
            None => OpenAIRealtimeVoice::default(),
        };

        Ok(Self {
            config,
            model,
            voice,
            state: Arc::new(RwLock::new(ConnectionState::Connecting)),
            ready: Arc::new(AtomicBool::new(false)),
            session_id: Arc::new(RwLock::new(None)),
            ws_sender: None,
            events,
            connection_handle: None,
        })
    }

    /// Get the requested model.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get the configured voice.
    pub fn voice(&self) -> OpenAIRealtimeVoice {
        self.voice
    }

    /// Get the remote session ID once the session is created.
    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().clone()
    }

    /// Build the WebSocket URL with model parameter.
    fn build_ws_url(&self) -> RealtimeResult<url::Url> {
        let base = if self.config.url.is_empty() {
            OPENAI_REALTIME_URL
        } else {
            self.config.url.as_str()
        };

        let mut url = url::Url::parse(base)
            .map_err(|e| RealtimeError::InvalidConfiguration(format!("realtime url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("model", &self.model);
        Ok(url)
    }

    /// Build the session configuration sent right after the socket opens.
    fn build_session_config(&self) -> SessionConfig {
        let transcription_model = self
            .config
            .input_audio_transcription
            .as_ref()
            .map(|t| t.model.clone())
            .unwrap_or_else(|| DEFAULT_TRANSCRIPTION_MODEL.to_string());

        let turn_detection = match self.config.turn_detection.clone().unwrap_or_default() {
            TurnDetectionConfig::ServerVad {
                threshold,
                prefix_padding_ms,
                silence_duration_ms,
            } => Some(TurnDetection::ServerVad {
                threshold,
                prefix_padding_ms,
                silence_duration_ms,
            }),
            TurnDetectionConfig::None => None,
        };

        SessionConfig {
            modalities: Some(
                self.config
                    .modalities
                    .clone()
                    .unwrap_or_else(|| vec!["text".to_string(), "audio".to_string()]),
            ),
            instructions: self.config.instructions.clone(),
            voice: Some(self.voice.as_str().to_string()),
            input_audio_format: Some(
                self.config
                    .input_audio_format
                    .clone()
                    .unwrap_or_else(|| TELEPHONY_AUDIO_FORMAT.to_string()),
            ),
            output_audio_format: Some(
                self.config
                    .output_audio_format
                    .clone()
                    .unwrap_or_else(|| TELEPHONY_AUDIO_FORMAT.to_string()),
            ),
            input_audio_transcription: Some(InputAudioTranscription {
                model: transcription_model,
            }),
            turn_detection,
        }
    }

    /// Queue an event for the socket task.
    async fn send_event(&self, event: ClientEvent) -> RealtimeResult<()> {
        let Some(sender) = self.ws_sender.as_ref() else {
            return Err(RealtimeError::NotConnected);
        };
        sender
            .send(event)
            .await
            .map_err(|e| RealtimeError::WebSocketError(e.to_string()))
    }
}

#[async_trait]
impl BaseRealtime for OpenAIRealtime {
    async fn connect(&mut self) -> RealtimeResult<()> {
        // One connection per leg
        if self.connection_handle.is_some() {
            return Ok(());
        }

        *self.state.write() = ConnectionState::Connecting;

        let url = self.build_ws_url()?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.config.api_key))
            .map_err(|e| RealtimeError::InvalidConfiguration(e.to_string()))?;
        request.headers_mut().insert(header::AUTHORIZATION, auth);
        request
            .headers_mut()
            .insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        let (ws_stream, _response) = match tokio_tungstenite::connect_async(request).await {
            Ok(connected) => connected,
            Err(e) => {
                *self.state.write() = ConnectionState::Closed;
                return Err(map_connect_error(e));
            }
        };

        info!(model = %self.model, "Connected to OpenAI Realtime API");

        let (mut ws_sink, ws_stream) = ws_stream.split();

        let update = ClientEvent::SessionUpdate {
            session: self.build_session_config(),
        };
        if let Err(e) = send_client_event(&mut ws_sink, &update).await {
            *self.state.write() = ConnectionState::Closed;
            return Err(e);
        }
        *self.state.write() = ConnectionState::Configured;
        debug!("Sent session configuration");

        let (tx, rx) = mpsc::channel::<ClientEvent>(WS_CHANNEL_CAPACITY);
        self.ws_sender = Some(tx);

        let task = ConnectionTask {
            events: self.events.clone(),
            state: self.state.clone(),
            ready: self.ready.clone(),
            session_id: self.session_id.clone(),
        };
        self.connection_handle = Some(tokio::spawn(task.run(ws_sink, ws_stream, rx)));

        Ok(())
    }

    async fn disconnect(&mut self) -> RealtimeResult<()> {
        // Dropping the sender makes the socket task send a close frame and exit
        self.ws_sender = None;

        if let Some(mut handle) = self.connection_handle.take()
            && tokio::time::timeout(CLOSE_TIMEOUT, &mut handle).await.is_err()
        {
            warn!("Realtime connection task did not stop in time, aborting");
            handle.abort();
        }

        self.ready.store(false, Ordering::SeqCst);
        *self.state.write() = ConnectionState::Closed;

        info!("Disconnected from OpenAI Realtime API");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn get_connection_state(&self) -> ConnectionState {
        *self.state.read()
    }

    async fn send_audio(&mut self, audio_data: Bytes) -> RealtimeResult<()> {
        if self.ws_sender.is_none() {
            return Err(RealtimeError::NotConnected);
        }
        if !self.is_ready() {
            return Err(RealtimeError::NotReady);
        }

        self.send_event(ClientEvent::audio_append(&audio_data)).await
    }
}

// =============================================================================
// Connection Task
// =============================================================================

/// Socket task state shared with the owning [`OpenAIRealtime`].
struct ConnectionTask {
    events: RealtimeEventSender,
    state: Arc<RwLock<ConnectionState>>,
    ready: Arc<AtomicBool>,
    session_id: Arc<RwLock<Option<String>>>,
}

impl ConnectionTask {
    async fn run(
        self,
        mut ws_sink: WsSink,
        mut ws_stream: SplitStream<WsStream>,
        mut rx: mpsc::Receiver<ClientEvent>,
    ) {
        loop {
            tokio::select! {
                outgoing = rx.recv() => match outgoing {
                    Some(event) => {
                        if let Err(e) = send_client_event(&mut ws_sink, &event).await {
                            error!(error = %e, "Failed to send realtime event");
                            break;
                        }
                    }
                    None => {
                        let _ = ws_sink.send(Message::Close(None)).await;
                        break;
                    }
                },

                incoming = ws_stream.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let event = match serde_json::from_str::<ServerEvent>(&text) {
                            Ok(event) => event,
                            Err(e) => {
                                warn!(error = %e, "Failed to parse server event");
                                continue;
                            }
                        };

                        if let ServerEvent::SessionCreated { session } = &event {
                            if self.ready.swap(true, Ordering::SeqCst) {
                                debug!("Ignoring repeated session.created");
                                continue;
                            }
                            *self.session_id.write() = Some(session.id.clone());
                            *self.state.write() = ConnectionState::Ready;
                            info!(realtime_session_id = %session.id, "OpenAI Realtime session created");

                            if let Err(e) = send_client_event(&mut ws_sink, &ClientEvent::ResponseCreate).await {
                                error!(error = %e, "Failed to request opening response");
                                break;
                            }
                        }

                        if let Some(signal) = translate_server_event(event)
                            && self.events.send(signal).await.is_err()
                        {
                            debug!("Realtime event receiver dropped");
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                            error!(error = %e, "Failed to send pong");
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(frame = ?frame, "Realtime WebSocket closed by server");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!(error = %e, "Realtime WebSocket error");
                        break;
                    }
                    None => break,
                },
            }
        }

        self.ready.store(false, Ordering::SeqCst);
        *self.state.write() = ConnectionState::Closed;
        let _ = self.events.send(RealtimeEvent::Closed).await;
        info!("OpenAI Realtime connection task ended");
    }
}

/// Serialize and write one client event.
async fn send_client_event(sink: &mut WsSink, event: &ClientEvent) -> RealtimeResult<()> {
    let json = serde_json::to_string(event)
        .map_err(|e| RealtimeError::SerializationError(e.to_string()))?;
    sink.send(Message::Text(json.into()))
        .await
        .map_err(|e| RealtimeError::WebSocketError(e.to_string()))
}

fn map_connect_error(err: tungstenite::Error) -> RealtimeError {
    match err {
        tungstenite::Error::Http(response)
            if response.status() == StatusCode::UNAUTHORIZED
                || response.status() == StatusCode::FORBIDDEN =>
        {
            RealtimeError::AuthenticationFailed(format!("HTTP {}", response.status()))
        }
        other => RealtimeError::ConnectionFailed(other.to_string()),
    }
}

/// Map a decoded server event to the signal the bridge acts on, if any.
///
/// `session.created` maps to [`RealtimeEvent::Ready`]; readiness bookkeeping
/// happens in the socket task before the signal is delivered.
pub(crate) fn translate_server_event(event: ServerEvent) -> Option<RealtimeEvent> {
    match event {
        ServerEvent::SessionCreated { .. } => Some(RealtimeEvent::Ready),

        ServerEvent::SessionUpdated { session } => {
            debug!(realtime_session_id = %session.id, "OpenAI Realtime session updated");
            None
        }

        ServerEvent::Error { error } => {
            error!(
                error_type = %error.error_type,
                code = ?error.code,
                "OpenAI Realtime error: {}",
                error.message
            );
            None
        }

        ServerEvent::SpeechStarted { audio_start_ms, .. } => {
            debug!(audio_start_ms, "Caller speech started");
            Some(RealtimeEvent::SpeechStarted { audio_start_ms })
        }

        ServerEvent::SpeechStopped { audio_end_ms } => {
            debug!(audio_end_ms, "Caller speech stopped");
            None
        }

        ServerEvent::TranscriptionCompleted {
            item_id,
            transcript,
        } => transcript_event(transcript, TranscriptRole::User, item_id),

        ServerEvent::AudioTranscriptDone {
            item_id,
            transcript,
        } => transcript_event(transcript, TranscriptRole::Assistant, item_id),

        ServerEvent::AudioDelta {
            delta,
            item_id,
            response_id,
        } => match ServerEvent::decode_audio_delta(&delta) {
            Ok(audio) if audio.is_empty() => None,
            Ok(audio) => Some(RealtimeEvent::Audio(RealtimeAudioData {
                data: Bytes::from(audio),
                item_id,
                response_id,
            })),
            Err(e) => {
                error!(error = %e, "Failed to decode audio delta");
                None
            }
        },

        ServerEvent::ResponseDone { response } => {
            if let Some(response) = response {
                debug!(response_id = %response.id, status = ?response.status, "Response done");
            }
            None
        }

        ServerEvent::Unknown => {
            trace!("Unhandled server event");
            None
        }
    }
}

fn transcript_event(
    text: String,
    role: TranscriptRole,
    item_id: Option<String>,
) -> Option<RealtimeEvent> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    debug!(role = %role, "Transcript: {}", text);
    Some(RealtimeEvent::Transcript(TranscriptResult {
        text: text.to_string(),
        role,
        item_id,
    }))
}

// =============================================================================
// Connector
// =============================================================================

/// Creates [`OpenAIRealtime`] legs.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAIRealtimeConnector;

impl RealtimeConnector for OpenAIRealtimeConnector {
    fn create(
        &self,
        config: RealtimeConfig,
        events: RealtimeEventSender,
    ) -> RealtimeResult<BoxedRealtime> {
        Ok(Box::new(OpenAIRealtime::new(config, events)?))
    }
}

// =============================================================================
// Tests
// =============================================================================
