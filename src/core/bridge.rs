//! Call bridge: pairs one telephony stream with one realtime AI leg.
//!
//! The bridge owns the AI leg and the receiving end of its event channel.
//! Everything it does runs on the telephony connection's task, so caller
//! audio, synthesized audio, barge-in clears and transcript appends are
//! applied in the order they reach that task.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};
use zeroize::Zeroize;

use crate::core::lifecycle::LifecycleManager;
use crate::core::realtime::{
    BoxedRealtime, InputTranscriptionConfig, RealtimeConfig, RealtimeConnector, RealtimeEvent,
    TranscriptRole, TurnDetectionConfig,
};
use crate::core::realtime::openai::TELEPHONY_AUDIO_FORMAT;
use crate::core::session::{RegistryError, Session, SessionRegistry, Speaker};
use crate::core::telephony::{TelephonyOutgoingMessage, TelephonyRoute};

/// Capacity of the per-call realtime event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Upper bound on the AI leg handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Process-wide parameters for opening AI legs.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub api_key: Option<String>,
    pub realtime_url: String,
    pub model: String,
    /// Synthesis voice for every call
    pub voice: String,
    pub transcription_model: String,
    pub turn_detection: TurnDetectionConfig,
}

impl BridgeSettings {
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Realtime configuration for one call.
    pub fn realtime_config(&self, session: &Session) -> RealtimeConfig {
        RealtimeConfig {
            api_key: self.api_key.clone().unwrap_or_default(),
            url: self.realtime_url.clone(),
            model: self.model.clone(),
            voice: Some(self.voice.clone()),
            instructions: Some(session.prompt.clone()),
            input_audio_format: Some(TELEPHONY_AUDIO_FORMAT.to_string()),
            output_audio_format: Some(TELEPHONY_AUDIO_FORMAT.to_string()),
            input_audio_transcription: Some(InputTranscriptionConfig {
                model: self.transcription_model.clone(),
            }),
            turn_detection: Some(self.turn_detection.clone()),
            modalities: Some(vec!["text".to_string(), "audio".to_string()]),
        }
    }
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            realtime_url: String::new(),
            model: String::new(),
            voice: "alloy".to_string(),
            transcription_model: "whisper-1".to_string(),
            turn_detection: TurnDetectionConfig::default(),
        }
    }
}

impl Drop for BridgeSettings {
    fn drop(&mut self) {
        if let Some(key) = self.api_key.as_mut() {
            key.zeroize();
        }
    }
}

/// Shared dependencies every telephony connection needs.
#[derive(Clone)]
pub struct BridgeContext {
    pub registry: Arc<SessionRegistry>,
    pub lifecycle: Arc<LifecycleManager>,
    pub connector: Arc<dyn RealtimeConnector>,
    pub settings: Arc<BridgeSettings>,
}

/// Runtime state of one bridged call.
pub struct CallBridge {
    session_id: String,
    stream_sid: String,
    leg: Option<BoxedRealtime>,
    events: mpsc::Receiver<RealtimeEvent>,
    events_open: bool,
    /// Set once the Ready signal has been processed on this task
    ai_ready: bool,
    outbound: mpsc::Sender<TelephonyRoute>,
    registry: Arc<SessionRegistry>,
}

impl CallBridge {
    /// Open the AI leg for `session`.
    ///
    /// Connection failures are logged and leave the bridge without a leg; the
    /// telephony side keeps running and caller audio is dropped.
    pub async fn open(
        ctx: &BridgeContext,
        session: &Session,
        stream_sid: String,
        outbound: mpsc::Sender<TelephonyRoute>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let config = ctx.settings.realtime_config(session);

        let leg = match ctx.connector.create(config, events_tx) {
            Ok(mut leg) => match tokio::time::timeout(CONNECT_TIMEOUT, leg.connect()).await {
                Ok(Ok(())) => {
                    info!(session_id = %session.id, stream_sid = %stream_sid, "AI leg connected");
                    Some(leg)
                }
                Ok(Err(e)) => {
                    error!(session_id = %session.id, error = %e, "Failed to connect AI leg");
                    None
                }
                Err(_) => {
                    error!(session_id = %session.id, "AI leg connection timed out");
                    None
                }
            },
            Err(e) => {
                error!(session_id = %session.id, error = %e, "Failed to create AI leg");
                None
            }
        };

        Self {
            session_id: session.id.clone(),
            stream_sid,
            leg,
            events: events_rx,
            events_open: true,
            ai_ready: false,
            outbound,
            registry: Arc::clone(&ctx.registry),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn stream_sid(&self) -> &str {
        &self.stream_sid
    }

    /// True once the AI leg has acknowledged the session and until it closes.
    pub fn is_ready(&self) -> bool {
        self.ai_ready && self.leg.as_ref().is_some_and(|leg| leg.is_ready())
    }

    /// Wait for the next AI signal.
    ///
    /// Once the channel is exhausted this yields a single `Closed` and then
    /// never resolves, so it can sit in a `select!` for the whole call.
    pub async fn next_event(&mut self) -> RealtimeEvent {
        if self.events_open {
            if let Some(event) = self.events.recv().await {
                return event;
            }
            self.events_open = false;
            return RealtimeEvent::Closed;
        }
        std::future::pending().await
    }

    /// Relay one frame of caller audio. Returns whether it was forwarded.
    ///
    /// Audio that arrives before the AI leg is ready is dropped, never queued.
    pub async fn forward_caller_audio(&mut self, audio: Bytes) -> bool {
        if !self.is_ready() {
            trace!(session_id = %self.session_id, "AI leg not ready, dropping caller audio");
            return false;
        }
        let Some(leg) = self.leg.as_mut() else {
            return false;
        };

        match leg.send_audio(audio).await {
            Ok(()) => true,
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "Failed to send caller audio");
                false
            }
        }
    }

    /// Apply one AI signal to the call.
    pub async fn handle_realtime_event(&mut self, event: RealtimeEvent) {
        match event {
            RealtimeEvent::Ready => {
                self.ai_ready = true;
                info!(session_id = %self.session_id, "AI leg ready");
            }

            RealtimeEvent::Audio(audio) => {
                let message = TelephonyOutgoingMessage::media(&self.stream_sid, &audio.data);
                self.send_outbound(message).await;
            }

            RealtimeEvent::SpeechStarted { audio_start_ms } => {
                debug!(
                    session_id = %self.session_id,
                    audio_start_ms,
                    "Caller barge-in, clearing playback"
                );
                self.send_outbound(TelephonyOutgoingMessage::clear(&self.stream_sid))
                    .await;
            }

            RealtimeEvent::Transcript(transcript) => {
                let speaker = match transcript.role {
                    TranscriptRole::User => Speaker::User,
                    TranscriptRole::Assistant => Speaker::Agent,
                };
                match self
                    .registry
                    .append_transcript(&self.session_id, speaker, transcript.text)
                {
                    Ok(()) => {}
                    Err(RegistryError::Ended(_)) => {
                        debug!(session_id = %self.session_id, "Dropping transcript for ended session");
                    }
                    Err(e) => {
                        warn!(session_id = %self.session_id, error = %e, "Failed to record transcript");
                    }
                }
            }

            RealtimeEvent::Closed => {
                if self.ai_ready || self.leg.is_some() {
                    warn!(session_id = %self.session_id, "AI leg closed");
                }
                self.ai_ready = false;
            }
        }
    }

    async fn send_outbound(&self, message: TelephonyOutgoingMessage) {
        if self
            .outbound
            .send(TelephonyRoute::Outgoing(message))
            .await
            .is_err()
        {
            debug!(session_id = %self.session_id, "Telephony writer gone, dropping outbound message");
        }
    }

    /// Close the AI leg.
    pub async fn teardown(mut self) {
        self.ai_ready = false;
        self.events.close();

        if let Some(mut leg) = self.leg.take()
            && let Err(e) = leg.disconnect().await
        {
            error!(session_id = %self.session_id, error = %e, "Failed to disconnect AI leg");
        }

        debug!(session_id = %self.session_id, "Call bridge torn down");
    }
}
