//! Base traits and types for the realtime AI leg.
//!
//! The AI leg of a call is a bidirectional audio connection to a hosted
//! realtime model. Caller audio goes in; synthesized audio, transcripts and
//! voice-activity signals come back out.
//!
//! Outbound signals are delivered as [`RealtimeEvent`]s over an `mpsc`
//! channel owned by the call bridge, so everything a call does happens in
//! arrival order on a single task.
//!
//! # Audio Format
//!
//! Telephony legs carry 8kHz G.711 u-law. The AI leg is configured for the
//! same codec in both directions, so frames are relayed without transcoding.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during realtime operations.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Connection to the provider failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// No socket: never connected, or already disconnected
    #[error("Not connected")]
    NotConnected,

    /// Connected but the remote has not acknowledged the session yet
    #[error("Session not ready")]
    NotReady,
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Configuration Types
// =============================================================================

/// Configuration for one realtime AI leg.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// API key for authentication
    pub api_key: String,

    /// WebSocket endpoint; the provider default is used when empty
    #[serde(default)]
    pub url: String,

    /// Model to use (e.g., "gpt-4o-realtime-preview")
    #[serde(default)]
    pub model: String,

    /// Voice ID for synthesized output
    #[serde(default)]
    pub voice: Option<String>,

    /// System instructions for the assistant
    #[serde(default)]
    pub instructions: Option<String>,

    /// Input audio format
    #[serde(default)]
    pub input_audio_format: Option<String>,

    /// Output audio format
    #[serde(default)]
    pub output_audio_format: Option<String>,

    /// Enable input audio transcription
    #[serde(default)]
    pub input_audio_transcription: Option<InputTranscriptionConfig>,

    /// Turn detection configuration
    #[serde(default)]
    pub turn_detection: Option<TurnDetectionConfig>,

    /// Response modalities (text, audio, or both)
    #[serde(default)]
    pub modalities: Option<Vec<String>>,
}

/// Configuration for input audio transcription.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputTranscriptionConfig {
    /// Model to use for transcription (e.g., "whisper-1")
    pub model: String,
}

/// Configuration for turn detection (VAD).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TurnDetectionConfig {
    /// Server-side VAD
    #[serde(rename = "server_vad")]
    ServerVad {
        /// Activation threshold (0.0 to 1.0)
        #[serde(default)]
        threshold: Option<f32>,
        /// Amount of audio to include before voice detection (ms)
        #[serde(default)]
        prefix_padding_ms: Option<u32>,
        /// Silence duration before end of turn (ms)
        #[serde(default)]
        silence_duration_ms: Option<u32>,
    },
    /// No automatic turn detection
    #[serde(rename = "none")]
    None,
}

impl Default for TurnDetectionConfig {
    fn default() -> Self {
        TurnDetectionConfig::ServerVad {
            threshold: Some(0.5),
            prefix_padding_ms: Some(300),
            silence_duration_ms: Some(500),
        }
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle of an AI leg.
///
/// `Connecting -> Configured -> Ready -> Closed`. A leg never leaves `Closed`;
/// one connection covers exactly one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Handshake in progress (or not started)
    #[default]
    Connecting,
    /// Socket open and session configuration sent
    Configured,
    /// Remote acknowledged the session; audio may flow
    Ready,
    /// Socket closed or failed
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Configured => write!(f, "Configured"),
            ConnectionState::Ready => write!(f, "Ready"),
            ConnectionState::Closed => write!(f, "Closed"),
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// Final transcript of one utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptResult {
    /// The transcribed text
    pub text: String,
    /// Role of the speaker (user or assistant)
    pub role: TranscriptRole,
    /// Item ID from the provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
}

/// Role of the speaker in a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    /// Caller speech transcript
    User,
    /// Assistant speech transcript
    Assistant,
}

impl fmt::Display for TranscriptRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscriptRole::User => write!(f, "user"),
            TranscriptRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// Synthesized audio chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeAudioData {
    /// Raw audio bytes in the leg's output format
    pub data: Bytes,
    /// Item ID from the provider
    pub item_id: Option<String>,
    /// Response ID from the provider
    pub response_id: Option<String>,
}

/// Signals an AI leg delivers to its call bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    /// Remote acknowledged the session; the opening turn has been requested
    Ready,
    /// Synthesized audio for the caller
    Audio(RealtimeAudioData),
    /// Completed transcript of a caller or assistant utterance
    Transcript(TranscriptResult),
    /// Caller started speaking (server VAD)
    SpeechStarted {
        /// Audio timestamp in milliseconds
        audio_start_ms: u64,
    },
    /// Leg closed; no further events follow
    Closed,
}

/// Sending half of a bridge's realtime event channel.
pub type RealtimeEventSender = mpsc::Sender<RealtimeEvent>;

// =============================================================================
// Base Trait
// =============================================================================

/// Base trait for realtime AI legs.
///
/// Implementations own their socket task and report everything the remote
/// sends through the [`RealtimeEventSender`] handed to them at creation.
#[async_trait]
pub trait BaseRealtime: Send + Sync {
    /// Open the connection and send the session configuration.
    async fn connect(&mut self) -> RealtimeResult<()>;

    /// Close the connection. Idempotent.
    async fn disconnect(&mut self) -> RealtimeResult<()>;

    /// True once the remote has acknowledged the session and until close.
    fn is_ready(&self) -> bool;

    /// Get the current connection state.
    fn get_connection_state(&self) -> ConnectionState;

    /// Append caller audio to the remote input buffer.
    async fn send_audio(&mut self, audio_data: Bytes) -> RealtimeResult<()>;
}

/// Boxed trait object for realtime legs.
pub type BoxedRealtime = Box<dyn BaseRealtime>;

/// Factory for realtime legs, held by the application state.
pub trait RealtimeConnector: Send + Sync {
    /// Create an unconnected leg that reports to `events`.
    fn create(
        &self,
        config: RealtimeConfig,
        events: RealtimeEventSender,
    ) -> RealtimeResult<BoxedRealtime>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_turn_detection_wire_shape() {
        assert_eq!(
            serde_json::to_value(TurnDetectionConfig::default()).unwrap(),
            json!({
                "type": "server_vad",
                "threshold": 0.5,
                "prefix_padding_ms": 300,
                "silence_duration_ms": 500
            })
        );
        assert_eq!(
            serde_json::to_value(TurnDetectionConfig::None).unwrap(),
            json!({"type": "none"})
        );
    }

    #[test]
    fn test_turn_detection_missing_fields_default_to_none() {
        let parsed: TurnDetectionConfig =
            serde_json::from_value(json!({"type": "server_vad", "threshold": 0.7})).unwrap();
        assert_eq!(
            parsed,
            TurnDetectionConfig::ServerVad {
                threshold: Some(0.7),
                prefix_padding_ms: None,
                silence_duration_ms: None,
            }
        );
    }

    #[test]
    fn test_config_defaults_leave_provider_choices_open() {
        let config = RealtimeConfig::default();
        assert!(config.url.is_empty());
        assert!(config.model.is_empty());
        assert!(config.turn_detection.is_none());
    }

    #[test]
    fn test_connection_state_starts_connecting() {
        assert_eq!(ConnectionState::default(), ConnectionState::Connecting);
        assert_eq!(ConnectionState::Configured.to_string(), "Configured");
    }

    #[test]
    fn test_not_ready_is_distinct_from_not_connected() {
        assert_eq!(RealtimeError::NotReady.to_string(), "Session not ready");
        assert_ne!(
            RealtimeError::NotReady.to_string(),
            RealtimeError::NotConnected.to_string()
        );
    }
}
