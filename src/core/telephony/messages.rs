//! Telephony media stream message types.
//!
//! The telephony provider speaks JSON text frames discriminated by `event`.
//! Inbound: `connected`, `start`, `media`, `stop` (plus `mark`, `dtmf`, ...
//! which are accepted and ignored). Outbound: `media` and `clear`.

use std::collections::HashMap;

use base64::prelude::*;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum accepted base64 media payload (64 KB). Real frames are ~20ms of
/// 8kHz u-law, i.e. a few hundred bytes.
pub const MAX_MEDIA_PAYLOAD_SIZE: usize = 64 * 1024;

/// Custom parameter carrying the session identifier.
pub const SESSION_ID_PARAMETER: &str = "sessionId";

// =============================================================================
// Errors
// =============================================================================

/// Inbound telephony frame failed to parse or validate.
#[derive(Debug, Error)]
pub enum TelephonyMessageError {
    #[error("Invalid message format: {0}")]
    InvalidFormat(#[from] serde_json::Error),

    #[error("Invalid media payload: {0}")]
    InvalidPayload(#[from] base64::DecodeError),

    #[error("Media payload too large: {size} bytes (max: {max} bytes)")]
    PayloadTooLarge { size: usize, max: usize },
}

// =============================================================================
// Incoming Messages (telephony provider -> bridge)
// =============================================================================

/// Inbound telephony event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyIncomingMessage {
    /// Socket handshake complete; informational
    Connected {
        #[serde(default)]
        protocol: Option<String>,
        #[serde(default)]
        version: Option<String>,
    },

    /// Stream metadata; sent once before any media
    Start {
        start: StartPayload,
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
    },

    /// One frame of caller audio
    Media {
        media: MediaPayload,
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
    },

    /// Stream ended by the provider
    Stop {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
    },

    /// Playback marker acknowledgement
    Mark {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
    },

    /// Any other event (e.g. `dtmf`)
    #[serde(other)]
    Unknown,
}

/// Body of a `start` event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPayload {
    pub stream_sid: String,
    pub call_sid: String,
    #[serde(default)]
    pub account_sid: Option<String>,
    #[serde(default)]
    pub custom_parameters: HashMap<String, String>,
}

impl StartPayload {
    /// Session id passed through `<Parameter name="sessionId">`, if non-empty.
    pub fn session_id(&self) -> Option<&str> {
        self.custom_parameters
            .get(SESSION_ID_PARAMETER)
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }
}

/// Body of a `media` event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MediaPayload {
    /// Base64-encoded u-law audio
    pub payload: String,
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub chunk: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl MediaPayload {
    /// Decode the audio, enforcing [`MAX_MEDIA_PAYLOAD_SIZE`].
    pub fn decode(&self) -> Result<Bytes, TelephonyMessageError> {
        let size = self.payload.len();
        if size > MAX_MEDIA_PAYLOAD_SIZE {
            return Err(TelephonyMessageError::PayloadTooLarge {
                size,
                max: MAX_MEDIA_PAYLOAD_SIZE,
            });
        }
        Ok(Bytes::from(BASE64_STANDARD.decode(&self.payload)?))
    }
}

/// Parse one inbound text frame.
pub fn parse_incoming(text: &str) -> Result<TelephonyIncomingMessage, TelephonyMessageError> {
    Ok(serde_json::from_str(text)?)
}

// =============================================================================
// Outgoing Messages (bridge -> telephony provider)
// =============================================================================

/// Outbound telephony event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyOutgoingMessage {
    /// Audio to play to the caller
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutgoingMedia,
    },

    /// Flush audio queued for playback (barge-in)
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

/// Body of an outbound `media` event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingMedia {
    /// Base64-encoded u-law audio
    pub payload: String,
}

impl TelephonyOutgoingMessage {
    /// Media frame carrying raw audio for `stream_sid`.
    pub fn media(stream_sid: impl Into<String>, audio: &[u8]) -> Self {
        TelephonyOutgoingMessage::Media {
            stream_sid: stream_sid.into(),
            media: OutgoingMedia {
                payload: BASE64_STANDARD.encode(audio),
            },
        }
    }

    pub fn clear(stream_sid: impl Into<String>) -> Self {
        TelephonyOutgoingMessage::Clear {
            stream_sid: stream_sid.into(),
        }
    }
}

/// Routing for the telephony socket's writer task.
#[derive(Debug)]
pub enum TelephonyRoute {
    Outgoing(TelephonyOutgoingMessage),
    Close,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_connected() {
        let msg =
            parse_incoming(r#"{"event":"connected","protocol":"Call","version":"1.0.0"}"#).unwrap();
        assert_eq!(
            msg,
            TelephonyIncomingMessage::Connected {
                protocol: Some("Call".to_string()),
                version: Some("1.0.0".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_start_with_custom_parameters() {
        let json = r#"{
            "event": "start",
            "sequenceNumber": "1",
            "start": {
                "accountSid": "AC1",
                "streamSid": "MZ1",
                "callSid": "CA1",
                "tracks": ["inbound"],
                "customParameters": {"sessionId": "s-1"},
                "mediaFormat": {"encoding": "audio/x-mulaw", "sampleRate": 8000, "channels": 1}
            },
            "streamSid": "MZ1"
        }"#;

        match parse_incoming(json).unwrap() {
            TelephonyIncomingMessage::Start { start, stream_sid } => {
                assert_eq!(start.stream_sid, "MZ1");
                assert_eq!(start.call_sid, "CA1");
                assert_eq!(start.session_id(), Some("s-1"));
                assert_eq!(stream_sid.as_deref(), Some("MZ1"));
            }
            other => panic!("Expected Start, got {other:?}"),
        }
    }

    #[test]
    fn test_start_without_custom_parameters() {
        let json = r#"{"event":"start","start":{"streamSid":"MZ1","callSid":"CA1"}}"#;
        match parse_incoming(json).unwrap() {
            TelephonyIncomingMessage::Start { start, .. } => assert!(start.session_id().is_none()),
            other => panic!("Expected Start, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_session_parameter_is_ignored() {
        let json = r#"{"event":"start","start":{"streamSid":"MZ1","callSid":"CA1","customParameters":{"sessionId":""}}}"#;
        match parse_incoming(json).unwrap() {
            TelephonyIncomingMessage::Start { start, .. } => assert!(start.session_id().is_none()),
            other => panic!("Expected Start, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_media_and_decode() {
        let json = r#"{"event":"media","sequenceNumber":"3","media":{"track":"inbound","chunk":"1","timestamp":"5","payload":"/38A"},"streamSid":"MZ1"}"#;
        match parse_incoming(json).unwrap() {
            TelephonyIncomingMessage::Media { media, .. } => {
                assert_eq!(media.decode().unwrap(), Bytes::from_static(&[0xff, 0x7f, 0x00]));
            }
            other => panic!("Expected Media, got {other:?}"),
        }
    }

    #[test]
    fn test_media_decode_rejects_bad_base64() {
        let media = MediaPayload {
            payload: "%%%".to_string(),
            track: None,
            chunk: None,
            timestamp: None,
        };
        assert!(matches!(
            media.decode(),
            Err(TelephonyMessageError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_media_decode_rejects_oversized_payload() {
        let media = MediaPayload {
            payload: "A".repeat(MAX_MEDIA_PAYLOAD_SIZE + 4),
            track: None,
            chunk: None,
            timestamp: None,
        };
        assert!(matches!(
            media.decode(),
            Err(TelephonyMessageError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_parse_stop_and_unknown() {
        assert!(matches!(
            parse_incoming(r#"{"event":"stop","streamSid":"MZ1","stop":{"callSid":"CA1"}}"#)
                .unwrap(),
            TelephonyIncomingMessage::Stop { .. }
        ));
        assert_eq!(
            parse_incoming(r#"{"event":"dtmf","dtmf":{"digit":"1"}}"#).unwrap(),
            TelephonyIncomingMessage::Unknown
        );
    }

    #[test]
    fn test_malformed_frames() {
        assert!(matches!(
            parse_incoming("not json"),
            Err(TelephonyMessageError::InvalidFormat(_))
        ));
        // Known event with a missing required body
        assert!(parse_incoming(r#"{"event":"media"}"#).is_err());
        assert!(parse_incoming(r#"{"event":"start","start":{"streamSid":"MZ1"}}"#).is_err());
        // No discriminator
        assert!(parse_incoming(r#"{"streamSid":"MZ1"}"#).is_err());
    }

    #[test]
    fn test_outgoing_serialization() {
        let media = serde_json::to_value(TelephonyOutgoingMessage::media("MZ1", &[0, 1, 2])).unwrap();
        assert_eq!(
            media,
            serde_json::json!({"event": "media", "streamSid": "MZ1", "media": {"payload": "AAEC"}})
        );

        let clear = serde_json::to_value(TelephonyOutgoingMessage::clear("MZ1")).unwrap();
        assert_eq!(clear, serde_json::json!({"event": "clear", "streamSid": "MZ1"}));
    }
}
