//! OpenAI Realtime API module.
//!
//! Speech-to-speech over a single WebSocket, with server-side VAD and
//! transcription of both sides of the conversation.
//!
//! The model name is passed through as configured; `gpt-4o-realtime-preview`
//! is used when none is set.
//!
//! # Supported Voices
//!
//! alloy, ash, ballad, coral, echo, sage, shimmer, verse
//!
//! # Audio Format
//!
//! G.711 u-law at 8kHz in both directions, matching telephony media streams.

mod client;
mod config;
mod messages;

pub use client::{OpenAIRealtime, OpenAIRealtimeConnector};
pub use config::{
    DEFAULT_REALTIME_MODEL, DEFAULT_TRANSCRIPTION_MODEL, OPENAI_REALTIME_URL,
    OpenAIRealtimeVoice, TELEPHONY_AUDIO_FORMAT,
};
pub use messages::{ClientEvent, ServerEvent, SessionConfig, TurnDetection};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realtime_url() {
        assert_eq!(OPENAI_REALTIME_URL, "wss://api.openai.com/v1/realtime");
    }

    #[test]
    fn test_default_transcription_model() {
        assert_eq!(DEFAULT_TRANSCRIPTION_MODEL, "whisper-1");
    }
}
