//! Realtime AI leg.
//!
//! This module provides the abstraction for the outbound conversational-AI
//! connection of a bridged call, and the OpenAI Realtime implementation.
//!
//! # Architecture
//!
//! - `BaseRealtime` trait for the per-call leg
//! - `RealtimeConnector` factory so the bridge never names a concrete provider
//! - `RealtimeEvent` channel instead of callbacks, so the call bridge consumes
//!   AI signals on its own task in arrival order
//!
//! # Example
//!
//! ```rust,ignore
//! use voice_bridge::core::realtime::{OpenAIRealtimeConnector, RealtimeConfig, RealtimeConnector};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (events_tx, mut events_rx) = mpsc::channel(256);
//!     let config = RealtimeConfig {
//!         api_key: "sk-...".to_string(),
//!         instructions: Some("Be concise".to_string()),
//!         ..Default::default()
//!     };
//!
//!     let mut leg = OpenAIRealtimeConnector.create(config, events_tx).unwrap();
//!     leg.connect().await.unwrap();
//!
//!     while let Some(event) = events_rx.recv().await {
//!         println!("{event:?}");
//!     }
//! }
//! ```

mod base;
pub mod openai;

pub use base::{
    BaseRealtime, BoxedRealtime, ConnectionState, InputTranscriptionConfig, RealtimeAudioData,
    RealtimeConfig, RealtimeConnector, RealtimeError, RealtimeEvent, RealtimeEventSender,
    RealtimeResult, TranscriptResult, TranscriptRole, TurnDetectionConfig,
};
pub use openai::{OpenAIRealtime, OpenAIRealtimeConnector};
