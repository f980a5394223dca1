//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoint
//! - `sessions` - Session creation
//! - `twiml` - Stream instructions for the telephony provider
//! - `media_stream` - Telephony media stream WebSocket

pub mod api;
pub mod media_stream;
pub mod sessions;
pub mod twiml;

pub use media_stream::media_stream_handler;
