//! Media stream WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::media_stream_handler;
use crate::handlers::twiml::MEDIA_STREAM_PATH;
use crate::state::AppState;
use std::sync::Arc;

/// Create the media stream router
///
/// # Endpoint
///
/// `GET /media-stream[?sessionId=...]` - WebSocket upgrade for one call's audio
///
/// # Protocol
///
/// The telephony provider sends JSON events: `connected`, `start` (with
/// `streamSid`, `callSid` and `customParameters.sessionId`), `media` (base64
/// mu-law audio) and `stop`.
///
/// The server sends back:
/// - `{"event":"media","streamSid":...,"media":{"payload":...}}` for agent audio
/// - `{"event":"clear","streamSid":...}` when the caller barges in
pub fn create_media_stream_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(MEDIA_STREAM_PATH, get(media_stream_handler))
        .layer(TraceLayer::new_for_http())
}
