//! Stream instructions for the telephony provider.
//!
//! The provider fetches `/twiml?sessionId=...` when the call connects and is
//! told to open a media stream back to `/media-stream`, carrying the session
//! id both as a URL parameter and as a custom stream parameter.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::core::telephony::SESSION_ID_PARAMETER;
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

pub const MEDIA_STREAM_PATH: &str = "/media-stream";

#[derive(Debug, Deserialize)]
pub struct TwimlQuery {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// Return TwiML connecting the call to this server's media stream endpoint.
pub async fn twiml_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TwimlQuery>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let session_id = query
        .session_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("sessionId query parameter is required".to_string()))?;

    if !state.sessions.contains(&session_id) {
        return Err(AppError::SessionNotFound(session_id));
    }

    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok());
    let stream_url = stream_url(state.config.public_url.as_deref(), host, &session_id)?;

    debug!(session_id = %session_id, stream_url = %stream_url, "Serving stream instructions");

    let body = render_twiml(stream_url.as_str(), &session_id);
    Ok((
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/xml; charset=utf-8"),
        )],
        body,
    )
        .into_response())
}

/// WebSocket URL for the media stream. The public URL wins over the Host
/// header; http(s) schemes map to ws(s).
pub fn stream_url(public_url: Option<&str>, host: Option<&str>, session_id: &str) -> AppResult<Url> {
    let base = match (public_url, host) {
        (Some(public), _) => public.trim_end_matches('/').to_string(),
        (None, Some(host)) => format!("wss://{host}"),
        (None, None) => {
            return Err(AppError::BadRequest(
                "Host header is required when no public URL is configured".to_string(),
            ));
        }
    };

    let mut url = Url::parse(&base)
        .map_err(|e| AppError::Internal(format!("Invalid stream base URL {base:?}: {e}")))?;

    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => other,
    }
    .to_string();
    url.set_scheme(&scheme)
        .map_err(|_| AppError::Internal(format!("Cannot use scheme {scheme} for stream URL")))?;

    let path = format!("{}{MEDIA_STREAM_PATH}", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.query_pairs_mut()
        .clear()
        .append_pair(SESSION_ID_PARAMETER, session_id);

    Ok(url)
}

pub fn render_twiml(stream_url: &str, session_id: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
<Response><Connect><Stream url=\"{}\"><Parameter name=\"{}\" value=\"{}\"/></Stream></Connect></Response>",
        xml_escape(stream_url),
        SESSION_ID_PARAMETER,
        xml_escape(session_id),
    )
}

fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
