//! Session creation endpoint.

use std::sync::Arc;

use axum::{Json, body::Bytes, extract::State};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::session::SessionAttributes;
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

/// Body of `POST /sessions`. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub prompt: Option<String>,
    pub call_id: Option<String>,
    pub contact_name: Option<String>,
    pub voice_id: Option<String>,
    pub language: Option<String>,
}

impl From<CreateSessionRequest> for SessionAttributes {
    fn from(request: CreateSessionRequest) -> Self {
        SessionAttributes {
            prompt: request.prompt,
            external_call_id: request.call_id,
            contact_name: request.contact_name,
            voice_id: request.voice_id,
            language: request.language,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: String,
}

/// Create a session record ahead of the call.
///
/// An empty body creates a session with every default applied.
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> AppResult<Json<CreateSessionResponse>> {
    let request: CreateSessionRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CreateSessionRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid session body: {e}")))?
    };

    let call_id = request.call_id.clone();
    let session_id = state.sessions.create(request.into());

    info!(session_id = %session_id, call_id = ?call_id, "Session created");

    Ok(Json(CreateSessionResponse { session_id }))
}
