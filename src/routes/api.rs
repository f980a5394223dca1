use axum::{
    Router,
    routing::{get, post},
};
use std::time::Duration;
use tower::util::option_layer;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use tower_http::trace::TraceLayer;

use crate::errors::app_error::{AppError, AppResult};
use crate::handlers::{api, sessions, twiml};
use crate::state::AppState;
use std::sync::Arc;

/// Per-client request budget for session creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRateLimit {
    pub requests_per_second: u32,
    pub burst_size: u32,
}

/// Create the HTTP API router
///
/// Health checks and the TwiML instructions endpoint. Neither is rate limited:
/// the telephony provider fetches instructions from shared egress addresses.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(api::health_check))
        .route("/health", get(api::health_check))
        // The telephony provider may fetch instructions with either verb
        .route("/twiml", get(twiml::twiml_handler).post(twiml::twiml_handler))
        .layer(TraceLayer::new_for_http())
}

/// Create the session creation router
///
/// `POST /sessions`, limited per client IP when `rate_limit` is set.
pub fn create_sessions_router(
    rate_limit: Option<SessionRateLimit>,
) -> AppResult<Router<Arc<AppState>>> {
    let governor = match rate_limit {
        Some(limit) => {
            let config = GovernorConfigBuilder::default()
                .period(Duration::from_secs(1) / limit.requests_per_second.max(1))
                .burst_size(limit.burst_size)
                .key_extractor(SmartIpKeyExtractor)
                .finish()
                .ok_or_else(|| {
                    AppError::Internal(format!("Invalid session rate limit: {limit:?}"))
                })?;
            Some(GovernorLayer::new(config))
        }
        None => None,
    };

    Ok(Router::new()
        .route("/sessions", post(sessions::create_session))
        .layer(option_layer(governor))
        .layer(TraceLayer::new_for_http()))
}
