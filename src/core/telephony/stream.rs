//! Per-connection telephony stream state machine.
//!
//! `Init -> Started -> Streaming -> Terminated`. A stream only reaches
//! `Started` once its `start` event names a session that could be attached;
//! only then is an AI leg opened.

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::messages::{
    MediaPayload, StartPayload, TelephonyIncomingMessage, TelephonyRoute, parse_incoming,
};
use crate::core::bridge::{BridgeContext, CallBridge};
use crate::core::lifecycle::EndReason;
use crate::core::realtime::RealtimeEvent;
use crate::core::session::RegistryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelephonyState {
    /// Connected, waiting for `start`
    Init,
    /// Session resolved and AI leg opened
    Started,
    /// Caller media flowing
    Streaming,
    /// Stopped or closed; nothing further is relayed
    Terminated,
}

impl fmt::Display for TelephonyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelephonyState::Init => write!(f, "init"),
            TelephonyState::Started => write!(f, "started"),
            TelephonyState::Streaming => write!(f, "streaming"),
            TelephonyState::Terminated => write!(f, "terminated"),
        }
    }
}

/// What the connection loop should do after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamControl {
    Continue,
    Close,
}

/// Call-side state of one telephony connection.
pub struct TelephonyStream {
    ctx: BridgeContext,
    /// `sessionId` query parameter captured at upgrade
    url_session_id: Option<String>,
    outbound: mpsc::Sender<TelephonyRoute>,
    state: TelephonyState,
    session_id: Option<String>,
    stream_sid: Option<String>,
    call_sid: Option<String>,
    bridge: Option<CallBridge>,
}

impl TelephonyStream {
    pub fn new(
        ctx: BridgeContext,
        url_session_id: Option<String>,
        outbound: mpsc::Sender<TelephonyRoute>,
    ) -> Self {
        Self {
            ctx,
            url_session_id: url_session_id.filter(|id| !id.is_empty()),
            outbound,
            state: TelephonyState::Init,
            session_id: None,
            stream_sid: None,
            call_sid: None,
            bridge: None,
        }
    }

    pub fn state(&self) -> TelephonyState {
        self.state
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn stream_sid(&self) -> Option<&str> {
        self.stream_sid.as_deref()
    }

    /// Handle one inbound text frame.
    pub async fn on_text(&mut self, text: &str) -> StreamControl {
        let message = match parse_incoming(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    session_id = ?self.session_id,
                    error = %e,
                    "Dropping malformed telephony message"
                );
                return StreamControl::Continue;
            }
        };

        match message {
            TelephonyIncomingMessage::Connected { protocol, version } => {
                debug!(protocol = ?protocol, version = ?version, "Telephony stream connected");
                StreamControl::Continue
            }
            TelephonyIncomingMessage::Start { start, .. } => self.on_start(start).await,
            TelephonyIncomingMessage::Media { media, .. } => {
                self.on_media(media).await;
                StreamControl::Continue
            }
            TelephonyIncomingMessage::Stop { .. } => self.on_stop().await,
            TelephonyIncomingMessage::Mark { .. } | TelephonyIncomingMessage::Unknown => {
                debug!(session_id = ?self.session_id, "Ignoring telephony event");
                StreamControl::Continue
            }
        }
    }

    async fn on_start(&mut self, start: StartPayload) -> StreamControl {
        if self.state != TelephonyState::Init {
            warn!(
                session_id = ?self.session_id,
                state = %self.state,
                "Ignoring repeated start event"
            );
            return StreamControl::Continue;
        }

        let Some(session_id) = self.resolve_session(&start) else {
            warn!(
                stream_sid = %start.stream_sid,
                call_sid = %start.call_sid,
                "No usable session for stream, closing"
            );
            self.state = TelephonyState::Terminated;
            return StreamControl::Close;
        };

        info!(
            session_id = %session_id,
            stream_sid = %start.stream_sid,
            call_sid = %start.call_sid,
            "Telephony stream started"
        );

        self.state = TelephonyState::Started;
        self.session_id = Some(session_id.clone());
        self.stream_sid = Some(start.stream_sid.clone());
        self.call_sid = Some(start.call_sid);

        let Some(session) = self.ctx.registry.get(&session_id) else {
            // Swept between attach and here
            warn!(session_id = %session_id, "Session vanished after attach, closing");
            self.state = TelephonyState::Terminated;
            return StreamControl::Close;
        };

        let bridge = CallBridge::open(
            &self.ctx,
            &session,
            start.stream_sid,
            self.outbound.clone(),
        )
        .await;
        self.bridge = Some(bridge);

        StreamControl::Continue
    }

    /// Custom parameter first, then the URL parameter. The first candidate
    /// that can be attached wins.
    fn resolve_session(&self, start: &StartPayload) -> Option<String> {
        let candidates = [start.session_id(), self.url_session_id.as_deref()];

        for candidate in candidates.into_iter().flatten() {
            match self.ctx.registry.attach(candidate) {
                Ok(_) => return Some(candidate.to_string()),
                Err(e @ RegistryError::NotFound(_)) => {
                    debug!(error = %e, "Session candidate not found");
                }
                Err(e) => {
                    warn!(error = %e, "Session candidate rejected");
                }
            }
        }
        None
    }

    async fn on_media(&mut self, media: MediaPayload) {
        match self.state {
            TelephonyState::Started => self.state = TelephonyState::Streaming,
            TelephonyState::Streaming => {}
            TelephonyState::Init | TelephonyState::Terminated => {
                trace!(state = %self.state, "Dropping media outside an active stream");
                return;
            }
        }

        let audio = match media.decode() {
            Ok(audio) => audio,
            Err(e) => {
                warn!(session_id = ?self.session_id, error = %e, "Dropping invalid media frame");
                return;
            }
        };

        if let Some(bridge) = self.bridge.as_mut() {
            bridge.forward_caller_audio(audio).await;
        }
    }

    async fn on_stop(&mut self) -> StreamControl {
        info!(
            session_id = ?self.session_id,
            stream_sid = ?self.stream_sid,
            "Telephony stream stopped"
        );
        self.finish(EndReason::CallEnded).await;
        StreamControl::Close
    }

    /// Wait for the next AI signal; never resolves while no AI leg exists.
    pub async fn next_realtime_event(&mut self) -> RealtimeEvent {
        match self.bridge.as_mut() {
            Some(bridge) => bridge.next_event().await,
            None => std::future::pending().await,
        }
    }

    pub async fn on_realtime_event(&mut self, event: RealtimeEvent) {
        if let Some(bridge) = self.bridge.as_mut() {
            bridge.handle_realtime_event(event).await;
        }
    }

    /// The telephony socket closed. Finalizes (if `stop` has not already)
    /// and closes the AI leg.
    pub async fn on_close(&mut self) {
        self.finish(EndReason::ConnectionClosed).await;
    }

    async fn finish(&mut self, reason: EndReason) {
        if let Some(session_id) = self.session_id.as_deref() {
            self.ctx
                .lifecycle
                .finalize(session_id, self.call_sid.as_deref(), reason);
        }

        if let Some(bridge) = self.bridge.take() {
            bridge.teardown().await;
        }

        self.state = TelephonyState::Terminated;
    }
}
