//! Telephony media streams.
//!
//! One [`TelephonyStream`] per inbound WebSocket from the telephony provider.
//! It parses provider events, resolves the call's session, and drives the
//! [`CallBridge`](crate::core::bridge::CallBridge) that owns the AI leg.

mod messages;
mod stream;

pub use messages::{
    MAX_MEDIA_PAYLOAD_SIZE, MediaPayload, OutgoingMedia, SESSION_ID_PARAMETER, StartPayload,
    TelephonyIncomingMessage, TelephonyMessageError, TelephonyOutgoingMessage, TelephonyRoute,
    parse_incoming,
};
pub use stream::{StreamControl, TelephonyState, TelephonyStream};
