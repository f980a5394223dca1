pub mod bridge;
pub mod lifecycle;
pub mod realtime;
pub mod session;
pub mod telephony;

// Re-export commonly used types for convenience
pub use bridge::{BridgeContext, BridgeSettings, CallBridge};

pub use lifecycle::{
    CallReport, EndReason, FinalizedCall, HttpResultsReporter, LifecycleConfig, LifecycleManager,
    ReportError, ResultsReporter,
};

pub use realtime::{
    BaseRealtime, BoxedRealtime, ConnectionState, OpenAIRealtime, OpenAIRealtimeConnector,
    RealtimeConfig, RealtimeConnector, RealtimeError, RealtimeEvent, RealtimeResult,
};

pub use session::{
    RegistryError, Session, SessionAttributes, SessionDefaults, SessionRegistry, Speaker,
    TranscriptEntry,
};

pub use telephony::{StreamControl, TelephonyState, TelephonyStream};
