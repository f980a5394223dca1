//! Call sessions and the in-memory session registry.
//!
//! A session is created by the session endpoint before the telephony provider
//! ever opens a media stream. It carries the assistant prompt and the caller
//! metadata, and accumulates the transcript while a call is bridged.
//!
//! Sessions live only in process memory. They are removed either a grace
//! period after the call is finalized, or by the periodic sweep once they
//! exceed the maximum age.

mod registry;
mod transcript;

use std::time::Duration;

use time::OffsetDateTime;

pub use registry::{RegistryError, SessionHandle, SessionRegistry};
pub use transcript::{Speaker, TranscriptEntry, TranscriptLabels, render_transcript};

/// Prompt used when the creator does not supply one.
pub const DEFAULT_PROMPT: &str = "You are a friendly and concise voice assistant on a phone call. \
Greet the caller, keep answers short, and ask one question at a time.";

/// Caller-supplied attributes for a new session. Every field is optional.
#[derive(Debug, Clone, Default)]
pub struct SessionAttributes {
    pub prompt: Option<String>,
    pub external_call_id: Option<String>,
    pub contact_name: Option<String>,
    pub voice_id: Option<String>,
    pub language: Option<String>,
}

/// Values applied for attributes missing from [`SessionAttributes`].
#[derive(Debug, Clone)]
pub struct SessionDefaults {
    pub prompt: String,
    pub language: String,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            language: "en".to_string(),
        }
    }
}

/// A call session record.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub prompt: String,
    pub external_call_id: Option<String>,
    pub contact_name: String,
    /// Caller-supplied voice label. Metadata only; the AI leg always uses
    /// the configured voice.
    pub voice_id: String,
    pub language: String,
    pub transcript: Vec<TranscriptEntry>,
    pub created_at: OffsetDateTime,
    /// Set once by finalize; never reset.
    pub ended: bool,
    /// True while a telephony/AI pairing owns this session.
    pub attached: bool,
}

impl Session {
    pub(crate) fn new(id: String, attributes: SessionAttributes, defaults: &SessionDefaults) -> Self {
        // Blank strings count as missing
        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

        Self {
            id,
            prompt: non_empty(attributes.prompt).unwrap_or_else(|| defaults.prompt.clone()),
            external_call_id: non_empty(attributes.external_call_id),
            contact_name: attributes.contact_name.unwrap_or_default(),
            voice_id: attributes.voice_id.unwrap_or_default(),
            language: non_empty(attributes.language).unwrap_or_else(|| defaults.language.clone()),
            transcript: Vec::new(),
            created_at: OffsetDateTime::now_utc(),
            ended: false,
            attached: false,
        }
    }

    /// Wall-clock time since creation, clamped at zero.
    pub fn age(&self) -> Duration {
        let elapsed = OffsetDateTime::now_utc() - self.created_at;
        Duration::try_from(elapsed).unwrap_or_default()
    }

    /// Transcript rendered with labels for this session's language.
    pub fn rendered_transcript(&self) -> String {
        render_transcript(
            &self.transcript,
            TranscriptLabels::for_language(&self.language),
        )
    }
}
