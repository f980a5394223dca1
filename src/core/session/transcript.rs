//! Speaker-labeled call transcript.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Who produced a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The caller on the telephony leg
    User,
    /// The AI assistant
    Agent,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::User => write!(f, "user"),
            Speaker::Agent => write!(f, "agent"),
        }
    }
}

/// A single completed utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEntry {
    pub role: Speaker,
    pub text: String,
    pub timestamp: OffsetDateTime,
}

impl TranscriptEntry {
    pub fn new(role: Speaker, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// Display labels used when rendering a transcript for the results collector.
///
/// Labels are presentation strings only; they are picked from the session
/// language and never parsed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscriptLabels {
    pub agent: &'static str,
    pub user: &'static str,
}

impl TranscriptLabels {
    pub const ENGLISH: Self = Self {
        agent: "Agent",
        user: "User",
    };

    pub const SPANISH: Self = Self {
        agent: "Agente",
        user: "Cliente",
    };

    /// Pick labels for a BCP-47-ish language tag (`es`, `es-MX`, `en-US`, ...).
    pub fn for_language(language: &str) -> Self {
        let primary = language
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        match primary.as_str() {
            "es" => Self::SPANISH,
            _ => Self::ENGLISH,
        }
    }

    fn label(&self, speaker: Speaker) -> &'static str {
        match speaker {
            Speaker::Agent => self.agent,
            Speaker::User => self.user,
        }
    }
}

/// Render entries as newline-joined `"<Label>: <text>"` lines, in arrival order.
pub fn render_transcript(entries: &[TranscriptEntry], labels: TranscriptLabels) -> String {
    entries
        .iter()
        .map(|entry| format!("{}: {}", labels.label(entry.role), entry.text))
        .collect::<Vec<_>>()
        .join("\n")
}
