//! Concurrent session registry.
//!
//! Sessions are stored as `Arc<RwLock<Session>>` inside a `DashMap`, so call
//! pairings and the background sweep can work on different sessions without
//! contending on a single lock. Map guards are never held while a session
//! lock is being acquired by anything other than [`SessionRegistry::sweep`].

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

use super::{Session, SessionAttributes, SessionDefaults, Speaker, TranscriptEntry};

/// Shared, lockable handle to a live session.
pub type SessionHandle = Arc<RwLock<Session>>;

/// Errors returned by registry operations that can be refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session already ended: {0}")]
    Ended(String),

    #[error("Session already attached to an active call: {0}")]
    AlreadyAttached(String),
}

/// Registry of call sessions keyed by session id.
pub struct SessionRegistry {
    sessions: DashMap<String, SessionHandle>,
    defaults: SessionDefaults,
}

impl SessionRegistry {
    pub fn new(defaults: SessionDefaults) -> Self {
        Self {
            sessions: DashMap::new(),
            defaults,
        }
    }

    /// Create a session with a fresh id, filling defaults for missing attributes.
    pub fn create(&self, attributes: SessionAttributes) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let session = Session::new(id.clone(), attributes, &self.defaults);

        debug!(
            session_id = %id,
            external_call_id = ?session.external_call_id,
            language = %session.language,
            "Session created"
        );

        self.sessions
            .insert(id.clone(), Arc::new(RwLock::new(session)));
        id
    }

    /// Snapshot of a session.
    pub fn get(&self, id: &str) -> Option<Session> {
        self.handle(id).map(|handle| handle.read().clone())
    }

    /// Shared handle to a session, for callers that need to mutate it.
    pub fn handle(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Remove a session. Returns whether it was present.
    pub fn delete(&self, id: &str) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            debug!(session_id = %id, "Session deleted");
        }
        removed
    }

    /// Claim a session for a call pairing.
    ///
    /// Fails if the session is unknown, already finalized, or owned by another
    /// pairing.
    pub fn attach(&self, id: &str) -> Result<SessionHandle, RegistryError> {
        let handle = self
            .handle(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

        {
            let mut session = handle.write();
            if session.ended {
                return Err(RegistryError::Ended(id.to_string()));
            }
            if session.attached {
                return Err(RegistryError::AlreadyAttached(id.to_string()));
            }
            session.attached = true;
        }

        Ok(handle)
    }

    /// Append a completed utterance to an active session's transcript.
    pub fn append_transcript(
        &self,
        id: &str,
        role: Speaker,
        text: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let handle = self
            .handle(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

        let mut session = handle.write();
        if session.ended {
            return Err(RegistryError::Ended(id.to_string()));
        }
        session.transcript.push(TranscriptEntry::new(role, text));
        Ok(())
    }

    /// Delete every session older than `max_age`, finalized or not.
    ///
    /// Returns the number of sessions removed.
    pub fn sweep(&self, max_age: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, handle| handle.read().age() <= max_age);
        before.saturating_sub(self.sessions.len())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(SessionDefaults::default())
    }
}
