//! Session lifecycle: call finalization, results reporting and eviction.
//!
//! `finalize` runs at most once per session no matter how many paths reach
//! it (explicit `stop`, socket close, or both racing). The `ended` flag is
//! flipped under the session's write lock, so only the first caller gets to
//! render the transcript, post the report and schedule deletion.
//!
//! Sessions leave the registry either a grace period after finalize, or via
//! the periodic sweep once they exceed the maximum age, whichever is first.

mod report;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::session::SessionRegistry;

pub use report::{
    CallReport, DEFAULT_REPORT_TIMEOUT, END_OF_CALL_REPORT, HttpResultsReporter, ReportError,
    ResultsReporter,
};

/// Why a call was finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Telephony provider sent `stop`
    CallEnded,
    /// Telephony socket closed without a prior `stop`
    ConnectionClosed,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::CallEnded => "call_ended",
            EndReason::ConnectionClosed => "connection_closed",
        }
    }
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timing for eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// Delay between finalize and deletion
    pub grace_period: Duration,
    /// Sessions older than this are swept regardless of state
    pub max_age: Duration,
    /// How often the sweep runs
    pub sweep_interval: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(60),
            max_age: Duration::from_secs(2 * 60 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
        }
    }
}

/// Outcome of the one finalize call that actually ended a session.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedCall {
    pub session_id: String,
    pub external_call_id: Option<String>,
    pub call_sid: Option<String>,
    pub transcript: String,
    pub duration_secs: u64,
    pub reason: EndReason,
}

impl FinalizedCall {
    /// Results payload, if the session has an external call id to report against.
    pub fn report(&self) -> Option<CallReport> {
        let call_id = self.external_call_id.clone()?;
        Some(CallReport {
            report_type: END_OF_CALL_REPORT.to_string(),
            call_id,
            call_sid: self.call_sid.clone(),
            transcript: self.transcript.clone(),
            duration: self.duration_secs,
            ended_reason: self.reason,
        })
    }
}

/// Finalizes calls and evicts sessions.
pub struct LifecycleManager {
    registry: Arc<SessionRegistry>,
    reporter: Option<Arc<dyn ResultsReporter>>,
    config: LifecycleConfig,
}

impl LifecycleManager {
    pub fn new(
        registry: Arc<SessionRegistry>,
        reporter: Option<Arc<dyn ResultsReporter>>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            registry,
            reporter,
            config,
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// End a call. Idempotent.
    ///
    /// Returns `None` if the session is unknown or was already finalized.
    /// Reporting and deletion run on detached tasks, so this must be called
    /// from within a Tokio runtime and never waits on the network.
    pub fn finalize(
        &self,
        session_id: &str,
        call_sid: Option<&str>,
        reason: EndReason,
    ) -> Option<FinalizedCall> {
        let Some(handle) = self.registry.handle(session_id) else {
            debug!(session_id = %session_id, "Finalize for unknown session ignored");
            return None;
        };

        let finalized = {
            let mut session = handle.write();
            if session.ended {
                debug!(session_id = %session_id, "Session already finalized");
                return None;
            }
            session.ended = true;
            session.attached = false;

            FinalizedCall {
                session_id: session.id.clone(),
                external_call_id: session.external_call_id.clone(),
                call_sid: call_sid.map(str::to_string),
                transcript: session.rendered_transcript(),
                duration_secs: session.age().as_secs(),
                reason,
            }
        };

        info!(
            session_id = %finalized.session_id,
            call_sid = ?finalized.call_sid,
            duration_secs = finalized.duration_secs,
            reason = %reason,
            "Call finalized"
        );

        self.dispatch_report(&finalized);
        self.schedule_deletion(finalized.session_id.clone());

        Some(finalized)
    }

    fn dispatch_report(&self, finalized: &FinalizedCall) {
        let Some(reporter) = self.reporter.as_ref() else {
            return;
        };
        let Some(report) = finalized.report() else {
            debug!(session_id = %finalized.session_id, "No external call id, skipping results report");
            return;
        };

        let reporter = Arc::clone(reporter);
        let session_id = finalized.session_id.clone();
        tokio::spawn(async move {
            match reporter.send(&report).await {
                Ok(()) => info!(session_id = %session_id, call_id = %report.call_id, "Results reported"),
                Err(e) => warn!(session_id = %session_id, error = %e, "Failed to report call results"),
            }
        });
    }

    fn schedule_deletion(&self, session_id: String) {
        let registry = Arc::clone(&self.registry);
        let grace_period = self.config.grace_period;
        tokio::spawn(async move {
            tokio::time::sleep(grace_period).await;
            registry.delete(&session_id);
        });
    }

    /// Delete every session older than the maximum age.
    pub fn sweep_once(&self) -> usize {
        let removed = self.registry.sweep(self.config.max_age);
        if removed > 0 {
            info!(removed, remaining = self.registry.len(), "Swept stale sessions");
        }
        removed
    }

    /// Run [`sweep_once`](Self::sweep_once) every sweep interval until `shutdown` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(manager.config.sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Session sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        manager.sweep_once();
                    }
                }
            }
        })
    }
}
