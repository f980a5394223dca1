//! In-process fakes shared by unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::core::lifecycle::{CallReport, ReportError, ResultsReporter};
use crate::core::realtime::{
    BaseRealtime, BoxedRealtime, ConnectionState, RealtimeConfig, RealtimeConnector,
    RealtimeError, RealtimeEvent, RealtimeEventSender, RealtimeResult,
};

// =============================================================================
// Fake realtime leg
// =============================================================================

#[derive(Default)]
struct LegRecord {
    configs: Vec<RealtimeConfig>,
    sent_audio: Vec<Bytes>,
    connected: bool,
    disconnected: bool,
    // Weak so dropping the leg still closes the bridge's channel
    events: Option<mpsc::WeakSender<RealtimeEvent>>,
}

/// Observes and drives the legs created by a [`FakeConnector`].
#[derive(Clone, Default)]
pub struct FakeLegMonitor {
    record: Arc<Mutex<LegRecord>>,
    ready: Arc<AtomicBool>,
}

impl FakeLegMonitor {
    pub fn configs(&self) -> Vec<RealtimeConfig> {
        self.record.lock().configs.clone()
    }

    pub fn sent_audio(&self) -> Vec<Bytes> {
        self.record.lock().sent_audio.clone()
    }

    pub fn connected(&self) -> bool {
        self.record.lock().connected
    }

    pub fn disconnected(&self) -> bool {
        self.record.lock().disconnected
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Deliver a signal as if the remote had sent it.
    pub async fn emit(&self, event: RealtimeEvent) {
        let sender = self
            .record
            .lock()
            .events
            .as_ref()
            .and_then(mpsc::WeakSender::upgrade);
        if let Some(sender) = sender {
            let _ = sender.send(event).await;
        }
    }
}

/// Connector producing [`FakeRealtime`] legs.
pub struct FakeConnector {
    monitor: FakeLegMonitor,
    fail_connect: bool,
    connect_delay: Option<Duration>,
    created: AtomicUsize,
}

impl FakeConnector {
    pub fn new() -> (Self, FakeLegMonitor) {
        Self::build(false)
    }

    /// Every leg fails to connect.
    pub fn failing() -> (Self, FakeLegMonitor) {
        Self::build(true)
    }

    /// Legs become ready and signal `Ready` as soon as the handshake starts,
    /// but `connect` only returns after `delay`.
    pub fn slow(delay: Duration) -> (Self, FakeLegMonitor) {
        let (mut connector, monitor) = Self::build(false);
        connector.connect_delay = Some(delay);
        (connector, monitor)
    }

    fn build(fail_connect: bool) -> (Self, FakeLegMonitor) {
        let monitor = FakeLegMonitor::default();
        (
            Self {
                monitor: monitor.clone(),
                fail_connect,
                connect_delay: None,
                created: AtomicUsize::new(0),
            },
            monitor,
        )
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl RealtimeConnector for FakeConnector {
    fn create(
        &self,
        config: RealtimeConfig,
        events: RealtimeEventSender,
    ) -> RealtimeResult<BoxedRealtime> {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.monitor.record.lock().configs.push(config);
        Ok(Box::new(FakeRealtime {
            monitor: self.monitor.clone(),
            events,
            fail_connect: self.fail_connect,
            connect_delay: self.connect_delay,
            state: ConnectionState::Connecting,
        }))
    }
}

pub struct FakeRealtime {
    monitor: FakeLegMonitor,
    events: RealtimeEventSender,
    fail_connect: bool,
    connect_delay: Option<Duration>,
    state: ConnectionState,
}

#[async_trait]
impl BaseRealtime for FakeRealtime {
    async fn connect(&mut self) -> RealtimeResult<()> {
        if self.fail_connect {
            self.state = ConnectionState::Closed;
            return Err(RealtimeError::ConnectionFailed("refused".to_string()));
        }
        {
            let mut record = self.monitor.record.lock();
            record.connected = true;
            record.events = Some(self.events.downgrade());
        }
        if let Some(delay) = self.connect_delay {
            self.monitor.set_ready(true);
            let _ = self.events.send(RealtimeEvent::Ready).await;
            tokio::time::sleep(delay).await;
        }
        self.state = ConnectionState::Configured;
        Ok(())
    }

    async fn disconnect(&mut self) -> RealtimeResult<()> {
        self.monitor.record.lock().disconnected = true;
        self.monitor.set_ready(false);
        self.state = ConnectionState::Closed;
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.monitor.ready.load(Ordering::SeqCst)
    }

    fn get_connection_state(&self) -> ConnectionState {
        self.state
    }

    async fn send_audio(&mut self, audio_data: Bytes) -> RealtimeResult<()> {
        if !self.is_ready() {
            return Err(RealtimeError::NotReady);
        }
        self.monitor.record.lock().sent_audio.push(audio_data);
        Ok(())
    }
}

// =============================================================================
// Recording results reporter
// =============================================================================

/// Reporter that keeps every report it is handed.
#[derive(Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<CallReport>>,
    fail: bool,
}

impl RecordingReporter {
    /// Records reports but answers every send with an error.
    pub fn failing() -> Self {
        Self {
            reports: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn reports(&self) -> Vec<CallReport> {
        self.reports.lock().clone()
    }

    fn len(&self) -> usize {
        self.reports.lock().len()
    }

    /// Wait up to two seconds for at least `count` reports.
    pub async fn wait_for(&self, count: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while self.len() < count {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {count} reports"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl ResultsReporter for RecordingReporter {
    async fn send(&self, report: &CallReport) -> Result<(), ReportError> {
        self.reports.lock().push(report.clone());
        if self.fail {
            return Err(ReportError::Status {
                url: "memory://".to_string(),
                status: 500,
                body: String::new(),
            });
        }
        Ok(())
    }
}
