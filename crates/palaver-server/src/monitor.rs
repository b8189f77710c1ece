//! Session liveness monitor.
//!
//! A background task that reports connected-party status: one line per
//! session lifecycle signal, and a periodic sweep of all active sessions
//! when no signal has arrived for a while. The monitor only reads session
//! state; it never touches the object graph, so it takes no address-space
//! lock.

use crate::metrics;
use crate::runtime::{ProtocolRuntime, SessionEvent, SessionRegistry, SessionSnapshot};
use chrono::Local;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{info, warn};

/// Shared slot holding the running server.
///
/// Clearing the slot is the monitor's only cancellation signal; the loop
/// observes it within one polling period and exits without emitting
/// further lines.
pub type SharedServer = Arc<RwLock<Option<Arc<dyn ProtocolRuntime>>>>;

/// Receives status lines.
pub trait StatusSink: Send + Sync {
    /// Emit one status line.
    fn emit(&self, line: &str);
}

/// Sink that writes lines to the tracing pipeline.
#[derive(Debug, Default)]
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
    fn emit(&self, line: &str) {
        info!(target: "palaver::session_status", "{line}");
    }
}

/// Monitor lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// No server to observe.
    Idle,
    /// Observing a running server.
    Running,
    /// Server slot cleared; awaiting loop exit.
    Draining,
    /// Loop joined; teardown complete.
    Stopped,
}

/// The session liveness monitor.
pub struct SessionMonitor {
    registry: Arc<dyn SessionRegistry>,
    sink: Arc<dyn StatusSink>,
    poll_interval: Duration,
    idle_threshold: Duration,
    state: Mutex<MonitorState>,
}

impl SessionMonitor {
    /// Create a monitor over the given registry.
    #[must_use]
    pub fn new(
        registry: Arc<dyn SessionRegistry>,
        sink: Arc<dyn StatusSink>,
        poll_interval: Duration,
        idle_threshold: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            sink,
            poll_interval,
            idle_threshold,
            state: Mutex::new(MonitorState::Idle),
        })
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> MonitorState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: MonitorState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Spawn the monitor loop observing `server`.
    pub fn spawn(self: &Arc<Self>, server: SharedServer) -> JoinHandle<()> {
        self.set_state(MonitorState::Running);
        let monitor = self.clone();
        tokio::spawn(async move { monitor.run(server).await })
    }

    /// Drain and join the monitor, in the required teardown order: clear
    /// the server slot, await the loop, then mark the monitor stopped.
    pub async fn shutdown(self: &Arc<Self>, server: &SharedServer, task: JoinHandle<()>) {
        server
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let _ = task.await;
        self.set_state(MonitorState::Stopped);
    }

    async fn run(&self, server: SharedServer) {
        let mut signals = self.registry.subscribe();
        let mut signals_open = true;

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_event = Instant::now();

        loop {
            if self.server_cleared(&server) {
                break;
            }

            tokio::select! {
                signal = signals.recv(), if signals_open => {
                    match signal {
                        Ok(signal) => {
                            // A signal can land in the drain window.
                            if self.server_cleared(&server) {
                                break;
                            }
                            last_event = Instant::now();
                            self.report_signal(&signal);
                        }
                        Err(RecvError::Closed) => signals_open = false,
                        Err(RecvError::Lagged(missed)) => {
                            warn!(missed, "Monitor lagged behind session signals");
                        }
                    }
                }

                _ = ticker.tick() => {
                    if self.server_cleared(&server) {
                        break;
                    }
                    if last_event.elapsed() > self.idle_threshold {
                        self.report_all_sessions();
                        last_event = Instant::now();
                    }
                }
            }
        }

        self.set_state(MonitorState::Draining);
    }

    fn server_cleared(&self, server: &SharedServer) -> bool {
        server
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }

    fn report_signal(&self, signal: &SessionEvent) {
        let mut line = format!("{:>9}:{:>20}:", signal.kind.to_string(), signal.session.name);
        if let Some(identity) = &signal.session.identity {
            line.push_str(&format!(":{:>20}:{}", identity, signal.session.id));
        }
        self.emit(&line);
    }

    /// One `-Status-` line per active session. A failed diagnostics read
    /// for one session must not keep the rest from being reported.
    fn report_all_sessions(&self) {
        for id in self.registry.session_ids() {
            match self.registry.diagnostics(&id) {
                Ok(session) => self.report_status(&session),
                Err(error) => {
                    warn!(session = %id, %error, "Failed to read session diagnostics");
                }
            }
        }
    }

    fn report_status(&self, session: &SessionSnapshot) {
        let last_contact = session.last_contact.with_timezone(&Local);
        let line = format!(
            "{:>9}:{:>20}:Last Event:{}",
            "-Status-",
            session.name,
            last_contact.format("%H:%M:%S")
        );
        self.emit(&line);
    }

    fn emit(&self, line: &str) {
        metrics::record_status_line();
        self.sink.emit(line);
    }
}

impl std::fmt::Debug for SessionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMonitor")
            .field("poll_interval", &self.poll_interval)
            .field("idle_threshold", &self.idle_threshold)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{
        LocalRuntime, RegistryError, SessionEventKind, SessionId, SessionSnapshot,
    };
    use chrono::Utc;
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::broadcast;
    use tokio::time::advance;

    const POLL: Duration = Duration::from_secs(1);
    const IDLE: Duration = Duration::from_secs(6);

    #[derive(Default)]
    struct RecordingSink {
        lines: StdMutex<Vec<String>>,
    }

    impl StatusSink for RecordingSink {
        fn emit(&self, line: &str) {
            self.lines.lock().unwrap().push(line.to_string());
        }
    }

    impl RecordingSink {
        fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }
    }

    /// Registry stub with fixed sessions and optionally failing reads.
    struct StubRegistry {
        sessions: Vec<SessionSnapshot>,
        failing: HashSet<u64>,
        events: broadcast::Sender<SessionEvent>,
    }

    impl StubRegistry {
        fn with_sessions(count: u64) -> Self {
            let (events, _) = broadcast::channel(16);
            let sessions = (1..=count)
                .map(|n| SessionSnapshot {
                    id: SessionId(n),
                    name: format!("client-{n}"),
                    identity: None,
                    last_contact: Utc::now(),
                })
                .collect();
            Self {
                sessions,
                failing: HashSet::new(),
                events,
            }
        }

        fn fail_session(mut self, id: u64) -> Self {
            self.failing.insert(id);
            self
        }

        fn signal(&self, kind: SessionEventKind, session: SessionSnapshot) {
            let _ = self.events.send(SessionEvent { kind, session });
        }
    }

    impl SessionRegistry for StubRegistry {
        fn session_ids(&self) -> Vec<SessionId> {
            self.sessions.iter().map(|s| s.id.clone()).collect()
        }

        fn diagnostics(&self, id: &SessionId) -> Result<SessionSnapshot, RegistryError> {
            if self.failing.contains(&id.0) {
                return Err(RegistryError::Diagnostics("read failed".into()));
            }
            self.sessions
                .iter()
                .find(|s| s.id == *id)
                .cloned()
                .ok_or_else(|| RegistryError::NotFound(id.clone()))
        }

        fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
            self.events.subscribe()
        }
    }

    fn shared_server() -> SharedServer {
        Arc::new(RwLock::new(Some(
            Arc::new(LocalRuntime::new()) as Arc<dyn ProtocolRuntime>
        )))
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sweep_reports_every_session_once() {
        let registry = Arc::new(StubRegistry::with_sessions(3));
        let sink = Arc::new(RecordingSink::default());
        let monitor = SessionMonitor::new(registry.clone(), sink.clone(), POLL, IDLE);

        let server = shared_server();
        let task = monitor.spawn(server.clone());
        settle().await;

        // First poll past the idleness threshold: one line per session.
        advance(Duration::from_millis(7_500)).await;
        settle().await;

        let lines = sink.lines();
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|line| line.contains("-Status-")));
        assert!(lines.iter().any(|line| line.contains("client-1")));
        assert!(lines.iter().any(|line| line.contains("client-3")));

        // The idle timer was reset: the next period emits nothing.
        advance(Duration::from_millis(1_500)).await;
        settle().await;
        assert_eq!(sink.lines().len(), 3);

        monitor.shutdown(&server, task).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_reports_immediately() {
        let registry = Arc::new(StubRegistry::with_sessions(0));
        let sink = Arc::new(RecordingSink::default());
        let monitor = SessionMonitor::new(registry.clone(), sink.clone(), POLL, IDLE);

        let server = shared_server();
        let task = monitor.spawn(server.clone());
        settle().await;

        registry.signal(
            SessionEventKind::Created,
            SessionSnapshot {
                id: SessionId(7),
                name: "client-7".into(),
                identity: Some("alice".into()),
                last_contact: Utc::now(),
            },
        );
        settle().await;

        // One line, without waiting for the next polling period.
        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("Created"));
        assert!(lines[0].contains("client-7"));
        assert!(lines[0].contains("alice"));
        assert!(lines[0].contains("session-7"));

        monitor.shutdown(&server, task).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthenticated_signal_omits_identity() {
        let registry = Arc::new(StubRegistry::with_sessions(0));
        let sink = Arc::new(RecordingSink::default());
        let monitor = SessionMonitor::new(registry.clone(), sink.clone(), POLL, IDLE);

        let server = shared_server();
        let task = monitor.spawn(server.clone());
        settle().await;

        registry.signal(
            SessionEventKind::Activated,
            SessionSnapshot {
                id: SessionId(9),
                name: "anon".into(),
                identity: None,
                last_contact: Utc::now(),
            },
        );
        settle().await;

        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("Activated"));
        assert!(!lines[0].contains("session-9"));

        monitor.shutdown(&server, task).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_failing_session_does_not_block_the_rest() {
        let registry = Arc::new(StubRegistry::with_sessions(3).fail_session(2));
        let sink = Arc::new(RecordingSink::default());
        let monitor = SessionMonitor::new(registry, sink.clone(), POLL, IDLE);

        let server = shared_server();
        let task = monitor.spawn(server.clone());
        settle().await;

        advance(Duration::from_millis(7_500)).await;
        settle().await;

        let lines = sink.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().any(|line| line.contains("client-1")));
        assert!(lines.iter().any(|line| line.contains("client-3")));

        monitor.shutdown(&server, task).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_clearing_server_drains_within_one_period() {
        let registry = Arc::new(StubRegistry::with_sessions(2));
        let sink = Arc::new(RecordingSink::default());
        let monitor = SessionMonitor::new(registry.clone(), sink.clone(), POLL, IDLE);

        let server = shared_server();
        let task = monitor.spawn(server.clone());
        settle().await;
        assert_eq!(monitor.state(), MonitorState::Running);

        server.write().unwrap().take();

        // A signal landing in the drain window, before the loop has
        // observed the cleared slot, produces no line.
        registry.signal(
            SessionEventKind::Created,
            SessionSnapshot {
                id: SessionId(1),
                name: "late".into(),
                identity: None,
                last_contact: Utc::now(),
            },
        );
        settle().await;
        assert!(sink.lines().is_empty());

        advance(Duration::from_millis(1_100)).await;
        settle().await;

        assert!(task.is_finished());
        assert_eq!(monitor.state(), MonitorState::Draining);

        monitor.shutdown(&server, task).await;
        assert_eq!(monitor.state(), MonitorState::Stopped);
    }
}
