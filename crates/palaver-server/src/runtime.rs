//! Contracts with the external protocol runtime.
//!
//! The handshake, channel security, wire encoding, and subscription
//! delivery all live in the external stack. This module defines what the
//! core needs from it — a start/stop surface, the session registry, and
//! the delivery engine — plus `LocalRuntime`, an in-process stand-in that
//! lets the binary run end-to-end without the real stack.

use crate::metrics;
use crate::policy::CertificatePolicy;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use palaver_space::{ChatEvent, DeliveryEngine, NodeId};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Unique identifier of a session, assigned by the external stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// The slice of session state the core reads.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// Session id.
    pub id: SessionId,
    /// Session display name.
    pub name: String,
    /// Authenticated identity display name, if any.
    pub identity: Option<String>,
    /// Last client contact time.
    pub last_contact: DateTime<Utc>,
}

/// Session lifecycle signal kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEventKind {
    Created,
    Activated,
    Closing,
}

impl fmt::Display for SessionEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEventKind::Created => write!(f, "Created"),
            SessionEventKind::Activated => write!(f, "Activated"),
            SessionEventKind::Closing => write!(f, "Closing"),
        }
    }
}

/// A session lifecycle signal.
#[derive(Debug, Clone)]
pub struct SessionEvent {
    /// What happened.
    pub kind: SessionEventKind,
    /// State of the session at signal time.
    pub session: SessionSnapshot,
}

/// Session registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No session with that id.
    #[error("session not found: {0}")]
    NotFound(SessionId),

    /// The session exists but its diagnostics could not be read.
    #[error("session diagnostics unavailable: {0}")]
    Diagnostics(String),
}

/// The external session registry.
///
/// Implementations own session state and whatever read-synchronization it
/// needs; the core only reads snapshots and lifecycle signals.
pub trait SessionRegistry: Send + Sync {
    /// Ids of all currently active sessions.
    fn session_ids(&self) -> Vec<SessionId>;

    /// Read one session's diagnostics.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistryError`] if the session is gone or unreadable.
    fn diagnostics(&self, id: &SessionId) -> Result<SessionSnapshot, RegistryError>;

    /// Subscribe to session lifecycle signals.
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;
}

/// Protocol stack errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The stack failed to start.
    #[error("protocol stack failed to start: {0}")]
    Start(String),

    /// The stack failed to stop cleanly.
    #[error("protocol stack failed to stop: {0}")]
    Stop(String),
}

/// The external protocol stack.
#[async_trait]
pub trait ProtocolRuntime: Send + Sync {
    /// Start serving.
    ///
    /// # Errors
    ///
    /// Returns a [`RuntimeError`] if the stack cannot start.
    async fn start(&self) -> Result<(), RuntimeError>;

    /// Stop serving.
    ///
    /// # Errors
    ///
    /// Returns a [`RuntimeError`] if the stack does not stop cleanly.
    async fn stop(&self) -> Result<(), RuntimeError>;

    /// Install the policy for untrusted peer certificates.
    fn install_certificate_policy(&self, policy: Arc<CertificatePolicy>);

    /// The stack's session registry.
    fn session_registry(&self) -> Arc<dyn SessionRegistry>;

    /// The stack's notification delivery engine.
    fn delivery_engine(&self) -> Arc<dyn DeliveryEngine>;
}

/// Delivery engine that traces deliveries and records metrics.
#[derive(Debug, Default)]
pub struct TracingDelivery;

impl DeliveryEngine for TracingDelivery {
    fn report_event(&self, event: &ChatEvent) {
        metrics::record_event_delivered();
        info!(
            source = %event.source,
            severity = event.severity.value(),
            name = %event.record.name,
            "{}",
            event.message.text
        );
    }

    fn attribute_changed(&self, node: &NodeId) {
        metrics::record_attribute_change();
        debug!(node = %node, "Attribute changed");
    }
}

/// In-process session registry backing [`LocalRuntime`].
pub struct LocalSessionRegistry {
    sessions: DashMap<SessionId, SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
    next_id: AtomicU64,
}

impl LocalSessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            sessions: DashMap::new(),
            events,
            next_id: AtomicU64::new(0),
        }
    }

    /// Create a session and signal `Created`.
    pub fn create_session(&self, name: impl Into<String>, identity: Option<String>) -> SessionId {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::AcqRel) + 1);
        let snapshot = SessionSnapshot {
            id: id.clone(),
            name: name.into(),
            identity,
            last_contact: Utc::now(),
        };
        self.sessions.insert(id.clone(), snapshot.clone());
        metrics::set_active_sessions(self.sessions.len());
        let _ = self.events.send(SessionEvent {
            kind: SessionEventKind::Created,
            session: snapshot,
        });
        id
    }

    /// Signal `Activated` for a session.
    pub fn activate_session(&self, id: &SessionId) {
        if let Some(mut session) = self.sessions.get_mut(id) {
            session.last_contact = Utc::now();
            let _ = self.events.send(SessionEvent {
                kind: SessionEventKind::Activated,
                session: session.clone(),
            });
        }
    }

    /// Signal `Closing` and remove the session.
    pub fn close_session(&self, id: &SessionId) {
        if let Some((_, snapshot)) = self.sessions.remove(id) {
            metrics::set_active_sessions(self.sessions.len());
            let _ = self.events.send(SessionEvent {
                kind: SessionEventKind::Closing,
                session: snapshot,
            });
        }
    }

    /// Update a session's last contact time.
    pub fn touch(&self, id: &SessionId) {
        if let Some(mut session) = self.sessions.get_mut(id) {
            session.last_contact = Utc::now();
        }
    }
}

impl Default for LocalSessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry for LocalSessionRegistry {
    fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    fn diagnostics(&self, id: &SessionId) -> Result<SessionSnapshot, RegistryError> {
        self.sessions
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

/// In-process stand-in for the external stack.
///
/// Serves no wire protocol; sessions are driven programmatically through
/// its registry. Useful for local runs and tests.
pub struct LocalRuntime {
    registry: Arc<LocalSessionRegistry>,
    delivery: Arc<TracingDelivery>,
    policy: RwLock<Option<Arc<CertificatePolicy>>>,
}

impl LocalRuntime {
    /// Create a stopped local runtime.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Arc::new(LocalSessionRegistry::new()),
            delivery: Arc::new(TracingDelivery),
            policy: RwLock::new(None),
        }
    }

    /// The registry, for driving sessions programmatically.
    #[must_use]
    pub fn local_registry(&self) -> Arc<LocalSessionRegistry> {
        self.registry.clone()
    }

    /// The installed certificate policy, if any.
    #[must_use]
    pub fn certificate_policy(&self) -> Option<Arc<CertificatePolicy>> {
        self.policy.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Default for LocalRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProtocolRuntime for LocalRuntime {
    async fn start(&self) -> Result<(), RuntimeError> {
        info!("Local runtime started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), RuntimeError> {
        info!("Local runtime stopped");
        Ok(())
    }

    fn install_certificate_policy(&self, policy: Arc<CertificatePolicy>) {
        *self.policy.write().unwrap_or_else(|e| e.into_inner()) = Some(policy);
    }

    fn session_registry(&self) -> Arc<dyn SessionRegistry> {
        self.registry.clone()
    }

    fn delivery_engine(&self) -> Arc<dyn DeliveryEngine> {
        self.delivery.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_registry_lifecycle() {
        let registry = LocalSessionRegistry::new();
        let mut events = registry.subscribe();

        let id = registry.create_session("client-1", Some("alice".into()));
        assert_eq!(registry.session_ids(), vec![id.clone()]);

        let event = events.try_recv().unwrap();
        assert_eq!(event.kind, SessionEventKind::Created);
        assert_eq!(event.session.name, "client-1");
        assert_eq!(event.session.identity.as_deref(), Some("alice"));

        registry.activate_session(&id);
        assert_eq!(events.try_recv().unwrap().kind, SessionEventKind::Activated);

        registry.close_session(&id);
        assert_eq!(events.try_recv().unwrap().kind, SessionEventKind::Closing);
        assert!(registry.session_ids().is_empty());
        assert!(matches!(
            registry.diagnostics(&id),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn test_delivery_engine_wiring_end_to_end() {
        use palaver_core::{ChatService, Logger};
        use palaver_space::{
            model, ChatModelSource, NamespaceTable, NodeManager, Variant, NAMESPACE_URI,
        };
        use std::collections::HashMap;

        let runtime = LocalRuntime::new();
        let service = Arc::new(ChatService::new(Arc::new(Logger::new())));

        let mut namespaces = NamespaceTable::new();
        let type_namespace = namespaces.get_or_append(NAMESPACE_URI);
        let manager = NodeManager::new(
            service,
            runtime.delivery_engine(),
            Arc::new(ChatModelSource::new(type_namespace)),
            &mut namespaces,
        );

        let mut external_references = HashMap::new();
        manager.create_address_space(&mut external_references).unwrap();
        manager.set_events_monitored(true);

        let object = NodeId::numeric(type_namespace, model::objects::CHAT_LOGS);
        let method = NodeId::numeric(type_namespace, model::methods::POST);
        manager
            .call(
                &object,
                &method,
                &[
                    Variant::String("alice".into()),
                    Variant::String("hi".into()),
                ],
            )
            .unwrap();

        assert_eq!(manager.post_count(), 1);
        assert_eq!(manager.events_composed(), 1);
        assert_eq!(manager.change_epoch(), 1);
    }

    #[tokio::test]
    async fn test_local_runtime_policy_installation() {
        let runtime = LocalRuntime::new();
        assert!(runtime.certificate_policy().is_none());

        runtime.install_certificate_policy(Arc::new(CertificatePolicy::new(true)));
        assert!(runtime.certificate_policy().is_some());

        runtime.start().await.unwrap();
        runtime.stop().await.unwrap();
    }
}
