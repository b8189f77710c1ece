//! Server launcher.
//!
//! Drives the host process through its lifecycle: validate the application
//! identity, install the certificate policy, build the domain service and
//! address space, start the protocol stack, run the session monitor, and
//! tear everything down in order. The launcher's outcome is an exit code
//! describing how far the server got.

use crate::config::Config;
use crate::metrics;
use crate::monitor::{SessionMonitor, SharedServer, StatusSink};
use crate::policy::{CertificatePolicy, IdentityProvider};
use crate::runtime::ProtocolRuntime;
use anyhow::{Context, Result};
use palaver_core::{ChatService, Logger};
use palaver_space::{ChatModelSource, NamespaceTable, NodeId, NodeManager, NAMESPACE_URI};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Process outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// The server never started.
    NotStarted,
    /// The server started but did not stop cleanly.
    Running,
    /// Startup raised an error.
    StartupFailed,
    /// The server ran and stopped cleanly.
    Ok,
}

impl ExitCode {
    /// Numeric process exit code.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            ExitCode::NotStarted => 1,
            ExitCode::StartupFailed => 2,
            ExitCode::Running => 3,
            ExitCode::Ok => 0,
        }
    }
}

/// Everything `start` wires up; consumed by teardown.
struct StartedServer {
    manager: Arc<NodeManager>,
    service: Arc<ChatService>,
    monitor: Arc<SessionMonitor>,
    monitor_task: JoinHandle<()>,
    server: SharedServer,
}

/// The server launcher.
pub struct ServerLauncher {
    config: Config,
    identity: Arc<dyn IdentityProvider>,
    runtime: Arc<dyn ProtocolRuntime>,
    sink: Arc<dyn StatusSink>,
}

impl ServerLauncher {
    /// Create a launcher over the given runtime.
    #[must_use]
    pub fn new(
        config: Config,
        identity: Arc<dyn IdentityProvider>,
        runtime: Arc<dyn ProtocolRuntime>,
        sink: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            config,
            identity,
            runtime,
            sink,
        }
    }

    /// Run the server until `shutdown` resolves or the configured run
    /// duration elapses, then tear it down.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> ExitCode {
        let started = match self.start().await {
            Ok(started) => started,
            Err(error) => {
                error!("Server failed to start: {error:#}");
                return ExitCode::StartupFailed;
            }
        };

        info!(
            application = %self.config.application_name,
            "Server running"
        );

        if self.config.run.seconds == 0 {
            shutdown.await;
        } else {
            let deadline = Duration::from_secs(self.config.run.seconds);
            tokio::select! {
                () = shutdown => {}
                () = tokio::time::sleep(deadline) => {
                    info!(seconds = self.config.run.seconds, "Run duration elapsed");
                }
            }
        }

        self.stop(started).await
    }

    /// Bring the server up.
    ///
    /// Any error here is fatal to the process; nothing partially started is
    /// left behind for the caller to clean up.
    async fn start(&self) -> Result<StartedServer> {
        let certificate = self
            .identity
            .application_certificate()
            .context("Application identity check failed")?;
        info!(subject = %certificate.subject, "Application identity validated");

        let policy = Arc::new(CertificatePolicy::new(
            self.config.security.auto_accept_untrusted,
        ));
        self.runtime.install_certificate_policy(policy);

        let logger = Arc::new(Logger::new());
        let service = Arc::new(ChatService::new(logger));
        service.on_count_changed(|_| metrics::record_post());

        // The model source and the manager must agree on the type
        // namespace; get_or_append is idempotent, so registering the URI
        // here first and again inside the manager yields the same index.
        let mut namespaces = NamespaceTable::new();
        let type_namespace = namespaces.get_or_append(NAMESPACE_URI);
        let template = Arc::new(ChatModelSource::new(type_namespace));

        let manager = Arc::new(NodeManager::new(
            service.clone(),
            self.runtime.delivery_engine(),
            template,
            &mut namespaces,
        ));

        let mut external_references: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        manager
            .create_address_space(&mut external_references)
            .context("Failed to create the address space")?;

        self.runtime
            .start()
            .await
            .context("Failed to start the protocol stack")?;

        let server: SharedServer = Arc::new(RwLock::new(Some(self.runtime.clone())));
        let monitor = SessionMonitor::new(
            self.runtime.session_registry(),
            self.sink.clone(),
            self.config.poll_interval(),
            self.config.idle_threshold(),
        );
        let monitor_task = monitor.spawn(server.clone());

        Ok(StartedServer {
            manager,
            service,
            monitor,
            monitor_task,
            server,
        })
    }

    /// Tear the server down: drain the monitor first, then stop the stack.
    async fn stop(&self, started: StartedServer) -> ExitCode {
        started
            .monitor
            .shutdown(&started.server, started.monitor_task)
            .await;

        // The object graph outlives the stack only in this scope.
        drop(started.manager);
        drop(started.service);

        if let Err(error) = self.runtime.stop().await {
            error!("Server failed to stop cleanly: {error}");
            return ExitCode::Running;
        }

        info!("Server stopped");
        ExitCode::Ok
    }
}

impl std::fmt::Debug for ServerLauncher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerLauncher")
            .field("application_name", &self.config.application_name)
            .finish()
    }
}
