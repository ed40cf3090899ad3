//! Zone server runtime
//!
//! ## Table of Contents
//! - **RuntimeState**: Server lifecycle state
//! - **ZoneServer**: Owns the lifecycle manager, supervisor and watchdog
//! - **shutdown_signal**: Waits for SIGTERM/SIGINT (Unix) or Ctrl+C

use crate::catalog::BoxedCatalog;
use crate::config::OrchestratorConfig;
use crate::content::NodeRegistry;
use crate::error::Result;
use crate::lifecycle::{FailFast, RegionLifecycleManager};
use crate::metrics::ZoneMetrics;
use crate::supervisor::ZoneCoordinatorSupervisor;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Runtime state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    /// Not started
    Stopped,
    /// Starting up
    Starting,
    /// Running normally
    Running,
    /// Shutting down
    ShuttingDown,
}

/// Zone server: every component constructed once and wired explicitly
pub struct ZoneServer {
    config: OrchestratorConfig,
    state: RwLock<RuntimeState>,

    lifecycle: Arc<RegionLifecycleManager>,
    supervisor: Arc<ZoneCoordinatorSupervisor>,
    catalog: BoxedCatalog,
    registry: Arc<NodeRegistry>,
    metrics: Option<Arc<ZoneMetrics>>,
    fail_fast: Arc<dyn FailFast>,

    watchdog: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ZoneServer {
    /// Create a new server (use ZoneServerBuilder instead)
    pub(crate) fn new(
        config: OrchestratorConfig,
        lifecycle: Arc<RegionLifecycleManager>,
        supervisor: Arc<ZoneCoordinatorSupervisor>,
        catalog: BoxedCatalog,
        registry: Arc<NodeRegistry>,
        metrics: Option<Arc<ZoneMetrics>>,
        fail_fast: Arc<dyn FailFast>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            state: RwLock::new(RuntimeState::Stopped),
            lifecycle,
            supervisor,
            catalog,
            registry,
            metrics,
            fail_fast,
            watchdog: Mutex::new(None),
            shutdown_tx,
        }
    }

    /// Configuration the server was built with
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Current runtime state
    pub fn state(&self) -> RuntimeState {
        *self.state.read()
    }

    /// Region lifecycle manager
    pub fn lifecycle(&self) -> &Arc<RegionLifecycleManager> {
        &self.lifecycle
    }

    /// Coordinator supervisor
    pub fn supervisor(&self) -> &Arc<ZoneCoordinatorSupervisor> {
        &self.supervisor
    }

    /// Resource catalog
    pub fn catalog(&self) -> &BoxedCatalog {
        &self.catalog
    }

    /// Node registry
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Metrics, when enabled
    pub fn metrics(&self) -> Option<&Arc<ZoneMetrics>> {
        self.metrics.as_ref()
    }

    /// Start the supervisor, bootstrap the core region and arm the watchdog
    pub async fn start(&self) -> Result<()> {
        *self.state.write() = RuntimeState::Starting;
        info!(
            node = %self.config.node_name,
            core = %self.config.core_region,
            "Starting zone server"
        );

        // Subscribe before anything can be published
        self.supervisor.start();

        if let Err(e) = self.lifecycle.bootstrap().await {
            self.supervisor.shutdown();
            *self.state.write() = RuntimeState::Stopped;
            return Err(e);
        }

        let watchdog = self
            .lifecycle
            .spawn_watchdog(self.config.watchdog_interval(), Arc::clone(&self.fail_fast));
        *self.watchdog.lock() = Some(watchdog);

        *self.state.write() = RuntimeState::Running;
        info!(loaded = ?self.lifecycle.loaded_regions(), "Zone server running");
        Ok(())
    }

    /// Start, then run until a shutdown signal arrives
    pub async fn run(&self) -> Result<()> {
        self.start().await?;
        self.wait_for_shutdown().await;
        Ok(())
    }

    /// Block until [`signal_shutdown`](Self::signal_shutdown) or a process
    /// signal, then shut down
    pub async fn wait_for_shutdown(&self) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Shutdown requested");
            }
            _ = shutdown_signal() => {
                info!("Shutdown signal received");
            }
        }

        self.shutdown();
    }

    /// Stop the watchdog and tear down every coordinator
    pub fn shutdown(&self) {
        {
            let mut state = self.state.write();
            if *state == RuntimeState::Stopped {
                return;
            }
            *state = RuntimeState::ShuttingDown;
        }

        info!("Shutting down zone server");

        if let Some(watchdog) = self.watchdog.lock().take() {
            watchdog.abort();
        }
        self.supervisor.shutdown();

        *self.state.write() = RuntimeState::Stopped;
        info!("Zone server stopped");
    }

    /// Ask a running server to shut down
    pub fn signal_shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Wait for a process shutdown signal
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Failed to install signal handlers");
                return std::future::pending().await;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(windows)]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        } else {
            info!("Received Ctrl+C");
        }
    }
}
