//! Zone coordinator supervision
//!
//! ## Table of Contents
//! - **ZoneCoordinatorSupervisor**: Spawns one coordinator per loaded zone
//!   and tears it down when the zone unloads
//!
//! A load-completed event spawns a coordinator after the settle delay. Each
//! region carries a spawn epoch bumped on unload, so a spawn still waiting
//! out its delay when the region unloads is dropped.
//!
//! When the event stream reports lost events the supervisor reconciles its
//! map against the lifecycle manager's load state and load generations.

use crate::catalog::BoxedCatalog;
use crate::config::{OrchestratorConfig, ServerRole};
use crate::content::NodeRegistry;
use crate::coordinator::ZoneCoordinator;
use crate::error::{Result, ZoneError};
use crate::events::{EventSubscription, RegionEvent};
use crate::lifecycle::RegionLifecycleManager;
use crate::metrics::ZoneMetrics;
use crate::types::RegionLoadState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Bridges region lifecycle events to coordinator lifecycle
pub struct ZoneCoordinatorSupervisor {
    role: ServerRole,
    settle_delay: Duration,
    shared_item_prefab: String,
    lifecycle: Arc<RegionLifecycleManager>,
    catalog: BoxedCatalog,
    registry: Arc<NodeRegistry>,
    metrics: Option<Arc<ZoneMetrics>>,
    coordinators: DashMap<String, Arc<ZoneCoordinator>>,
    // Region load generation each live coordinator was spawned for
    generations: DashMap<String, u64>,
    epochs: DashMap<String, u64>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl ZoneCoordinatorSupervisor {
    /// Create a supervisor
    pub fn new(
        config: &OrchestratorConfig,
        lifecycle: Arc<RegionLifecycleManager>,
        catalog: BoxedCatalog,
        registry: Arc<NodeRegistry>,
    ) -> Self {
        Self {
            role: config.role,
            settle_delay: config.settle_delay(),
            shared_item_prefab: config.shared_item_prefab.clone(),
            lifecycle,
            catalog,
            registry,
            metrics: None,
            coordinators: DashMap::new(),
            generations: DashMap::new(),
            epochs: DashMap::new(),
            event_loop: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    /// Attach metrics
    pub fn with_metrics(mut self, metrics: Arc<ZoneMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Coordinator for a region, if one is live
    pub fn coordinator(&self, region: &str) -> Option<Arc<ZoneCoordinator>> {
        self.coordinators.get(region).map(|c| Arc::clone(c.value()))
    }

    /// All live coordinators, ordered by region name
    pub fn all_coordinators(&self) -> Vec<Arc<ZoneCoordinator>> {
        let mut all: Vec<_> = self
            .coordinators
            .iter()
            .map(|c| Arc::clone(c.value()))
            .collect();
        all.sort_by(|a, b| a.region().cmp(b.region()));
        all
    }

    /// Number of live coordinators
    pub fn coordinator_count(&self) -> usize {
        self.coordinators.len()
    }

    /// Subscribe to the lifecycle manager's events and process them in the
    /// background until [`shutdown`](Self::shutdown)
    pub fn start(self: &Arc<Self>) {
        self.stopped.store(false, Ordering::SeqCst);
        let subscription = self.lifecycle.subscribe();
        let handle = self.run(subscription);
        if let Some(previous) = self.event_loop.lock().replace(handle) {
            previous.abort();
        }
        info!(role = ?self.role, "Zone coordinator supervisor started");
    }

    /// Process events from a subscription until it closes
    pub fn run(self: &Arc<Self>, mut subscription: EventSubscription) -> JoinHandle<()> {
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                supervisor.handle_event(event);
            }
            debug!("Region event stream closed");
        })
    }

    /// React to a single region event
    pub fn handle_event(self: &Arc<Self>, event: RegionEvent) {
        match event {
            RegionEvent::LoadCompleted { region } => {
                self.schedule_spawn(region);
            }
            RegionEvent::UnloadCompleted { region } => {
                self.on_region_unloaded(&region);
            }
            RegionEvent::CoreRegionFailure { region, reason } => {
                error!(region = %region, reason = %reason, "Core region failure reported, host is terminating");
            }
            RegionEvent::Lagged { skipped } => {
                warn!(skipped, "Region events lost, reconciling coordinators");
                self.reconcile();
            }
        }
    }

    fn schedule_spawn(self: &Arc<Self>, region: String) {
        let supervisor = Arc::clone(self);
        // Settle delay must not stall the event loop
        tokio::spawn(async move {
            if let Err(e) = supervisor.on_region_loaded(&region).await {
                warn!(region = %region, error = %e, "Coordinator spawn skipped");
            }
        });
    }

    /// Bring the coordinator map back in line with the lifecycle manager.
    ///
    /// Tears down every coordinator whose region is no longer loaded, or was
    /// reloaded after the coordinator was spawned, then schedules a spawn for
    /// every loaded zone without a coordinator. Returns the number of
    /// coordinators torn down.
    pub fn reconcile(self: &Arc<Self>) -> usize {
        let regions: Vec<String> = self.coordinators.iter().map(|c| c.key().clone()).collect();
        let stale: Vec<String> = regions
            .into_iter()
            .filter(|region| {
                self.lifecycle.load_state(region) != RegionLoadState::Loaded
                    || self.spawned_generation(region) != self.lifecycle.load_generation(region)
            })
            .collect();

        for region in &stale {
            warn!(region = %region, "Coordinator outlived its region load, tearing down");
            self.on_region_unloaded(region);
        }

        if self.role.is_authoritative() && !self.stopped.load(Ordering::SeqCst) {
            let missing: Vec<String> = self
                .lifecycle
                .loaded_regions()
                .into_iter()
                .filter(|r| !self.lifecycle.is_protected(r) && !self.coordinators.contains_key(r))
                .collect();
            for region in missing {
                info!(region = %region, "Scheduling coordinator for loaded zone");
                self.schedule_spawn(region);
            }
        }

        stale.len()
    }

    /// Handle a completed region load: wait out the settle delay, then spawn
    /// the region's coordinator.
    ///
    /// Returns `Ok(None)` when the event does not apply to this process or
    /// the region unloaded during the delay.
    pub async fn on_region_loaded(&self, region: &str) -> Result<Option<Arc<ZoneCoordinator>>> {
        if !self.role.is_authoritative() {
            debug!(region = %region, "Not authoritative, ignoring region load");
            return Ok(None);
        }
        if self.lifecycle.is_protected(region) {
            debug!(region = %region, "Protected region, no coordinator");
            return Ok(None);
        }

        let epoch = self.epoch(region);
        tokio::time::sleep(self.settle_delay).await;

        if self.stopped.load(Ordering::SeqCst) {
            return Ok(None);
        }
        if self.epoch(region) != epoch || self.lifecycle.load_state(region) != RegionLoadState::Loaded {
            info!(region = %region, "Region unloaded during settle delay, dropping spawn");
            return Ok(None);
        }

        self.spawn_coordinator(region).map(Some)
    }

    /// Create, start and track a coordinator for a loaded region.
    ///
    /// Fails with `ConcurrencyConflict` when one already exists.
    pub fn spawn_coordinator(&self, region: &str) -> Result<Arc<ZoneCoordinator>> {
        let definition = self
            .lifecycle
            .region(region)
            .ok_or_else(|| ZoneError::UnknownRegion(region.to_string()))?;

        let coordinator = match self.coordinators.entry(region.to_string()) {
            Entry::Occupied(_) => {
                warn!(region = %region, "Coordinator already exists, refusing duplicate spawn");
                return Err(ZoneError::conflict(format!(
                    "coordinator for '{}' already exists",
                    region
                )));
            }
            Entry::Vacant(slot) => {
                let mut coordinator = ZoneCoordinator::new(
                    &definition,
                    self.shared_item_prefab.clone(),
                    Arc::clone(&self.catalog),
                    Arc::clone(&self.registry),
                );
                if let Some(metrics) = &self.metrics {
                    coordinator = coordinator.with_metrics(Arc::clone(metrics));
                }
                let coordinator = Arc::new(coordinator);
                self.generations
                    .insert(region.to_string(), self.lifecycle.load_generation(region));
                slot.insert(Arc::clone(&coordinator));
                coordinator
            }
        };

        coordinator.start();
        self.update_gauge();
        info!(region = %region, subtype = %definition.resource_subtype, "Zone coordinator spawned");
        Ok(coordinator)
    }

    /// Handle a completed region unload. Returns whether a coordinator was
    /// torn down.
    pub fn on_region_unloaded(&self, region: &str) -> bool {
        *self.epochs.entry(region.to_string()).or_insert(0) += 1;
        self.generations.remove(region);

        match self.coordinators.remove(region) {
            Some((_, coordinator)) => {
                coordinator.teardown();
                self.update_gauge();
                info!(region = %region, "Zone coordinator removed");
                true
            }
            None => {
                debug!(region = %region, "No coordinator to remove");
                false
            }
        }
    }

    /// Stop processing events and tear down every coordinator
    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(handle) = self.event_loop.lock().take() {
            handle.abort();
        }

        let regions: Vec<String> = self.coordinators.iter().map(|c| c.key().clone()).collect();
        for region in &regions {
            if let Some((_, coordinator)) = self.coordinators.remove(region) {
                coordinator.teardown();
            }
        }
        self.generations.clear();
        self.update_gauge();
        info!(coordinators = regions.len(), "Zone coordinator supervisor stopped");
    }

    fn spawned_generation(&self, region: &str) -> u64 {
        self.generations.get(region).map(|g| *g.value()).unwrap_or(0)
    }

    fn epoch(&self, region: &str) -> u64 {
        self.epochs.get(region).map(|e| *e.value()).unwrap_or(0)
    }

    fn update_gauge(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.set_coordinators(self.coordinators.len());
        }
    }
}
