//! Region lifecycle management
//!
//! ## Table of Contents
//! - **RegionLifecycleManager**: Source of truth for which regions are loaded
//! - **FailFast / ProcessExit**: Termination hook used by the core watchdog
//!
//! Per-region state machine:
//!
//! ```text
//! Unloaded -(load)-> Loading -(complete)-> Loaded -(unload)-> Unloading -(complete)-> Unloaded
//! ```
//!
//! The core region is loaded once by [`RegionLifecycleManager::bootstrap`] and
//! never leaves `Loaded` afterwards. Core and menu regions are protected from
//! zone operations.

use crate::config::OrchestratorConfig;
use crate::content::BoxedContentLoader;
use crate::error::{Result, ZoneError};
use crate::events::{EventBus, EventSubscription, RegionEvent};
use crate::metrics::{Timer, ZoneMetrics};
use crate::types::{RegionDefinition, RegionLoadState};
use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Exit status used when the core region watchdog terminates the process
pub const CORE_FAILURE_EXIT_CODE: i32 = 70;

/// Action taken when the core region is found broken.
///
/// Implementations must not attempt recovery.
pub trait FailFast: Send + Sync {
    /// Terminate the host
    fn terminate(&self, reason: &str);
}

/// Exits the process immediately
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExit;

impl FailFast for ProcessExit {
    fn terminate(&self, reason: &str) {
        error!(reason = %reason, code = CORE_FAILURE_EXIT_CODE, "Terminating process: core region lost");
        std::process::exit(CORE_FAILURE_EXIT_CODE);
    }
}

#[derive(Debug, Default)]
struct LoadTable {
    states: HashMap<String, RegionLoadState>,
    // Regions with a load in flight
    in_progress: HashSet<String>,
    // Completed loads per region
    generations: HashMap<String, u64>,
}

impl LoadTable {
    fn state(&self, region: &str) -> RegionLoadState {
        self.states
            .get(region)
            .copied()
            .unwrap_or(RegionLoadState::Unloaded)
    }
}

/// Owns the set of loadable regions and their load state
pub struct RegionLifecycleManager {
    core_region: String,
    menu_region: String,
    load_menu_on_start: bool,
    regions: RwLock<BTreeMap<String, RegionDefinition>>,
    table: RwLock<LoadTable>,
    loader: BoxedContentLoader,
    events: Arc<EventBus>,
    metrics: Option<Arc<ZoneMetrics>>,
}

impl RegionLifecycleManager {
    /// Create a manager for the configured regions
    pub fn new(config: &OrchestratorConfig, loader: BoxedContentLoader, events: Arc<EventBus>) -> Self {
        let regions = config
            .regions
            .iter()
            .map(|r| (r.name.clone(), r.clone()))
            .collect();

        Self {
            core_region: config.core_region.clone(),
            menu_region: config.menu_region.clone(),
            load_menu_on_start: config.load_menu_on_start,
            regions: RwLock::new(regions),
            table: RwLock::new(LoadTable::default()),
            loader,
            events,
            metrics: None,
        }
    }

    /// Attach metrics
    pub fn with_metrics(mut self, metrics: Arc<ZoneMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Name of the core region
    pub fn core_region(&self) -> &str {
        &self.core_region
    }

    /// Name of the menu region
    pub fn menu_region(&self) -> &str {
        &self.menu_region
    }

    /// Event bus load/unload completions are published on
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Subscribe to region events
    pub fn subscribe(&self) -> EventSubscription {
        self.events.subscribe()
    }

    /// Whether a region is excluded from zone operations
    pub fn is_protected(&self, region: &str) -> bool {
        if region == self.core_region || (!self.menu_region.is_empty() && region == self.menu_region) {
            return true;
        }
        self.regions
            .read()
            .get(region)
            .map(|r| r.protected)
            .unwrap_or(false)
    }

    /// Definition of a configured region
    pub fn region(&self, region: &str) -> Option<RegionDefinition> {
        self.regions.read().get(region).cloned()
    }

    /// All configured regions, ordered by name
    pub fn regions(&self) -> Vec<RegionDefinition> {
        self.regions.read().values().cloned().collect()
    }

    /// Current load state of a region
    pub fn load_state(&self, region: &str) -> RegionLoadState {
        self.table.read().state(region)
    }

    /// Whether a load is in flight for the region
    pub fn is_loading(&self, region: &str) -> bool {
        self.table.read().in_progress.contains(region)
    }

    /// Number of completed loads of a region.
    ///
    /// Changes whenever the region is unloaded and loaded again, so a
    /// consumer can tell a reload from the load it already handled.
    pub fn load_generation(&self, region: &str) -> u64 {
        self.table
            .read()
            .generations
            .get(region)
            .copied()
            .unwrap_or(0)
    }

    /// Names of all regions in the `Loaded` state, ordered by name
    pub fn loaded_regions(&self) -> Vec<String> {
        let mut loaded: Vec<String> = self
            .table
            .read()
            .states
            .iter()
            .filter(|(_, s)| **s == RegionLoadState::Loaded)
            .map(|(name, _)| name.clone())
            .collect();
        loaded.sort();
        loaded
    }

    /// Load the core region, make it the active root, and optionally load
    /// the menu region. The only path allowed to load protected regions.
    pub async fn bootstrap(&self) -> Result<()> {
        let core = self
            .region(&self.core_region)
            .ok_or_else(|| ZoneError::UnknownRegion(self.core_region.clone()))?;

        self.load_internal(core).await?;
        self.loader.set_active_root(&self.core_region)?;
        info!(region = %self.core_region, "Core region loaded and active");

        if self.load_menu_on_start && !self.menu_region.is_empty() {
            let menu = self
                .region(&self.menu_region)
                .ok_or_else(|| ZoneError::UnknownRegion(self.menu_region.clone()))?;
            self.load_internal(menu).await?;
        }

        Ok(())
    }

    /// Add a loadable region definition
    pub fn register_zone(&self, region: RegionDefinition) -> Result<()> {
        let result = self.try_register(region);
        self.record("register", &result);
        result
    }

    fn try_register(&self, region: RegionDefinition) -> Result<()> {
        if region.protected || self.is_protected(&region.name) {
            warn!(region = %region.name, "Refusing to register protected region as a zone");
            return Err(ZoneError::ProtectionViolation(region.name));
        }

        let state = self.load_state(&region.name);
        if state != RegionLoadState::Unloaded {
            return Err(ZoneError::conflict(format!(
                "cannot redefine region '{}' while {}",
                region.name, state
            )));
        }

        info!(region = %region.name, subtype = %region.resource_subtype, "Zone registered");
        self.regions.write().insert(region.name.clone(), region);
        Ok(())
    }

    /// Load a zone region
    pub async fn load_region(&self, region: &str) -> Result<()> {
        let result = self.try_load(region).await;
        self.record("load", &result);
        result
    }

    async fn try_load(&self, region: &str) -> Result<()> {
        if self.is_protected(region) {
            warn!(region = %region, "Rejected load of protected region");
            return Err(ZoneError::ProtectionViolation(region.to_string()));
        }

        let definition = self
            .region(region)
            .ok_or_else(|| ZoneError::UnknownRegion(region.to_string()))?;

        self.load_internal(definition).await
    }

    async fn load_internal(&self, definition: RegionDefinition) -> Result<()> {
        let name = definition.name.clone();

        {
            let mut table = self.table.write();
            match table.state(&name) {
                RegionLoadState::Loaded => {
                    debug!(region = %name, "Region already loaded");
                    return Ok(());
                }
                RegionLoadState::Unloading => {
                    return Err(ZoneError::conflict(format!("region '{}' is unloading", name)));
                }
                RegionLoadState::Loading | RegionLoadState::Unloaded => {}
            }
            if !table.in_progress.insert(name.clone()) {
                warn!(region = %name, "Load already in progress");
                return Err(ZoneError::conflict(format!("load of '{}' already in progress", name)));
            }
            table.states.insert(name.clone(), RegionLoadState::Loading);
        }

        info!(region = %name, bundle = %definition.content_bundle, loader = self.loader.name(), "Loading region");
        let timer = Timer::start();
        let result = self.loader.load_additive(&definition).await;

        {
            let mut table = self.table.write();
            table.in_progress.remove(&name);
            match &result {
                Ok(()) => {
                    table.states.insert(name.clone(), RegionLoadState::Loaded);
                    *table.generations.entry(name.clone()).or_insert(0) += 1;
                }
                Err(_) => {
                    table.states.remove(&name);
                }
            }
        }

        match result {
            Ok(()) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_region_loaded(&name, timer.elapsed_secs());
                }
                info!(region = %name, "Region loaded");
                self.events.publish(RegionEvent::LoadCompleted { region: name });
                Ok(())
            }
            Err(e) => {
                error!(region = %name, error = %e, "Region load failed");
                Err(e)
            }
        }
    }

    /// Unload a region. The core region can never be unloaded.
    pub async fn unload_region(&self, region: &str) -> Result<()> {
        let result = self.try_unload(region).await;
        self.record("unload", &result);
        result
    }

    async fn try_unload(&self, region: &str) -> Result<()> {
        if region == self.core_region {
            warn!(region = %region, "Rejected unload of core region");
            return Err(ZoneError::ProtectionViolation(region.to_string()));
        }

        {
            let mut table = self.table.write();
            match table.state(region) {
                RegionLoadState::Unloaded => {
                    debug!(region = %region, "Region not loaded, nothing to unload");
                    return Ok(());
                }
                RegionLoadState::Unloading => {
                    debug!(region = %region, "Unload already in progress");
                    return Ok(());
                }
                RegionLoadState::Loading => {
                    return Err(ZoneError::conflict(format!(
                        "cannot unload '{}' while it is loading",
                        region
                    )));
                }
                RegionLoadState::Loaded => {
                    table.states.insert(region.to_string(), RegionLoadState::Unloading);
                }
            }
        }

        info!(region = %region, "Unloading region");
        let result = self.loader.unload(region).await;

        match result {
            Ok(()) => {
                self.table.write().states.remove(region);
                if let Some(metrics) = &self.metrics {
                    metrics.record_region_unloaded();
                }
                info!(region = %region, "Region unloaded");
                self.events.publish(RegionEvent::UnloadCompleted {
                    region: region.to_string(),
                });
                Ok(())
            }
            Err(e) => {
                // Content is still there
                self.table
                    .write()
                    .states
                    .insert(region.to_string(), RegionLoadState::Loaded);
                error!(region = %region, error = %e, "Region unload failed");
                Err(e)
            }
        }
    }

    /// Make `target` the only loaded zone.
    ///
    /// Unloads every other loaded zone and the menu region, then loads the
    /// target. A failed unload is logged and does not stop the load; the
    /// first failure is returned once every step has run.
    pub async fn transition_to_region(&self, target: &str) -> Result<()> {
        let result = self.try_transition(target).await;
        self.record("transition", &result);
        result
    }

    async fn try_transition(&self, target: &str) -> Result<()> {
        if self.is_protected(target) {
            warn!(region = %target, "Rejected transition to protected region");
            return Err(ZoneError::ProtectionViolation(target.to_string()));
        }
        if self.region(target).is_none() {
            return Err(ZoneError::UnknownRegion(target.to_string()));
        }

        info!(region = %target, "Transitioning to region");
        let mut first_error: Option<ZoneError> = None;

        let to_unload: Vec<String> = self
            .loaded_regions()
            .into_iter()
            .filter(|r| r != target && !self.is_protected(r))
            .collect();

        let unloads = join_all(to_unload.iter().map(|region| self.unload_region(region))).await;
        for (region, result) in to_unload.iter().zip(unloads) {
            if let Err(e) = result {
                warn!(region = %region, error = %e, "Unload during transition failed, continuing");
                first_error.get_or_insert(e);
            }
        }

        if !self.menu_region.is_empty() && self.load_state(&self.menu_region) == RegionLoadState::Loaded {
            if let Err(e) = self.unload_region(&self.menu_region).await {
                warn!(region = %self.menu_region, error = %e, "Menu unload during transition failed, continuing");
                first_error.get_or_insert(e);
            }
        }

        if self.load_state(target) != RegionLoadState::Loaded {
            if let Err(e) = self.load_region(target).await {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            None => {
                info!(region = %target, "Transition complete");
                Ok(())
            }
            Some(e) => Err(e),
        }
    }

    /// Verify the core region is loaded and is the active root.
    ///
    /// Returns the failed check as the error.
    pub fn check_core_health(&self) -> std::result::Result<(), String> {
        let core = &self.core_region;
        if self.load_state(core) != RegionLoadState::Loaded || !self.loader.is_loaded(core) {
            return Err(format!("core region '{}' is not loaded", core));
        }
        match self.loader.active_root() {
            Some(root) if &root == core => Ok(()),
            Some(root) => Err(format!("active root is '{}', expected core region '{}'", root, core)),
            None => Err(format!("no active root, expected core region '{}'", core)),
        }
    }

    /// Periodically check core region health.
    ///
    /// On the first failure the watchdog publishes
    /// [`RegionEvent::CoreRegionFailure`], hands control to `fail_fast`, and
    /// stops. There is no retry.
    pub fn spawn_watchdog(self: &Arc<Self>, interval: Duration, fail_fast: Arc<dyn FailFast>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(reason) = manager.check_core_health() {
                    error!(region = %manager.core_region, reason = %reason, "Core region health check failed");
                    if let Some(metrics) = &manager.metrics {
                        metrics.record_watchdog_failure();
                    }
                    manager.events.publish(RegionEvent::CoreRegionFailure {
                        region: manager.core_region.clone(),
                        reason: reason.clone(),
                    });
                    fail_fast.terminate(&reason);
                    break;
                }
                debug!(region = %manager.core_region, "Core region healthy");
            }
        })
    }

    fn record(&self, op: &str, result: &Result<()>) {
        if let Some(metrics) = &self.metrics {
            metrics.record_region_op(op, result);
        }
    }
}
