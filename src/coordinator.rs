//! Per-region zone coordinator
//!
//! ## Table of Contents
//! - **ZoneCoordinator**: Brings one region's harvest economy into a
//!   consistent, query-ready state
//! - **CoordinatorStatus**: Status snapshot for the query surface
//! - **AssignmentReport**: Outcome of the assign step
//!
//! Initialization runs discover → populate pool → assign strictly in order.
//! Any step failing leaves the coordinator uninitialized; there is no retry.

use crate::catalog::BoxedCatalog;
use crate::content::{HarvestNode, HarvestNodeSnapshot, NodeRegistry};
use crate::error::{Result, ZoneError};
use crate::metrics::ZoneMetrics;
use crate::types::{NodeId, RegionDefinition, ResourceId, ResourceInstance, ResourceSubtype, ResourceType, Waypoint};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Status snapshot of a coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorStatus {
    /// Region name
    pub region: String,
    /// Whether initialization completed
    pub initialized: bool,
    /// Number of active harvest nodes
    pub node_count: usize,
    /// Number of instances in the region pool
    pub pool_size: usize,
    /// Region resource subtype
    pub resource_subtype: ResourceSubtype,
}

/// Outcome of one assign pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssignmentReport {
    /// Number of resource type groups
    pub groups: usize,
    /// Nodes that received an assignment
    pub assigned_nodes: usize,
    /// Instances created on demand
    pub spawned: Vec<ResourceId>,
    /// Groups left unassigned because creation failed
    pub failed_groups: Vec<ResourceType>,
}

#[derive(Debug, Default)]
struct CoordinatorState {
    active_nodes: Vec<HarvestNode>,
    pool: Vec<ResourceInstance>,
    waypoint: Option<Waypoint>,
    initialized: bool,
}

/// Controller for a single loaded region
pub struct ZoneCoordinator {
    region: String,
    resource_subtype: ResourceSubtype,
    shared_item_prefab: String,
    catalog: BoxedCatalog,
    registry: Arc<NodeRegistry>,
    metrics: Option<Arc<ZoneMetrics>>,
    state: RwLock<CoordinatorState>,
    torn_down: AtomicBool,
    init_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ZoneCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoneCoordinator")
            .field("region", &self.region)
            .field("resource_subtype", &self.resource_subtype)
            .finish_non_exhaustive()
    }
}

impl ZoneCoordinator {
    /// Create a coordinator bound to a region definition
    pub fn new(
        region: &RegionDefinition,
        shared_item_prefab: impl Into<String>,
        catalog: BoxedCatalog,
        registry: Arc<NodeRegistry>,
    ) -> Self {
        Self {
            region: region.name.clone(),
            resource_subtype: region.resource_subtype.clone(),
            shared_item_prefab: shared_item_prefab.into(),
            catalog,
            registry,
            metrics: None,
            state: RwLock::new(CoordinatorState::default()),
            torn_down: AtomicBool::new(false),
            init_task: Mutex::new(None),
        }
    }

    /// Attach metrics
    pub fn with_metrics(mut self, metrics: Arc<ZoneMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Region name
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Region resource subtype
    pub fn resource_subtype(&self) -> &ResourceSubtype {
        &self.resource_subtype
    }

    /// Whether initialization completed
    pub fn is_initialized(&self) -> bool {
        self.state.read().initialized
    }

    /// Whether the coordinator has been torn down
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    /// Run the initialization pipeline in the background
    pub fn start(self: &Arc<Self>) {
        let coordinator = Arc::clone(self);
        let handle = tokio::spawn(async move {
            // Outcome is logged by initialize
            let _ = coordinator.initialize().await;
        });
        *self.init_task.lock() = Some(handle);
    }

    /// Whether a background initialization task is still running
    pub fn is_initializing(&self) -> bool {
        self.init_task
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Run discover → populate → assign and mark the coordinator initialized
    pub async fn initialize(&self) -> Result<()> {
        info!(region = %self.region, subtype = %self.resource_subtype, "Initializing zone coordinator");

        let result = self.run_pipeline().await;
        match &result {
            Ok(report) => {
                self.state.write().initialized = true;
                info!(
                    region = %self.region,
                    groups = report.groups,
                    assigned = report.assigned_nodes,
                    spawned = report.spawned.len(),
                    failed_groups = report.failed_groups.len(),
                    "Zone coordinator initialized"
                );
            }
            Err(ZoneError::Abandoned(_)) => {
                debug!(region = %self.region, "Initialization abandoned after teardown");
            }
            Err(e) => {
                self.state.write().initialized = false;
                error!(region = %self.region, error = %e, "Zone coordinator initialization failed");
            }
        }

        if let Some(metrics) = &self.metrics {
            if !matches!(result, Err(ZoneError::Abandoned(_))) {
                metrics.record_coordinator_init(result.is_ok());
            }
        }
        result.map(|_| ())
    }

    async fn run_pipeline(&self) -> Result<AssignmentReport> {
        self.discover().await?;
        self.populate_pool().await?;
        self.assign_resources().await
    }

    /// Discover the region's harvest nodes and waypoint.
    ///
    /// Yields one scheduling step first so region content can finish
    /// registering. Returns the number of nodes found.
    pub async fn discover(&self) -> Result<usize> {
        tokio::task::yield_now().await;
        self.ensure_live()?;

        let nodes = self.registry.discover_harvest_nodes(&self.region);
        let waypoint = self.registry.waypoint(&self.region);

        for node in &nodes {
            node.set_resource_subtype(self.resource_subtype.clone());
            node.set_shared_item_prefab(self.shared_item_prefab.clone());
        }

        if waypoint.is_none() {
            warn!(region = %self.region, "Region has no waypoint anchor");
        }
        info!(region = %self.region, nodes = nodes.len(), "Harvest nodes discovered");

        let count = nodes.len();
        let mut state = self.state.write();
        state.active_nodes = nodes;
        state.waypoint = waypoint;
        Ok(count)
    }

    /// Build the region pool from a catalog snapshot: matching subtype,
    /// currently inside its validity window. Returns the pool size.
    pub async fn populate_pool(&self) -> Result<usize> {
        let snapshot = self.catalog.all_instances().await?;
        self.ensure_live()?;

        let now = Utc::now();
        let pool: Vec<ResourceInstance> = snapshot
            .into_iter()
            .filter(|i| i.subtype == self.resource_subtype && i.is_valid_at(now))
            .collect();

        debug!(region = %self.region, pool = pool.len(), "Region resource pool populated");
        let size = pool.len();
        self.state.write().pool = pool;
        Ok(size)
    }

    /// Give every node group one shared resource instance.
    ///
    /// Nodes are grouped by resource type. Each group takes the first pool
    /// instance of that type, or an instance created on demand. When creation
    /// fails the group stays unassigned.
    pub async fn assign_resources(&self) -> Result<AssignmentReport> {
        let mut groups: BTreeMap<ResourceType, Vec<HarvestNode>> = BTreeMap::new();
        for node in self.state.read().active_nodes.iter() {
            groups
                .entry(node.resource_type().clone())
                .or_default()
                .push(node.clone());
        }

        let mut report = AssignmentReport {
            groups: groups.len(),
            ..Default::default()
        };

        for (resource_type, nodes) in groups {
            let existing = self
                .state
                .read()
                .pool
                .iter()
                .find(|i| i.resource_type == resource_type)
                .cloned();

            let instance = match existing {
                Some(instance) => instance,
                None => {
                    let spawned = self
                        .catalog
                        .spawn_instance(&resource_type, &self.resource_subtype)
                        .await;
                    // Late completions after teardown are discarded
                    self.ensure_live()?;

                    if let Some(metrics) = &self.metrics {
                        metrics.record_resource_spawn(spawned.is_ok());
                    }
                    match spawned {
                        Ok(instance) => {
                            info!(
                                region = %self.region,
                                resource_type = %resource_type,
                                id = %instance.id,
                                "Created resource instance on demand"
                            );
                            self.state.write().pool.push(instance.clone());
                            report.spawned.push(instance.id);
                            instance
                        }
                        Err(e) => {
                            error!(
                                region = %self.region,
                                resource_type = %resource_type,
                                subtype = %self.resource_subtype,
                                nodes = nodes.len(),
                                error = %e,
                                "Resource creation failed, leaving node group unassigned"
                            );
                            report.failed_groups.push(resource_type);
                            continue;
                        }
                    }
                }
            };

            for node in &nodes {
                node.set_assigned_resource(instance.id);
            }
            report.assigned_nodes += nodes.len();
        }

        Ok(report)
    }

    /// Tear the coordinator down, abandoning any in-flight initialization
    pub fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.init_task.lock().take() {
            handle.abort();
        }
        self.state.write().initialized = false;
        info!(region = %self.region, "Zone coordinator torn down");
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_torn_down() {
            return Err(ZoneError::Abandoned(self.region.clone()));
        }
        Ok(())
    }

    fn ensure_ready(&self) -> Result<()> {
        if !self.is_initialized() {
            return Err(ZoneError::NotReady(self.region.clone()));
        }
        Ok(())
    }

    // Query surface

    /// Current status; available before initialization completes
    pub fn status(&self) -> CoordinatorStatus {
        let state = self.state.read();
        CoordinatorStatus {
            region: self.region.clone(),
            initialized: state.initialized,
            node_count: state.active_nodes.len(),
            pool_size: state.pool.len(),
            resource_subtype: self.resource_subtype.clone(),
        }
    }

    /// The region's waypoint anchor, if it has one
    pub fn waypoint(&self) -> Result<Option<Waypoint>> {
        self.ensure_ready()?;
        Ok(self.state.read().waypoint.clone())
    }

    /// Whether the initialized region has a waypoint anchor
    pub fn has_waypoint(&self) -> bool {
        let state = self.state.read();
        state.initialized && state.waypoint.is_some()
    }

    /// Copy of the region resource pool
    pub fn region_resources(&self) -> Result<Vec<ResourceInstance>> {
        self.ensure_ready()?;
        Ok(self.state.read().pool.clone())
    }

    /// Copies of the active harvest nodes
    pub fn active_nodes(&self) -> Result<Vec<HarvestNodeSnapshot>> {
        self.ensure_ready()?;
        Ok(self
            .state
            .read()
            .active_nodes
            .iter()
            .map(HarvestNode::snapshot)
            .collect())
    }

    /// Handle an actor interacting with a harvest node.
    ///
    /// Only readiness and node membership are validated.
    pub fn process_node_interaction(&self, node_id: NodeId, actor_id: &str, tool_power: f32) -> Result<()> {
        self.ensure_ready()?;

        let known = self
            .state
            .read()
            .active_nodes
            .iter()
            .any(|n| n.id() == node_id);
        if !known {
            return Err(ZoneError::UnknownNode(node_id.to_string()));
        }

        debug!(region = %self.region, node = %node_id, actor = %actor_id, tool_power, "Node interaction accepted");
        Ok(())
    }
}

impl Drop for ZoneCoordinator {
    fn drop(&mut self) {
        if let Some(handle) = self.init_task.get_mut().take() {
            handle.abort();
        }
    }
}
