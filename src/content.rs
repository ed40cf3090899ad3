//! Region content: loader seam, harvest nodes and the node registry
//!
//! ## Table of Contents
//! - **RegionContentLoader**: Trait for instantiating/removing region content
//! - **HarvestNode**: Shared handle to a harvestable content object
//! - **NodeRegistry**: Per-region registry nodes push themselves into
//! - **StaticContentLoader**: Loader that instantiates a region's manifest

use crate::error::{Result, ZoneError};
use crate::types::{NodeId, RegionDefinition, ResourceId, ResourceSubtype, ResourceType, Waypoint};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Trait for region content backends
#[async_trait]
pub trait RegionContentLoader: Send + Sync {
    /// Instantiate a region's content alongside what is already loaded
    async fn load_additive(&self, region: &RegionDefinition) -> Result<()>;

    /// Remove a region's content
    async fn unload(&self, region: &str) -> Result<()>;

    /// Whether the region's content is currently instantiated
    fn is_loaded(&self, region: &str) -> bool;

    /// Designate the active root region
    fn set_active_root(&self, region: &str) -> Result<()>;

    /// Currently designated active root
    fn active_root(&self) -> Option<String>;

    /// Loader name for logging
    fn name(&self) -> &str;
}

/// Type alias for a shared content loader
pub type BoxedContentLoader = Arc<dyn RegionContentLoader>;

#[derive(Debug, Default)]
struct NodeState {
    assigned_resource: Option<ResourceId>,
    resource_subtype: Option<ResourceSubtype>,
    shared_item_prefab: Option<String>,
}

/// Shared handle to a harvest node.
///
/// Clones refer to the same node; only the owning coordinator mutates it.
#[derive(Debug, Clone)]
pub struct HarvestNode {
    id: NodeId,
    region: String,
    resource_type: ResourceType,
    position: [f32; 3],
    state: Arc<RwLock<NodeState>>,
}

impl HarvestNode {
    /// Create a new, unassigned node
    pub fn new(region: impl Into<String>, resource_type: impl Into<ResourceType>) -> Self {
        Self {
            id: NodeId::new(),
            region: region.into(),
            resource_type: resource_type.into(),
            position: [0.0; 3],
            state: Arc::new(RwLock::new(NodeState::default())),
        }
    }

    /// Set the world position
    pub fn at(mut self, position: [f32; 3]) -> Self {
        self.position = position;
        self
    }

    /// Node id
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Owning region
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Resource type the node yields
    pub fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    /// Currently assigned resource instance
    pub fn assigned_resource(&self) -> Option<ResourceId> {
        self.state.read().assigned_resource
    }

    /// Assign a resource instance
    pub fn set_assigned_resource(&self, id: ResourceId) {
        self.state.write().assigned_resource = Some(id);
    }

    /// Resource subtype attached at registration
    pub fn resource_subtype(&self) -> Option<ResourceSubtype> {
        self.state.read().resource_subtype.clone()
    }

    /// Attach the region's resource subtype
    pub fn set_resource_subtype(&self, subtype: ResourceSubtype) {
        self.state.write().resource_subtype = Some(subtype);
    }

    /// Shared item prefab reference
    pub fn shared_item_prefab(&self) -> Option<String> {
        self.state.read().shared_item_prefab.clone()
    }

    /// Attach the shared item prefab reference
    pub fn set_shared_item_prefab(&self, prefab: impl Into<String>) {
        self.state.write().shared_item_prefab = Some(prefab.into());
    }

    /// Copy of the node's current state
    pub fn snapshot(&self) -> HarvestNodeSnapshot {
        let state = self.state.read();
        HarvestNodeSnapshot {
            id: self.id,
            region: self.region.clone(),
            resource_type: self.resource_type.clone(),
            position: self.position,
            assigned_resource: state.assigned_resource,
            resource_subtype: state.resource_subtype.clone(),
        }
    }
}

/// Point-in-time copy of a harvest node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestNodeSnapshot {
    /// Node id
    pub id: NodeId,
    /// Owning region
    pub region: String,
    /// Resource type the node yields
    pub resource_type: ResourceType,
    /// World position
    pub position: [f32; 3],
    /// Assigned resource instance, if any
    pub assigned_resource: Option<ResourceId>,
    /// Attached resource subtype
    pub resource_subtype: Option<ResourceSubtype>,
}

#[derive(Debug, Default)]
struct RegionContent {
    nodes: Vec<HarvestNode>,
    waypoint: Option<Waypoint>,
}

/// Registry harvest nodes and waypoints register themselves with when
/// their region's content is instantiated
#[derive(Debug, Default)]
pub struct NodeRegistry {
    regions: RwLock<HashMap<String, RegionContent>>,
}

impl NodeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a harvest node with its region
    pub fn register_node(&self, node: HarvestNode) {
        debug!(region = %node.region(), node = %node.id(), resource_type = %node.resource_type(), "Harvest node registered");
        self.regions
            .write()
            .entry(node.region().to_string())
            .or_default()
            .nodes
            .push(node);
    }

    /// Register the region's waypoint anchor
    pub fn register_waypoint(&self, region: &str, waypoint: Waypoint) {
        self.regions
            .write()
            .entry(region.to_string())
            .or_default()
            .waypoint = Some(waypoint);
    }

    /// All harvest nodes registered for a region
    pub fn discover_harvest_nodes(&self, region: &str) -> Vec<HarvestNode> {
        self.regions
            .read()
            .get(region)
            .map(|c| c.nodes.clone())
            .unwrap_or_default()
    }

    /// The region's waypoint anchor
    pub fn waypoint(&self, region: &str) -> Option<Waypoint> {
        self.regions.read().get(region).and_then(|c| c.waypoint.clone())
    }

    /// Drop everything registered for a region
    pub fn clear_region(&self, region: &str) -> usize {
        self.regions
            .write()
            .remove(region)
            .map(|c| c.nodes.len())
            .unwrap_or(0)
    }

    /// Number of nodes registered for a region
    pub fn node_count(&self, region: &str) -> usize {
        self.regions.read().get(region).map(|c| c.nodes.len()).unwrap_or(0)
    }
}

/// Content loader that instantiates each region's configured manifest.
///
/// Loading pushes the manifest's nodes and waypoint into the shared
/// [`NodeRegistry`]; unloading removes them.
pub struct StaticContentLoader {
    registry: Arc<NodeRegistry>,
    loaded: RwLock<HashSet<String>>,
    active_root: RwLock<Option<String>>,
    failing: RwLock<HashSet<String>>,
    latency: Duration,
}

impl StaticContentLoader {
    /// Create a loader writing into the given registry
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self {
            registry,
            loaded: RwLock::new(HashSet::new()),
            active_root: RwLock::new(None),
            failing: RwLock::new(HashSet::new()),
            latency: Duration::ZERO,
        }
    }

    /// Simulated load/unload latency
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make every subsequent load/unload of `region` fail
    pub fn fail_region(&self, region: impl Into<String>) {
        self.failing.write().insert(region.into());
    }

    /// Remove a region's content without going through the lifecycle
    pub fn evict(&self, region: &str) {
        self.loaded.write().remove(region);
        self.registry.clear_region(region);
    }

    async fn simulate_io(&self) {
        if self.latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn check_failure(&self, region: &str, op: &str) -> Result<()> {
        if self.failing.read().contains(region) {
            return Err(ZoneError::content(region, format!("{} failed", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl RegionContentLoader for StaticContentLoader {
    async fn load_additive(&self, region: &RegionDefinition) -> Result<()> {
        self.simulate_io().await;
        self.check_failure(&region.name, "load")?;

        // Reloading replaces any stale registrations
        self.registry.clear_region(&region.name);
        for spec in &region.content.nodes {
            self.registry.register_node(
                HarvestNode::new(region.name.clone(), spec.resource_type.clone()).at(spec.position),
            );
        }
        if let Some(waypoint) = &region.content.waypoint {
            self.registry.register_waypoint(&region.name, waypoint.clone());
        }

        self.loaded.write().insert(region.name.clone());
        info!(
            region = %region.name,
            bundle = %region.content_bundle,
            nodes = region.content.nodes.len(),
            "Region content instantiated"
        );
        Ok(())
    }

    async fn unload(&self, region: &str) -> Result<()> {
        self.simulate_io().await;
        self.check_failure(region, "unload")?;

        self.loaded.write().remove(region);
        let removed = self.registry.clear_region(region);
        info!(region = %region, nodes = removed, "Region content removed");
        Ok(())
    }

    fn is_loaded(&self, region: &str) -> bool {
        self.loaded.read().contains(region)
    }

    fn set_active_root(&self, region: &str) -> Result<()> {
        if !self.is_loaded(region) {
            return Err(ZoneError::content(region, "cannot activate a region that is not loaded"));
        }
        *self.active_root.write() = Some(region.to_string());
        Ok(())
    }

    fn active_root(&self) -> Option<String> {
        self.active_root.read().clone()
    }

    fn name(&self) -> &str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_harvest_node_handle_shares_state() {
        let node = HarvestNode::new("Pasture", "Wheat");
        let clone = node.clone();

        clone.set_assigned_resource(ResourceId::new(7));
        clone.set_resource_subtype("Ithoria".into());
        clone.set_shared_item_prefab("items/crate");

        assert_eq!(node.assigned_resource(), Some(ResourceId::new(7)));
        assert_eq!(node.resource_subtype(), Some("Ithoria".into()));
        assert_eq!(node.shared_item_prefab().as_deref(), Some("items/crate"));

        let snapshot = node.snapshot();
        assert_eq!(snapshot.id, node.id());
        assert_eq!(snapshot.assigned_resource, Some(ResourceId::new(7)));
    }

    #[test]
    fn test_registry_per_region() {
        let registry = NodeRegistry::new();
        registry.register_node(HarvestNode::new("Pasture", "Wheat"));
        registry.register_node(HarvestNode::new("Pasture", "Stone"));
        registry.register_node(HarvestNode::new("Quarry", "Stone"));
        registry.register_waypoint("Pasture", Waypoint::new("Gate", [0.0; 3]));

        assert_eq!(registry.discover_harvest_nodes("Pasture").len(), 2);
        assert_eq!(registry.node_count("Quarry"), 1);
        assert!(registry.waypoint("Quarry").is_none());
        assert_eq!(registry.waypoint("Pasture").unwrap().name, "Gate");

        assert_eq!(registry.clear_region("Pasture"), 2);
        assert!(registry.discover_harvest_nodes("Pasture").is_empty());
    }

    #[tokio::test]
    async fn test_static_loader_pushes_manifest() {
        let registry = Arc::new(NodeRegistry::new());
        let loader = StaticContentLoader::new(registry.clone());
        let region = RegionDefinition::new("Pasture", "Ithoria")
            .with_node("Wheat")
            .with_node("Wheat")
            .with_waypoint(Waypoint::new("Gate", [1.0, 2.0, 3.0]));

        loader.load_additive(&region).await.unwrap();
        assert!(loader.is_loaded("Pasture"));
        assert_eq!(registry.node_count("Pasture"), 2);
        assert!(registry.waypoint("Pasture").is_some());

        // Loading again does not duplicate registrations
        loader.load_additive(&region).await.unwrap();
        assert_eq!(registry.node_count("Pasture"), 2);

        loader.unload("Pasture").await.unwrap();
        assert!(!loader.is_loaded("Pasture"));
        assert_eq!(registry.node_count("Pasture"), 0);
    }

    #[tokio::test]
    async fn test_static_loader_failures_and_root() {
        let loader = StaticContentLoader::new(Arc::new(NodeRegistry::new()));
        let core = RegionDefinition::new("Core", "None").protected();

        assert!(loader.set_active_root("Core").is_err());
        loader.load_additive(&core).await.unwrap();
        loader.set_active_root("Core").unwrap();
        assert_eq!(loader.active_root().as_deref(), Some("Core"));

        loader.fail_region("Broken");
        let broken = RegionDefinition::new("Broken", "None");
        let err = loader.load_additive(&broken).await.unwrap_err();
        assert!(matches!(err, ZoneError::ContentLoad { .. }));
        assert!(!loader.is_loaded("Broken"));
    }
}
