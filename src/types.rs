//! Core types for zone orchestration
//!
//! ## Table of Contents
//! - **ResourceType / ResourceSubtype**: Resource classification keys
//! - **ResourceId / NodeId**: Identifiers for instances and harvest nodes
//! - **RegionDefinition**: Static description of a loadable region
//! - **RegionLoadState**: Per-region load state machine
//! - **ResourceInstance / ResourceTemplate**: Catalog records
//! - **Waypoint**: Named anchor inside a region

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Resource type a harvest node yields (e.g. `Wheat`, `Stone`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceType(String);

impl ResourceType {
    /// Create a new resource type
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ResourceType {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Region-level classification used to filter the catalog into a pool
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceSubtype(String);

impl ResourceSubtype {
    /// Create a new resource subtype
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceSubtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceSubtype {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ResourceSubtype {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of a resource instance in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(u64);

impl ResourceId {
    /// Create a ResourceId from a u64
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ResourceId {
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

/// Unique identifier for a harvest node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(Uuid);

impl NodeId {
    /// Create a new random NodeId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a NodeId from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", &self.0.to_string()[..8])
    }
}

/// Named anchor point inside a region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    /// Anchor name
    pub name: String,
    /// World position
    pub position: [f32; 3],
}

impl Waypoint {
    /// Create a new waypoint
    pub fn new(name: impl Into<String>, position: [f32; 3]) -> Self {
        Self {
            name: name.into(),
            position,
        }
    }
}

/// Harvest node placement in a region's content manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Resource type the node yields
    pub resource_type: ResourceType,
    /// World position
    #[serde(default)]
    pub position: [f32; 3],
}

/// Content a region instantiates when loaded
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentManifest {
    /// Harvest nodes placed in the region
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    /// Waypoint anchor, if the region has one
    #[serde(default)]
    pub waypoint: Option<Waypoint>,
}

/// Static definition of a loadable region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionDefinition {
    /// Region name, unique across the configured set
    pub name: String,
    /// Reference to the content bundle the loader instantiates
    pub content_bundle: String,
    /// Resource subtype used to filter the region's pool
    pub resource_subtype: ResourceSubtype,
    /// Excluded from zone operations (core and menu regions)
    #[serde(default)]
    pub protected: bool,
    /// Content instantiated on load
    #[serde(default)]
    pub content: ContentManifest,
}

impl RegionDefinition {
    /// Create a new, unprotected region definition
    pub fn new(name: impl Into<String>, resource_subtype: impl Into<ResourceSubtype>) -> Self {
        let name = name.into();
        Self {
            content_bundle: format!("regions/{}", name.to_lowercase()),
            name,
            resource_subtype: resource_subtype.into(),
            protected: false,
            content: ContentManifest::default(),
        }
    }

    /// Mark the region as protected
    pub fn protected(mut self) -> Self {
        self.protected = true;
        self
    }

    /// Set the content bundle reference
    pub fn with_bundle(mut self, bundle: impl Into<String>) -> Self {
        self.content_bundle = bundle.into();
        self
    }

    /// Add a harvest node to the content manifest
    pub fn with_node(mut self, resource_type: impl Into<ResourceType>) -> Self {
        self.content.nodes.push(NodeSpec {
            resource_type: resource_type.into(),
            position: [0.0; 3],
        });
        self
    }

    /// Set the waypoint anchor
    pub fn with_waypoint(mut self, waypoint: Waypoint) -> Self {
        self.content.waypoint = Some(waypoint);
        self
    }
}

/// Load state of a single region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegionLoadState {
    /// Not loaded
    Unloaded,
    /// Load in flight
    Loading,
    /// Fully loaded
    Loaded,
    /// Unload in flight
    Unloading,
}

impl fmt::Display for RegionLoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RegionLoadState::Unloaded => "unloaded",
            RegionLoadState::Loading => "loading",
            RegionLoadState::Loaded => "loaded",
            RegionLoadState::Unloading => "unloading",
        };
        f.write_str(s)
    }
}

/// Quality attributes keyed by attribute name (e.g. `OQ`, `DR`)
pub type QualityAttributes = BTreeMap<String, u16>;

/// Concrete, time-bounded resource record owned by the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceInstance {
    /// Instance id
    pub id: ResourceId,
    /// Template this instance was created from
    pub template_id: u64,
    /// Resource type
    pub resource_type: ResourceType,
    /// Resource subtype
    pub subtype: ResourceSubtype,
    /// Quality attributes
    #[serde(default)]
    pub quality: QualityAttributes,
    /// Start of the validity window
    pub valid_from: DateTime<Utc>,
    /// End of the validity window
    pub valid_to: DateTime<Utc>,
}

impl ResourceInstance {
    /// Whether `now` lies inside `[valid_from, valid_to]`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_from <= now && now <= self.valid_to
    }

    /// Whether the instance is currently valid
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}

/// Blueprint the catalog spawns instances from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceTemplate {
    /// Template id
    pub id: u64,
    /// Resource type produced
    pub resource_type: ResourceType,
    /// Resource subtype produced
    pub subtype: ResourceSubtype,
    /// Quality attributes copied onto spawned instances
    #[serde(default)]
    pub quality: QualityAttributes,
    /// How long spawned instances stay valid
    #[serde(default = "default_lifetime_hours")]
    pub lifetime_hours: i64,
}

fn default_lifetime_hours() -> i64 {
    24 * 7
}

impl ResourceTemplate {
    /// Create a new template with an empty attribute set
    pub fn new(
        id: u64,
        resource_type: impl Into<ResourceType>,
        subtype: impl Into<ResourceSubtype>,
    ) -> Self {
        Self {
            id,
            resource_type: resource_type.into(),
            subtype: subtype.into(),
            quality: QualityAttributes::new(),
            lifetime_hours: default_lifetime_hours(),
        }
    }

    /// Set a quality attribute
    pub fn with_quality(mut self, name: impl Into<String>, value: u16) -> Self {
        self.quality.insert(name.into(), value);
        self
    }

    /// Set the lifetime of spawned instances
    pub fn with_lifetime_hours(mut self, hours: i64) -> Self {
        self.lifetime_hours = hours;
        self
    }

    /// Whether this template produces the requested pairing
    pub fn produces(&self, resource_type: &ResourceType, subtype: &ResourceSubtype) -> bool {
        &self.resource_type == resource_type && &self.subtype == subtype
    }

    /// Build an instance with the given id, valid from `now`
    pub fn instantiate(&self, id: ResourceId, now: DateTime<Utc>) -> ResourceInstance {
        ResourceInstance {
            id,
            template_id: self.id,
            resource_type: self.resource_type.clone(),
            subtype: self.subtype.clone(),
            quality: self.quality.clone(),
            valid_from: now,
            valid_to: now + Duration::hours(self.lifetime_hours),
        }
    }
}
