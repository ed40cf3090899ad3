//! # Zone Orchestration
//!
//! Server-side zone management for a persistent multiplayer world: which
//! regions are loaded, which per-zone coordinators exist, and how harvest
//! nodes in a zone are bound to resource instances.
//!
//! ## Features
//!
//! - **Region Lifecycle**: Load, unload and transition between zones with a
//!   single source of truth for load state
//! - **Core Watchdog**: Fail-fast termination when the core region is lost
//! - **Coordinator Supervision**: Exactly one coordinator per loaded zone,
//!   spawned after a settle delay and torn down on unload
//! - **Resource Assignment**: Match harvest nodes to pooled instances or
//!   spawn new ones through a [`ResourceCatalog`]
//! - **Metrics**: Prometheus-compatible metrics export
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use zone_orchestration::{RegionDefinition, ResourceTemplate, ZoneServerBuilder};
//!
//! #[tokio::main]
//! async fn main() -> zone_orchestration::Result<()> {
//!     let server = ZoneServerBuilder::new()
//!         .with_region(RegionDefinition::new("Pasture", "Ithoria").with_node("Wheat"))
//!         .with_template(ResourceTemplate::new(1, "Wheat", "Ithoria"))
//!         .build()?;
//!
//!     server.start().await?;
//!     server.lifecycle().transition_to_region("Pasture").await?;
//!     server.shutdown();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod builder;
pub mod catalog;
pub mod config;
pub mod content;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod metrics;
pub mod runtime;
pub mod supervisor;
pub mod types;

// Re-exports for ergonomic API
pub use builder::ZoneServerBuilder;
pub use catalog::{BoxedCatalog, FileCatalog, MemoryCatalog, ResourceCatalog};
pub use config::{OrchestratorConfig, ServerRole};
pub use content::{
    BoxedContentLoader, HarvestNode, HarvestNodeSnapshot, NodeRegistry, RegionContentLoader,
    StaticContentLoader,
};
pub use coordinator::{AssignmentReport, CoordinatorStatus, ZoneCoordinator};
pub use error::{Result, ZoneError};
pub use events::{EventBus, EventSubscription, RegionEvent};
pub use lifecycle::{FailFast, ProcessExit, RegionLifecycleManager, CORE_FAILURE_EXIT_CODE};
pub use metrics::ZoneMetrics;
pub use runtime::{RuntimeState, ZoneServer};
pub use supervisor::ZoneCoordinatorSupervisor;
pub use types::{
    ContentManifest, NodeId, NodeSpec, QualityAttributes, RegionDefinition, RegionLoadState,
    ResourceId, ResourceInstance, ResourceSubtype, ResourceTemplate, ResourceType, Waypoint,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::builder::ZoneServerBuilder;
    pub use crate::catalog::{MemoryCatalog, ResourceCatalog};
    pub use crate::config::{OrchestratorConfig, ServerRole};
    pub use crate::coordinator::ZoneCoordinator;
    pub use crate::error::{Result, ZoneError};
    pub use crate::events::RegionEvent;
    pub use crate::lifecycle::RegionLifecycleManager;
    pub use crate::runtime::ZoneServer;
    pub use crate::supervisor::ZoneCoordinatorSupervisor;
    pub use crate::types::{RegionDefinition, ResourceTemplate};
}
