//! ZoneServerBuilder for configuring and constructing zone servers
//!
//! ## Table of Contents
//! - **ZoneServerBuilder**: Builder pattern that explicitly constructs every
//!   component once and hands it to its dependents

use crate::catalog::{BoxedCatalog, FileCatalog, MemoryCatalog};
use crate::config::{OrchestratorConfig, ServerRole};
use crate::content::{BoxedContentLoader, NodeRegistry, StaticContentLoader};
use crate::error::{Result, ZoneError};
use crate::events::EventBus;
use crate::lifecycle::{FailFast, ProcessExit, RegionLifecycleManager};
use crate::metrics::ZoneMetrics;
use crate::runtime::ZoneServer;
use crate::supervisor::ZoneCoordinatorSupervisor;
use crate::types::{RegionDefinition, ResourceTemplate};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Builder for constructing zone servers
pub struct ZoneServerBuilder {
    config: OrchestratorConfig,
    catalog: Option<BoxedCatalog>,
    loader: Option<BoxedContentLoader>,
    registry: Option<Arc<NodeRegistry>>,
    fail_fast: Option<Arc<dyn FailFast>>,
    metrics_enabled: bool,
}

impl ZoneServerBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: OrchestratorConfig::default(),
            catalog: None,
            loader: None,
            registry: None,
            fail_fast: None,
            metrics_enabled: true,
        }
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a region definition
    pub fn with_region(mut self, region: RegionDefinition) -> Self {
        self.config.regions.push(region);
        self
    }

    /// Add a resource template
    pub fn with_template(mut self, template: ResourceTemplate) -> Self {
        self.config.templates.push(template);
        self
    }

    /// Set the process role
    pub fn with_role(mut self, role: ServerRole) -> Self {
        self.config.role = role;
        self
    }

    /// Set the coordinator settle delay
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.config = self.config.with_settle_delay(delay);
        self
    }

    /// Set the watchdog interval
    pub fn with_watchdog_interval(mut self, interval: Duration) -> Self {
        self.config = self.config.with_watchdog_interval(interval);
        self
    }

    /// Use a custom resource catalog
    pub fn with_catalog(mut self, catalog: BoxedCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Use a custom content loader and the registry it pushes nodes into
    pub fn with_content_loader(mut self, loader: BoxedContentLoader, registry: Arc<NodeRegistry>) -> Self {
        self.loader = Some(loader);
        self.registry = Some(registry);
        self
    }

    /// Use a custom termination hook for the core watchdog
    pub fn with_fail_fast(mut self, fail_fast: Arc<dyn FailFast>) -> Self {
        self.fail_fast = Some(fail_fast);
        self
    }

    /// Enable or disable metrics
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    /// Build the zone server
    pub fn build(self) -> Result<ZoneServer> {
        self.config.validate()?;
        if self.loader.is_some() != self.registry.is_some() {
            return Err(ZoneError::config("content loader and node registry must be set together"));
        }

        info!(
            node = %self.config.node_name,
            role = ?self.config.role,
            regions = self.config.regions.len(),
            "Building zone server"
        );

        let registry = self.registry.unwrap_or_else(|| Arc::new(NodeRegistry::new()));
        let loader: BoxedContentLoader = match self.loader {
            Some(loader) => loader,
            None => Arc::new(StaticContentLoader::new(Arc::clone(&registry))),
        };

        let catalog: BoxedCatalog = match self.catalog {
            Some(catalog) => catalog,
            None => match &self.config.catalog_path {
                Some(path) => Arc::new(FileCatalog::open(path, self.config.templates.clone())?),
                None => Arc::new(MemoryCatalog::with_templates(self.config.templates.clone())),
            },
        };

        let metrics = if self.metrics_enabled {
            Some(Arc::new(ZoneMetrics::new()?))
        } else {
            None
        };

        let events = Arc::new(EventBus::new(self.config.event_capacity));

        let mut lifecycle = RegionLifecycleManager::new(&self.config, loader, events);
        if let Some(metrics) = &metrics {
            lifecycle = lifecycle.with_metrics(Arc::clone(metrics));
        }
        let lifecycle = Arc::new(lifecycle);

        let mut supervisor = ZoneCoordinatorSupervisor::new(
            &self.config,
            Arc::clone(&lifecycle),
            Arc::clone(&catalog),
            Arc::clone(&registry),
        );
        if let Some(metrics) = &metrics {
            supervisor = supervisor.with_metrics(Arc::clone(metrics));
        }

        let fail_fast = self.fail_fast.unwrap_or_else(|| Arc::new(ProcessExit));

        Ok(ZoneServer::new(
            self.config,
            lifecycle,
            Arc::new(supervisor),
            catalog,
            registry,
            metrics,
            fail_fast,
        ))
    }
}

impl Default for ZoneServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_default() {
        let server = ZoneServerBuilder::new().build();
        assert!(server.is_ok());
    }

    #[test]
    fn test_builder_with_regions() {
        let server = ZoneServerBuilder::new()
            .with_region(RegionDefinition::new("Pasture", "Ithoria").with_node("Wheat"))
            .with_template(ResourceTemplate::new(1, "Wheat", "Ithoria"))
            .with_settle_delay(Duration::from_millis(5))
            .with_metrics(false)
            .build()
            .unwrap();
        assert!(server.lifecycle().region("Pasture").is_some());
        assert!(server.metrics().is_none());
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let config = OrchestratorConfig {
            core_region: String::new(),
            ..Default::default()
        };
        assert!(ZoneServerBuilder::new().with_config(config).build().is_err());
    }

    #[test]
    fn test_builder_file_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let config = OrchestratorConfig {
            catalog_path: Some(dir.path().join("catalog.json")),
            ..Default::default()
        };
        assert!(ZoneServerBuilder::new().with_config(config).build().is_ok());
    }
}
