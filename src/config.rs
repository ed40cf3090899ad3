//! Orchestrator configuration
//!
//! ## Table of Contents
//! - **ServerRole**: Authoritative server or client process
//! - **OrchestratorConfig**: Complete configuration, loadable from TOML
//!
//! ## Example (zones.toml)
//!
//! ```toml
//! role = "server"
//! core_region = "Core"
//! menu_region = "Menu"
//! settle_delay_ms = 2000
//! watchdog_interval_ms = 5000
//!
//! [[regions]]
//! name = "Core"
//! content_bundle = "regions/core"
//! resource_subtype = "None"
//! protected = true
//!
//! [[regions]]
//! name = "Menu"
//! content_bundle = "regions/menu"
//! resource_subtype = "None"
//! protected = true
//!
//! [[regions]]
//! name = "Pasture"
//! content_bundle = "regions/pasture"
//! resource_subtype = "Ithoria"
//!
//! [[regions.content.nodes]]
//! resource_type = "Wheat"
//!
//! [[templates]]
//! id = 1
//! resource_type = "Wheat"
//! subtype = "Ithoria"
//! ```

use crate::error::{Result, ZoneError};
use crate::types::{RegionDefinition, ResourceTemplate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Role of this process in the multiplayer session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerRole {
    /// Authoritative server; spawns zone coordinators
    #[default]
    Server,
    /// Non-authoritative client; never spawns coordinators
    Client,
}

impl ServerRole {
    /// Whether this role owns gameplay state
    pub fn is_authoritative(&self) -> bool {
        matches!(self, ServerRole::Server)
    }
}

impl std::str::FromStr for ServerRole {
    type Err = ZoneError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "server" => Ok(ServerRole::Server),
            "client" => Ok(ServerRole::Client),
            other => Err(ZoneError::config(format!("unknown role '{}'", other))),
        }
    }
}

/// Complete orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Node name used in logs
    pub node_name: String,
    /// Process role
    pub role: ServerRole,
    /// Permanently loaded region hosting cross-zone singletons
    pub core_region: String,
    /// Menu region, unloaded on the first zone transition
    pub menu_region: String,
    /// Load the menu region during bootstrap
    pub load_menu_on_start: bool,
    /// Delay between load completion and coordinator spawn
    pub settle_delay_ms: u64,
    /// Core region health check interval
    pub watchdog_interval_ms: u64,
    /// Item prefab reference attached to every discovered harvest node
    pub shared_item_prefab: String,
    /// Capacity of the region event channel
    pub event_capacity: usize,
    /// JSON file backing the resource catalog; in-memory when unset
    pub catalog_path: Option<PathBuf>,
    /// Loadable regions, including the core and menu regions
    pub regions: Vec<RegionDefinition>,
    /// Resource templates seeded into the catalog
    pub templates: Vec<ResourceTemplate>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        let core = "Core".to_string();
        let menu = "Menu".to_string();
        Self {
            node_name: hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "zone-node".to_string()),
            role: ServerRole::Server,
            regions: vec![
                RegionDefinition::new(core.clone(), "None").protected(),
                RegionDefinition::new(menu.clone(), "None").protected(),
            ],
            core_region: core,
            menu_region: menu,
            load_menu_on_start: true,
            settle_delay_ms: 2000,
            watchdog_interval_ms: 5000,
            shared_item_prefab: "items/resource_container".to_string(),
            event_capacity: 256,
            catalog_path: None,
            templates: Vec::new(),
        }
    }
}

impl OrchestratorConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Settle delay as a `Duration`
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Watchdog interval as a `Duration`
    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms)
    }

    /// Add a region definition
    pub fn with_region(mut self, region: RegionDefinition) -> Self {
        self.regions.push(region);
        self
    }

    /// Add a resource template
    pub fn with_template(mut self, template: ResourceTemplate) -> Self {
        self.templates.push(template);
        self
    }

    /// Set the settle delay
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the watchdog interval
    pub fn with_watchdog_interval(mut self, interval: Duration) -> Self {
        self.watchdog_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the process role
    pub fn with_role(mut self, role: ServerRole) -> Self {
        self.role = role;
        self
    }

    /// Check the configuration for inconsistencies
    pub fn validate(&self) -> Result<()> {
        if self.core_region.is_empty() {
            return Err(ZoneError::config("core_region must not be empty"));
        }
        if self.watchdog_interval_ms == 0 {
            return Err(ZoneError::config("watchdog_interval_ms must be positive"));
        }
        if self.event_capacity == 0 {
            return Err(ZoneError::config("event_capacity must be positive"));
        }

        let mut seen = HashSet::new();
        for region in &self.regions {
            if !seen.insert(region.name.as_str()) {
                return Err(ZoneError::config(format!(
                    "duplicate region definition '{}'",
                    region.name
                )));
            }
        }

        if !seen.contains(self.core_region.as_str()) {
            return Err(ZoneError::config(format!(
                "core region '{}' is not defined",
                self.core_region
            )));
        }
        if !self.menu_region.is_empty() && !seen.contains(self.menu_region.as_str()) {
            return Err(ZoneError::config(format!(
                "menu region '{}' is not defined",
                self.menu_region
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = OrchestratorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.role, ServerRole::Server);
        assert_eq!(config.settle_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            role = "client"
            core_region = "Hub"
            menu_region = ""
            settle_delay_ms = 10

            [[regions]]
            name = "Hub"
            content_bundle = "regions/hub"
            resource_subtype = "None"
            protected = true

            [[regions]]
            name = "Pasture"
            content_bundle = "regions/pasture"
            resource_subtype = "Ithoria"

            [[regions.content.nodes]]
            resource_type = "Wheat"

            [[regions.content.nodes]]
            resource_type = "Stone"
            position = [1.0, 0.0, 3.5]

            [[templates]]
            id = 1
            resource_type = "Stone"
            subtype = "Ithoria"
            quality = { OQ = 640 }
        "#;

        let config = OrchestratorConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.role, ServerRole::Client);
        assert_eq!(config.regions.len(), 2);
        assert_eq!(config.regions[1].content.nodes.len(), 2);
        assert_eq!(config.templates[0].quality.get("OQ"), Some(&640));
        assert_eq!(config.templates[0].lifetime_hours, 24 * 7);
    }

    #[test]
    fn test_validate_rejects_missing_core() {
        let config = OrchestratorConfig {
            core_region: "Nowhere".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ZoneError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let config = OrchestratorConfig::default()
            .with_region(RegionDefinition::new("Pasture", "Ithoria"))
            .with_region(RegionDefinition::new("Pasture", "Ithoria"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("Server".parse::<ServerRole>().unwrap(), ServerRole::Server);
        assert!("observer".parse::<ServerRole>().is_err());
        assert!(!ServerRole::Client.is_authoritative());
    }
}
