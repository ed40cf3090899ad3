//! Resource catalog backends
//!
//! ## Table of Contents
//! - **ResourceCatalog**: Trait for the authoritative resource store
//! - **MemoryCatalog**: In-memory catalog (default, tests)
//! - **FileCatalog**: JSON file catalog; spawns are written through to disk
//!
//! The catalog is shared by every zone coordinator. It does not deduplicate:
//! two regions sharing a subtype may both spawn an instance for the same
//! `(type, subtype)` pair.

use crate::error::{Result, ZoneError};
use crate::types::{ResourceId, ResourceInstance, ResourceSubtype, ResourceTemplate, ResourceType};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Trait for resource catalog backends
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceCatalog: Send + Sync {
    /// Snapshot of every known instance
    async fn all_instances(&self) -> Result<Vec<ResourceInstance>>;

    /// Create a new instance for the pairing; may perform durable writes
    async fn spawn_instance(
        &self,
        resource_type: &ResourceType,
        subtype: &ResourceSubtype,
    ) -> Result<ResourceInstance>;

    /// Look up an instance by id
    async fn instance_by_id(&self, id: ResourceId) -> Result<Option<ResourceInstance>>;
}

/// Type alias for a shared catalog
pub type BoxedCatalog = Arc<dyn ResourceCatalog>;

/// Serializable catalog contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CatalogState {
    instances: Vec<ResourceInstance>,
    templates: Vec<ResourceTemplate>,
    next_id: u64,
}

impl CatalogState {
    fn with_templates(templates: Vec<ResourceTemplate>) -> Self {
        Self {
            instances: Vec::new(),
            templates,
            next_id: 1,
        }
    }

    fn insert(&mut self, instance: ResourceInstance) {
        self.next_id = self.next_id.max(instance.id.as_u64().saturating_add(1));
        self.instances.push(instance);
    }

    fn add_template(&mut self, template: ResourceTemplate) {
        // Seeded templates do not override ones already persisted
        if !self.templates.iter().any(|t| t.id == template.id) {
            self.templates.push(template);
        }
    }

    fn spawn(&mut self, resource_type: &ResourceType, subtype: &ResourceSubtype) -> Result<ResourceInstance> {
        let template = self
            .templates
            .iter()
            .find(|t| t.produces(resource_type, subtype))
            .ok_or_else(|| {
                ZoneError::creation(resource_type.as_str(), subtype.as_str(), "no matching template")
            })?;

        let id = ResourceId::new(self.next_id.max(1));
        // next_id saturates at u64::MAX, which is then already taken
        if self.get(id).is_some() {
            return Err(ZoneError::creation(
                resource_type.as_str(),
                subtype.as_str(),
                "resource id space exhausted",
            ));
        }
        let instance = template.instantiate(id, Utc::now());
        self.insert(instance.clone());
        Ok(instance)
    }

    fn get(&self, id: ResourceId) -> Option<ResourceInstance> {
        self.instances.iter().find(|i| i.id == id).cloned()
    }
}

/// In-memory catalog
#[derive(Debug)]
pub struct MemoryCatalog {
    state: RwLock<CatalogState>,
    spawn_calls: AtomicU64,
    latency: Duration,
}

impl MemoryCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::with_templates(Vec::new())
    }

    /// Create a catalog able to spawn from the given templates
    pub fn with_templates(templates: Vec<ResourceTemplate>) -> Self {
        Self {
            state: RwLock::new(CatalogState::with_templates(templates)),
            spawn_calls: AtomicU64::new(0),
            latency: Duration::ZERO,
        }
    }

    /// Simulated latency of spawn calls
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Seed an existing instance
    pub fn insert_instance(&self, instance: ResourceInstance) {
        self.state.write().insert(instance);
    }

    /// Add a template
    pub fn add_template(&self, template: ResourceTemplate) {
        self.state.write().add_template(template);
    }

    /// Number of spawn calls received, successful or not
    pub fn spawn_count(&self) -> u64 {
        self.spawn_calls.load(Ordering::SeqCst)
    }

    /// Number of stored instances
    pub fn len(&self) -> usize {
        self.state.read().instances.len()
    }

    /// Whether the catalog holds no instances
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceCatalog for MemoryCatalog {
    async fn all_instances(&self) -> Result<Vec<ResourceInstance>> {
        Ok(self.state.read().instances.clone())
    }

    async fn spawn_instance(
        &self,
        resource_type: &ResourceType,
        subtype: &ResourceSubtype,
    ) -> Result<ResourceInstance> {
        self.spawn_calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let instance = self.state.write().spawn(resource_type, subtype)?;
        debug!(id = %instance.id, resource_type = %resource_type, subtype = %subtype, "Resource instance spawned");
        Ok(instance)
    }

    async fn instance_by_id(&self, id: ResourceId) -> Result<Option<ResourceInstance>> {
        Ok(self.state.read().get(id))
    }
}

/// File-based persistent catalog
///
/// Simple JSON file storage. Every spawn is flushed before it is returned.
pub struct FileCatalog {
    path: PathBuf,
    state: RwLock<CatalogState>,
}

impl FileCatalog {
    /// Open or create a catalog file, seeding templates it does not yet hold
    pub fn open(path: impl AsRef<Path>, templates: Vec<ResourceTemplate>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut state = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ZoneError::catalog(format!("Failed to read catalog: {}", e)))?;
            serde_json::from_str(&contents)?
        } else {
            CatalogState::with_templates(Vec::new())
        };
        for template in templates {
            state.add_template(template);
        }

        info!(
            path = %path.display(),
            instances = state.instances.len(),
            templates = state.templates.len(),
            "File catalog opened"
        );

        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    /// Persist the catalog to disk
    pub async fn flush(&self) -> Result<()> {
        let contents = {
            let state = self.state.read();
            serde_json::to_string_pretty(&*state)?
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ZoneError::catalog(format!("Failed to create dir: {}", e)))?;
        }

        tokio::fs::write(&self.path, contents)
            .await
            .map_err(|e| ZoneError::catalog(format!("Failed to write catalog: {}", e)))?;

        debug!(path = %self.path.display(), "File catalog flushed");
        Ok(())
    }

    /// Seed an existing instance (not flushed)
    pub fn insert_instance(&self, instance: ResourceInstance) {
        self.state.write().insert(instance);
    }
}

#[async_trait]
impl ResourceCatalog for FileCatalog {
    async fn all_instances(&self) -> Result<Vec<ResourceInstance>> {
        Ok(self.state.read().instances.clone())
    }

    async fn spawn_instance(
        &self,
        resource_type: &ResourceType,
        subtype: &ResourceSubtype,
    ) -> Result<ResourceInstance> {
        let instance = self.state.write().spawn(resource_type, subtype)?;
        if let Err(e) = self.flush().await {
            // Not durable, so not created
            self.state.write().instances.retain(|i| i.id != instance.id);
            return Err(ZoneError::creation(
                resource_type.as_str(),
                subtype.as_str(),
                e.to_string(),
            ));
        }
        info!(id = %instance.id, resource_type = %resource_type, subtype = %subtype, "Resource instance persisted");
        Ok(instance)
    }

    async fn instance_by_id(&self, id: ResourceId) -> Result<Option<ResourceInstance>> {
        Ok(self.state.read().get(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wheat_template() -> ResourceTemplate {
        ResourceTemplate::new(1, "Wheat", "Ithoria").with_quality("OQ", 420)
    }

    #[tokio::test]
    async fn test_memory_catalog_spawn() {
        let catalog = MemoryCatalog::with_templates(vec![wheat_template()]);

        let instance = catalog
            .spawn_instance(&"Wheat".into(), &"Ithoria".into())
            .await
            .unwrap();
        assert_eq!(instance.id, ResourceId::new(1));
        assert_eq!(instance.template_id, 1);
        assert!(instance.is_valid());
        assert_eq!(catalog.len(), 1);

        let found = catalog.instance_by_id(instance.id).await.unwrap();
        assert_eq!(found, Some(instance));
        assert!(catalog.instance_by_id(ResourceId::new(99)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_catalog_missing_template() {
        let catalog = MemoryCatalog::with_templates(vec![wheat_template()]);

        let err = catalog
            .spawn_instance(&"Stone".into(), &"Ithoria".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ZoneError::CreationFailure { .. }));
        assert_eq!(catalog.spawn_count(), 1);
        assert!(catalog.is_empty());
    }

    #[tokio::test]
    async fn test_seeded_ids_are_not_reused() {
        let catalog = MemoryCatalog::with_templates(vec![wheat_template()]);
        catalog.insert_instance(wheat_template().instantiate(ResourceId::new(7), Utc::now()));

        let spawned = catalog
            .spawn_instance(&"Wheat".into(), &"Ithoria".into())
            .await
            .unwrap();
        assert_eq!(spawned.id, ResourceId::new(8));
    }

    #[tokio::test]
    async fn test_exhausted_id_space_fails_cleanly() {
        let catalog = MemoryCatalog::with_templates(vec![wheat_template()]);
        catalog.insert_instance(wheat_template().instantiate(ResourceId::new(u64::MAX), Utc::now()));

        let err = catalog
            .spawn_instance(&"Wheat".into(), &"Ithoria".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ZoneError::CreationFailure { .. }));
        assert_eq!(catalog.len(), 1);
    }

    #[tokio::test]
    async fn test_file_catalog_persists_spawns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");

        let spawned_id = {
            let catalog = FileCatalog::open(&path, vec![wheat_template()]).unwrap();
            let instance = catalog
                .spawn_instance(&"Wheat".into(), &"Ithoria".into())
                .await
                .unwrap();
            instance.id
        };

        let reopened = FileCatalog::open(&path, vec![wheat_template()]).unwrap();
        let instances = reopened.all_instances().await.unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].id, spawned_id);

        // Ids keep increasing across reopen
        let next = reopened
            .spawn_instance(&"Wheat".into(), &"Ithoria".into())
            .await
            .unwrap();
        assert!(next.id > spawned_id);
    }
}
