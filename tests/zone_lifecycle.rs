//! End-to-end tests: lifecycle manager, supervisor and coordinators wired
//! together through the builder.

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use zone_orchestration::prelude::*;
use zone_orchestration::{
    FailFast, MemoryCatalog, NodeRegistry, RegionLoadState, ResourceId, ResourceSubtype,
    ResourceType, StaticContentLoader, Waypoint, ZoneCoordinator,
};

#[derive(Default)]
struct RecordingFailFast {
    reasons: Mutex<Vec<String>>,
}

impl FailFast for RecordingFailFast {
    fn terminate(&self, reason: &str) {
        self.reasons.lock().push(reason.to_string());
    }
}

fn pasture() -> RegionDefinition {
    RegionDefinition::new("Pasture", "Ithoria")
        .with_node("Wheat")
        .with_node("Wheat")
        .with_node("Stone")
        .with_waypoint(Waypoint::new("PastureGate", [12.0, 0.0, -4.0]))
}

fn build(catalog: Arc<MemoryCatalog>) -> ZoneServer {
    ZoneServerBuilder::new()
        .with_region(pasture())
        .with_region(RegionDefinition::new("Quarry", "Ithoria").with_node("Stone"))
        .with_settle_delay(Duration::from_millis(10))
        .with_watchdog_interval(Duration::from_millis(20))
        .with_catalog(catalog)
        .with_fail_fast(Arc::new(RecordingFailFast::default()))
        .build()
        .unwrap()
}

fn ithoria_catalog() -> Arc<MemoryCatalog> {
    let wheat = ResourceTemplate::new(1, "Wheat", "Ithoria");
    let stone = ResourceTemplate::new(2, "Stone", "Ithoria");
    let catalog = MemoryCatalog::with_templates(vec![wheat.clone(), stone]);
    catalog.insert_instance(wheat.instantiate(ResourceId::new(7), Utc::now()));
    Arc::new(catalog)
}

async fn wait_for_initialized(server: &ZoneServer, region: &str) -> Arc<ZoneCoordinator> {
    for _ in 0..200 {
        if let Some(coordinator) = server.supervisor().coordinator(region) {
            if coordinator.is_initialized() {
                return coordinator;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("coordinator for {} never initialized", region);
}

async fn wait_for_no_coordinator(server: &ZoneServer, region: &str) {
    for _ in 0..200 {
        if server.supervisor().coordinator(region).is_none() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("coordinator for {} was never removed", region);
}

#[tokio::test]
async fn test_pasture_assignment() {
    let catalog = ithoria_catalog();
    let server = build(catalog.clone());
    server.start().await.unwrap();

    server.lifecycle().load_region("Pasture").await.unwrap();
    let coordinator = wait_for_initialized(&server, "Pasture").await;

    let nodes = coordinator.active_nodes().unwrap();
    assert_eq!(nodes.len(), 3);

    let wheat = ResourceType::from("Wheat");
    let stone = ResourceType::from("Stone");
    for node in nodes.iter().filter(|n| n.resource_type == wheat) {
        assert_eq!(node.assigned_resource, Some(ResourceId::new(7)));
        assert_eq!(node.resource_subtype, Some(ResourceSubtype::from("Ithoria")));
    }

    assert_eq!(catalog.spawn_count(), 1);
    let stone_node = nodes.iter().find(|n| n.resource_type == stone).unwrap();
    let spawned = stone_node.assigned_resource.unwrap();
    assert_ne!(spawned, ResourceId::new(7));
    let instance = catalog.instance_by_id(spawned).await.unwrap().unwrap();
    assert_eq!(instance.resource_type, stone);

    assert_eq!(
        coordinator.waypoint().unwrap().map(|w| w.name),
        Some("PastureGate".to_string())
    );
    assert_eq!(coordinator.region_resources().unwrap().len(), 2);

    // Re-running assignment on a fully assigned zone spawns nothing
    let report = coordinator.assign_resources().await.unwrap();
    assert!(report.spawned.is_empty());
    assert_eq!(catalog.spawn_count(), 1);
    assert_eq!(coordinator.active_nodes().unwrap(), nodes);

    server.shutdown();
}

#[tokio::test]
async fn test_transition_unloads_zone_and_menu() {
    let server = build(ithoria_catalog());
    server.start().await.unwrap();
    let lifecycle = server.lifecycle();

    lifecycle.load_region("Pasture").await.unwrap();
    assert_eq!(lifecycle.load_state("Menu"), RegionLoadState::Loaded);

    let mut events = lifecycle.subscribe();
    lifecycle.transition_to_region("Quarry").await.unwrap();

    assert_eq!(lifecycle.load_state("Pasture"), RegionLoadState::Unloaded);
    assert_eq!(lifecycle.load_state("Menu"), RegionLoadState::Unloaded);
    assert_eq!(lifecycle.load_state("Quarry"), RegionLoadState::Loaded);
    assert_eq!(lifecycle.load_state("Core"), RegionLoadState::Loaded);

    let mut seen = Vec::new();
    while let Some(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(!seen.iter().any(|e| e.region() == Some("Core")));
    assert!(seen.contains(&RegionEvent::UnloadCompleted { region: "Pasture".into() }));
    assert!(seen.contains(&RegionEvent::UnloadCompleted { region: "Menu".into() }));
    assert!(seen.contains(&RegionEvent::LoadCompleted { region: "Quarry".into() }));

    wait_for_no_coordinator(&server, "Pasture").await;
    wait_for_initialized(&server, "Quarry").await;
    assert_eq!(server.supervisor().coordinator_count(), 1);

    server.shutdown();
}

#[tokio::test]
async fn test_double_load_spawns_one_coordinator() {
    let server = build(ithoria_catalog());
    server.start().await.unwrap();

    server.lifecycle().load_region("Pasture").await.unwrap();
    server.lifecycle().load_region("Pasture").await.unwrap();
    assert_eq!(server.lifecycle().loaded_regions(), vec!["Core", "Menu", "Pasture"]);

    wait_for_initialized(&server, "Pasture").await;
    tokio::time::sleep(Duration::from_millis(40)).await;

    let all = server.supervisor().all_coordinators();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].region(), "Pasture");

    server.shutdown();
}

#[tokio::test]
async fn test_core_is_never_unloaded() {
    let server = build(ithoria_catalog());
    server.start().await.unwrap();

    let err = server.lifecycle().unload_region("Core").await.unwrap_err();
    assert!(matches!(err, ZoneError::ProtectionViolation(_)));

    server.lifecycle().transition_to_region("Pasture").await.unwrap();
    assert_eq!(server.lifecycle().load_state("Core"), RegionLoadState::Loaded);
    assert!(server.lifecycle().check_core_health().is_ok());

    server.shutdown();
}

#[tokio::test]
async fn test_unload_removes_coordinator() {
    let server = build(ithoria_catalog());
    server.start().await.unwrap();

    server.lifecycle().load_region("Pasture").await.unwrap();
    let coordinator = wait_for_initialized(&server, "Pasture").await;

    server.lifecycle().unload_region("Pasture").await.unwrap();
    wait_for_no_coordinator(&server, "Pasture").await;

    assert!(coordinator.is_torn_down());
    assert!(matches!(coordinator.active_nodes(), Err(ZoneError::NotReady(_))));
    assert_eq!(server.registry().node_count("Pasture"), 0);

    server.shutdown();
}

#[tokio::test]
async fn test_client_role_never_spawns() {
    let server = ZoneServerBuilder::new()
        .with_region(pasture())
        .with_role(ServerRole::Client)
        .with_settle_delay(Duration::from_millis(5))
        .with_fail_fast(Arc::new(RecordingFailFast::default()))
        .build()
        .unwrap();
    server.start().await.unwrap();

    server.lifecycle().load_region("Pasture").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(server.supervisor().coordinator_count(), 0);

    server.shutdown();
}

#[tokio::test]
async fn test_config_file_round_trip() {
    let toml = r#"
        settle_delay_ms = 5
        watchdog_interval_ms = 50

        [[regions]]
        name = "Core"
        content_bundle = "regions/core"
        resource_subtype = "None"
        protected = true

        [[regions]]
        name = "Menu"
        content_bundle = "regions/menu"
        resource_subtype = "None"
        protected = true

        [[regions]]
        name = "Pasture"
        content_bundle = "regions/pasture"
        resource_subtype = "Ithoria"

        [[regions.content.nodes]]
        resource_type = "Wheat"

        [[templates]]
        id = 1
        resource_type = "Wheat"
        subtype = "Ithoria"
    "#;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("zones.toml");
    std::fs::write(&path, toml).unwrap();

    let config = OrchestratorConfig::from_file(&path).unwrap();
    let server = ZoneServerBuilder::new()
        .with_config(config)
        .with_fail_fast(Arc::new(RecordingFailFast::default()))
        .build()
        .unwrap();
    server.start().await.unwrap();

    server.lifecycle().transition_to_region("Pasture").await.unwrap();
    let coordinator = wait_for_initialized(&server, "Pasture").await;
    let nodes = coordinator.active_nodes().unwrap();
    assert_eq!(nodes.len(), 1);
    assert!(nodes[0].assigned_resource.is_some());

    server.shutdown();
}

#[tokio::test]
async fn test_watchdog_terminates_on_core_loss() {
    let registry = Arc::new(NodeRegistry::new());
    let loader = Arc::new(StaticContentLoader::new(Arc::clone(&registry)));
    let fail_fast = Arc::new(RecordingFailFast::default());

    let server = ZoneServerBuilder::new()
        .with_content_loader(loader.clone(), registry)
        .with_watchdog_interval(Duration::from_millis(10))
        .with_fail_fast(fail_fast.clone())
        .build()
        .unwrap();
    let mut events = server.lifecycle().subscribe();
    server.start().await.unwrap();

    loader.evict("Core");
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(fail_fast.reasons.lock().len(), 1);
    let mut failure = None;
    while let Some(event) = events.try_recv() {
        if let RegionEvent::CoreRegionFailure { region, .. } = event {
            failure = Some(region);
        }
    }
    assert_eq!(failure.as_deref(), Some("Core"));

    server.shutdown();
}

#[tokio::test]
async fn test_transition_survives_event_overflow() {
    let mut config = OrchestratorConfig::default()
        .with_settle_delay(Duration::ZERO)
        .with_watchdog_interval(Duration::from_millis(50));
    for zone in ["A", "B", "C", "D", "E"] {
        config = config.with_region(RegionDefinition::new(zone, "Ithoria").with_node("Wheat"));
    }
    config.event_capacity = 2;

    let server = ZoneServerBuilder::new()
        .with_config(config)
        .with_catalog(ithoria_catalog())
        .with_fail_fast(Arc::new(RecordingFailFast::default()))
        .build()
        .unwrap();
    server.start().await.unwrap();

    for zone in ["A", "B", "C", "D"] {
        server.lifecycle().load_region(zone).await.unwrap();
        wait_for_initialized(&server, zone).await;
    }

    server.lifecycle().transition_to_region("E").await.unwrap();
    wait_for_initialized(&server, "E").await;
    for zone in ["A", "B", "C", "D"] {
        wait_for_no_coordinator(&server, zone).await;
    }

    assert_eq!(server.lifecycle().loaded_regions(), vec!["Core", "E"]);
    let all = server.supervisor().all_coordinators();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].region(), "E");

    server.shutdown();
}
