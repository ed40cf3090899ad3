//! Metrics for zone orchestration
//!
//! ## Table of Contents
//! - **ZoneMetrics**: Prometheus registry and zone counters/gauges
//! - **Timer**: Helper for measuring operation duration

use crate::error::{Result, ZoneError};
use prometheus::{Counter, CounterVec, Gauge, HistogramOpts, HistogramVec, Opts, Registry};

/// Core metrics for the zone orchestrator
pub struct ZoneMetrics {
    registry: Registry,

    // Region metrics
    pub regions_loaded: Gauge,
    pub region_operations: CounterVec,
    pub region_load_duration: HistogramVec,

    // Coordinator metrics
    pub coordinators_active: Gauge,
    pub coordinator_inits: CounterVec,

    // Catalog metrics
    pub resource_spawns: CounterVec,

    // Watchdog
    pub watchdog_failures: Counter,
}

impl ZoneMetrics {
    /// Create a new metrics instance
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let regions_loaded = Gauge::new("zone_regions_loaded", "Regions currently loaded")?;
        let region_operations = CounterVec::new(
            Opts::new("zone_region_operations_total", "Region lifecycle operations"),
            &["op", "result"],
        )?;
        let region_load_duration = HistogramVec::new(
            HistogramOpts::new("zone_region_load_duration_seconds", "Region content load duration")
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["region"],
        )?;

        let coordinators_active = Gauge::new("zone_coordinators_active", "Live zone coordinators")?;
        let coordinator_inits = CounterVec::new(
            Opts::new("zone_coordinator_inits_total", "Coordinator initialization pipelines"),
            &["result"],
        )?;

        let resource_spawns = CounterVec::new(
            Opts::new("zone_resource_spawns_total", "On-demand resource instance creations"),
            &["result"],
        )?;

        let watchdog_failures = Counter::new(
            "zone_watchdog_failures_total",
            "Core region health check failures",
        )?;

        registry.register(Box::new(regions_loaded.clone()))?;
        registry.register(Box::new(region_operations.clone()))?;
        registry.register(Box::new(region_load_duration.clone()))?;
        registry.register(Box::new(coordinators_active.clone()))?;
        registry.register(Box::new(coordinator_inits.clone()))?;
        registry.register(Box::new(resource_spawns.clone()))?;
        registry.register(Box::new(watchdog_failures.clone()))?;

        Ok(Self {
            registry,
            regions_loaded,
            region_operations,
            region_load_duration,
            coordinators_active,
            coordinator_inits,
            resource_spawns,
            watchdog_failures,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record the outcome of a lifecycle operation
    pub fn record_region_op(&self, op: &str, result: &Result<()>) {
        let label = match result {
            Ok(()) => "ok",
            Err(e) => e.kind(),
        };
        self.region_operations.with_label_values(&[op, label]).inc();
    }

    /// Record a completed region load
    pub fn record_region_loaded(&self, region: &str, duration_secs: f64) {
        self.regions_loaded.inc();
        self.region_load_duration
            .with_label_values(&[region])
            .observe(duration_secs);
    }

    /// Record a completed region unload
    pub fn record_region_unloaded(&self) {
        self.regions_loaded.dec();
    }

    /// Update the live coordinator count
    pub fn set_coordinators(&self, count: usize) {
        self.coordinators_active.set(count as f64);
    }

    /// Record a finished coordinator pipeline
    pub fn record_coordinator_init(&self, success: bool) {
        let result = if success { "success" } else { "failed" };
        self.coordinator_inits.with_label_values(&[result]).inc();
    }

    /// Record an on-demand resource spawn
    pub fn record_resource_spawn(&self, success: bool) {
        let result = if success { "success" } else { "failed" };
        self.resource_spawns.with_label_values(&[result]).inc();
    }

    /// Record a watchdog failure
    pub fn record_watchdog_failure(&self) {
        self.watchdog_failures.inc();
    }

    /// Gather all metrics as text
    pub fn gather_text(&self) -> Result<String> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| ZoneError::metrics(format!("Encode error: {}", e)))?;
        String::from_utf8(buffer).map_err(|e| ZoneError::metrics(format!("UTF8 error: {}", e)))
    }
}

/// Timer for measuring operation duration
pub struct Timer {
    start: std::time::Instant,
}

impl Timer {
    /// Start a new timer
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Get elapsed time in seconds
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}
