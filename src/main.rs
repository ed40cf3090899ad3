//! # Zone Server
//!
//! Headless binary that hosts the zone orchestration runtime.
//!
//! ## Usage
//!
//! ```bash
//! # Start with the default Core/Menu regions
//! zone-server
//!
//! # Start with a config file
//! zone-server --config demos/zones.toml
//!
//! # Start and immediately enter a zone
//! zone-server --config demos/zones.toml --enter Pasture
//!
//! # Run as a non-authoritative client (never spawns coordinators)
//! zone-server --role client
//! ```

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use zone_orchestration::{OrchestratorConfig, ServerRole, ZoneServerBuilder};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "zone-server")]
#[command(about = "Zone orchestration server")]
#[command(version)]
struct Args {
    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Process role (server or client)
    #[arg(short, long)]
    role: Option<ServerRole>,

    /// Node name used in logs
    #[arg(long)]
    node_name: Option<String>,

    /// Zone to transition into once the core region is up
    #[arg(short, long)]
    enter: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = match &args.config {
        Some(path) => OrchestratorConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => OrchestratorConfig::default(),
    };

    // CLI takes precedence over the config file
    if let Some(role) = args.role {
        config.role = role;
    }
    if let Some(node_name) = args.node_name {
        config.node_name = node_name;
    }

    info!("Server configuration:");
    info!("  Node: {}", config.node_name);
    info!("  Role: {:?}", config.role);
    info!("  Core region: {}", config.core_region);
    info!("  Regions: {}", config.regions.len());
    info!("  Settle delay: {} ms", config.settle_delay_ms);

    let server = ZoneServerBuilder::new()
        .with_config(config)
        .build()
        .context("failed to build zone server")?;

    server.start().await.context("failed to start zone server")?;

    if let Some(zone) = &args.enter {
        if let Err(e) = server.lifecycle().transition_to_region(zone).await {
            warn!(region = %zone, error = %e, "Initial transition failed");
        }
    }

    server.wait_for_shutdown().await;

    if let Some(metrics) = server.metrics() {
        if let Ok(text) = metrics.gather_text() {
            info!("Final metrics:\n{}", text);
        }
    }

    Ok(())
}
