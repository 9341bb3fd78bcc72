//! statusboard - uptime calendar for a single external service.
//!
//! Polls a status API on a fixed interval, records every observation in
//! SQLite, and serves a calendar of daily uptime.

mod aggregate;
mod config;
mod db;
mod probe;
mod scheduler;
mod web;

use aggregate::{Aggregator, SnapshotCache};
use config::ServerConfig;
use db::Store;
use probe::Prober;
use scheduler::{RetentionManager, Scheduler};
use web::Server;

use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("statusboard=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting statusboard on port {}...", cfg.http_port);
    tracing::info!("Monitoring {} ({}) every {}s", cfg.service_id, cfg.endpoint, cfg.poll_interval_secs);
    tracing::info!("Using database at {}", cfg.db_path);

    // No degraded mode exists without a durable store.
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!(
        "Database initialized with {} observations",
        store.count(&cfg.service_id)?
    );

    // Probe on a fixed interval
    let prober = Arc::new(Prober::new(cfg.probe_config(), store.clone()));
    let scheduler = Scheduler::new(prober);
    scheduler.start(cfg.poll_interval())?;

    // Optional retention
    let retention = if cfg.retention_days > 0 {
        let covered_days = u64::from(cfg.retention_days);
        if covered_days < (cfg.month_count as u64) * 31 {
            tracing::warn!(
                "Retention of {} days is shorter than the {} months shown on the dashboard",
                cfg.retention_days,
                cfg.month_count
            );
        }
        let manager = RetentionManager::new(store.clone(), &cfg.service_id, cfg.retention_days);
        manager.start(RETENTION_SWEEP_INTERVAL);
        Some(manager)
    } else {
        None
    };

    // Dashboard snapshot refresh
    let aggregator = Arc::new(
        Aggregator::new(store.clone(), &cfg.service_id)
            .with_downtime_threshold(cfg.downtime_threshold_minutes),
    );
    let cache = Arc::new(SnapshotCache::new());
    let refresh = cache.spawn_refresh(aggregator.clone(), cfg.snapshot_refresh(), cfg.month_count);

    // Start web server
    let probe_timeout = cfg.probe_timeout();
    let server = Server::new(cfg, store, aggregator, cache);
    server.start(shutdown_signal()).await?;

    scheduler.stop();
    drain_in_flight(&scheduler, probe_timeout).await;
    if let Some(manager) = retention {
        manager.stop();
    }
    refresh.abort();
    tracing::info!("Server and scheduler stopped");

    Ok(())
}

/// Give an in-flight probe up to its timeout to land before exiting.
async fn drain_in_flight(scheduler: &Scheduler<Prober>, budget: Duration) {
    let deadline = tokio::time::Instant::now() + budget;
    while scheduler.in_flight() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    if scheduler.in_flight() > 0 {
        tracing::warn!("Abandoning in-flight probe at shutdown");
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
