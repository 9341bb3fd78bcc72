//! Latest-snapshot cache shared between the refresh task and request handlers.

use super::{Aggregator, DashboardSnapshot};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Holds the most recent dashboard snapshot.
///
/// A single refresh task publishes whole snapshots; readers clone the `Arc`
/// and never observe a half-built value.
pub struct SnapshotCache {
    tx: watch::Sender<Arc<DashboardSnapshot>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Arc::new(DashboardSnapshot::default()));
        Self { tx }
    }

    /// The latest published snapshot.
    pub fn current(&self) -> Arc<DashboardSnapshot> {
        self.tx.borrow().clone()
    }

    pub fn publish(&self, snapshot: DashboardSnapshot) {
        self.tx.send_replace(Arc::new(snapshot));
    }

    /// Recompute the snapshot every `period`, starting immediately.
    pub fn spawn_refresh(
        self: &Arc<Self>,
        aggregator: Arc<Aggregator>,
        period: Duration,
        month_count: usize,
    ) -> JoinHandle<()> {
        let cache = self.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                let aggregator = aggregator.clone();
                match tokio::task::spawn_blocking(move || aggregator.snapshot(month_count)).await {
                    Ok(snapshot) => {
                        tracing::debug!("Snapshot refreshed ({} months)", snapshot.months.len());
                        cache.publish(snapshot);
                    }
                    Err(e) => tracing::error!("Snapshot refresh failed: {}", e),
                }
            }
        })
    }
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewObservation, PhaseTimings, ServiceStatus, Store};
    use chrono::Utc;
    use tempfile::NamedTempFile;

    #[test]
    fn test_publish_replaces_snapshot() {
        let cache = SnapshotCache::new();
        assert!(cache.current().months.is_empty());
        assert_eq!(cache.current().status, ServiceStatus::Unknown);

        let held = cache.current();
        cache.publish(DashboardSnapshot {
            status: ServiceStatus::Up,
            time_ago: "just now".to_string(),
            ..Default::default()
        });

        // Earlier readers keep their own consistent copy.
        assert_eq!(held.status, ServiceStatus::Unknown);
        assert_eq!(cache.current().status, ServiceStatus::Up);
    }

    #[tokio::test]
    async fn test_refresh_publishes() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        store
            .append(&NewObservation {
                timestamp: Utc::now(),
                service_id: "svc".to_string(),
                status: ServiceStatus::Down,
                raw_response: Vec::new(),
                timings: PhaseTimings::default(),
            })
            .unwrap();

        let cache = Arc::new(SnapshotCache::new());
        let aggregator = Arc::new(Aggregator::new(store, "svc"));
        let handle = cache.spawn_refresh(aggregator, Duration::from_secs(3600), 2);

        for _ in 0..100 {
            if !cache.current().months.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handle.abort();

        let snapshot = cache.current();
        assert_eq!(snapshot.status, ServiceStatus::Down);
        assert_eq!(snapshot.months.len(), 2);
    }
}
