//! Retention manager for trimming old observations.
//!
//! Only started when a retention window is configured; otherwise the
//! observation log grows without bound.

use crate::db::Store;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Manager for deleting observations past their retention period.
pub struct RetentionManager {
    store: Arc<Store>,
    service_id: String,
    retention: ChronoDuration,
    stop: broadcast::Sender<()>,
}

impl RetentionManager {
    pub fn new(store: Arc<Store>, service_id: &str, retention_days: u32) -> Self {
        let (stop, _) = broadcast::channel(1);
        Self {
            store,
            service_id: service_id.to_string(),
            retention: ChronoDuration::days(i64::from(retention_days)),
            stop,
        }
    }

    /// Start the retention manager background task.
    pub fn start(&self, every: Duration) {
        let store = self.store.clone();
        let service_id = self.service_id.clone();
        let retention = self.retention;
        let mut rx = self.stop.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);

            loop {
                tokio::select! {
                    _ = rx.recv() => break,
                    _ = interval.tick() => {
                        process_retention(&store, &service_id, retention, Utc::now());
                    }
                }
            }
        });
    }

    /// Stop the retention manager.
    pub fn stop(&self) {
        let _ = self.stop.send(());
    }
}

/// Delete everything older than `now - retention`. Returns rows removed.
fn process_retention(store: &Store, service_id: &str, retention: ChronoDuration, now: DateTime<Utc>) -> usize {
    let cutoff = now - retention;

    match store.delete_before(service_id, cutoff) {
        Ok(0) => 0,
        Ok(removed) => {
            tracing::info!(
                "RetentionManager: Deleted {} observations for {} older than {}",
                removed,
                service_id,
                cutoff.format("%Y-%m-%d %H:%M:%S")
            );
            removed
        }
        Err(e) => {
            tracing::error!(
                "RetentionManager: Failed to delete observations for {}: {}",
                service_id,
                e
            );
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewObservation, PhaseTimings, ServiceStatus};
    use chrono::TimeZone;
    use tempfile::NamedTempFile;

    fn append(store: &Store, ts: DateTime<Utc>) {
        store
            .append(&NewObservation {
                timestamp: ts,
                service_id: "svc".to_string(),
                status: ServiceStatus::Up,
                raw_response: Vec::new(),
                timings: PhaseTimings::default(),
            })
            .unwrap();
    }

    #[test]
    fn test_process_retention_cutoff() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap();

        append(&store, now - ChronoDuration::days(40));
        append(&store, now - ChronoDuration::days(31));
        append(&store, now - ChronoDuration::days(29));
        append(&store, now);

        let removed = process_retention(&store, "svc", ChronoDuration::days(30), now);
        assert_eq!(removed, 2);
        assert_eq!(store.count("svc").unwrap(), 2);

        // Nothing left to trim on a second pass.
        assert_eq!(process_retention(&store, "svc", ChronoDuration::days(30), now), 0);
    }

    #[tokio::test]
    async fn test_manager_runs_and_stops() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        append(&store, Utc::now() - ChronoDuration::days(10));
        append(&store, Utc::now());

        let manager = RetentionManager::new(store.clone(), "svc", 7);
        manager.start(Duration::from_secs(3600));
        tokio::time::sleep(Duration::from_millis(50)).await;
        manager.stop();

        assert_eq!(store.count("svc").unwrap(), 1);
    }
}
