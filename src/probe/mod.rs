//! Probe module for polling the external status API.
//!
//! One probe per tick: fetch the status endpoint on a cold connection,
//! classify the payload and append the result to the store.

mod http;
mod payload;

pub use http::*;
pub use payload::*;

use crate::db::{NewObservation, PhaseTimings, RecordId, ServiceStatus, Store};
use crate::scheduler::Tick;

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Probe error types. Every variant degrades to an `Unknown` observation.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("probe setup failed: {0}")]
    Setup(String),
}

/// Probe configuration.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Identifier stored with each observation.
    pub service_id: String,
    /// Key looked up in the payload's service map.
    pub service_key: String,
    pub endpoint: String,
    pub timeout: Duration,
}

/// Issues probes and records their outcome.
pub struct Prober {
    config: ProbeConfig,
    store: Arc<Store>,
}

impl Prober {
    pub fn new(config: ProbeConfig, store: Arc<Store>) -> Self {
        Self { config, store }
    }

    /// Run one probe and build the observation. Never fails.
    pub async fn probe(&self) -> NewObservation {
        let result = run_http_probe(&self.config.endpoint, self.config.timeout).await;
        let timestamp = Utc::now();

        match result {
            Ok(exchange) => {
                let status = classify(&exchange.body, &self.config.service_key);
                tracing::info!(
                    "Probe {}: {:?} (HTTP {}, {:.1} ms)",
                    self.config.service_id,
                    status,
                    exchange.status_code,
                    exchange.timings.total_ms
                );
                NewObservation {
                    timestamp,
                    service_id: self.config.service_id.clone(),
                    status,
                    raw_response: exchange.body,
                    timings: exchange.timings,
                }
            }
            Err(e) => {
                tracing::warn!("Probe failed for {}: {}", self.config.service_id, e);
                NewObservation {
                    timestamp,
                    service_id: self.config.service_id.clone(),
                    status: ServiceStatus::Unknown,
                    raw_response: Vec::new(),
                    timings: PhaseTimings::default(),
                }
            }
        }
    }

    /// Probe once and append the result. A failed write loses this tick only.
    pub async fn probe_and_record(&self) -> Option<RecordId> {
        let obs = self.probe().await;
        let service_id = obs.service_id.clone();
        let store = self.store.clone();

        match tokio::task::spawn_blocking(move || store.append(&obs)).await {
            Ok(Ok(id)) => Some(id),
            Ok(Err(e)) => {
                tracing::error!("Failed to record observation for {}: {}", service_id, e);
                None
            }
            Err(e) => {
                tracing::error!("Record task for {} failed: {}", service_id, e);
                None
            }
        }
    }
}

impl Tick for Prober {
    fn tick(&self) -> impl Future<Output = ()> + Send {
        async move {
            self.probe_and_record().await;
        }
    }
}
