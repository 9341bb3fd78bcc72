//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Auto-increment identity of a stored observation.
pub type RecordId = i64;

/// Availability of the monitored service as seen by one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    #[default]
    Unknown,
    Up,
    Down,
}

impl ServiceStatus {
    /// Integer code used in the `status` column.
    pub fn code(self) -> i64 {
        match self {
            ServiceStatus::Unknown => 0,
            ServiceStatus::Up => 1,
            ServiceStatus::Down => 2,
        }
    }

    /// Decode a stored status. Unrecognized codes read back as `Unknown`.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => ServiceStatus::Up,
            2 => ServiceStatus::Down,
            _ => ServiceStatus::Unknown,
        }
    }
}

/// Per-phase latency breakdown of one HTTP exchange, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PhaseTimings {
    pub dns_ms: f64,
    pub tcp_ms: f64,
    pub tls_ms: f64,
    pub server_ms: f64,
    pub content_ms: f64,
    pub total_ms: f64,
}

/// An observation that has not been persisted yet.
#[derive(Debug, Clone)]
pub struct NewObservation {
    pub timestamp: DateTime<Utc>,
    pub service_id: String,
    pub status: ServiceStatus,
    pub raw_response: Vec<u8>,
    pub timings: PhaseTimings,
}

/// A stored probe result. Rows are append-only and never updated.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub id: RecordId,
    pub timestamp: DateTime<Utc>,
    pub service_id: String,
    pub status: ServiceStatus,
    pub raw_response: Vec<u8>,
    pub timings: PhaseTimings,
}
