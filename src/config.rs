//! Configuration module for statusboard.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::probe::ProbeConfig;

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the web server (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "dbs/statusboard.db")
    pub db_path: String,
    /// Status API polled once per tick
    pub endpoint: String,
    /// Key looked up in the payload's `platform.response` map
    pub service_key: String,
    /// Identifier stored with each observation (default: the service key)
    pub service_id: String,
    pub poll_interval_secs: u64,
    /// Probe timeout; defaults to, and is capped at, the poll interval
    pub probe_timeout_secs: Option<u64>,
    pub downtime_threshold_minutes: f64,
    pub snapshot_refresh_secs: u64,
    /// Months shown on the dashboard
    pub month_count: usize,
    /// Days of observations to keep; 0 keeps everything
    pub retention_days: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "dbs/statusboard.db".to_string(),
            endpoint: "https://api.bethesda.net/status/ext-server-status?product_id=8".to_string(),
            service_key: "fallout76".to_string(),
            service_id: "fallout76".to_string(),
            poll_interval_secs: 60,
            probe_timeout_secs: None,
            downtime_threshold_minutes: 15.0,
            snapshot_refresh_secs: 120,
            month_count: 9,
            retention_days: 0,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables (all optional):
    /// - `STATUSBOARD_HTTP_PORT`
    /// - `STATUSBOARD_DB_PATH`
    /// - `STATUSBOARD_ENDPOINT`
    /// - `STATUSBOARD_SERVICE_KEY`
    /// - `STATUSBOARD_SERVICE_ID`
    /// - `STATUSBOARD_POLL_INTERVAL_SECS`
    /// - `STATUSBOARD_PROBE_TIMEOUT_SECS`
    /// - `STATUSBOARD_DOWNTIME_THRESHOLD_MINUTES`
    /// - `STATUSBOARD_SNAPSHOT_REFRESH_SECS`
    /// - `STATUSBOARD_MONTHS`
    /// - `STATUSBOARD_RETENTION_DAYS`
    pub fn load() -> Self {
        Self::load_from(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn load_from<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(port) = parse_var(&lookup, "STATUSBOARD_HTTP_PORT") {
            cfg.http_port = port;
        }
        if let Some(db_path) = lookup("STATUSBOARD_DB_PATH") {
            cfg.db_path = db_path;
        }
        if let Some(endpoint) = lookup("STATUSBOARD_ENDPOINT") {
            cfg.endpoint = endpoint;
        }

        let service_key = lookup("STATUSBOARD_SERVICE_KEY");
        if let Some(key) = &service_key {
            cfg.service_key = key.clone();
        }
        match lookup("STATUSBOARD_SERVICE_ID") {
            Some(id) => cfg.service_id = id,
            None => {
                if let Some(key) = service_key {
                    cfg.service_id = key;
                }
            }
        }

        if let Some(secs) = parse_var::<u64, _>(&lookup, "STATUSBOARD_POLL_INTERVAL_SECS") {
            if secs > 0 {
                cfg.poll_interval_secs = secs;
            } else {
                tracing::warn!("Ignoring zero STATUSBOARD_POLL_INTERVAL_SECS");
            }
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "STATUSBOARD_PROBE_TIMEOUT_SECS") {
            if secs > 0 {
                cfg.probe_timeout_secs = Some(secs);
            }
        }
        if let Some(minutes) = parse_var::<f64, _>(&lookup, "STATUSBOARD_DOWNTIME_THRESHOLD_MINUTES") {
            if minutes.is_finite() && minutes > 0.0 {
                cfg.downtime_threshold_minutes = minutes;
            } else {
                tracing::warn!("Ignoring invalid STATUSBOARD_DOWNTIME_THRESHOLD_MINUTES");
            }
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "STATUSBOARD_SNAPSHOT_REFRESH_SECS") {
            if secs > 0 {
                cfg.snapshot_refresh_secs = secs;
            }
        }
        if let Some(months) = parse_var(&lookup, "STATUSBOARD_MONTHS") {
            cfg.month_count = months;
        }
        if let Some(days) = parse_var(&lookup, "STATUSBOARD_RETENTION_DAYS") {
            cfg.retention_days = days;
        }

        cfg
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Probe timeout, never longer than the poll interval.
    pub fn probe_timeout(&self) -> Duration {
        let timeout = self.probe_timeout_secs.unwrap_or(self.poll_interval_secs);
        if timeout > self.poll_interval_secs {
            tracing::warn!(
                "Probe timeout {}s exceeds poll interval {}s; clamping",
                timeout,
                self.poll_interval_secs
            );
        }
        Duration::from_secs(timeout.min(self.poll_interval_secs))
    }

    pub fn snapshot_refresh(&self) -> Duration {
        Duration::from_secs(self.snapshot_refresh_secs)
    }

    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            service_id: self.service_id.clone(),
            service_key: self.service_key.clone(),
            endpoint: self.endpoint.clone(),
            timeout: self.probe_timeout(),
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid value for {}: {:?}", key, raw);
            None
        }
    }
}
