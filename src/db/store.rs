//! SQLite database store implementation.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

use super::models::*;

/// Fixed-width UTC format so that lexical order of the `time` column is time order.
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

const OBSERVATION_COLUMNS: &str =
    "id, time, service_id, status, raw_response, ms_dns, ms_tcp, ms_tls, ms_server, ms_content, ms_total";

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection mutex poisoned")]
    Poisoned,
}

/// Thread-safe append-only observation store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the store at the given path and initialize its schema.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        // Readers in other processes must not block the prober's writes.
        let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Create tables and indexes if absent. Never drops anything.
    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    /// Append one observation and return its record id.
    pub fn append(&self, obs: &NewObservation) -> Result<RecordId, DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO observations (service_id, status, raw_response, ms_dns, ms_tcp, ms_tls, ms_server, ms_content, ms_total, time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                obs.service_id,
                obs.status.code(),
                obs.raw_response,
                obs.timings.dns_ms,
                obs.timings.tcp_ms,
                obs.timings.tls_ms,
                obs.timings.server_ms,
                obs.timings.content_ms,
                obs.timings.total_ms,
                format_db_time(obs.timestamp),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Observations for a service in `[from, to)`, newest first.
    ///
    /// Rows sharing a timestamp come back in reverse insertion order.
    pub fn query_range(
        &self,
        service_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Observation>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {OBSERVATION_COLUMNS} FROM observations
             WHERE service_id = ?1 AND time >= ?2 AND time < ?3
             ORDER BY time DESC, id DESC"
        ))?;

        let rows = stmt
            .query_map(
                params![service_id, format_db_time(from), format_db_time(to)],
                observation_from_row,
            )?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(rows)
    }

    /// The most recent observation for a service, if any.
    pub fn query_latest(&self, service_id: &str) -> Result<Option<Observation>, DbError> {
        let conn = self.conn()?;
        let obs = conn
            .query_row(
                &format!(
                    "SELECT {OBSERVATION_COLUMNS} FROM observations
                     WHERE service_id = ?1
                     ORDER BY time DESC, id DESC LIMIT 1"
                ),
                params![service_id],
                observation_from_row,
            )
            .optional()?;
        Ok(obs)
    }

    /// Number of stored observations for a service.
    pub fn count(&self, service_id: &str) -> Result<i64, DbError> {
        let conn = self.conn()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM observations WHERE service_id = ?1",
            params![service_id],
            |row| row.get(0),
        )?)
    }

    /// Delete observations strictly older than `cutoff`. Returns rows removed.
    pub fn delete_before(&self, service_id: &str, cutoff: DateTime<Utc>) -> Result<usize, DbError> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM observations WHERE service_id = ?1 AND time < ?2",
            params![service_id, format_db_time(cutoff)],
        )?;
        Ok(removed)
    }
}

fn observation_from_row(row: &Row<'_>) -> SqlResult<Observation> {
    let time_str: String = row.get(1)?;
    let timestamp = parse_db_time(&time_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            Type::Text,
            format!("unparseable timestamp {time_str:?}").into(),
        )
    })?;

    Ok(Observation {
        id: row.get(0)?,
        timestamp,
        service_id: row.get(2)?,
        status: ServiceStatus::from_code(row.get(3)?),
        raw_response: row.get(4)?,
        timings: PhaseTimings {
            dns_ms: row.get(5)?,
            tcp_ms: row.get(6)?,
            tls_ms: row.get(7)?,
            server_ms: row.get(8)?,
            content_ms: row.get(9)?,
            total_ms: row.get(10)?,
        },
    })
}

fn format_db_time(t: DateTime<Utc>) -> String {
    t.format(TIME_FORMAT).to_string()
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = [TIME_FORMAT, "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
