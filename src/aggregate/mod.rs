//! Aggregation of the observation log into calendar views.
//!
//! Each observation's status is taken to describe the interval from that
//! sample up to the next newer one. Time before the first and after the last
//! sample of a day is not attributed to either bucket.

mod cache;
mod calendar;
mod humanize;

pub use cache::*;
pub use calendar::*;
pub use humanize::*;

use crate::db::{Observation, ServiceStatus, Store};

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Minutes of downtime at which a day is flagged offline.
pub const DEFAULT_DOWNTIME_THRESHOLD_MINUTES: f64 = 15.0;

/// "Time ago" text when there is no readable latest observation.
pub const UNKNOWN_TIME_AGO: &str = "Unknown";

/// Uptime summary for one UTC calendar day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayStatus {
    pub date: NaiveDate,
    pub status_online: bool,
    pub status_offline: bool,
    /// No observations were collected that day.
    pub status_unknown: bool,
    pub minutes_down: f64,
    pub minutes_up: f64,
}

impl DayStatus {
    pub fn unknown(date: NaiveDate) -> Self {
        Self {
            date,
            status_online: false,
            status_offline: false,
            status_unknown: true,
            minutes_down: 0.0,
            minutes_up: 0.0,
        }
    }
}

/// One calendar month of day statuses.
#[derive(Debug, Clone, Serialize)]
pub struct MonthSummary {
    /// e.g. "October 2026"
    pub label: String,
    pub year: i32,
    pub month: u32,
    /// Blank cells before day 1 in a Monday-first week grid.
    pub leading_empty_slots: u32,
    pub days: Vec<DayStatus>,
}

/// Everything the dashboard page renders.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DashboardSnapshot {
    pub status: ServiceStatus,
    pub time_ago: String,
    /// Most recent month first.
    pub months: Vec<MonthSummary>,
    pub generated_at: DateTime<Utc>,
}

/// Reduce one day's observations (newest first) to a `DayStatus`.
pub fn summarize_day(date: NaiveDate, newest_first: &[Observation], threshold_minutes: f64) -> DayStatus {
    if newest_first.is_empty() {
        return DayStatus::unknown(date);
    }

    let mut minutes_up = 0.0;
    let mut minutes_down = 0.0;

    for pair in newest_first.windows(2) {
        let (newer, older) = (&pair[0], &pair[1]);
        let minutes = (newer.timestamp - older.timestamp).num_milliseconds() as f64 / 60_000.0;
        match older.status {
            ServiceStatus::Up => minutes_up += minutes,
            ServiceStatus::Down => minutes_down += minutes,
            ServiceStatus::Unknown => {}
        }
    }

    let offline = minutes_down >= threshold_minutes;
    DayStatus {
        date,
        status_online: !offline,
        status_offline: offline,
        status_unknown: false,
        minutes_down,
        minutes_up,
    }
}

/// Reads the store and builds day, month and dashboard views for one service.
pub struct Aggregator {
    store: Arc<Store>,
    service_id: String,
    downtime_threshold_minutes: f64,
}

impl Aggregator {
    pub fn new(store: Arc<Store>, service_id: &str) -> Self {
        Self {
            store,
            service_id: service_id.to_string(),
            downtime_threshold_minutes: DEFAULT_DOWNTIME_THRESHOLD_MINUTES,
        }
    }

    pub fn with_downtime_threshold(mut self, minutes: f64) -> Self {
        self.downtime_threshold_minutes = minutes;
        self
    }

    /// Status of the UTC day `[date 00:00, date+1 00:00)`.
    ///
    /// A failed read is logged and reported as an unknown day.
    pub fn day_status(&self, date: NaiveDate) -> DayStatus {
        let start = date.and_time(NaiveTime::MIN).and_utc();
        let end = start + ChronoDuration::days(1);

        match self.store.query_range(&self.service_id, start, end) {
            Ok(rows) => summarize_day(date, &rows, self.downtime_threshold_minutes),
            Err(e) => {
                tracing::error!("Aggregator: Failed to read observations for {}: {}", date, e);
                DayStatus::unknown(date)
            }
        }
    }

    /// Day statuses for a whole month. Out-of-range months wrap into the adjacent year.
    pub fn month_summary(&self, year: i32, month: u32) -> MonthSummary {
        let (year, month) = normalize_month(year, i64::from(month));
        let dates = days_of_month(year, month);

        let (label, leading_empty_slots) = match dates.first() {
            Some(first) => (first.format("%B %Y").to_string(), leading_empty_slots(*first)),
            None => (format!("{}-{:02}", year, month), 0),
        };

        MonthSummary {
            label,
            year,
            month,
            leading_empty_slots,
            days: dates.into_iter().map(|d| self.day_status(d)).collect(),
        }
    }

    /// Current status and how long ago it was observed.
    pub fn current_status(&self, now: DateTime<Utc>) -> (ServiceStatus, String) {
        match self.store.query_latest(&self.service_id) {
            Ok(Some(obs)) => (obs.status, time_ago(now, obs.timestamp)),
            Ok(None) => (ServiceStatus::Unknown, UNKNOWN_TIME_AGO.to_string()),
            Err(e) => {
                tracing::error!("Aggregator: Failed to read latest observation: {}", e);
                (ServiceStatus::Unknown, UNKNOWN_TIME_AGO.to_string())
            }
        }
    }

    pub fn snapshot(&self, month_count: usize) -> DashboardSnapshot {
        self.snapshot_at(Utc::now(), month_count)
    }

    /// Dashboard as of `now`: `month_count` months walking back from the current one.
    pub fn snapshot_at(&self, now: DateTime<Utc>, month_count: usize) -> DashboardSnapshot {
        let (status, time_ago) = self.current_status(now);
        let today = now.date_naive();

        let months = (0..month_count as i64)
            .map(|back| {
                let (year, month) = normalize_month(today.year(), i64::from(today.month()) - back);
                self.month_summary(year, month)
            })
            .collect();

        DashboardSnapshot {
            status,
            time_ago,
            months,
            generated_at: now,
        }
    }
}
