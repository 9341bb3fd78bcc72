//! HTTP request handlers.

use super::AppState;
use crate::aggregate::{time_ago, DashboardSnapshot, DayStatus, MonthSummary, UNKNOWN_TIME_AGO};
use crate::db::{PhaseTimings, ServiceStatus};

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::fmt::Write;

// ============================================================================
// Templates
// ============================================================================

const DASHBOARD_TEMPLATE: &str = include_str!("templates/dashboard.html");

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Cached snapshot with the live current status laid over it.
async fn live_snapshot(state: &AppState) -> DashboardSnapshot {
    let mut snapshot = (*state.cache.current()).clone();
    let aggregator = state.aggregator.clone();

    let (status, time_ago) = tokio::task::spawn_blocking(move || aggregator.current_status(Utc::now()))
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Current status task failed: {}", e);
            (ServiceStatus::Unknown, UNKNOWN_TIME_AGO.to_string())
        });
    snapshot.status = status;
    snapshot.time_ago = time_ago;
    snapshot
}

// ============================================================================
// Dashboard
// ============================================================================

pub async fn handle_dashboard(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = live_snapshot(&state).await;
    Html(render_dashboard(&snapshot, &state.config.service_id))
}

pub fn render_dashboard(snapshot: &DashboardSnapshot, service: &str) -> String {
    let (status_class, status_text) = match snapshot.status {
        ServiceStatus::Up => ("up", "online"),
        ServiceStatus::Down => ("down", "offline"),
        ServiceStatus::Unknown => ("unknown", "in an unknown state"),
    };

    // Nothing to show until the first refresh lands.
    let (months, footer) = if snapshot.months.is_empty() {
        (
            "<p class=\"pending\">Building the calendar, check back in a moment.</p>".to_string(),
            "Calendar not generated yet".to_string(),
        )
    } else {
        (
            snapshot.months.iter().map(render_month).collect::<Vec<_>>().join("\n"),
            format!("Calendar generated {} UTC", snapshot.generated_at.format("%Y-%m-%d %H:%M")),
        )
    };

    DASHBOARD_TEMPLATE
        .replace("{{title}}", &format!("{} status", escape_html(service)))
        .replace("{{service}}", &escape_html(service))
        .replace("{{status_class}}", status_class)
        .replace("{{status_text}}", status_text)
        .replace("{{time_ago}}", &escape_html(&snapshot.time_ago))
        .replace("{{months}}", &months)
        .replace("{{footer}}", &footer)
}

fn render_month(month: &MonthSummary) -> String {
    let mut html = String::new();
    let _ = write!(html, "<section class=\"month\"><h2>{}</h2><div class=\"grid\">", month.label);

    for day in WEEKDAYS {
        let _ = write!(html, "<div class=\"dow\">{}</div>", day);
    }
    for _ in 0..month.leading_empty_slots {
        html.push_str("<div class=\"day empty\"></div>");
    }
    for day in &month.days {
        html.push_str(&render_day(day));
    }

    html.push_str("</div></section>");
    html
}

fn render_day(day: &DayStatus) -> String {
    let class = if day.status_offline {
        "offline"
    } else if day.status_online {
        "online"
    } else {
        "unknown"
    };

    let title = if day.status_unknown {
        format!("{}: no data", day.date)
    } else {
        format!(
            "{}: {:.0} min up, {:.0} min down",
            day.date, day.minutes_up, day.minutes_down
        )
    };

    format!(
        "<div class=\"day {}\" title=\"{}\">{}</div>",
        class,
        title,
        day.date.format("%-d")
    )
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// ============================================================================
// API
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub service_id: String,
    pub status: ServiceStatus,
    pub time_ago: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timings: Option<PhaseTimings>,
}

/// Latest observation only, without any aggregation.
pub async fn handle_status(State(state): State<AppState>) -> impl IntoResponse {
    let service_id = state.config.service_id.clone();
    let store = state.store.clone();
    let lookup = service_id.clone();

    match tokio::task::spawn_blocking(move || store.query_latest(&lookup)).await {
        Ok(Ok(Some(obs))) => Json(StatusResponse {
            service_id,
            status: obs.status,
            time_ago: time_ago(Utc::now(), obs.timestamp),
            checked_at: Some(obs.timestamp),
            timings: Some(obs.timings),
        })
        .into_response(),
        Ok(Ok(None)) => Json(StatusResponse {
            service_id,
            status: ServiceStatus::Unknown,
            time_ago: UNKNOWN_TIME_AGO.to_string(),
            checked_at: None,
            timings: None,
        })
        .into_response(),
        Ok(Err(e)) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Body of the latest observation exactly as the status API returned it.
pub async fn handle_latest_raw(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.store.clone();
    let service_id = state.config.service_id.clone();

    match tokio::task::spawn_blocking(move || store.query_latest(&service_id)).await {
        Ok(Ok(Some(obs))) => (
            [
                (header::CONTENT_TYPE, "application/octet-stream".to_string()),
                (header::HeaderName::from_static("x-observation-id"), obs.id.to_string()),
            ],
            obs.raw_response,
        )
            .into_response(),
        Ok(Ok(None)) => (StatusCode::NOT_FOUND, "No observations recorded").into_response(),
        Ok(Err(e)) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn handle_snapshot(State(state): State<AppState>) -> impl IntoResponse {
    Json(live_snapshot(&state).await)
}

pub async fn handle_day(State(state): State<AppState>, Path(date): Path<String>) -> impl IntoResponse {
    let date = match NaiveDate::parse_from_str(&date, "%Y-%m-%d") {
        Ok(d) => d,
        Err(_) => return (StatusCode::BAD_REQUEST, "Expected a date as YYYY-MM-DD").into_response(),
    };

    let aggregator = state.aggregator.clone();
    match tokio::task::spawn_blocking(move || aggregator.day_status(date)).await {
        Ok(day) => Json(day).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Unknown paths are sent back to the dashboard.
pub async fn handle_fallback() -> impl IntoResponse {
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, "/")])
}

// ============================================================================
// Static Assets
// ============================================================================

pub async fn handle_favicon() -> impl IntoResponse {
    let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 100 100">
        <rect x="5" y="5" width="90" height="90" rx="14" fill="#2e9e5b"/>
        <path d="M25 52 L43 70 L77 32" stroke="white" stroke-width="9" fill="none"/>
    </svg>"##;

    ([(header::CONTENT_TYPE, "image/svg+xml")], svg)
}
