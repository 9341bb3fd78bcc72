//! HTTP probe implementation.
//!
//! Uses libcurl so each transfer phase can be timed. Connections are never
//! reused: every probe pays the full DNS, TCP and TLS cost.

use curl::easy::{Easy2, Handler, WriteError};
use std::time::Duration;

use super::ProbeError;
use crate::db::PhaseTimings;

/// A completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct HttpExchange {
    pub status_code: u32,
    pub body: Vec<u8>,
    pub timings: PhaseTimings,
}

#[derive(Default)]
struct BodyCollector {
    body: Vec<u8>,
}

impl Handler for BodyCollector {
    fn write(&mut self, data: &[u8]) -> Result<usize, WriteError> {
        self.body.extend_from_slice(data);
        Ok(data.len())
    }
}

/// Run an HTTP GET probe against `url` on tokio's blocking pool.
pub async fn run_http_probe(url: &str, timeout: Duration) -> Result<HttpExchange, ProbeError> {
    let url = url.to_string();
    tokio::task::spawn_blocking(move || fetch(&url, timeout))
        .await
        .map_err(|e| ProbeError::Setup(format!("probe task failed: {}", e)))?
}

fn fetch(url: &str, timeout: Duration) -> Result<HttpExchange, ProbeError> {
    let mut easy = Easy2::new(BodyCollector::default());
    configure(&mut easy, url, timeout).map_err(|e| ProbeError::Setup(e.to_string()))?;

    easy.perform().map_err(|e| {
        if e.is_operation_timedout() {
            ProbeError::Timeout(timeout)
        } else {
            ProbeError::Transport(e.to_string())
        }
    })?;

    let status_code = easy.response_code().unwrap_or_default();
    let timings = phase_timings(&mut easy);
    let body = std::mem::take(&mut easy.get_mut().body);

    Ok(HttpExchange {
        status_code,
        body,
        timings,
    })
}

fn configure(easy: &mut Easy2<BodyCollector>, url: &str, timeout: Duration) -> Result<(), curl::Error> {
    easy.url(url)?;
    easy.get(true)?;
    easy.follow_location(true)?;
    easy.timeout(timeout)?;
    easy.fresh_connect(true)?;
    easy.forbid_reuse(true)?;
    easy.useragent(concat!("statusboard/", env!("CARGO_PKG_VERSION")))?;
    Ok(())
}

/// Break curl's cumulative timestamps down into per-phase durations.
fn phase_timings(easy: &mut Easy2<BodyCollector>) -> PhaseTimings {
    let dns = easy.namelookup_time().unwrap_or_default();
    let connect = easy.connect_time().unwrap_or(dns).max(dns);
    // appconnect stays zero for plain HTTP.
    let tls = easy.appconnect_time().unwrap_or_default().max(connect);
    let pretransfer = easy.pretransfer_time().unwrap_or(tls).max(tls);
    let ttfb = easy.starttransfer_time().unwrap_or(pretransfer).max(pretransfer);
    let total = easy.total_time().unwrap_or(ttfb).max(ttfb);

    PhaseTimings {
        dns_ms: millis(dns),
        tcp_ms: millis(saturating_sub(connect, dns)),
        tls_ms: millis(saturating_sub(tls, connect)),
        server_ms: millis(saturating_sub(ttfb, pretransfer)),
        content_ms: millis(saturating_sub(total, ttfb)),
        total_ms: millis(total),
    }
}

fn saturating_sub(left: Duration, right: Duration) -> Duration {
    left.checked_sub(right).unwrap_or(Duration::ZERO)
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
