//! Child remote-control client.
//!
//! Each child process exposes `http://127.0.0.1:<port>/core/stats` on its
//! leased loopback port. Progress polled from it is advisory: samples feed
//! the metrics table and the job row while it runs, but completion is
//! always reconciled from the transfer log after exit.

use std::time::Duration;

use serde_json::Value;

use crate::error::{CoreError, CoreResult};

/// Per-request poll timeout.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(2);

/// One stats sample from the child.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RcStats {
    pub bytes: i64,
    pub speed: f64,
    pub transfers: i64,
    pub errors: i64,
}

/// Stats poller bound to a reusable HTTP client.
#[derive(Clone)]
pub struct RcClient {
    http: reqwest::Client,
}

impl Default for RcClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RcClient {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(POLL_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { http }
    }

    /// Polls `/core/stats` on the given port.
    ///
    /// POSTs an empty JSON object first; some tool builds only answer GET,
    /// so a non-OK POST falls back to GET before giving up.
    pub async fn poll_stats(&self, port: u16) -> CoreResult<RcStats> {
        let url = format!("http://127.0.0.1:{port}/core/stats");

        let post = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .body("{}")
            .send()
            .await
            .map_err(|e| CoreError::transient(format!("rc poll: {e}")))?;

        let body: Value = if post.status().is_success() {
            post.json()
                .await
                .map_err(|e| CoreError::transient(format!("rc decode: {e}")))?
        } else {
            let status = post.status();
            let get = self
                .http
                .get(&url)
                .send()
                .await
                .map_err(|_| CoreError::transient(format!("rc status {status}")))?;
            if !get.status().is_success() {
                return Err(CoreError::transient(format!("rc status {}", get.status())));
            }
            get.json()
                .await
                .map_err(|e| CoreError::transient(format!("rc decode: {e}")))?
        };

        Ok(stats_from_value(&body))
    }
}

/// Decodes a stats payload, tolerating numbers sent as JSON numbers or
/// decimal strings.
pub fn stats_from_value(v: &Value) -> RcStats {
    RcStats {
        bytes: coerce_i64(&v["bytes"]),
        speed: coerce_f64(&v["speed"]),
        transfers: coerce_i64(&v["transfers"]),
        errors: coerce_i64(&v["errors"]),
    }
}

fn coerce_i64(v: &Value) -> i64 {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn coerce_f64(v: &Value) -> f64 {
    match v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}
