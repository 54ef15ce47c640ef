//! Gateway status snapshots.
//!
//! `GatewayStatus` is the read model of the control surface: subscribers
//! receive a payload-free "status changed" signal and re-query this
//! snapshot. It is always a copy; holding one never blocks the gateway.

use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ServerConfig;

/// Rolling performance statistics.
///
/// All rates are computed over the trailing metrics window, except
/// `total_requests` which is monotonic and never reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    /// Requests admitted per minute, extrapolated from the window.
    pub requests_per_minute: f64,
    /// Mean latency of completed requests in the window, milliseconds.
    pub avg_latency_ms: f64,
    /// Requests recorded since the gateway value was created.
    pub total_requests: u64,
    /// Share of window requests that failed or were cancelled, 0..1.
    pub error_rate: f64,
}

/// Snapshot of the gateway's externally visible state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatus {
    /// Whether the listener is bound and accepting requests.
    pub running: bool,
    /// Bound address while running.
    pub address: Option<SocketAddr>,
    /// Config of the current run, or the last run when stopped.
    pub config: Option<ServerConfig>,
    /// Requests admitted but not yet finished.
    pub active_requests: usize,
    /// Rolling statistics.
    pub stats: Stats,
    /// Wall-clock start time of the current run.
    pub started_at: Option<DateTime<Utc>>,
}

impl GatewayStatus {
    /// Snapshot for a gateway that is not running.
    #[must_use]
    pub fn stopped(config: Option<ServerConfig>, stats: Stats) -> Self {
        Self {
            running: false,
            address: None,
            config,
            active_requests: 0,
            stats,
            started_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopped_snapshot_has_no_activity() {
        let status = GatewayStatus::stopped(None, Stats::default());
        assert!(!status.running);
        assert_eq!(status.active_requests, 0);
        assert!(status.address.is_none());
    }

    #[test]
    fn status_serializes_camel_case() {
        let status = GatewayStatus::stopped(Some(ServerConfig::default()), Stats::default());
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["running"], false);
        assert!(json["activeRequests"].is_u64());
        assert!(json["stats"]["requestsPerMinute"].is_f64());
        assert!(json["config"]["maxConcurrentRequests"].is_u64());
    }
}
