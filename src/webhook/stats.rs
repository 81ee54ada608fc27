// src/webhook/stats.rs
//
// The receiver-wide stats record (spec §3 ReceiverStats), generalizing this
// codebase's health_handler snapshot (main.rs: rooms_active, subscribers_active,
// tls_enabled) to the webhook receiver's own counters. Mutated under a single
// read-write lock shared with the handler list, per spec §4.1/§5.

use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle state of the tunnel supervisor (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelStatus {
    Starting,
    Running,
    Stopped,
    Failed,
}

impl Default for TunnelStatus {
    fn default() -> Self {
        TunnelStatus::Stopped
    }
}

/// Mutable receiver state, read by `/health` and `/` and written by the
/// ingest handler and the tunnel supervisor (spec §3).
#[derive(Debug, Clone)]
pub struct ReceiverStats {
    pub started_at: SystemTime,
    pub events_received: u64,
    pub last_event_at: Option<SystemTime>,
    pub local_url: String,
    pub public_url: Option<String>,
    pub tunnel_status: TunnelStatus,
}

impl ReceiverStats {
    pub fn new(local_url: String) -> Self {
        Self {
            started_at: SystemTime::now(),
            events_received: 0,
            last_event_at: None,
            local_url,
            public_url: None,
            tunnel_status: TunnelStatus::Stopped,
        }
    }

    /// Record that an event was accepted. `events_received` never decreases
    /// (spec §3 invariant, §8 invariant 5).
    pub fn record_event(&mut self) {
        self.events_received += 1;
        self.last_event_at = Some(SystemTime::now());
    }

    pub fn snapshot(&self) -> ReceiverStatsSnapshot {
        ReceiverStatsSnapshot {
            started_at: system_time_to_utc(self.started_at),
            events_received: self.events_received,
            last_event_at: self.last_event_at.map(system_time_to_utc),
            local_url: self.local_url.clone(),
            public_url: self.public_url.clone(),
            tunnel_status: self.tunnel_status,
        }
    }
}

fn system_time_to_utc(t: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(t)
}

/// JSON-serializable view of [`ReceiverStats`], returned by `/health`.
#[derive(Debug, Serialize)]
pub struct ReceiverStatsSnapshot {
    pub started_at: DateTime<Utc>,
    pub events_received: u64,
    pub last_event_at: Option<DateTime<Utc>>,
    pub local_url: String,
    pub public_url: Option<String>,
    pub tunnel_status: TunnelStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_event_is_monotonic() {
        let mut stats = ReceiverStats::new("http://127.0.0.1:8080/webhook".into());
        assert_eq!(stats.events_received, 0);
        assert!(stats.last_event_at.is_none());

        stats.record_event();
        stats.record_event();

        assert_eq!(stats.events_received, 2);
        assert!(stats.last_event_at.is_some());
    }

    #[test]
    fn default_tunnel_status_is_stopped() {
        let stats = ReceiverStats::new("http://127.0.0.1:8080/webhook".into());
        assert_eq!(stats.tunnel_status, TunnelStatus::Stopped);
        assert!(stats.public_url.is_none());
    }

    #[test]
    fn snapshot_serializes_tunnel_status_lowercase() {
        let stats = ReceiverStats::new("http://127.0.0.1:8080/webhook".into());
        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["tunnel_status"], "stopped");
    }
}
