use std::time::Duration;

use serde::Serialize;

/// Structured trace events emitted across all skywork-relay crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    DiscoveryAttempt {
        attempt: u32,
        max_attempts: u32,
        error: Option<String>,
        retry_in_ms: Option<u64>,
    },
    EndpointDiscovered {
        endpoint: String,
        duration_ms: u64,
    },
    EndpointRejected {
        candidate: String,
    },
    RpcCompleted {
        method: String,
        id: u64,
        duration_ms: u64,
        outcome: String,
    },
    SessionClosed {
        cancelled_calls: usize,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "sk_event");
    }
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
pub fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
