use std::time::Duration;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Protocol session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Immutable settings for one streaming-discovery RPC session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Event-stream URL; only used to establish the stream.
    #[serde(default = "d_base_url")]
    pub base_url: String,
    /// Cap on the wait for an endpoint announcement, per discovery attempt.
    #[serde(default = "d_10000")]
    pub endpoint_timeout_ms: u64,
    /// Cap on one RPC round trip. Document generation can take minutes.
    #[serde(default = "d_600000")]
    pub request_timeout_ms: u64,
    /// Total discovery attempts (not additional retries).
    #[serde(default = "d_3")]
    pub max_retries: u32,
    /// Delay before the second attempt; doubles for each one after.
    #[serde(default = "d_1000")]
    pub retry_delay_ms: u64,
    #[serde(default = "d_protocol_version")]
    pub protocol_version: String,
    #[serde(default = "d_client_name")]
    pub client_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            endpoint_timeout_ms: 10_000,
            request_timeout_ms: 600_000,
            max_retries: 3,
            retry_delay_ms: 1_000,
            protocol_version: d_protocol_version(),
            client_name: d_client_name(),
        }
    }
}

impl SessionConfig {
    pub fn endpoint_timeout(&self) -> Duration {
        Duration::from_millis(self.endpoint_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_base_url() -> String {
    "https://api.skywork.ai/open/sse".into()
}
fn d_10000() -> u64 {
    10_000
}
fn d_600000() -> u64 {
    600_000
}
fn d_3() -> u32 {
    3
}
fn d_1000() -> u64 {
    1_000
}
fn d_protocol_version() -> String {
    "2024-11-05".into()
}
fn d_client_name() -> String {
    "skywork-relay".into()
}
