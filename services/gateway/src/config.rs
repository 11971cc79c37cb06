use std::time::Duration;

use serde::Deserialize;

use hooki_core::config::Config;

/// Gateway configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Redis connection URL. Unset runs the limiter and event bus in-process,
    /// which is only correct for a single gateway instance.
    #[serde(default)]
    pub redis_url: Option<String>,
    /// TCP port to listen on. Env var: `GATEWAY_PORT`.
    #[serde(default = "default_port")]
    pub gateway_port: u16,

    /// Requests per window per source IP.
    #[serde(default = "default_ip_rate_limit")]
    pub ip_rate_limit: u32,
    #[serde(default = "default_window_ms")]
    pub ip_rate_window_ms: u64,
    /// Per-flow limit when the flow does not set `rate_limit_per_minute`.
    #[serde(default = "default_flow_rate_limit")]
    pub flow_rate_limit: u32,
    #[serde(default = "default_window_ms")]
    pub flow_rate_window_ms: u64,
    /// Freshness window for inbound signatures.
    #[serde(default = "default_signature_max_age_ms")]
    pub signature_max_age_ms: i64,

    /// Concurrent async deliveries.
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
    /// Global cap on async delivery starts per second.
    #[serde(default = "default_worker_rate_per_sec")]
    pub worker_rate_per_sec: u32,
    #[serde(default = "default_worker_poll_interval_ms")]
    pub worker_poll_interval_ms: u64,
    /// How long a claimed job stays invisible to other workers.
    #[serde(default = "default_job_lease_ms")]
    pub job_lease_ms: u64,

    /// Defaults for destinations embedded in the flow graph.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub default_retry_delay_ms: u64,
    /// Re-run destination URL screening before every outbound call.
    #[serde(default)]
    pub delivery_ssrf_check: bool,

    /// Idle interval after which subscriptions emit a heartbeat.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
}

impl Config for GatewayConfig {}

fn default_port() -> u16 {
    3120
}

fn default_ip_rate_limit() -> u32 {
    100
}

fn default_flow_rate_limit() -> u32 {
    1000
}

fn default_window_ms() -> u64 {
    60_000
}

fn default_signature_max_age_ms() -> i64 {
    crate::security::signature::DEFAULT_MAX_AGE_MS
}

fn default_worker_concurrency() -> usize {
    10
}

fn default_worker_rate_per_sec() -> u32 {
    100
}

fn default_worker_poll_interval_ms() -> u64 {
    500
}

fn default_job_lease_ms() -> u64 {
    5 * 60 * 1000
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_heartbeat_interval_secs() -> u64 {
    15
}

impl GatewayConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}
