use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use hooki_domain::event::{AttemptSummary, LogSummary};
use hooki_domain::graph::FlowGraph;
use hooki_domain::status::{AttemptStatus, LogStatus};

/// Stored request/response bodies are cut to this many bytes.
pub const BODY_CAPTURE_LIMIT: usize = 10_000;
/// Replaces the value of secure headers in stored logs.
pub const MASKED_VALUE: &str = "***";
/// Headers masked when a flow does not configure its own list.
pub const DEFAULT_SECURE_HEADERS: &[&str] = &["authorization"];

pub const SIGNATURE_HEADER: &str = "x-hooki-signature";
pub const DELIVERY_ID_HEADER: &str = "x-hooki-delivery-id";
pub const LOG_ID_HEADER: &str = "x-hooki-log-id";
pub const MODE_HEADER: &str = "x-hooki-mode";

/// Maximum size of the late-subscriber backlog on the flow event stream.
pub const STREAM_BACKLOG: u32 = 20;

/// A configured webhook pipeline.
#[derive(Debug, Clone)]
pub struct Flow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    /// Editor graph as stored; parse with [`Flow::graph`].
    pub config: Option<Value>,
    pub signing_secret: String,
    pub require_signature: bool,
    pub async_mode: bool,
    pub rate_limit_per_minute: Option<u32>,
    /// Lowercase header names masked in stored logs.
    pub secure_headers: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Flow {
    pub fn graph(&self) -> FlowGraph {
        FlowGraph::from_config(self.config.as_ref())
    }
}

/// Row of the `destinations` table.
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationRecord {
    pub id: Uuid,
    pub flow_id: Uuid,
    pub name: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_ms: u64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Delivery target normalized from either a table row or an outbound graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    /// Table id as a string, or the graph node id.
    pub key: String,
    pub table_id: Option<Uuid>,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_ms: u64,
}

impl Destination {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl From<&DestinationRecord> for Destination {
    fn from(record: &DestinationRecord) -> Self {
        Self {
            key: record.id.to_string(),
            table_id: Some(record.id),
            url: record.url.clone(),
            headers: record.headers.clone(),
            max_retries: record.max_retries,
            retry_delay_ms: record.retry_delay_ms,
            timeout_ms: record.timeout_ms,
        }
    }
}

/// One inbound request as recorded in the audit log.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookLog {
    pub id: Uuid,
    pub flow_id: Uuid,
    pub method: String,
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub source_ip: Option<String>,
    pub status: LogStatus,
    pub received_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WebhookLog {
    pub fn summary(&self) -> LogSummary {
        LogSummary {
            id: self.id,
            flow_id: self.flow_id,
            method: self.method.clone(),
            path: self.path.clone(),
            source_ip: self.source_ip.clone(),
            status: self.status,
            received_at: self.received_at,
        }
    }
}

/// One try against one destination.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryAttempt {
    pub id: Uuid,
    pub webhook_log_id: Uuid,
    pub destination_id: Option<Uuid>,
    pub destination_key: String,
    pub destination_url: String,
    pub attempt_number: u32,
    pub status: AttemptStatus,
    pub response_status: Option<u16>,
    pub response_body: Option<String>,
    pub response_time_ms: Option<u64>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DeliveryAttempt {
    /// A fresh `pending` attempt with a new id, started now.
    pub fn begin(log_id: Uuid, destination: &Destination, attempt_number: u32) -> Self {
        Self {
            id: Uuid::now_v7(),
            webhook_log_id: log_id,
            destination_id: destination.table_id,
            destination_key: destination.key.clone(),
            destination_url: destination.url.clone(),
            attempt_number,
            status: AttemptStatus::Pending,
            response_status: None,
            response_body: None,
            response_time_ms: None,
            error_message: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn summary(&self) -> AttemptSummary {
        AttemptSummary {
            id: self.id,
            webhook_log_id: self.webhook_log_id,
            destination_id: self.destination_key.clone(),
            destination_url: self.destination_url.clone(),
            attempt_number: self.attempt_number,
            status: self.status,
            response_status: self.response_status,
            response_time_ms: self.response_time_ms,
            error_message: self.error_message.clone(),
        }
    }
}

/// A log together with every attempt recorded against it.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub log: WebhookLog,
    pub attempts: Vec<DeliveryAttempt>,
}

/// What gets sent to a destination, minus the per-try signature headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundPayload {
    pub method: String,
    pub headers: Vec<(String, String)>,
    /// Exact bytes received. Hex in the serialized job spec.
    #[serde(default, with = "hex_body")]
    pub body: Option<Vec<u8>>,
}

mod hex_body {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match body {
            Some(bytes) => s.serialize_some(&hex::encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|encoded| hex::decode(encoded).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Serialized into `delivery_jobs.spec`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub destination: Destination,
    pub payload: OutboundPayload,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryJob {
    pub id: Uuid,
    pub webhook_log_id: Uuid,
    pub flow_id: Uuid,
    pub spec: JobSpec,
    pub signing_secret: String,
    /// Tries already executed.
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    /// Only successes from this round keep an exhausted job from failing the log.
    pub round_started_at: DateTime<Utc>,
}

impl DeliveryJob {
    pub fn new(
        log_id: Uuid,
        flow_id: Uuid,
        destination: Destination,
        payload: OutboundPayload,
        signing_secret: String,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            webhook_log_id: log_id,
            flow_id,
            // `maxRetries` counts total tries; zero still gets one.
            max_attempts: destination.max_retries.max(1),
            backoff_base_ms: destination.retry_delay_ms,
            spec: JobSpec {
                destination,
                payload,
            },
            signing_secret,
            attempts_made: 0,
            round_started_at: Utc::now(),
        }
    }

    /// Delay before the try that follows try number `attempt_number`.
    pub fn backoff_after(&self, attempt_number: u32) -> Duration {
        let exp = attempt_number.saturating_sub(1).min(20);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(1u64 << exp))
    }
}

/// Which sliding window rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitScope {
    Ip,
    Flow,
}

impl std::fmt::Display for LimitScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Ip => "ip",
            Self::Flow => "flow",
        })
    }
}

/// Outcome of one sliding-window check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Unix ms at which the current window has fully slid past.
    pub reset_at_ms: i64,
    pub retry_after_secs: u64,
}

impl RateLimitDecision {
    /// Decide from the number of entries already in the window before this hit.
    pub fn evaluate(count_before: u64, limit: u32, now_ms: i64, window: Duration) -> Self {
        let window_ms = window.as_millis() as i64;
        let limit_wide = u64::from(limit);
        Self {
            allowed: count_before < limit_wide,
            limit,
            remaining: limit_wide.saturating_sub(count_before + 1) as u32,
            reset_at_ms: now_ms + window_ms,
            retry_after_secs: window.as_millis().div_ceil(1000) as u64,
        }
    }
}

/// An inbound webhook call, already read off the wire.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: String,
    pub path: String,
    /// Lowercase names, arrival order.
    pub headers: Vec<(String, String)>,
    /// Raw bytes as received; signatures are checked over these.
    pub body: Option<Vec<u8>>,
    pub source_ip: String,
}

impl InboundRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// How an inbound request names its flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowTarget {
    /// `/webhook/{flowId}`
    Id(Uuid),
    /// A path inside the shared namespace, resolved by content.
    Path(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Sync,
    Async,
}

impl DeliveryMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Async => "async",
        }
    }
}

/// Response from a destination.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl OutboundResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A fully signed request ready for the HTTP client.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub timeout: Duration,
}
