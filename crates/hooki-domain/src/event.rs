//! Live events published per flow.
//!
//! Events are ephemeral: they are never persisted and carry enough of the log
//! and attempt rows for a dashboard to render state without a follow-up query.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::{AttemptStatus, LogStatus};

/// Event topic for a flow. Transports add their own channel prefix.
pub fn flow_topic(flow_id: Uuid) -> String {
    format!("flow:{flow_id}")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSummary {
    pub id: Uuid,
    pub flow_id: Uuid,
    pub method: String,
    pub path: String,
    pub source_ip: Option<String>,
    pub status: LogStatus,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptSummary {
    pub id: Uuid,
    pub webhook_log_id: Uuid,
    /// Table id, or the graph node id for config-embedded destinations.
    pub destination_id: String,
    pub destination_url: String,
    pub attempt_number: u32,
    pub status: AttemptStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FlowEvent {
    #[serde(rename = "log:created", rename_all = "camelCase")]
    LogCreated { flow_id: Uuid, log: LogSummary },
    #[serde(rename = "delivery:started", rename_all = "camelCase")]
    DeliveryStarted {
        log_id: Uuid,
        destination_id: String,
        attempt_id: Uuid,
        attempt_number: u32,
    },
    #[serde(rename = "delivery:completed", rename_all = "camelCase")]
    DeliveryCompleted { log_id: Uuid, attempt: AttemptSummary },
    #[serde(rename = "delivery:failed", rename_all = "camelCase")]
    DeliveryFailed { log_id: Uuid, attempt: AttemptSummary },
    /// Synthetic keep-alive emitted by subscriptions, never published.
    #[serde(rename = "heartbeat")]
    Heartbeat { timestamp: DateTime<Utc> },
}

impl FlowEvent {
    pub fn heartbeat() -> Self {
        Self::Heartbeat {
            timestamp: Utc::now(),
        }
    }

    /// Log the event refers to, if any.
    pub fn log_id(&self) -> Option<Uuid> {
        match self {
            Self::LogCreated { log, .. } => Some(log.id),
            Self::DeliveryStarted { log_id, .. }
            | Self::DeliveryCompleted { log_id, .. }
            | Self::DeliveryFailed { log_id, .. } => Some(*log_id),
            Self::Heartbeat { .. } => None,
        }
    }

    pub fn is_delivery(&self) -> bool {
        matches!(
            self,
            Self::DeliveryStarted { .. }
                | Self::DeliveryCompleted { .. }
                | Self::DeliveryFailed { .. }
        )
    }

    /// Value of the `type` discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LogCreated { .. } => "log:created",
            Self::DeliveryStarted { .. } => "delivery:started",
            Self::DeliveryCompleted { .. } => "delivery:completed",
            Self::DeliveryFailed { .. } => "delivery:failed",
            Self::Heartbeat { .. } => "heartbeat",
        }
    }
}
