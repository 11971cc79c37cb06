use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use hooki_domain::pagination::LogPage;
use hooki_domain::status::{AttemptStatus, LogStatus};

use crate::domain::types::{DeliveryAttempt, LogEntry};
use crate::error::GatewayError;
use crate::state::AppState;
use crate::usecase::logs::{GetLogUseCase, ListLogsUseCase};
use crate::usecase::replay::ReplayLogUseCase;

// ── Response types ───────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptResponse {
    pub id: Uuid,
    /// Table id, or the graph node id.
    pub destination_id: String,
    pub destination_url: String,
    pub attempt_number: u32,
    pub status: AttemptStatus,
    pub response_status: Option<u16>,
    pub response_body: Option<String>,
    pub response_time_ms: Option<u64>,
    pub error_message: Option<String>,
    #[serde(serialize_with = "hooki_core::serde::to_rfc3339_ms")]
    pub started_at: DateTime<Utc>,
    #[serde(serialize_with = "hooki_core::serde::opt_to_rfc3339_ms")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<DeliveryAttempt> for AttemptResponse {
    fn from(attempt: DeliveryAttempt) -> Self {
        Self {
            id: attempt.id,
            destination_id: attempt.destination_key,
            destination_url: attempt.destination_url,
            attempt_number: attempt.attempt_number,
            status: attempt.status,
            response_status: attempt.response_status,
            response_body: attempt.response_body,
            response_time_ms: attempt.response_time_ms,
            error_message: attempt.error_message,
            started_at: attempt.started_at,
            completed_at: attempt.completed_at,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogResponse {
    pub id: Uuid,
    pub flow_id: Uuid,
    pub method: String,
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub source_ip: Option<String>,
    pub status: LogStatus,
    #[serde(serialize_with = "hooki_core::serde::to_rfc3339_ms")]
    pub received_at: DateTime<Utc>,
    #[serde(serialize_with = "hooki_core::serde::opt_to_rfc3339_ms")]
    pub completed_at: Option<DateTime<Utc>>,
    pub attempts: Vec<AttemptResponse>,
}

impl From<LogEntry> for LogResponse {
    fn from(entry: LogEntry) -> Self {
        let LogEntry { log, attempts } = entry;
        Self {
            id: log.id,
            flow_id: log.flow_id,
            method: log.method,
            path: log.path,
            headers: log.headers,
            body: log.body,
            source_ip: log.source_ip,
            status: log.status,
            received_at: log.received_at,
            completed_at: log.completed_at,
            attempts: attempts.into_iter().map(AttemptResponse::from).collect(),
        }
    }
}

// ── GET /flows/{flow_id}/logs ────────────────────────────────────────────────

pub async fn list_logs(
    State(state): State<AppState>,
    Path(flow_id): Path<Uuid>,
    Query(page): Query<LogPage>,
) -> Result<Json<Vec<LogResponse>>, GatewayError> {
    let usecase = ListLogsUseCase {
        logs: state.audit_log(),
    };
    let entries = usecase.execute(flow_id, page).await?;
    Ok(Json(entries.into_iter().map(LogResponse::from).collect()))
}

// ── GET /logs/{log_id} ───────────────────────────────────────────────────────

pub async fn get_log(
    State(state): State<AppState>,
    Path(log_id): Path<Uuid>,
) -> Result<Json<LogResponse>, GatewayError> {
    let usecase = GetLogUseCase {
        logs: state.audit_log(),
    };
    let entry = usecase.execute(log_id).await?;
    Ok(Json(entry.into()))
}

// ── POST /logs/{log_id}/replay ───────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayResponse {
    pub success: bool,
    pub queued_count: usize,
}

pub async fn replay_log(
    State(state): State<AppState>,
    Path(log_id): Path<Uuid>,
) -> Result<Json<ReplayResponse>, GatewayError> {
    let usecase = ReplayLogUseCase {
        resolver: state.resolver(),
        engine: state.engine(),
    };
    let queued_count = usecase.execute(log_id).await?;
    Ok(Json(ReplayResponse {
        success: true,
        queued_count,
    }))
}
