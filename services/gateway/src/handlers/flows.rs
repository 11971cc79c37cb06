use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::types::{DestinationRecord, Flow};
use crate::error::GatewayError;
use crate::state::AppState;
use crate::usecase::flows::{
    AddDestinationUseCase, DestinationInput, FlowInput, RotateSecretUseCase, SaveFlowUseCase,
};

// ── Response types ───────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowResponse {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub config: Option<Value>,
    pub signing_secret: String,
    pub require_signature: bool,
    pub async_mode: bool,
    pub rate_limit_per_minute: Option<u32>,
    pub secure_headers: Vec<String>,
    #[serde(serialize_with = "hooki_core::serde::to_rfc3339_ms")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "hooki_core::serde::to_rfc3339_ms")]
    pub updated_at: DateTime<Utc>,
}

impl From<Flow> for FlowResponse {
    fn from(flow: Flow) -> Self {
        Self {
            id: flow.id,
            project_id: flow.project_id,
            name: flow.name,
            description: flow.description,
            is_active: flow.is_active,
            config: flow.config,
            signing_secret: flow.signing_secret,
            require_signature: flow.require_signature,
            async_mode: flow.async_mode,
            rate_limit_per_minute: flow.rate_limit_per_minute,
            secure_headers: flow.secure_headers,
            created_at: flow.created_at,
            updated_at: flow.updated_at,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationResponse {
    pub id: Uuid,
    pub flow_id: Uuid,
    pub name: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_ms: u64,
    pub is_active: bool,
    #[serde(serialize_with = "hooki_core::serde::to_rfc3339_ms")]
    pub created_at: DateTime<Utc>,
}

impl From<DestinationRecord> for DestinationResponse {
    fn from(record: DestinationRecord) -> Self {
        Self {
            id: record.id,
            flow_id: record.flow_id,
            name: record.name,
            url: record.url,
            headers: record.headers,
            max_retries: record.max_retries,
            retry_delay_ms: record.retry_delay_ms,
            timeout_ms: record.timeout_ms,
            is_active: record.is_active,
            created_at: record.created_at,
        }
    }
}

// ── POST /flows, PUT /flows/{flow_id} ────────────────────────────────────────

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveFlowRequest {
    pub project_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub config: Option<Value>,
    #[serde(default = "default_true")]
    pub require_signature: bool,
    #[serde(default)]
    pub async_mode: bool,
    #[serde(default)]
    pub rate_limit_per_minute: Option<u32>,
    #[serde(default)]
    pub secure_headers: Option<Vec<String>>,
}

impl From<SaveFlowRequest> for FlowInput {
    fn from(body: SaveFlowRequest) -> Self {
        Self {
            project_id: body.project_id,
            name: body.name,
            description: body.description,
            is_active: body.is_active,
            config: body.config,
            require_signature: body.require_signature,
            async_mode: body.async_mode,
            rate_limit_per_minute: body.rate_limit_per_minute,
            secure_headers: body.secure_headers,
        }
    }
}

pub async fn create_flow(
    State(state): State<AppState>,
    Json(body): Json<SaveFlowRequest>,
) -> Result<(StatusCode, Json<FlowResponse>), GatewayError> {
    let usecase = SaveFlowUseCase {
        resolver: state.resolver(),
    };
    let flow = usecase.execute(None, body.into()).await?;
    Ok((StatusCode::CREATED, Json(flow.into())))
}

pub async fn update_flow(
    State(state): State<AppState>,
    Path(flow_id): Path<Uuid>,
    Json(body): Json<SaveFlowRequest>,
) -> Result<Json<FlowResponse>, GatewayError> {
    let usecase = SaveFlowUseCase {
        resolver: state.resolver(),
    };
    let flow = usecase.execute(Some(flow_id), body.into()).await?;
    Ok(Json(flow.into()))
}

// ── POST /flows/{flow_id}/secret ─────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretResponse {
    pub signing_secret: String,
}

pub async fn rotate_secret(
    State(state): State<AppState>,
    Path(flow_id): Path<Uuid>,
) -> Result<Json<SecretResponse>, GatewayError> {
    let usecase = RotateSecretUseCase {
        flows: state.flow_repo(),
    };
    let signing_secret = usecase.execute(flow_id).await?;
    Ok(Json(SecretResponse { signing_secret }))
}

// ── POST /flows/{flow_id}/destinations ───────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddDestinationRequest {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub retry_delay_ms: Option<u64>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

pub async fn add_destination(
    State(state): State<AppState>,
    Path(flow_id): Path<Uuid>,
    Json(body): Json<AddDestinationRequest>,
) -> Result<(StatusCode, Json<DestinationResponse>), GatewayError> {
    let usecase = AddDestinationUseCase {
        resolver: state.resolver(),
    };
    let record = usecase
        .execute(
            flow_id,
            DestinationInput {
                name: body.name,
                url: body.url,
                headers: body.headers,
                max_retries: body.max_retries,
                retry_delay_ms: body.retry_delay_ms,
                timeout_ms: body.timeout_ms,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(record.into())))
}
