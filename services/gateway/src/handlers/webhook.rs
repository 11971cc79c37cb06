use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use uuid::Uuid;

use crate::domain::types::{FlowTarget, InboundRequest, LOG_ID_HEADER, MODE_HEADER};
use crate::error::GatewayError;
use crate::state::AppState;
use crate::usecase::ingest::{Dispatch, IngestWebhookUseCase, Ingested};

pub const SHARED_NAMESPACE: &str = "/api/webhook/";

/// First `x-forwarded-for` entry, else `cf-connecting-ip`, else `unknown`.
pub fn source_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or_else(|| {
            headers
                .get("cf-connecting-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|ip| !ip.is_empty())
        })
        .unwrap_or("unknown")
        .to_owned()
}

fn inbound_request(
    method: &Method,
    path: String,
    headers: &HeaderMap,
    body: &Bytes,
) -> InboundRequest {
    InboundRequest {
        method: method.as_str().to_owned(),
        path,
        headers: headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_owned(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect(),
        body: (!body.is_empty()).then(|| body.to_vec()),
        source_ip: source_ip(headers),
    }
}

/// Shape the caller-facing response.
///
/// Sync mode passes the first destination's status and body through; a
/// transport failure becomes 502. Everything else gets a JSON envelope.
pub fn ingest_response(ingested: Ingested) -> Response {
    let Ingested {
        log_id,
        mode,
        flow_limit,
        dispatch,
        processing_time_ms,
    } = ingested;

    let mut response = match dispatch {
        Dispatch::Queued(queued) => Json(json!({
            "success": true,
            "logId": log_id,
            "queued": queued,
            "processingTimeMs": processing_time_ms,
        }))
        .into_response(),
        Dispatch::Sync(outcomes) => match outcomes.into_iter().next() {
            None => Json(json!({
                "success": true,
                "logId": log_id,
                "deliveries": 0,
                "processingTimeMs": processing_time_ms,
            }))
            .into_response(),
            Some(first) => match first.result {
                Ok(upstream) => {
                    let status =
                        StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
                    let content_type = upstream
                        .content_type
                        .and_then(|ct| HeaderValue::from_str(&ct).ok())
                        .unwrap_or(HeaderValue::from_static("application/json"));
                    (status, [(header::CONTENT_TYPE, content_type)], upstream.body).into_response()
                }
                Err(e) => (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({
                        "success": false,
                        "logId": log_id,
                        "error": e.to_string(),
                        "processingTimeMs": processing_time_ms,
                    })),
                )
                    .into_response(),
            },
        },
    };

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&log_id.to_string()) {
        headers.insert(HeaderName::from_static(LOG_ID_HEADER), value);
    }
    headers.insert(
        HeaderName::from_static(MODE_HEADER),
        HeaderValue::from_static(mode.as_str()),
    );
    headers.insert("x-ratelimit-remaining", HeaderValue::from(flow_limit.remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(flow_limit.reset_at_ms));
    response
}

async fn ingest(
    state: &AppState,
    request: InboundRequest,
    target: FlowTarget,
) -> Result<Response, GatewayError> {
    let usecase = IngestWebhookUseCase {
        gate: state.gate(),
        engine: state.engine(),
    };
    let ingested = usecase.execute(request, target).await?;
    Ok(ingest_response(ingested))
}

// ── ANY /webhook/{flow_id} ───────────────────────────────────────────────────

pub async fn webhook_by_id(
    State(state): State<AppState>,
    Path(flow_id): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    // Anything that is not a UUID cannot name a flow.
    let flow_id: Uuid = flow_id.parse().map_err(|_| GatewayError::FlowNotFound)?;
    let request = inbound_request(&method, uri.path().to_owned(), &headers, &body);
    ingest(&state, request, FlowTarget::Id(flow_id)).await
}

// ── ANY /api/webhook/{*path} ─────────────────────────────────────────────────

pub async fn webhook_by_path(
    State(state): State<AppState>,
    Path(path): Path<String>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let inbound_path = format!("{SHARED_NAMESPACE}{}", path.trim_start_matches('/'));
    let request = inbound_request(&method, inbound_path.clone(), &headers, &body);
    ingest(&state, request, FlowTarget::Path(inbound_path)).await
}
