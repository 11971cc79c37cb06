use axum::Json;
use axum::http::StatusCode;
use serde_json::{Map, Value, json};

/// Handler for `GET /healthz`: the process is up.
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Build a `GET /readyz` response from named dependency checks.
///
/// Returns 200 when every check passed, 503 otherwise, with per-check detail.
pub fn readiness(checks: &[(&str, bool)]) -> (StatusCode, Json<Value>) {
    let ready = checks.iter().all(|(_, ok)| *ok);
    let detail: Map<String, Value> = checks
        .iter()
        .map(|(name, ok)| ((*name).to_owned(), Value::from(if *ok { "ok" } else { "down" })))
        .collect();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(json!({ "ready": ready, "checks": detail })))
}
