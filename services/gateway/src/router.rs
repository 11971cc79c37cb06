use axum::{
    Router,
    routing::{any, get, post, put},
};

use hooki_core::health::healthz;
use hooki_core::middleware::{propagate_request_id_layer, request_id_layer, trace_layer};

use crate::handlers::{
    flows::{add_destination, create_flow, rotate_secret, update_flow},
    health::readyz,
    logs::{get_log, list_logs, replay_log},
    streams::{delivery_events, flow_events},
    webhook::{webhook_by_id, webhook_by_path},
};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Ingestion
        .route("/webhook/{flow_id}", any(webhook_by_id))
        .route("/api/webhook/{*path}", any(webhook_by_path))
        // Flows
        .route("/flows", post(create_flow))
        .route("/flows/{flow_id}", put(update_flow))
        .route("/flows/{flow_id}/secret", post(rotate_secret))
        .route("/flows/{flow_id}/destinations", post(add_destination))
        // Logs
        .route("/flows/{flow_id}/logs", get(list_logs))
        .route("/logs/{log_id}", get(get_log))
        .route("/logs/{log_id}/replay", post(replay_log))
        // Live events
        .route("/flows/{flow_id}/events", get(flow_events))
        .route("/logs/{log_id}/events", get(delivery_events))
        .layer(propagate_request_id_layer())
        .layer(trace_layer())
        .layer(request_id_layer())
        .with_state(state)
}
