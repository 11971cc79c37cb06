use axum::{
    extract::{Path, State},
    response::sse::{Event, Sse},
};
use futures::{Stream, StreamExt};
use uuid::Uuid;

use hooki_domain::event::FlowEvent;

use crate::domain::repository::EventStream;
use crate::error::GatewayError;
use crate::state::AppState;
use crate::usecase::stream::{SubscribeDeliveriesUseCase, SubscribeFlowUseCase};

/// Each event goes out with its `type` as the SSE event name. Heartbeats are
/// part of the stream, so no separate keep-alive is configured.
fn sse(events: EventStream) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    Sse::new(events.map(|event: FlowEvent| Event::default().event(event.kind()).json_data(&event)))
}

// ── GET /flows/{flow_id}/events ──────────────────────────────────────────────

pub async fn flow_events(
    State(state): State<AppState>,
    Path(flow_id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, GatewayError> {
    let usecase = SubscribeFlowUseCase {
        logs: state.audit_log(),
        events: state.events.clone(),
        heartbeat: state.config.heartbeat_interval(),
    };
    let events = usecase.execute(flow_id, state.shutdown.child_token()).await?;
    Ok(sse(events))
}

// ── GET /logs/{log_id}/events ────────────────────────────────────────────────

pub async fn delivery_events(
    State(state): State<AppState>,
    Path(log_id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, GatewayError> {
    let usecase = SubscribeDeliveriesUseCase {
        logs: state.audit_log(),
        events: state.events.clone(),
        heartbeat: state.config.heartbeat_interval(),
    };
    let events = usecase.execute(log_id, state.shutdown.child_token()).await?;
    Ok(sse(events))
}
