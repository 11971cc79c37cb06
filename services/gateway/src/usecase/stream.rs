use std::time::Duration;

use futures::{StreamExt, stream};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use hooki_domain::event::{FlowEvent, flow_topic};
use hooki_domain::pagination::LogPage;

use crate::domain::repository::{AuditLog, EventBus, EventStream};
use crate::domain::types::STREAM_BACKLOG;
use crate::error::GatewayError;

/// Interleave a heartbeat whenever `events` stays quiet for `interval`.
///
/// Ends when `events` ends or `cancel` fires, whichever comes first.
pub fn with_heartbeat(
    events: EventStream,
    interval: Duration,
    cancel: CancellationToken,
) -> EventStream {
    stream::unfold((events, cancel), move |(mut events, cancel)| async move {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            next = events.next() => next.map(|event| (event, (events, cancel))),
            _ = tokio::time::sleep(interval) => Some((FlowEvent::heartbeat(), (events, cancel))),
        }
    })
    .boxed()
}

// ── SubscribeFlow ────────────────────────────────────────────────────────────

pub struct SubscribeFlowUseCase<L: AuditLog, E: EventBus> {
    pub logs: L,
    pub events: E,
    pub heartbeat: Duration,
}

impl<L: AuditLog, E: EventBus> SubscribeFlowUseCase<L, E> {
    /// Recent logs as `log:created` events, oldest first, then live events.
    pub async fn execute(
        &self,
        flow_id: Uuid,
        cancel: CancellationToken,
    ) -> Result<EventStream, GatewayError> {
        // Subscribe before reading the backlog so nothing falls in between.
        let live = self.events.subscribe(&flow_topic(flow_id)).await?;
        let recent = self
            .logs
            .list(
                flow_id,
                LogPage {
                    limit: STREAM_BACKLOG,
                    offset: 0,
                },
            )
            .await?;
        let backlog: Vec<FlowEvent> = recent
            .into_iter()
            .rev()
            .map(|entry| FlowEvent::LogCreated {
                flow_id,
                log: entry.log.summary(),
            })
            .collect();
        tracing::debug!(flow_id = %flow_id, backlog = backlog.len(), "flow subscription opened");

        Ok(stream::iter(backlog)
            .chain(with_heartbeat(live, self.heartbeat, cancel))
            .boxed())
    }
}

// ── SubscribeDeliveries ──────────────────────────────────────────────────────

pub struct SubscribeDeliveriesUseCase<L: AuditLog, E: EventBus> {
    pub logs: L,
    pub events: E,
    pub heartbeat: Duration,
}

impl<L: AuditLog, E: EventBus> SubscribeDeliveriesUseCase<L, E> {
    /// Delivery events of one log, including those caused by replays.
    pub async fn execute(
        &self,
        log_id: Uuid,
        cancel: CancellationToken,
    ) -> Result<EventStream, GatewayError> {
        let entry = self
            .logs
            .get(log_id)
            .await?
            .ok_or(GatewayError::LogNotFound)?;
        let live = self
            .events
            .subscribe(&flow_topic(entry.log.flow_id))
            .await?
            .filter(move |event| {
                let keep = event.is_delivery() && event.log_id() == Some(log_id);
                async move { keep }
            })
            .boxed();
        Ok(with_heartbeat(live, self.heartbeat, cancel))
    }
}
