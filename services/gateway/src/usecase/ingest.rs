use std::time::Instant;

use chrono::Utc;
use uuid::Uuid;

use hooki_domain::event::FlowEvent;
use hooki_domain::status::LogStatus;

use crate::domain::repository::{
    AuditLog, DeliveryClient, EventBus, FlowRepository, JobQueue, RateLimiter,
};
use crate::domain::types::{
    DeliveryMode, FlowTarget, InboundRequest, OutboundPayload, RateLimitDecision, WebhookLog,
};
use crate::error::GatewayError;
use crate::usecase::audit::{capture_body, capture_headers, forwardable_headers};
use crate::usecase::deliver::{DeliveryEngine, TryOutcome};
use crate::usecase::gate::SecurityGate;

/// What happened to the deliveries of an accepted request.
#[derive(Debug)]
pub enum Dispatch {
    /// Inline tries, in destination order.
    Sync(Vec<TryOutcome>),
    /// Number of jobs handed to the worker pool.
    Queued(usize),
}

#[derive(Debug)]
pub struct Ingested {
    pub log_id: Uuid,
    pub mode: DeliveryMode,
    pub flow_limit: RateLimitDecision,
    pub dispatch: Dispatch,
    pub processing_time_ms: u64,
}

pub struct IngestWebhookUseCase<F, R, L, E, Q, D>
where
    F: FlowRepository,
    R: RateLimiter,
    L: AuditLog,
    E: EventBus,
    Q: JobQueue,
    D: DeliveryClient,
{
    pub gate: SecurityGate<F, R>,
    pub engine: DeliveryEngine<L, E, Q, D>,
}

impl<F, R, L, E, Q, D> IngestWebhookUseCase<F, R, L, E, Q, D>
where
    F: FlowRepository,
    R: RateLimiter,
    L: AuditLog,
    E: EventBus,
    Q: JobQueue,
    D: DeliveryClient,
{
    pub async fn execute(
        &self,
        request: InboundRequest,
        target: FlowTarget,
    ) -> Result<Ingested, GatewayError> {
        let started = Instant::now();
        let admission = self.gate.admit(&request, &target).await?;
        let flow = admission.flow;

        let destinations = self.gate.resolver.destinations(&flow).await?;
        let mode = if flow.async_mode || destinations.len() > 1 {
            DeliveryMode::Async
        } else {
            DeliveryMode::Sync
        };

        let log = WebhookLog {
            id: Uuid::now_v7(),
            flow_id: flow.id,
            method: request.method.clone(),
            path: request.path.clone(),
            headers: capture_headers(&request.headers, &flow.secure_headers),
            body: request
                .body
                .as_deref()
                .filter(|b| !b.is_empty())
                .map(capture_body),
            source_ip: Some(request.source_ip.clone()),
            status: LogStatus::Processing,
            received_at: Utc::now(),
            completed_at: None,
        };
        self.engine.logs.record(&log).await?;
        self.engine
            .publish(
                flow.id,
                FlowEvent::LogCreated {
                    flow_id: flow.id,
                    log: log.summary(),
                },
            )
            .await;
        tracing::info!(
            flow_id = %flow.id,
            log_id = %log.id,
            method = %log.method,
            path = %log.path,
            mode = mode.as_str(),
            destinations = destinations.len(),
            "webhook accepted"
        );

        let payload = OutboundPayload {
            method: request.method,
            headers: forwardable_headers(&request.headers),
            body: request.body.filter(|b| !b.is_empty()),
        };

        let dispatch = match mode {
            DeliveryMode::Sync => Dispatch::Sync(
                self.engine
                    .deliver_sync(&flow, log.id, &destinations, &payload)
                    .await?,
            ),
            DeliveryMode::Async => {
                let queued = self
                    .engine
                    .enqueue(&flow, log.id, &destinations, &payload)
                    .await?;
                if queued == 0 {
                    self.engine
                        .logs
                        .update_status(log.id, LogStatus::Completed)
                        .await?;
                }
                Dispatch::Queued(queued)
            }
        };

        Ok(Ingested {
            log_id: log.id,
            mode,
            flow_limit: admission.flow_limit,
            dispatch,
            processing_time_ms: started.elapsed().as_millis() as u64,
        })
    }
}
