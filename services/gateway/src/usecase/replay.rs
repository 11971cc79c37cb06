use uuid::Uuid;

use hooki_domain::status::LogStatus;

use crate::domain::repository::{AuditLog, DeliveryClient, EventBus, FlowRepository, JobQueue};
use crate::domain::types::{MASKED_VALUE, OutboundPayload, WebhookLog};
use crate::error::GatewayError;
use crate::usecase::audit::forwardable_headers;
use crate::usecase::deliver::DeliveryEngine;
use crate::usecase::resolve::FlowResolver;

/// Stored headers minus masked ones. The real values are gone, and sending
/// the mask would be worse than sending nothing.
pub fn replay_headers(log: &WebhookLog, secure_headers: &[String]) -> Vec<(String, String)> {
    let headers: Vec<(String, String)> = log
        .headers
        .iter()
        .filter(|(name, value)| {
            !(value.as_str() == MASKED_VALUE
                && secure_headers.iter().any(|s| s.eq_ignore_ascii_case(name)))
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    forwardable_headers(&headers)
}

pub struct ReplayLogUseCase<F, L, E, Q, D>
where
    F: FlowRepository,
    L: AuditLog,
    E: EventBus,
    Q: JobQueue,
    D: DeliveryClient,
{
    pub resolver: FlowResolver<F>,
    pub engine: DeliveryEngine<L, E, Q, D>,
}

impl<F, L, E, Q, D> ReplayLogUseCase<F, L, E, Q, D>
where
    F: FlowRepository,
    L: AuditLog,
    E: EventBus,
    Q: JobQueue,
    D: DeliveryClient,
{
    /// Queue the stored request for every current destination of its flow.
    /// Returns the number of jobs queued.
    pub async fn execute(&self, log_id: Uuid) -> Result<usize, GatewayError> {
        let entry = self
            .engine
            .logs
            .get(log_id)
            .await?
            .ok_or(GatewayError::LogNotFound)?;
        let log = entry.log;
        // Replays go through even when the flow was deactivated afterwards.
        let flow = self
            .resolver
            .flows
            .find_by_id(log.flow_id)
            .await?
            .ok_or(GatewayError::FlowNotFound)?;
        let destinations = self.resolver.destinations(&flow).await?;

        let payload = OutboundPayload {
            method: log.method.clone(),
            headers: replay_headers(&log, &flow.secure_headers),
            body: log.body.clone().map(String::into_bytes),
        };
        if destinations.is_empty() {
            tracing::info!(flow_id = %flow.id, log_id = %log.id, "nothing to replay");
            return Ok(0);
        }
        // Set before the jobs become claimable so a fast worker's verdict sticks.
        self.engine
            .logs
            .update_status(log.id, LogStatus::Processing)
            .await?;
        let queued = self
            .engine
            .enqueue(&flow, log.id, &destinations, &payload)
            .await?;
        tracing::info!(flow_id = %flow.id, log_id = %log.id, queued, "log replayed");
        Ok(queued)
    }
}
