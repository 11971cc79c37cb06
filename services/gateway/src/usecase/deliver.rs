use std::time::Instant;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use hooki_domain::event::{FlowEvent, flow_topic};
use hooki_domain::status::{AttemptStatus, LogStatus};

use crate::domain::repository::{AuditLog, DeliveryClient, EventBus, JobQueue};
use crate::domain::types::{
    DELIVERY_ID_HEADER, DeliveryAttempt, DeliveryJob, Destination, Flow, OutboundPayload,
    OutboundRequest, OutboundResponse, SIGNATURE_HEADER,
};
use crate::error::{DeliveryError, GatewayError};
use crate::security::{signature, ssrf};
use crate::usecase::audit::capture_body;

#[derive(Debug, Clone, Copy, Default)]
pub struct DeliveryPolicy {
    /// Screen destination URLs before every call, not only at configuration time.
    pub ssrf_check: bool,
}

/// Result of one try against one destination.
#[derive(Debug, Clone)]
pub struct TryOutcome {
    pub attempt: DeliveryAttempt,
    pub result: Result<OutboundResponse, DeliveryError>,
}

impl TryOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(&self.result, Ok(response) if response.is_success())
    }

    /// Why the try failed, as stored on the attempt.
    pub fn failure_reason(&self) -> Option<String> {
        match &self.result {
            Ok(response) if response.is_success() => None,
            Ok(response) => Some(format!("HTTP {}", response.status)),
            Err(e) => Some(e.to_string()),
        }
    }
}

/// How an async job ended up after one try.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Delivered,
    Retrying { next_attempt_at: DateTime<Utc> },
    Exhausted,
}

pub struct DeliveryEngine<L, E, Q, D>
where
    L: AuditLog,
    E: EventBus,
    Q: JobQueue,
    D: DeliveryClient,
{
    pub logs: L,
    pub events: E,
    pub queue: Q,
    pub client: D,
    pub policy: DeliveryPolicy,
}

impl<L, E, Q, D> DeliveryEngine<L, E, Q, D>
where
    L: AuditLog,
    E: EventBus,
    Q: JobQueue,
    D: DeliveryClient,
{
    /// Publish on the flow topic. Live events are best effort.
    pub async fn publish(&self, flow_id: Uuid, event: FlowEvent) {
        if let Err(e) = self.events.publish(&flow_topic(flow_id), &event).await {
            tracing::warn!(
                flow_id = %flow_id,
                event = event.kind(),
                error = ?e,
                "event publish failed"
            );
        }
    }

    fn screen(&self, destination: &Destination) -> Result<(), DeliveryError> {
        if !self.policy.ssrf_check {
            return Ok(());
        }
        ssrf::validate_destination_url(&destination.url)
            .map(|_| ())
            .map_err(|e| DeliveryError::Blocked(e.to_string()))
    }

    /// Forwarded headers, then the destination's custom headers (which win on
    /// name clashes), then a fresh signature and the delivery id.
    fn signed_request(
        &self,
        attempt: &DeliveryAttempt,
        destination: &Destination,
        payload: &OutboundPayload,
        secret: &str,
    ) -> OutboundRequest {
        let body = payload.body.as_deref().unwrap_or_default();
        let mut headers: Vec<(String, String)> = payload
            .headers
            .iter()
            .filter(|(name, _)| {
                !destination
                    .headers
                    .keys()
                    .any(|custom| custom.eq_ignore_ascii_case(name))
            })
            .cloned()
            .collect();
        headers.extend(
            destination
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        headers.push((
            SIGNATURE_HEADER.to_owned(),
            signature::signature_header(secret, Utc::now().timestamp_millis(), body),
        ));
        headers.push((DELIVERY_ID_HEADER.to_owned(), attempt.id.to_string()));
        OutboundRequest {
            url: destination.url.clone(),
            method: payload.method.clone(),
            headers,
            body: payload.body.clone(),
            timeout: destination.timeout(),
        }
    }

    /// One signed call to one destination, recorded as its own attempt row.
    ///
    /// The row is written `pending` before the call and upserted with the
    /// outcome after it. A failed try is stored with `failure_status`.
    #[allow(clippy::too_many_arguments)]
    pub async fn attempt(
        &self,
        flow_id: Uuid,
        log_id: Uuid,
        destination: &Destination,
        payload: &OutboundPayload,
        secret: &str,
        attempt_number: u32,
        failure_status: AttemptStatus,
    ) -> Result<TryOutcome, GatewayError> {
        let mut attempt = DeliveryAttempt::begin(log_id, destination, attempt_number);
        self.logs.record_attempt(&attempt).await?;
        self.publish(
            flow_id,
            FlowEvent::DeliveryStarted {
                log_id,
                destination_id: destination.key.clone(),
                attempt_id: attempt.id,
                attempt_number,
            },
        )
        .await;

        let started = Instant::now();
        let result = match self.screen(destination) {
            Ok(()) => {
                let request = self.signed_request(&attempt, destination, payload, secret);
                self.client.send(request).await
            }
            Err(e) => Err(e),
        };
        attempt.response_time_ms = Some(started.elapsed().as_millis() as u64);
        attempt.completed_at = Some(Utc::now());

        let outcome = {
            if let Ok(response) = &result {
                attempt.response_status = Some(response.status);
                attempt.response_body = Some(capture_body(&response.body));
            }
            let mut outcome = TryOutcome { attempt, result };
            outcome.attempt.error_message = outcome.failure_reason();
            outcome.attempt.status = if outcome.succeeded() {
                AttemptStatus::Success
            } else {
                failure_status
            };
            outcome
        };
        self.logs.record_attempt(&outcome.attempt).await?;

        let destination_url = ssrf::redact_url(&destination.url);
        if outcome.succeeded() {
            tracing::info!(
                log_id = %log_id,
                attempt_id = %outcome.attempt.id,
                attempt_number,
                destination = %destination_url,
                status = outcome.attempt.response_status,
                elapsed_ms = outcome.attempt.response_time_ms,
                "delivery succeeded"
            );
            self.publish(
                flow_id,
                FlowEvent::DeliveryCompleted {
                    log_id,
                    attempt: outcome.attempt.summary(),
                },
            )
            .await;
        } else {
            tracing::warn!(
                log_id = %log_id,
                attempt_id = %outcome.attempt.id,
                attempt_number,
                destination = %destination_url,
                error = outcome.attempt.error_message.as_deref().unwrap_or(""),
                "delivery failed"
            );
            self.publish(
                flow_id,
                FlowEvent::DeliveryFailed {
                    log_id,
                    attempt: outcome.attempt.summary(),
                },
            )
            .await;
        }
        Ok(outcome)
    }

    /// Inline delivery, one destination after another.
    ///
    /// Sets the log `completed` when every try succeeded (or there were none),
    /// `failed` otherwise.
    pub async fn deliver_sync(
        &self,
        flow: &Flow,
        log_id: Uuid,
        destinations: &[Destination],
        payload: &OutboundPayload,
    ) -> Result<Vec<TryOutcome>, GatewayError> {
        let mut outcomes = Vec::with_capacity(destinations.len());
        for destination in destinations {
            let outcome = self
                .attempt(
                    flow.id,
                    log_id,
                    destination,
                    payload,
                    &flow.signing_secret,
                    1,
                    AttemptStatus::Failed,
                )
                .await?;
            outcomes.push(outcome);
        }
        let status = if outcomes.iter().all(TryOutcome::succeeded) {
            LogStatus::Completed
        } else {
            LogStatus::Failed
        };
        self.logs.update_status(log_id, status).await?;
        Ok(outcomes)
    }

    /// One durable job per destination. Returns how many were queued.
    pub async fn enqueue(
        &self,
        flow: &Flow,
        log_id: Uuid,
        destinations: &[Destination],
        payload: &OutboundPayload,
    ) -> Result<usize, GatewayError> {
        let jobs: Vec<DeliveryJob> = destinations
            .iter()
            .map(|destination| {
                DeliveryJob::new(
                    log_id,
                    flow.id,
                    destination.clone(),
                    payload.clone(),
                    flow.signing_secret.clone(),
                )
            })
            .collect();
        if jobs.is_empty() {
            return Ok(0);
        }
        self.queue.enqueue(&jobs).await?;
        tracing::info!(
            flow_id = %flow.id,
            log_id = %log_id,
            queued = jobs.len(),
            "deliveries queued"
        );
        Ok(jobs.len())
    }

    /// Execute the next try of a claimed job and settle it.
    pub async fn run_job(&self, job: &DeliveryJob) -> Result<JobOutcome, GatewayError> {
        let attempt_number = job.attempts_made + 1;
        let failure_status = if attempt_number >= job.max_attempts {
            AttemptStatus::Failed
        } else {
            AttemptStatus::Retrying
        };
        let outcome = self
            .attempt(
                job.flow_id,
                job.webhook_log_id,
                &job.spec.destination,
                &job.spec.payload,
                &job.signing_secret,
                attempt_number,
                failure_status,
            )
            .await?;

        match outcome.failure_reason() {
            None => {
                self.queue.complete(job.id, attempt_number).await?;
                self.logs
                    .update_status(job.webhook_log_id, LogStatus::Completed)
                    .await?;
                Ok(JobOutcome::Delivered)
            }
            Some(reason) => self.settle_failure(job, attempt_number, &reason).await,
        }
    }

    /// Reschedule with backoff, or give up when the budget is spent.
    ///
    /// Giving up marks the log `failed` unless another destination delivered
    /// in the same round.
    pub async fn settle_failure(
        &self,
        job: &DeliveryJob,
        attempt_number: u32,
        reason: &str,
    ) -> Result<JobOutcome, GatewayError> {
        if attempt_number >= job.max_attempts {
            self.queue.fail(job.id, attempt_number, reason).await?;
            let marked = self
                .logs
                .fail_unless_delivered(job.webhook_log_id, job.round_started_at)
                .await?;
            tracing::warn!(
                job_id = %job.id,
                log_id = %job.webhook_log_id,
                attempts = attempt_number,
                log_failed = marked,
                "delivery retries exhausted"
            );
            return Ok(JobOutcome::Exhausted);
        }
        let delay = job.backoff_after(attempt_number);
        let next_attempt_at = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        self.queue
            .retry(job.id, attempt_number, next_attempt_at, reason)
            .await?;
        tracing::debug!(
            job_id = %job.id,
            attempts = attempt_number,
            delay_ms = delay.as_millis() as u64,
            "delivery rescheduled"
        );
        Ok(JobOutcome::Retrying { next_attempt_at })
    }
}
