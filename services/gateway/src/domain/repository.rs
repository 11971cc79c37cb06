use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use uuid::Uuid;

use hooki_domain::event::FlowEvent;
use hooki_domain::pagination::LogPage;
use hooki_domain::status::LogStatus;

use crate::domain::types::{
    DeliveryAttempt, DeliveryJob, DestinationRecord, Flow, LogEntry, OutboundRequest,
    OutboundResponse, RateLimitDecision, WebhookLog,
};
use crate::error::{DeliveryError, GatewayError};

// Ports return `Send` futures so generic use cases can be spawned onto the
// worker pool.

/// Flow and destination records owned by the configuration side.
pub trait FlowRepository: Send + Sync {
    fn find_by_id(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<Flow>, GatewayError>> + Send;

    fn list_active(&self) -> impl Future<Output = Result<Vec<Flow>, GatewayError>> + Send;

    /// Every flow, active or not. Used by the route conflict check.
    fn list_all(&self) -> impl Future<Output = Result<Vec<Flow>, GatewayError>> + Send;

    /// Active table destinations for a flow, oldest first.
    fn active_destinations(
        &self,
        flow_id: Uuid,
    ) -> impl Future<Output = Result<Vec<DestinationRecord>, GatewayError>> + Send;

    /// Insert or replace a flow.
    fn save(&self, flow: &Flow) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Returns `false` when the flow does not exist.
    fn update_secret(
        &self,
        id: Uuid,
        secret: &str,
    ) -> impl Future<Output = Result<bool, GatewayError>> + Send;

    fn insert_destination(
        &self,
        record: &DestinationRecord,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;
}

/// Shared sliding-window counter.
pub trait RateLimiter: Send + Sync {
    /// Count one hit against `key` and decide. Evict, count, insert and expire
    /// happen as one atomic unit per key.
    fn hit(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> impl Future<Output = Result<RateLimitDecision, GatewayError>> + Send;
}

/// Durable record of inbound requests and delivery attempts.
pub trait AuditLog: Send + Sync {
    fn record(&self, log: &WebhookLog) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Upsert by attempt id.
    fn record_attempt(
        &self,
        attempt: &DeliveryAttempt,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Terminal statuses also stamp `completed_at`.
    fn update_status(
        &self,
        log_id: Uuid,
        status: LogStatus,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Mark the log `failed` unless an attempt started at or after `since`
    /// succeeded, in a single statement. Returns whether the log was marked.
    fn fail_unless_delivered(
        &self,
        log_id: Uuid,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool, GatewayError>> + Send;

    /// Newest first, each with its attempts.
    fn list(
        &self,
        flow_id: Uuid,
        page: LogPage,
    ) -> impl Future<Output = Result<Vec<LogEntry>, GatewayError>> + Send;

    fn get(
        &self,
        log_id: Uuid,
    ) -> impl Future<Output = Result<Option<LogEntry>, GatewayError>> + Send;
}

pub type EventStream = BoxStream<'static, FlowEvent>;

/// Fire-and-forget topic fan-out. At-most-once.
pub trait EventBus: Send + Sync {
    fn publish(
        &self,
        topic: &str,
        event: &FlowEvent,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Live events on `topic`. Dropping the stream unsubscribes.
    fn subscribe(
        &self,
        topic: &str,
    ) -> impl Future<Output = Result<EventStream, GatewayError>> + Send;
}

/// Durable queue of async delivery jobs.
pub trait JobQueue: Send + Sync {
    fn enqueue(&self, jobs: &[DeliveryJob])
    -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Lease up to `limit` due jobs for `lease`. Jobs whose lease expired are
    /// due again.
    fn claim(
        &self,
        limit: usize,
        lease: Duration,
    ) -> impl Future<Output = Result<Vec<DeliveryJob>, GatewayError>> + Send;

    fn complete(
        &self,
        job_id: Uuid,
        attempts_made: u32,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    fn retry(
        &self,
        job_id: Uuid,
        attempts_made: u32,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    fn fail(
        &self,
        job_id: Uuid,
        attempts_made: u32,
        error: &str,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;
}

/// Outbound HTTP. The request's timeout is a hard bound.
pub trait DeliveryClient: Send + Sync {
    fn send(
        &self,
        request: OutboundRequest,
    ) -> impl Future<Output = Result<OutboundResponse, DeliveryError>> + Send;
}
