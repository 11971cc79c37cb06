use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DbBackend, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Statement,
    sea_query::{Expr, OnConflict},
};
use uuid::Uuid;

use hooki_domain::pagination::LogPage;
use hooki_domain::status::{AttemptStatus, LogStatus};
use hooki_gateway_schema::{delivery_attempts, delivery_jobs, destinations, flows, webhook_logs};

use crate::domain::repository::{AuditLog, FlowRepository, JobQueue};
use crate::domain::types::{
    DEFAULT_SECURE_HEADERS, DeliveryAttempt, DeliveryJob, DestinationRecord, Flow, JobSpec,
    LogEntry, WebhookLog,
};
use crate::error::GatewayError;

// ── Flow repository ──────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbFlowRepository {
    pub db: DatabaseConnection,
}

impl FlowRepository for DbFlowRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Flow>, GatewayError> {
        let model = flows::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .context("find flow by id")?;
        Ok(model.map(flow_from_model))
    }

    async fn list_active(&self) -> Result<Vec<Flow>, GatewayError> {
        let models = flows::Entity::find()
            .filter(flows::Column::IsActive.eq(true))
            .order_by_asc(flows::Column::CreatedAt)
            .all(&self.db)
            .await
            .context("list active flows")?;
        Ok(models.into_iter().map(flow_from_model).collect())
    }

    async fn list_all(&self) -> Result<Vec<Flow>, GatewayError> {
        let models = flows::Entity::find()
            .order_by_asc(flows::Column::CreatedAt)
            .all(&self.db)
            .await
            .context("list flows")?;
        Ok(models.into_iter().map(flow_from_model).collect())
    }

    async fn active_destinations(
        &self,
        flow_id: Uuid,
    ) -> Result<Vec<DestinationRecord>, GatewayError> {
        let models = destinations::Entity::find()
            .filter(destinations::Column::FlowId.eq(flow_id))
            .filter(destinations::Column::IsActive.eq(true))
            .order_by_asc(destinations::Column::CreatedAt)
            .all(&self.db)
            .await
            .context("list active destinations")?;
        Ok(models.into_iter().map(destination_from_model).collect())
    }

    async fn save(&self, flow: &Flow) -> Result<(), GatewayError> {
        let rate_limit_per_minute = flow
            .rate_limit_per_minute
            .map(i32::try_from)
            .transpose()
            .context("rate limit per minute out of range")?;
        let am = flows::ActiveModel {
            id: Set(flow.id),
            project_id: Set(flow.project_id),
            name: Set(flow.name.clone()),
            description: Set(flow.description.clone()),
            is_active: Set(flow.is_active),
            config: Set(flow.config.clone()),
            signing_secret: Set(flow.signing_secret.clone()),
            require_signature: Set(flow.require_signature),
            async_mode: Set(flow.async_mode),
            rate_limit_per_minute: Set(rate_limit_per_minute),
            secure_headers: Set(serde_json::json!(flow.secure_headers)),
            created_at: Set(flow.created_at),
            updated_at: Set(flow.updated_at),
        };
        flows::Entity::insert(am)
            .on_conflict(
                OnConflict::column(flows::Column::Id)
                    .update_columns([
                        flows::Column::ProjectId,
                        flows::Column::Name,
                        flows::Column::Description,
                        flows::Column::IsActive,
                        flows::Column::Config,
                        flows::Column::SigningSecret,
                        flows::Column::RequireSignature,
                        flows::Column::AsyncMode,
                        flows::Column::RateLimitPerMinute,
                        flows::Column::SecureHeaders,
                        flows::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await
            .context("save flow")?;
        Ok(())
    }

    async fn update_secret(&self, id: Uuid, secret: &str) -> Result<bool, GatewayError> {
        let result = flows::Entity::update_many()
            .col_expr(flows::Column::SigningSecret, Expr::value(secret))
            .col_expr(flows::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(flows::Column::Id.eq(id))
            .exec(&self.db)
            .await
            .context("rotate flow secret")?;
        Ok(result.rows_affected > 0)
    }

    async fn insert_destination(&self, record: &DestinationRecord) -> Result<(), GatewayError> {
        let max_retries = i32::try_from(record.max_retries).context("max retries out of range")?;
        let retry_delay_ms =
            i32::try_from(record.retry_delay_ms).context("retry delay out of range")?;
        let timeout_ms = i32::try_from(record.timeout_ms).context("timeout out of range")?;
        destinations::ActiveModel {
            id: Set(record.id),
            flow_id: Set(record.flow_id),
            name: Set(record.name.clone()),
            url: Set(record.url.clone()),
            headers: Set(serde_json::json!(record.headers)),
            max_retries: Set(max_retries),
            retry_delay_ms: Set(retry_delay_ms),
            timeout_ms: Set(timeout_ms),
            is_active: Set(record.is_active),
            created_at: Set(record.created_at),
        }
        .insert(&self.db)
        .await
        .context("insert destination")?;
        Ok(())
    }
}

fn flow_from_model(model: flows::Model) -> Flow {
    let secure_headers = serde_json::from_value::<Vec<String>>(model.secure_headers)
        .unwrap_or_else(|_| {
            DEFAULT_SECURE_HEADERS
                .iter()
                .map(|h| (*h).to_owned())
                .collect()
        });
    Flow {
        id: model.id,
        project_id: model.project_id,
        name: model.name,
        description: model.description,
        is_active: model.is_active,
        config: model.config,
        signing_secret: model.signing_secret,
        require_signature: model.require_signature,
        async_mode: model.async_mode,
        rate_limit_per_minute: model.rate_limit_per_minute.map(|v| v.max(0) as u32),
        secure_headers,
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

fn string_map(value: serde_json::Value) -> BTreeMap<String, String> {
    serde_json::from_value(value).unwrap_or_default()
}

fn destination_from_model(model: destinations::Model) -> DestinationRecord {
    DestinationRecord {
        id: model.id,
        flow_id: model.flow_id,
        name: model.name,
        url: model.url,
        headers: string_map(model.headers),
        max_retries: model.max_retries.max(0) as u32,
        retry_delay_ms: model.retry_delay_ms.max(0) as u64,
        timeout_ms: model.timeout_ms.max(0) as u64,
        is_active: model.is_active,
        created_at: model.created_at,
    }
}

// ── Audit log ────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbAuditLog {
    pub db: DatabaseConnection,
}

impl DbAuditLog {
    async fn attempts_for(
        &self,
        log_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<DeliveryAttempt>>, GatewayError> {
        let mut grouped: HashMap<Uuid, Vec<DeliveryAttempt>> = HashMap::new();
        if log_ids.is_empty() {
            return Ok(grouped);
        }
        let models = delivery_attempts::Entity::find()
            .filter(delivery_attempts::Column::WebhookLogId.is_in(log_ids.iter().copied()))
            .order_by_asc(delivery_attempts::Column::StartedAt)
            .all(&self.db)
            .await
            .context("list delivery attempts")?;
        for model in models {
            let attempt = attempt_from_model(model)?;
            grouped
                .entry(attempt.webhook_log_id)
                .or_default()
                .push(attempt);
        }
        Ok(grouped)
    }
}

impl AuditLog for DbAuditLog {
    async fn record(&self, log: &WebhookLog) -> Result<(), GatewayError> {
        webhook_logs::ActiveModel {
            id: Set(log.id),
            flow_id: Set(log.flow_id),
            method: Set(log.method.clone()),
            path: Set(log.path.clone()),
            headers: Set(serde_json::json!(log.headers)),
            body: Set(log.body.clone()),
            source_ip: Set(log.source_ip.clone()),
            status: Set(log.status.as_str().to_owned()),
            received_at: Set(log.received_at),
            completed_at: Set(log.completed_at),
        }
        .insert(&self.db)
        .await
        .context("insert webhook log")?;
        Ok(())
    }

    async fn record_attempt(&self, attempt: &DeliveryAttempt) -> Result<(), GatewayError> {
        let am = delivery_attempts::ActiveModel {
            id: Set(attempt.id),
            webhook_log_id: Set(attempt.webhook_log_id),
            destination_id: Set(attempt.destination_id),
            destination_key: Set(attempt.destination_key.clone()),
            destination_url: Set(attempt.destination_url.clone()),
            attempt_number: Set(attempt.attempt_number as i32),
            status: Set(attempt.status.as_str().to_owned()),
            response_status: Set(attempt.response_status.map(i32::from)),
            response_body: Set(attempt.response_body.clone()),
            response_time_ms: Set(attempt.response_time_ms.map(|ms| ms as i64)),
            error_message: Set(attempt.error_message.clone()),
            started_at: Set(attempt.started_at),
            completed_at: Set(attempt.completed_at),
        };
        delivery_attempts::Entity::insert(am)
            .on_conflict(
                OnConflict::column(delivery_attempts::Column::Id)
                    .update_columns([
                        delivery_attempts::Column::Status,
                        delivery_attempts::Column::ResponseStatus,
                        delivery_attempts::Column::ResponseBody,
                        delivery_attempts::Column::ResponseTimeMs,
                        delivery_attempts::Column::ErrorMessage,
                        delivery_attempts::Column::CompletedAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await
            .context("upsert delivery attempt")?;
        Ok(())
    }

    async fn update_status(&self, log_id: Uuid, status: LogStatus) -> Result<(), GatewayError> {
        let completed_at: Option<DateTime<Utc>> = status.is_terminal().then(Utc::now);
        webhook_logs::Entity::update_many()
            .col_expr(webhook_logs::Column::Status, Expr::value(status.as_str()))
            .col_expr(webhook_logs::Column::CompletedAt, Expr::value(completed_at))
            .filter(webhook_logs::Column::Id.eq(log_id))
            .exec(&self.db)
            .await
            .context("update webhook log status")?;
        Ok(())
    }

    async fn fail_unless_delivered(
        &self,
        log_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<bool, GatewayError> {
        let result = self
            .db
            .execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                r#"
                UPDATE webhook_logs
                SET status = 'failed', completed_at = $2
                WHERE id = $1
                  AND NOT EXISTS (
                      SELECT 1 FROM delivery_attempts
                      WHERE webhook_log_id = $1
                        AND status = 'success'
                        AND started_at >= $3
                  )
                "#,
                [log_id.into(), Utc::now().into(), since.into()],
            ))
            .await
            .context("fail webhook log unless delivered")?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, flow_id: Uuid, page: LogPage) -> Result<Vec<LogEntry>, GatewayError> {
        let LogPage { limit, offset } = page.clamped();
        let models = webhook_logs::Entity::find()
            .filter(webhook_logs::Column::FlowId.eq(flow_id))
            .order_by_desc(webhook_logs::Column::ReceivedAt)
            .offset(offset)
            .limit(u64::from(limit))
            .all(&self.db)
            .await
            .context("list webhook logs")?;
        let ids: Vec<Uuid> = models.iter().map(|m| m.id).collect();
        let mut attempts = self.attempts_for(&ids).await?;
        models
            .into_iter()
            .map(|model| {
                let log = log_from_model(model)?;
                let attempts = attempts.remove(&log.id).unwrap_or_default();
                Ok(LogEntry { log, attempts })
            })
            .collect()
    }

    async fn get(&self, log_id: Uuid) -> Result<Option<LogEntry>, GatewayError> {
        let Some(model) = webhook_logs::Entity::find_by_id(log_id)
            .one(&self.db)
            .await
            .context("find webhook log")?
        else {
            return Ok(None);
        };
        let log = log_from_model(model)?;
        let attempts = self
            .attempts_for(&[log_id])
            .await?
            .remove(&log_id)
            .unwrap_or_default();
        Ok(Some(LogEntry { log, attempts }))
    }
}

fn log_from_model(model: webhook_logs::Model) -> anyhow::Result<WebhookLog> {
    Ok(WebhookLog {
        status: model
            .status
            .parse::<LogStatus>()
            .context("webhook log status")?,
        id: model.id,
        flow_id: model.flow_id,
        method: model.method,
        path: model.path,
        headers: string_map(model.headers),
        body: model.body,
        source_ip: model.source_ip,
        received_at: model.received_at,
        completed_at: model.completed_at,
    })
}

fn attempt_from_model(model: delivery_attempts::Model) -> anyhow::Result<DeliveryAttempt> {
    Ok(DeliveryAttempt {
        status: model
            .status
            .parse::<AttemptStatus>()
            .context("delivery attempt status")?,
        id: model.id,
        webhook_log_id: model.webhook_log_id,
        destination_id: model.destination_id,
        destination_key: model.destination_key,
        destination_url: model.destination_url,
        attempt_number: model.attempt_number.max(0) as u32,
        response_status: model.response_status.map(|s| s as u16),
        response_body: model.response_body,
        response_time_ms: model.response_time_ms.map(|ms| ms.max(0) as u64),
        error_message: model.error_message,
        started_at: model.started_at,
        completed_at: model.completed_at,
    })
}

// ── Job queue ────────────────────────────────────────────────────────────────

const JOB_QUEUED: &str = "queued";
const JOB_COMPLETED: &str = "completed";
const JOB_FAILED: &str = "failed";
const NO_LEASE: Option<DateTime<Utc>> = None;

#[derive(Clone)]
pub struct DbJobQueue {
    pub db: DatabaseConnection,
}

impl JobQueue for DbJobQueue {
    async fn enqueue(&self, jobs: &[DeliveryJob]) -> Result<(), GatewayError> {
        if jobs.is_empty() {
            return Ok(());
        }
        let now = Utc::now();
        let models = jobs
            .iter()
            .map(|job| {
                Ok(delivery_jobs::ActiveModel {
                    id: Set(job.id),
                    webhook_log_id: Set(job.webhook_log_id),
                    flow_id: Set(job.flow_id),
                    spec: Set(serde_json::to_value(&job.spec).context("serialize job spec")?),
                    signing_secret: Set(job.signing_secret.clone()),
                    attempts: Set(job.attempts_made as i32),
                    max_attempts: Set(job.max_attempts as i32),
                    backoff_base_ms: Set(job.backoff_base_ms as i64),
                    round_started_at: Set(job.round_started_at),
                    status: Set(JOB_QUEUED.to_owned()),
                    next_attempt_at: Set(now),
                    locked_until: Set(None),
                    last_error: Set(None),
                    created_at: Set(now),
                    finished_at: Set(None),
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        delivery_jobs::Entity::insert_many(models)
            .exec(&self.db)
            .await
            .context("enqueue delivery jobs")?;
        Ok(())
    }

    async fn claim(
        &self,
        limit: usize,
        lease: Duration,
    ) -> Result<Vec<DeliveryJob>, GatewayError> {
        let now = Utc::now();
        let locked_until = now + chrono::Duration::from_std(lease).context("job lease")?;
        // Expired leases belong to workers that died mid-try.
        let models = delivery_jobs::Entity::find()
            .from_raw_sql(Statement::from_sql_and_values(
                DbBackend::Postgres,
                r#"
                UPDATE delivery_jobs
                SET status = 'running', locked_until = $2
                WHERE id IN (
                    SELECT id FROM delivery_jobs
                    WHERE (status = 'queued' AND next_attempt_at <= $1)
                       OR (status = 'running' AND locked_until < $1)
                    ORDER BY next_attempt_at
                    LIMIT $3
                    FOR UPDATE SKIP LOCKED
                )
                RETURNING *
                "#,
                [now.into(), locked_until.into(), (limit as i64).into()],
            ))
            .all(&self.db)
            .await
            .context("claim delivery jobs")?;
        let jobs = models
            .into_iter()
            .map(job_from_model)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    async fn complete(&self, job_id: Uuid, attempts_made: u32) -> Result<(), GatewayError> {
        delivery_jobs::Entity::update_many()
            .col_expr(delivery_jobs::Column::Status, Expr::value(JOB_COMPLETED))
            .col_expr(delivery_jobs::Column::Attempts, Expr::value(attempts_made as i32))
            .col_expr(delivery_jobs::Column::LockedUntil, Expr::value(NO_LEASE))
            .col_expr(delivery_jobs::Column::FinishedAt, Expr::value(Some(Utc::now())))
            .filter(delivery_jobs::Column::Id.eq(job_id))
            .exec(&self.db)
            .await
            .context("complete delivery job")?;
        Ok(())
    }

    async fn retry(
        &self,
        job_id: Uuid,
        attempts_made: u32,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), GatewayError> {
        delivery_jobs::Entity::update_many()
            .col_expr(delivery_jobs::Column::Status, Expr::value(JOB_QUEUED))
            .col_expr(delivery_jobs::Column::Attempts, Expr::value(attempts_made as i32))
            .col_expr(delivery_jobs::Column::NextAttemptAt, Expr::value(next_attempt_at))
            .col_expr(delivery_jobs::Column::LockedUntil, Expr::value(NO_LEASE))
            .col_expr(delivery_jobs::Column::LastError, Expr::value(error))
            .filter(delivery_jobs::Column::Id.eq(job_id))
            .exec(&self.db)
            .await
            .context("reschedule delivery job")?;
        Ok(())
    }

    async fn fail(
        &self,
        job_id: Uuid,
        attempts_made: u32,
        error: &str,
    ) -> Result<(), GatewayError> {
        delivery_jobs::Entity::update_many()
            .col_expr(delivery_jobs::Column::Status, Expr::value(JOB_FAILED))
            .col_expr(delivery_jobs::Column::Attempts, Expr::value(attempts_made as i32))
            .col_expr(delivery_jobs::Column::LockedUntil, Expr::value(NO_LEASE))
            .col_expr(delivery_jobs::Column::LastError, Expr::value(error))
            .col_expr(delivery_jobs::Column::FinishedAt, Expr::value(Some(Utc::now())))
            .filter(delivery_jobs::Column::Id.eq(job_id))
            .exec(&self.db)
            .await
            .context("fail delivery job")?;
        Ok(())
    }
}

fn job_from_model(model: delivery_jobs::Model) -> anyhow::Result<DeliveryJob> {
    let spec: JobSpec = serde_json::from_value(model.spec).context("deserialize job spec")?;
    Ok(DeliveryJob {
        id: model.id,
        webhook_log_id: model.webhook_log_id,
        flow_id: model.flow_id,
        spec,
        signing_secret: model.signing_secret,
        attempts_made: model.attempts.max(0) as u32,
        max_attempts: model.max_attempts.max(1) as u32,
        backoff_base_ms: model.backoff_base_ms.max(0) as u64,
        round_started_at: model.round_started_at,
    })
}
