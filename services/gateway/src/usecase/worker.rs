use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;
use crate::domain::repository::{AuditLog, DeliveryClient, EventBus, JobQueue};
use crate::domain::types::DeliveryJob;
use crate::usecase::deliver::{DeliveryEngine, JobOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    pub concurrency: usize,
    /// Job starts per second across the whole pool.
    pub rate_per_sec: u32,
    pub poll_interval: Duration,
    pub lease: Duration,
}

impl From<&GatewayConfig> for WorkerSettings {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            concurrency: config.worker_concurrency.max(1),
            rate_per_sec: config.worker_rate_per_sec.max(1),
            poll_interval: Duration::from_millis(config.worker_poll_interval_ms),
            lease: Duration::from_millis(config.job_lease_ms),
        }
    }
}

/// Run one claimed job to a settled state.
///
/// An internal error during the try (storage, serialization) spends one try
/// of the budget like a delivery failure. If even settling fails the job is
/// left leased and comes back once the lease runs out.
pub async fn execute_job<L, E, Q, D>(
    engine: &DeliveryEngine<L, E, Q, D>,
    job: &DeliveryJob,
) -> Option<JobOutcome>
where
    L: AuditLog,
    E: EventBus,
    Q: JobQueue,
    D: DeliveryClient,
{
    match engine.run_job(job).await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            tracing::warn!(
                job_id = %job.id,
                log_id = %job.webhook_log_id,
                error = ?e,
                "delivery job errored"
            );
            match engine
                .settle_failure(job, job.attempts_made + 1, &e.to_string())
                .await
            {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    tracing::error!(job_id = %job.id, error = ?e, "failed to settle delivery job");
                    None
                }
            }
        }
    }
}

/// Pulls due jobs from the durable queue and runs them on a bounded pool.
pub struct DeliveryWorker<L, E, Q, D>
where
    L: AuditLog,
    E: EventBus,
    Q: JobQueue,
    D: DeliveryClient,
{
    pub engine: Arc<DeliveryEngine<L, E, Q, D>>,
    pub settings: WorkerSettings,
}

impl<L, E, Q, D> DeliveryWorker<L, E, Q, D>
where
    L: AuditLog + 'static,
    E: EventBus + 'static,
    Q: JobQueue + 'static,
    D: DeliveryClient + 'static,
{
    /// Poll until `cancel` fires, then wait for in-flight jobs to finish.
    pub async fn run(self, cancel: CancellationToken) {
        let WorkerSettings {
            concurrency,
            rate_per_sec,
            poll_interval,
            lease,
        } = self.settings;
        let permits = Arc::new(Semaphore::new(concurrency));
        let mut pacing = tokio::time::interval(Duration::from_secs(1) / rate_per_sec.max(1));
        pacing.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(concurrency, rate_per_sec, "delivery worker started");

        while !cancel.is_cancelled() {
            let free = permits.available_permits();
            let jobs = if free == 0 {
                Vec::new()
            } else {
                match self.engine.queue.claim(free, lease).await {
                    Ok(jobs) => jobs,
                    Err(e) => {
                        tracing::error!(error = ?e, "failed to claim delivery jobs");
                        Vec::new()
                    }
                }
            };

            if jobs.is_empty() {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(poll_interval) => continue,
                }
            }

            for job in jobs {
                pacing.tick().await;
                let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                    break;
                };
                let engine = Arc::clone(&self.engine);
                tokio::spawn(async move {
                    let _permit = permit;
                    execute_job(&engine, &job).await;
                });
            }
        }

        // Every permit back means every spawned job has settled.
        let _ = permits.acquire_many(concurrency as u32).await;
        tracing::info!("delivery worker stopped");
    }
}
