use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use hooki_domain::pagination::LogPage;
use hooki_domain::status::{AttemptStatus, LogStatus};

use hooki_gateway::domain::repository::{AuditLog, FlowRepository, JobQueue};
use hooki_gateway::domain::types::{
    DeliveryAttempt, DeliveryJob, DestinationRecord, Flow, InboundRequest, LogEntry, WebhookLog,
};
use hooki_gateway::error::GatewayError;
use hooki_gateway::infra::events::LocalEventBus;
use hooki_gateway::infra::http::HttpDeliveryClient;
use hooki_gateway::infra::rate_limit::LocalRateLimiter;
use hooki_gateway::usecase::deliver::{DeliveryEngine, DeliveryPolicy, JobOutcome};
use hooki_gateway::usecase::gate::{GatePolicy, SecurityGate};
use hooki_gateway::usecase::resolve::{DestinationDefaults, FlowResolver};
use hooki_gateway::usecase::worker::execute_job;

pub const TEST_SECRET: &str = "whsec_integration_test_secret";

// ── MockFlowRepo ─────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockFlowRepo {
    pub flows: Arc<Mutex<Vec<Flow>>>,
    pub destinations: Arc<Mutex<Vec<DestinationRecord>>>,
}

impl MockFlowRepo {
    pub fn new(flows: Vec<Flow>) -> Self {
        Self {
            flows: Arc::new(Mutex::new(flows)),
            destinations: Arc::default(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_destinations(self, records: Vec<DestinationRecord>) -> Self {
        *self.destinations.lock().unwrap() = records;
        self
    }

    /// Returns a shared handle to the stored flows for post-execution inspection.
    pub fn flows_handle(&self) -> Arc<Mutex<Vec<Flow>>> {
        Arc::clone(&self.flows)
    }
}

impl FlowRepository for MockFlowRepo {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Flow>, GatewayError> {
        Ok(self.flows.lock().unwrap().iter().find(|f| f.id == id).cloned())
    }

    async fn list_active(&self) -> Result<Vec<Flow>, GatewayError> {
        Ok(self
            .flows
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.is_active)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<Flow>, GatewayError> {
        Ok(self.flows.lock().unwrap().clone())
    }

    async fn active_destinations(
        &self,
        flow_id: Uuid,
    ) -> Result<Vec<DestinationRecord>, GatewayError> {
        let mut records: Vec<DestinationRecord> = self
            .destinations
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.flow_id == flow_id && d.is_active)
            .cloned()
            .collect();
        records.sort_by_key(|d| d.created_at);
        Ok(records)
    }

    async fn save(&self, flow: &Flow) -> Result<(), GatewayError> {
        let mut flows = self.flows.lock().unwrap();
        match flows.iter_mut().find(|f| f.id == flow.id) {
            Some(existing) => *existing = flow.clone(),
            None => flows.push(flow.clone()),
        }
        Ok(())
    }

    async fn update_secret(&self, id: Uuid, secret: &str) -> Result<bool, GatewayError> {
        let mut flows = self.flows.lock().unwrap();
        match flows.iter_mut().find(|f| f.id == id) {
            Some(flow) => {
                flow.signing_secret = secret.to_owned();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_destination(&self, record: &DestinationRecord) -> Result<(), GatewayError> {
        self.destinations.lock().unwrap().push(record.clone());
        Ok(())
    }
}

// ── MockAuditLog ─────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockAuditLog {
    pub logs: Arc<Mutex<Vec<WebhookLog>>>,
    pub attempts: Arc<Mutex<Vec<DeliveryAttempt>>>,
}

impl MockAuditLog {
    pub fn new(logs: Vec<WebhookLog>) -> Self {
        Self {
            logs: Arc::new(Mutex::new(logs)),
            attempts: Arc::default(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn log(&self, id: Uuid) -> WebhookLog {
        self.logs
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.id == id)
            .cloned()
            .expect("log recorded")
    }

    pub fn only_log(&self) -> WebhookLog {
        let logs = self.logs.lock().unwrap();
        assert_eq!(logs.len(), 1, "expected exactly one log");
        logs[0].clone()
    }

    /// Attempts of one log in recording order.
    pub fn attempts_of(&self, log_id: Uuid) -> Vec<DeliveryAttempt> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.webhook_log_id == log_id)
            .cloned()
            .collect()
    }
}

impl AuditLog for MockAuditLog {
    async fn record(&self, log: &WebhookLog) -> Result<(), GatewayError> {
        self.logs.lock().unwrap().push(log.clone());
        Ok(())
    }

    async fn record_attempt(&self, attempt: &DeliveryAttempt) -> Result<(), GatewayError> {
        let mut attempts = self.attempts.lock().unwrap();
        match attempts.iter_mut().find(|a| a.id == attempt.id) {
            Some(existing) => *existing = attempt.clone(),
            None => attempts.push(attempt.clone()),
        }
        Ok(())
    }

    async fn update_status(&self, log_id: Uuid, status: LogStatus) -> Result<(), GatewayError> {
        if let Some(log) = self.logs.lock().unwrap().iter_mut().find(|l| l.id == log_id) {
            log.status = status;
            if status.is_terminal() {
                log.completed_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn fail_unless_delivered(
        &self,
        log_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<bool, GatewayError> {
        let delivered = self.attempts.lock().unwrap().iter().any(|a| {
            a.webhook_log_id == log_id
                && a.status == AttemptStatus::Success
                && a.started_at >= since
        });
        if delivered {
            return Ok(false);
        }
        self.update_status(log_id, LogStatus::Failed).await?;
        Ok(true)
    }

    async fn list(&self, flow_id: Uuid, page: LogPage) -> Result<Vec<LogEntry>, GatewayError> {
        let mut logs: Vec<WebhookLog> = self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.flow_id == flow_id)
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        Ok(logs
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .map(|log| LogEntry {
                attempts: self.attempts_of(log.id),
                log,
            })
            .collect())
    }

    async fn get(&self, log_id: Uuid) -> Result<Option<LogEntry>, GatewayError> {
        let log = self.logs.lock().unwrap().iter().find(|l| l.id == log_id).cloned();
        Ok(log.map(|log| LogEntry {
            attempts: self.attempts_of(log.id),
            log,
        }))
    }
}

// ── MockJobQueue ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub job: DeliveryJob,
    pub state: JobState,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

#[derive(Clone, Default)]
pub struct MockJobQueue {
    pub jobs: Arc<Mutex<Vec<QueuedJob>>>,
}

impl MockJobQueue {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn jobs_handle(&self) -> Arc<Mutex<Vec<QueuedJob>>> {
        Arc::clone(&self.jobs)
    }

    pub fn snapshot(&self) -> Vec<QueuedJob> {
        self.jobs.lock().unwrap().clone()
    }

    fn update(&self, job_id: Uuid, apply: impl FnOnce(&mut QueuedJob)) {
        if let Some(entry) = self
            .jobs
            .lock()
            .unwrap()
            .iter_mut()
            .find(|j| j.job.id == job_id)
        {
            apply(entry);
        }
    }
}

impl JobQueue for MockJobQueue {
    async fn enqueue(&self, jobs: &[DeliveryJob]) -> Result<(), GatewayError> {
        let now = Utc::now();
        self.jobs
            .lock()
            .unwrap()
            .extend(jobs.iter().cloned().map(|job| QueuedJob {
                job,
                state: JobState::Queued,
                next_attempt_at: now,
                last_error: None,
            }));
        Ok(())
    }

    async fn claim(
        &self,
        limit: usize,
        _lease: Duration,
    ) -> Result<Vec<DeliveryJob>, GatewayError> {
        let now = Utc::now();
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter_mut()
            .filter(|j| j.state == JobState::Queued && j.next_attempt_at <= now)
            .take(limit)
            .map(|j| {
                j.state = JobState::Running;
                j.job.clone()
            })
            .collect())
    }

    async fn complete(&self, job_id: Uuid, attempts_made: u32) -> Result<(), GatewayError> {
        self.update(job_id, |j| {
            j.state = JobState::Completed;
            j.job.attempts_made = attempts_made;
        });
        Ok(())
    }

    async fn retry(
        &self,
        job_id: Uuid,
        attempts_made: u32,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), GatewayError> {
        self.update(job_id, |j| {
            j.state = JobState::Queued;
            j.job.attempts_made = attempts_made;
            j.next_attempt_at = next_attempt_at;
            j.last_error = Some(error.to_owned());
        });
        Ok(())
    }

    async fn fail(
        &self,
        job_id: Uuid,
        attempts_made: u32,
        error: &str,
    ) -> Result<(), GatewayError> {
        self.update(job_id, |j| {
            j.state = JobState::Failed;
            j.job.attempts_made = attempts_made;
            j.last_error = Some(error.to_owned());
        });
        Ok(())
    }
}

// ── Wiring ───────────────────────────────────────────────────────────────────

pub type TestEngine =
    DeliveryEngine<MockAuditLog, LocalEventBus, MockJobQueue, HttpDeliveryClient>;

/// Graph destinations retry without delay so queued jobs are due immediately.
pub fn test_defaults() -> DestinationDefaults {
    DestinationDefaults {
        max_retries: 3,
        retry_delay_ms: 0,
        timeout_ms: 5_000,
    }
}

pub fn test_resolver(flows: MockFlowRepo) -> FlowResolver<MockFlowRepo> {
    FlowResolver {
        flows,
        defaults: test_defaults(),
    }
}

pub fn test_gate(flows: MockFlowRepo) -> SecurityGate<MockFlowRepo, LocalRateLimiter> {
    SecurityGate {
        resolver: test_resolver(flows),
        limiter: LocalRateLimiter::new(),
        policy: GatePolicy::default(),
    }
}

pub fn test_engine(logs: MockAuditLog, events: LocalEventBus, queue: MockJobQueue) -> TestEngine {
    DeliveryEngine {
        logs,
        events,
        queue,
        client: HttpDeliveryClient::new().unwrap(),
        policy: DeliveryPolicy::default(),
    }
}

/// Claim and run due jobs until none are left.
pub async fn drain(engine: &TestEngine) -> Vec<JobOutcome> {
    let mut outcomes = Vec::new();
    for _ in 0..50 {
        let jobs = engine.queue.claim(10, Duration::from_secs(60)).await.unwrap();
        if jobs.is_empty() {
            return outcomes;
        }
        for job in jobs {
            outcomes.extend(execute_job(engine, &job).await);
        }
    }
    panic!("queue did not drain");
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

pub fn test_flow(config: Option<Value>) -> Flow {
    let now = Utc::now();
    Flow {
        id: Uuid::now_v7(),
        project_id: Uuid::now_v7(),
        name: "Payments".to_owned(),
        description: None,
        is_active: true,
        config,
        signing_secret: TEST_SECRET.to_owned(),
        require_signature: false,
        async_mode: false,
        rate_limit_per_minute: None,
        secure_headers: vec!["authorization".to_owned()],
        created_at: now,
        updated_at: now,
    }
}

pub fn test_destination(flow_id: Uuid, url: &str, max_retries: u32) -> DestinationRecord {
    DestinationRecord {
        id: Uuid::now_v7(),
        flow_id,
        name: "primary".to_owned(),
        url: url.to_owned(),
        headers: Default::default(),
        max_retries,
        retry_delay_ms: 0,
        timeout_ms: 5_000,
        is_active: true,
        created_at: Utc::now(),
    }
}

pub fn test_request(path: &str, body: &str, headers: &[(&str, &str)]) -> InboundRequest {
    InboundRequest {
        method: "POST".to_owned(),
        path: path.to_owned(),
        headers: headers
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect(),
        body: Some(body.as_bytes().to_vec()),
        source_ip: "203.0.113.10".to_owned(),
    }
}

pub fn test_log(flow_id: Uuid, received_at: DateTime<Utc>) -> WebhookLog {
    WebhookLog {
        id: Uuid::now_v7(),
        flow_id,
        method: "POST".to_owned(),
        path: format!("/webhook/{flow_id}"),
        headers: [
            ("authorization".to_owned(), "***".to_owned()),
            ("content-type".to_owned(), "application/json".to_owned()),
        ]
        .into_iter()
        .collect(),
        body: Some(r#"{"event":"paid"}"#.to_owned()),
        source_ip: Some("203.0.113.10".to_owned()),
        status: LogStatus::Completed,
        received_at,
        completed_at: Some(received_at),
    }
}
