use std::sync::Arc;
use std::time::Duration;

use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;
use crate::infra::db::{DbAuditLog, DbFlowRepository, DbJobQueue};
use crate::infra::events::EventBusBackend;
use crate::infra::http::HttpDeliveryClient;
use crate::infra::rate_limit::RateLimiterBackend;
use crate::usecase::deliver::{DeliveryEngine, DeliveryPolicy};
use crate::usecase::gate::{GatePolicy, SecurityGate};
use crate::usecase::resolve::{DestinationDefaults, FlowResolver};

pub type GatewayEngine =
    DeliveryEngine<DbAuditLog, EventBusBackend, DbJobQueue, HttpDeliveryClient>;

/// Shared application state passed to every handler via axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub limiter: RateLimiterBackend,
    pub events: EventBusBackend,
    pub http: HttpDeliveryClient,
    pub config: Arc<GatewayConfig>,
    /// Cancelled on shutdown. Live subscriptions hold child tokens.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn flow_repo(&self) -> DbFlowRepository {
        DbFlowRepository {
            db: self.db.clone(),
        }
    }

    pub fn audit_log(&self) -> DbAuditLog {
        DbAuditLog {
            db: self.db.clone(),
        }
    }

    pub fn job_queue(&self) -> DbJobQueue {
        DbJobQueue {
            db: self.db.clone(),
        }
    }

    pub fn destination_defaults(&self) -> DestinationDefaults {
        DestinationDefaults {
            max_retries: self.config.default_max_retries,
            retry_delay_ms: self.config.default_retry_delay_ms,
            timeout_ms: self.config.default_timeout_ms,
        }
    }

    pub fn resolver(&self) -> FlowResolver<DbFlowRepository> {
        FlowResolver {
            flows: self.flow_repo(),
            defaults: self.destination_defaults(),
        }
    }

    pub fn gate(&self) -> SecurityGate<DbFlowRepository, RateLimiterBackend> {
        let config = &self.config;
        SecurityGate {
            resolver: self.resolver(),
            limiter: self.limiter.clone(),
            policy: GatePolicy {
                ip_limit: config.ip_rate_limit,
                ip_window: Duration::from_millis(config.ip_rate_window_ms),
                flow_limit: config.flow_rate_limit,
                flow_window: Duration::from_millis(config.flow_rate_window_ms),
                signature_max_age_ms: config.signature_max_age_ms,
            },
        }
    }

    pub fn engine(&self) -> GatewayEngine {
        DeliveryEngine {
            logs: self.audit_log(),
            events: self.events.clone(),
            queue: self.job_queue(),
            client: self.http.clone(),
            policy: DeliveryPolicy {
                ssrf_check: self.config.delivery_ssrf_check,
            },
        }
    }
}
