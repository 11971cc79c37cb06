use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use hooki_domain::graph::FlowGraph;

use crate::domain::repository::FlowRepository;
use crate::domain::types::{DEFAULT_SECURE_HEADERS, DestinationRecord, Flow};
use crate::error::GatewayError;
use crate::security::{generate_secret, ssrf};
use crate::usecase::resolve::FlowResolver;

pub const MAX_RETRIES_RANGE: std::ops::RangeInclusive<u32> = 0..=10;
pub const TIMEOUT_MS_RANGE: std::ops::RangeInclusive<u64> = 1_000..=120_000;
pub const RETRY_DELAY_MS_RANGE: std::ops::RangeInclusive<u64> = 0..=3_600_000;
pub const RATE_LIMIT_PER_MINUTE_RANGE: std::ops::RangeInclusive<u32> = 1..=1_000_000;

/// Reject a graph whose outbound URLs point at private or internal hosts.
fn check_outbound_urls(graph: &FlowGraph) -> Result<(), GatewayError> {
    for (_, url) in graph.outbound_targets() {
        ssrf::validate_destination_url(url).map_err(|e| {
            GatewayError::InvalidDestination(format!("{}: {e}", ssrf::redact_url(url)))
        })?;
    }
    Ok(())
}

/// Reject inbound paths already declared by any other flow, active or not.
async fn check_route_conflicts<F: FlowRepository>(
    flows: &F,
    graph: &FlowGraph,
    own_id: Option<Uuid>,
) -> Result<(), GatewayError> {
    let paths: Vec<&str> = graph.inbound_paths().collect();
    if paths.is_empty() {
        return Ok(());
    }
    for other in flows.list_all().await? {
        if Some(other.id) == own_id {
            continue;
        }
        let other_graph = other.graph();
        if let Some(route) = paths.iter().find(|p| other_graph.declares_path(p)) {
            return Err(GatewayError::RouteConflict {
                route: (*route).to_owned(),
                flow_name: other.name,
            });
        }
    }
    Ok(())
}

// ── SaveFlow ─────────────────────────────────────────────────────────────────

pub struct FlowInput {
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub config: Option<Value>,
    pub require_signature: bool,
    pub async_mode: bool,
    pub rate_limit_per_minute: Option<u32>,
    pub secure_headers: Option<Vec<String>>,
}

pub struct SaveFlowUseCase<F: FlowRepository> {
    pub resolver: FlowResolver<F>,
}

impl<F: FlowRepository> SaveFlowUseCase<F> {
    /// Create a flow (`flow_id` is `None`) or replace an existing one.
    ///
    /// Flows that resolve to more than one destination are switched to async.
    pub async fn execute(
        &self,
        flow_id: Option<Uuid>,
        input: FlowInput,
    ) -> Result<Flow, GatewayError> {
        if input.name.trim().is_empty() {
            return Err(GatewayError::InvalidConfig("name is required".to_owned()));
        }
        if input
            .rate_limit_per_minute
            .is_some_and(|limit| !RATE_LIMIT_PER_MINUTE_RANGE.contains(&limit))
        {
            return Err(GatewayError::InvalidConfig(
                "rateLimitPerMinute must be between 1 and 1000000".to_owned(),
            ));
        }
        let graph = match &input.config {
            Some(config) => FlowGraph::parse(config)
                .map_err(|e| GatewayError::InvalidConfig(e.to_string()))?,
            None => FlowGraph::default(),
        };
        check_outbound_urls(&graph)?;
        check_route_conflicts(&self.resolver.flows, &graph, flow_id).await?;

        let now = Utc::now();
        let existing = match flow_id {
            Some(id) => Some(
                self.resolver
                    .flows
                    .find_by_id(id)
                    .await?
                    .ok_or(GatewayError::FlowNotFound)?,
            ),
            None => None,
        };
        let secure_headers = input
            .secure_headers
            .map(|headers| headers.iter().map(|h| h.to_ascii_lowercase()).collect())
            .or_else(|| existing.as_ref().map(|f| f.secure_headers.clone()))
            .unwrap_or_else(|| {
                DEFAULT_SECURE_HEADERS
                    .iter()
                    .map(|h| (*h).to_owned())
                    .collect()
            });

        let mut flow = Flow {
            id: existing.as_ref().map_or_else(Uuid::now_v7, |f| f.id),
            project_id: input.project_id,
            name: input.name,
            description: input.description,
            is_active: input.is_active,
            config: input.config,
            signing_secret: existing
                .as_ref()
                .map_or_else(generate_secret, |f| f.signing_secret.clone()),
            require_signature: input.require_signature,
            async_mode: input.async_mode,
            rate_limit_per_minute: input.rate_limit_per_minute,
            secure_headers,
            created_at: existing.as_ref().map_or(now, |f| f.created_at),
            updated_at: now,
        };
        if !flow.async_mode && self.resolver.destinations(&flow).await?.len() > 1 {
            flow.async_mode = true;
        }
        self.resolver.flows.save(&flow).await?;
        tracing::info!(
            flow_id = %flow.id,
            created = existing.is_none(),
            async_mode = flow.async_mode,
            "flow saved"
        );
        Ok(flow)
    }
}

// ── RotateSecret ─────────────────────────────────────────────────────────────

pub struct RotateSecretUseCase<F: FlowRepository> {
    pub flows: F,
}

impl<F: FlowRepository> RotateSecretUseCase<F> {
    /// Replace the signing secret and return the new value. Signatures made
    /// with the old secret stop verifying immediately.
    pub async fn execute(&self, flow_id: Uuid) -> Result<String, GatewayError> {
        let secret = generate_secret();
        if !self.flows.update_secret(flow_id, &secret).await? {
            return Err(GatewayError::FlowNotFound);
        }
        tracing::info!(flow_id = %flow_id, "signing secret rotated");
        Ok(secret)
    }
}

// ── AddDestination ───────────────────────────────────────────────────────────

pub struct DestinationInput {
    pub name: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
}

pub struct AddDestinationUseCase<F: FlowRepository> {
    pub resolver: FlowResolver<F>,
}

impl<F: FlowRepository> AddDestinationUseCase<F> {
    pub async fn execute(
        &self,
        flow_id: Uuid,
        input: DestinationInput,
    ) -> Result<DestinationRecord, GatewayError> {
        let mut flow = self
            .resolver
            .flows
            .find_by_id(flow_id)
            .await?
            .ok_or(GatewayError::FlowNotFound)?;

        ssrf::validate_destination_url(&input.url)
            .map_err(|e| GatewayError::InvalidDestination(e.to_string()))?;
        let defaults = self.resolver.defaults;
        let max_retries = input.max_retries.unwrap_or(defaults.max_retries);
        if !MAX_RETRIES_RANGE.contains(&max_retries) {
            return Err(GatewayError::InvalidDestination(
                "maxRetries must be between 0 and 10".to_owned(),
            ));
        }
        let timeout_ms = input.timeout_ms.unwrap_or(defaults.timeout_ms);
        if !TIMEOUT_MS_RANGE.contains(&timeout_ms) {
            return Err(GatewayError::InvalidDestination(
                "timeoutMs must be between 1000 and 120000".to_owned(),
            ));
        }
        let retry_delay_ms = input.retry_delay_ms.unwrap_or(defaults.retry_delay_ms);
        if !RETRY_DELAY_MS_RANGE.contains(&retry_delay_ms) {
            return Err(GatewayError::InvalidDestination(
                "retryDelayMs must be between 0 and 3600000".to_owned(),
            ));
        }

        let record = DestinationRecord {
            id: Uuid::now_v7(),
            flow_id,
            name: input.name,
            url: input.url,
            headers: input.headers,
            max_retries,
            retry_delay_ms,
            timeout_ms,
            is_active: true,
            created_at: Utc::now(),
        };
        self.resolver.flows.insert_destination(&record).await?;

        if !flow.async_mode && self.resolver.destinations(&flow).await?.len() > 1 {
            flow.async_mode = true;
            flow.updated_at = Utc::now();
            self.resolver.flows.save(&flow).await?;
        }
        tracing::info!(flow_id = %flow_id, destination_id = %record.id, "destination added");
        Ok(record)
    }
}
