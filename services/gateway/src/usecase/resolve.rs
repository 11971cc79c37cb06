use uuid::Uuid;

use hooki_domain::graph::FlowGraph;

use crate::domain::repository::FlowRepository;
use crate::domain::types::{Destination, Flow, FlowTarget};
use crate::error::GatewayError;

/// Settings applied to destinations embedded in the flow graph, which carry
/// only a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestinationDefaults {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_ms: u64,
}

impl Default for DestinationDefaults {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1000,
            timeout_ms: 30_000,
        }
    }
}

/// One destination per outbound node, in node order.
pub fn graph_destinations(graph: &FlowGraph, defaults: DestinationDefaults) -> Vec<Destination> {
    graph
        .outbound_targets()
        .map(|(node_id, url)| Destination {
            key: node_id.to_owned(),
            table_id: None,
            url: url.to_owned(),
            headers: Default::default(),
            max_retries: defaults.max_retries,
            retry_delay_ms: defaults.retry_delay_ms,
            timeout_ms: defaults.timeout_ms,
        })
        .collect()
}

pub struct FlowResolver<F>
where
    F: FlowRepository,
{
    pub flows: F,
    pub defaults: DestinationDefaults,
}

impl<F> FlowResolver<F>
where
    F: FlowRepository,
{
    /// Active flow by id. Distinguishes unknown (404) from inactive (503).
    pub async fn resolve_by_id(&self, id: Uuid) -> Result<Flow, GatewayError> {
        let flow = self
            .flows
            .find_by_id(id)
            .await?
            .ok_or(GatewayError::FlowNotFound)?;
        if !flow.is_active {
            return Err(GatewayError::FlowInactive);
        }
        Ok(flow)
    }

    /// The active flow whose graph declares `path`.
    pub async fn resolve_by_path(&self, path: &str) -> Result<Flow, GatewayError> {
        // Inbound paths are unique across flows, so the first hit is the only one.
        self.flows
            .list_active()
            .await?
            .into_iter()
            .find(|flow| flow.graph().declares_path(path))
            .ok_or(GatewayError::FlowNotFound)
    }

    pub async fn resolve(&self, target: &FlowTarget) -> Result<Flow, GatewayError> {
        match target {
            FlowTarget::Id(id) => self.resolve_by_id(*id).await,
            FlowTarget::Path(path) => self.resolve_by_path(path).await,
        }
    }

    /// Normalized delivery targets. Active table rows win over graph nodes.
    pub async fn destinations(&self, flow: &Flow) -> Result<Vec<Destination>, GatewayError> {
        let records = self.flows.active_destinations(flow.id).await?;
        if !records.is_empty() {
            return Ok(records.iter().map(Destination::from).collect());
        }
        Ok(graph_destinations(&flow.graph(), self.defaults))
    }
}
