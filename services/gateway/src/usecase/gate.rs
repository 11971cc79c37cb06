use std::time::Duration;

use chrono::Utc;

use crate::domain::repository::{FlowRepository, RateLimiter};
use crate::domain::types::{
    Flow, FlowTarget, InboundRequest, LimitScope, RateLimitDecision, SIGNATURE_HEADER,
};
use crate::error::GatewayError;
use crate::security::{allow_list, signature};
use crate::usecase::resolve::FlowResolver;

#[derive(Debug, Clone, Copy)]
pub struct GatePolicy {
    pub ip_limit: u32,
    pub ip_window: Duration,
    /// Used when the flow has no `rate_limit_per_minute`.
    pub flow_limit: u32,
    pub flow_window: Duration,
    pub signature_max_age_ms: i64,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            ip_limit: 100,
            ip_window: Duration::from_secs(60),
            flow_limit: 1000,
            flow_window: Duration::from_secs(60),
            signature_max_age_ms: signature::DEFAULT_MAX_AGE_MS,
        }
    }
}

/// A request that passed every check.
#[derive(Debug, Clone)]
pub struct Admission {
    pub flow: Flow,
    /// Flow window state after this request, for response headers.
    pub flow_limit: RateLimitDecision,
}

pub struct SecurityGate<F, R>
where
    F: FlowRepository,
    R: RateLimiter,
{
    pub resolver: FlowResolver<F>,
    pub limiter: R,
    pub policy: GatePolicy,
}

impl<F, R> SecurityGate<F, R>
where
    F: FlowRepository,
    R: RateLimiter,
{
    /// Run the checks in order, stopping at the first failure:
    /// IP rate limit, flow lookup, flow rate limit, IP allow-list, signature.
    pub async fn admit(
        &self,
        request: &InboundRequest,
        target: &FlowTarget,
    ) -> Result<Admission, GatewayError> {
        let ip = self
            .limiter
            .hit(
                &format!("ip:{}", request.source_ip),
                self.policy.ip_limit,
                self.policy.ip_window,
            )
            .await?;
        if !ip.allowed {
            tracing::warn!(source_ip = %request.source_ip, "ip rate limit exceeded");
            return Err(GatewayError::RateLimited {
                scope: LimitScope::Ip,
                decision: ip,
            });
        }

        let flow = self.resolver.resolve(target).await?;

        let limit = flow.rate_limit_per_minute.unwrap_or(self.policy.flow_limit);
        let flow_limit = self
            .limiter
            .hit(&format!("flow:{}", flow.id), limit, self.policy.flow_window)
            .await?;
        if !flow_limit.allowed {
            tracing::warn!(flow_id = %flow.id, limit, "flow rate limit exceeded");
            return Err(GatewayError::RateLimited {
                scope: LimitScope::Flow,
                decision: flow_limit,
            });
        }

        let graph = flow.graph();
        if !allow_list::is_allowed(&request.source_ip, graph.allowed_ips(&request.path)) {
            tracing::warn!(
                flow_id = %flow.id,
                source_ip = %request.source_ip,
                path = %request.path,
                "source ip not in allow-list"
            );
            return Err(GatewayError::IpNotAllowed);
        }

        if flow.require_signature {
            signature::verify(
                request.header(SIGNATURE_HEADER),
                request.body.as_deref().unwrap_or_default(),
                &flow.signing_secret,
                Utc::now().timestamp_millis(),
                self.policy.signature_max_age_ms,
            )
            .inspect_err(|e| {
                tracing::warn!(flow_id = %flow.id, reason = %e, "signature rejected");
            })?;
        }

        Ok(Admission { flow, flow_limit })
    }
}
