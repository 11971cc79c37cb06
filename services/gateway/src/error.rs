use std::time::Duration;

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::domain::types::{LimitScope, RateLimitDecision};
use crate::security::signature::SignatureError;

/// Gateway service error variants.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{scope} rate limit exceeded")]
    RateLimited {
        scope: LimitScope,
        decision: RateLimitDecision,
    },
    #[error("flow not found")]
    FlowNotFound,
    #[error("flow is inactive")]
    FlowInactive,
    #[error("ip not allowed")]
    IpNotAllowed,
    #[error(transparent)]
    InvalidSignature(#[from] SignatureError),
    #[error("log not found")]
    LogNotFound,
    #[error("route {route:?} is already used by flow {flow_name:?}")]
    RouteConflict { route: String, flow_name: String },
    #[error("invalid destination: {0}")]
    InvalidDestination(String),
    #[error("invalid flow config: {0}")]
    InvalidConfig(String),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::FlowNotFound => "FLOW_NOT_FOUND",
            Self::FlowInactive => "FLOW_INACTIVE",
            Self::IpNotAllowed => "IP_NOT_ALLOWED",
            Self::InvalidSignature(_) => "INVALID_SIGNATURE",
            Self::LogNotFound => "LOG_NOT_FOUND",
            Self::RouteConflict { .. } => "ROUTE_CONFLICT",
            Self::InvalidDestination(_) => "INVALID_DESTINATION",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::FlowNotFound | Self::LogNotFound => StatusCode::NOT_FOUND,
            Self::FlowInactive => StatusCode::SERVICE_UNAVAILABLE,
            Self::IpNotAllowed => StatusCode::FORBIDDEN,
            Self::InvalidSignature(_) => StatusCode::UNAUTHORIZED,
            Self::RouteConflict { .. } => StatusCode::CONFLICT,
            Self::InvalidDestination(_) | Self::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // Gate rejections are expected traffic and already visible in the
        // TraceLayer span; only internal failures carry a chain worth logging.
        if let Self::Internal(ref e) = self {
            tracing::error!(error = ?e, kind = "INTERNAL", "internal error");
        }
        let body = serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        let mut response = (status, axum::Json(body)).into_response();
        if let Self::RateLimited { decision, .. } = &self {
            let headers = response.headers_mut();
            headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
            headers.insert("x-ratelimit-reset", HeaderValue::from(decision.reset_at_ms));
            headers.insert("retry-after", HeaderValue::from(decision.retry_after_secs));
        }
        response
    }
}

/// Why a single delivery try did not produce a response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("destination blocked: {0}")]
    Blocked(String),
}
