use std::time::Duration;

use chrono::Utc;

use hooki_gateway::domain::types::{FlowTarget, LimitScope, SIGNATURE_HEADER};
use hooki_gateway::error::GatewayError;
use hooki_gateway::security::signature::SignatureError;
use hooki_gateway::usecase::gate::GatePolicy;
use hooki_testing::graph::GraphBuilder;
use hooki_testing::signature::signature_header;

use crate::helpers::{MockFlowRepo, TEST_SECRET, test_flow, test_gate, test_request};

const BODY: &str = r#"{"event":"invoice.paid"}"#;

// ── Flow resolution ──────────────────────────────────────────────────────────

#[tokio::test]
async fn should_admit_active_flow_by_id() {
    let flow = test_flow(None);
    let gate = test_gate(MockFlowRepo::new(vec![flow.clone()]));

    let admission = gate
        .admit(&test_request("/webhook/x", BODY, &[]), &FlowTarget::Id(flow.id))
        .await
        .unwrap();

    assert_eq!(admission.flow.id, flow.id);
    assert!(admission.flow_limit.allowed);
    assert_eq!(admission.flow_limit.remaining, 999);
}

#[tokio::test]
async fn should_reject_unknown_flow() {
    let gate = test_gate(MockFlowRepo::empty());
    let result = gate
        .admit(
            &test_request("/webhook/x", BODY, &[]),
            &FlowTarget::Id(uuid::Uuid::now_v7()),
        )
        .await;
    assert!(
        matches!(result, Err(GatewayError::FlowNotFound)),
        "expected FlowNotFound, got {result:?}"
    );
}

#[tokio::test]
async fn should_reject_inactive_flow() {
    let mut flow = test_flow(None);
    flow.is_active = false;
    let gate = test_gate(MockFlowRepo::new(vec![flow.clone()]));
    let result = gate
        .admit(&test_request("/webhook/x", BODY, &[]), &FlowTarget::Id(flow.id))
        .await;
    assert!(
        matches!(result, Err(GatewayError::FlowInactive)),
        "expected FlowInactive, got {result:?}"
    );
}

#[tokio::test]
async fn should_resolve_shared_namespace_path_by_graph() {
    let stripe = test_flow(Some(
        GraphBuilder::new()
            .inbound("/api/webhook/stripe")
            .outbound("https://billing.example.com/hook")
            .build(),
    ));
    let github = test_flow(Some(
        GraphBuilder::new()
            .legacy_inbound("/api/webhook/github")
            .build(),
    ));
    let gate = test_gate(MockFlowRepo::new(vec![stripe, github.clone()]));

    let admission = gate
        .admit(
            &test_request("/api/webhook/github", BODY, &[]),
            &FlowTarget::Path("/api/webhook/github".to_owned()),
        )
        .await
        .unwrap();
    assert_eq!(admission.flow.id, github.id);

    let missing = gate
        .admit(
            &test_request("/api/webhook/gitlab", BODY, &[]),
            &FlowTarget::Path("/api/webhook/gitlab".to_owned()),
        )
        .await;
    assert!(matches!(missing, Err(GatewayError::FlowNotFound)));
}

// ── Rate limits ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_reject_source_ip_over_limit() {
    let flow = test_flow(None);
    let mut gate = test_gate(MockFlowRepo::new(vec![flow.clone()]));
    gate.policy = GatePolicy {
        ip_limit: 2,
        ip_window: Duration::from_secs(60),
        ..GatePolicy::default()
    };
    let request = test_request("/webhook/x", BODY, &[]);
    let target = FlowTarget::Id(flow.id);

    gate.admit(&request, &target).await.unwrap();
    gate.admit(&request, &target).await.unwrap();
    let result = gate.admit(&request, &target).await;

    match result {
        Err(GatewayError::RateLimited { scope, decision }) => {
            assert_eq!(scope, LimitScope::Ip);
            assert_eq!(decision.remaining, 0);
            assert_eq!(decision.retry_after_secs, 60);
        }
        other => panic!("expected ip RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn should_charge_ip_budget_before_resolving_flow() {
    let flow = test_flow(None);
    let mut gate = test_gate(MockFlowRepo::new(vec![flow.clone()]));
    gate.policy = GatePolicy {
        ip_limit: 2,
        ..GatePolicy::default()
    };
    let request = test_request("/webhook/x", BODY, &[]);
    let unknown = FlowTarget::Id(uuid::Uuid::now_v7());

    for _ in 0..2 {
        let result = gate.admit(&request, &unknown).await;
        assert!(
            matches!(result, Err(GatewayError::FlowNotFound)),
            "expected FlowNotFound, got {result:?}"
        );
    }

    // Misses spent the budget, so even a known flow is now refused.
    let result = gate.admit(&request, &FlowTarget::Id(flow.id)).await;
    assert!(
        matches!(
            result,
            Err(GatewayError::RateLimited {
                scope: LimitScope::Ip,
                ..
            })
        ),
        "expected ip RateLimited, got {result:?}"
    );
    let result = gate.admit(&request, &unknown).await;
    assert!(
        matches!(
            result,
            Err(GatewayError::RateLimited {
                scope: LimitScope::Ip,
                ..
            })
        ),
        "expected ip RateLimited before lookup, got {result:?}"
    );
}

#[tokio::test]
async fn should_apply_flow_specific_limit() {
    let mut flow = test_flow(None);
    flow.rate_limit_per_minute = Some(1);
    let gate = test_gate(MockFlowRepo::new(vec![flow.clone()]));
    let request = test_request("/webhook/x", BODY, &[]);
    let target = FlowTarget::Id(flow.id);

    gate.admit(&request, &target).await.unwrap();
    let result = gate.admit(&request, &target).await;

    assert!(
        matches!(
            result,
            Err(GatewayError::RateLimited {
                scope: LimitScope::Flow,
                ..
            })
        ),
        "expected flow RateLimited, got {result:?}"
    );
}

// ── Allow-list ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_enforce_inbound_allow_list() {
    let flow = test_flow(Some(
        GraphBuilder::new()
            .inbound_with_ips("/api/webhook/ops", &["198.51.100.0/24"])
            .build(),
    ));
    let gate = test_gate(MockFlowRepo::new(vec![flow.clone()]));
    let target = FlowTarget::Path("/api/webhook/ops".to_owned());

    let mut request = test_request("/api/webhook/ops", BODY, &[]);
    let result = gate.admit(&request, &target).await;
    assert!(
        matches!(result, Err(GatewayError::IpNotAllowed)),
        "expected IpNotAllowed, got {result:?}"
    );

    request.source_ip = "198.51.100.42".to_owned();
    gate.admit(&request, &target).await.unwrap();
}

// ── Signatures ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_require_signature_when_flow_demands_it() {
    let mut flow = test_flow(None);
    flow.require_signature = true;
    let gate = test_gate(MockFlowRepo::new(vec![flow.clone()]));
    let result = gate
        .admit(&test_request("/webhook/x", BODY, &[]), &FlowTarget::Id(flow.id))
        .await;
    assert!(
        matches!(
            result,
            Err(GatewayError::InvalidSignature(SignatureError::Missing))
        ),
        "expected missing signature, got {result:?}"
    );
}

#[tokio::test]
async fn should_accept_provider_signature() {
    let mut flow = test_flow(None);
    flow.require_signature = true;
    let gate = test_gate(MockFlowRepo::new(vec![flow.clone()]));
    let header = signature_header(TEST_SECRET, Utc::now().timestamp_millis(), BODY);

    gate.admit(
        &test_request("/webhook/x", BODY, &[(SIGNATURE_HEADER, header.as_str())]),
        &FlowTarget::Id(flow.id),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn should_reject_signature_older_than_five_minutes() {
    let mut flow = test_flow(None);
    flow.require_signature = true;
    let gate = test_gate(MockFlowRepo::new(vec![flow.clone()]));
    let stale = Utc::now().timestamp_millis() - 5 * 60 * 1000 - 1_000;
    let header = signature_header(TEST_SECRET, stale, BODY);

    let result = gate
        .admit(
            &test_request("/webhook/x", BODY, &[(SIGNATURE_HEADER, header.as_str())]),
            &FlowTarget::Id(flow.id),
        )
        .await;
    assert!(
        matches!(
            result,
            Err(GatewayError::InvalidSignature(SignatureError::Expired))
        ),
        "expected expired signature, got {result:?}"
    );
}

#[tokio::test]
async fn should_reject_signature_over_tampered_body() {
    let mut flow = test_flow(None);
    flow.require_signature = true;
    let gate = test_gate(MockFlowRepo::new(vec![flow.clone()]));
    let header = signature_header(TEST_SECRET, Utc::now().timestamp_millis(), BODY);

    let result = gate
        .admit(
            &test_request(
                "/webhook/x",
                r#"{"event":"invoice.refunded"}"#,
                &[(SIGNATURE_HEADER, header.as_str())],
            ),
            &FlowTarget::Id(flow.id),
        )
        .await;
    assert!(matches!(
        result,
        Err(GatewayError::InvalidSignature(SignatureError::Mismatch))
    ));
}
