use std::collections::BTreeMap;

use serde_json::json;
use uuid::Uuid;

use hooki_gateway::error::GatewayError;
use hooki_gateway::usecase::flows::{
    AddDestinationUseCase, DestinationInput, FlowInput, RotateSecretUseCase, SaveFlowUseCase,
};
use hooki_testing::graph::GraphBuilder;

use crate::helpers::{MockFlowRepo, TEST_SECRET, test_destination, test_flow, test_resolver};

fn input(name: &str, config: Option<serde_json::Value>) -> FlowInput {
    FlowInput {
        project_id: Uuid::now_v7(),
        name: name.to_owned(),
        description: None,
        is_active: true,
        config,
        require_signature: true,
        async_mode: false,
        rate_limit_per_minute: None,
        secure_headers: None,
    }
}

fn destination_input(url: &str) -> DestinationInput {
    DestinationInput {
        name: "crm".to_owned(),
        url: url.to_owned(),
        headers: BTreeMap::new(),
        max_retries: None,
        retry_delay_ms: None,
        timeout_ms: None,
    }
}

// ── SaveFlowUseCase ──────────────────────────────────────────────────────────

#[tokio::test]
async fn should_create_flow_with_generated_secret() {
    let repo = MockFlowRepo::empty();
    let usecase = SaveFlowUseCase {
        resolver: test_resolver(repo.clone()),
    };

    let flow = usecase
        .execute(
            None,
            input(
                "Stripe",
                Some(
                    GraphBuilder::new()
                        .inbound("/api/webhook/stripe")
                        .outbound("https://billing.example.com/hook")
                        .build(),
                ),
            ),
        )
        .await
        .unwrap();

    assert_eq!(flow.signing_secret.len(), 64);
    assert_eq!(flow.secure_headers, vec!["authorization".to_owned()]);
    assert!(!flow.async_mode);
    assert_eq!(repo.flows_handle().lock().unwrap().len(), 1);
}

#[tokio::test]
async fn should_reject_inbound_path_owned_by_another_flow() {
    let mut existing = test_flow(Some(
        GraphBuilder::new().inbound("/api/webhook/stripe").build(),
    ));
    existing.name = "Stripe live".to_owned();
    // Inactive flows still own their paths.
    existing.is_active = false;
    let usecase = SaveFlowUseCase {
        resolver: test_resolver(MockFlowRepo::new(vec![existing])),
    };

    let result = usecase
        .execute(
            None,
            input(
                "Stripe copy",
                Some(GraphBuilder::new().inbound("/api/webhook/stripe").build()),
            ),
        )
        .await;

    match result {
        Err(e @ GatewayError::RouteConflict { .. }) => assert_eq!(
            e.to_string(),
            r#"route "/api/webhook/stripe" is already used by flow "Stripe live""#
        ),
        other => panic!("expected RouteConflict, got {other:?}"),
    }
}

#[tokio::test]
async fn should_allow_flow_to_keep_its_own_paths_on_update() {
    let existing = test_flow(Some(
        GraphBuilder::new().inbound("/api/webhook/stripe").build(),
    ));
    let repo = MockFlowRepo::new(vec![existing.clone()]);
    let usecase = SaveFlowUseCase {
        resolver: test_resolver(repo.clone()),
    };

    let mut update = input(
        "Stripe renamed",
        Some(GraphBuilder::new().inbound("/api/webhook/stripe").build()),
    );
    update.secure_headers = Some(vec!["X-Api-Key".to_owned()]);
    let flow = usecase.execute(Some(existing.id), update).await.unwrap();

    assert_eq!(flow.id, existing.id);
    assert_eq!(flow.name, "Stripe renamed");
    assert_eq!(flow.signing_secret, TEST_SECRET);
    assert_eq!(flow.created_at, existing.created_at);
    assert_eq!(flow.secure_headers, vec!["x-api-key".to_owned()]);
    assert_eq!(repo.flows_handle().lock().unwrap().len(), 1);
}

#[tokio::test]
async fn should_force_async_for_multiple_outbound_nodes() {
    let usecase = SaveFlowUseCase {
        resolver: test_resolver(MockFlowRepo::empty()),
    };

    let flow = usecase
        .execute(
            None,
            input(
                "Fan-out",
                Some(
                    GraphBuilder::new()
                        .inbound("/api/webhook/orders")
                        .outbound("https://erp.example.com/hook")
                        .outbound("https://crm.example.com/hook")
                        .build(),
                ),
            ),
        )
        .await
        .unwrap();

    assert!(flow.async_mode);
}

#[tokio::test]
async fn should_reject_private_outbound_url() {
    let usecase = SaveFlowUseCase {
        resolver: test_resolver(MockFlowRepo::empty()),
    };

    let result = usecase
        .execute(
            None,
            input(
                "Internal",
                Some(
                    GraphBuilder::new()
                        .inbound("/api/webhook/internal")
                        .outbound("http://169.254.169.254/latest/meta-data")
                        .build(),
                ),
            ),
        )
        .await;

    assert!(
        matches!(result, Err(GatewayError::InvalidDestination(_))),
        "expected InvalidDestination, got {result:?}"
    );
}

#[tokio::test]
async fn should_reject_malformed_graph() {
    let usecase = SaveFlowUseCase {
        resolver: test_resolver(MockFlowRepo::empty()),
    };

    let result = usecase
        .execute(None, input("Broken", Some(json!({"nodes": "not-a-list"}))))
        .await;

    assert!(
        matches!(result, Err(GatewayError::InvalidConfig(_))),
        "expected InvalidConfig, got {result:?}"
    );
}

#[tokio::test]
async fn should_reject_rate_limit_outside_storable_range() {
    let repo = MockFlowRepo::empty();
    let usecase = SaveFlowUseCase {
        resolver: test_resolver(repo.clone()),
    };

    for limit in [0, 1_000_001, i32::MAX as u32 + 1, u32::MAX] {
        let mut flow = input("Limited", None);
        flow.rate_limit_per_minute = Some(limit);
        let result = usecase.execute(None, flow).await;
        assert!(
            matches!(result, Err(GatewayError::InvalidConfig(_))),
            "expected InvalidConfig for {limit}, got {result:?}"
        );
    }
    assert!(repo.flows.lock().unwrap().is_empty());

    let mut flow = input("Limited", None);
    flow.rate_limit_per_minute = Some(1_000_000);
    let saved = usecase.execute(None, flow).await.unwrap();
    assert_eq!(saved.rate_limit_per_minute, Some(1_000_000));
}

#[tokio::test]
async fn should_reject_unknown_flow_on_update() {
    let usecase = SaveFlowUseCase {
        resolver: test_resolver(MockFlowRepo::empty()),
    };
    let result = usecase.execute(Some(Uuid::now_v7()), input("Ghost", None)).await;
    assert!(matches!(result, Err(GatewayError::FlowNotFound)));
}

// ── RotateSecretUseCase ──────────────────────────────────────────────────────

#[tokio::test]
async fn should_replace_signing_secret() {
    let flow = test_flow(None);
    let repo = MockFlowRepo::new(vec![flow.clone()]);
    let usecase = RotateSecretUseCase {
        flows: repo.clone(),
    };

    let secret = usecase.execute(flow.id).await.unwrap();

    assert_ne!(secret, TEST_SECRET);
    assert_eq!(secret.len(), 64);
    assert_eq!(repo.flows_handle().lock().unwrap()[0].signing_secret, secret);
}

#[tokio::test]
async fn should_reject_rotation_for_unknown_flow() {
    let usecase = RotateSecretUseCase {
        flows: MockFlowRepo::empty(),
    };
    let result = usecase.execute(Uuid::now_v7()).await;
    assert!(matches!(result, Err(GatewayError::FlowNotFound)));
}

// ── AddDestinationUseCase ────────────────────────────────────────────────────

#[tokio::test]
async fn should_add_destination_with_defaults() {
    let flow = test_flow(None);
    let repo = MockFlowRepo::new(vec![flow.clone()]);
    let usecase = AddDestinationUseCase {
        resolver: test_resolver(repo.clone()),
    };

    let record = usecase
        .execute(flow.id, destination_input("https://crm.example.com/hook"))
        .await
        .unwrap();

    assert_eq!(record.flow_id, flow.id);
    assert_eq!(record.url, "https://crm.example.com/hook");
    assert_eq!(record.max_retries, 3);
    assert_eq!(record.timeout_ms, 5_000);
    assert!(record.is_active);
    assert!(!repo.flows_handle().lock().unwrap()[0].async_mode);
}

#[tokio::test]
async fn should_force_async_once_flow_has_two_destinations() {
    let flow = test_flow(None);
    let repo = MockFlowRepo::new(vec![flow.clone()])
        .with_destinations(vec![test_destination(flow.id, "https://erp.example.com/hook", 3)]);
    let usecase = AddDestinationUseCase {
        resolver: test_resolver(repo.clone()),
    };

    usecase
        .execute(flow.id, destination_input("https://crm.example.com/hook"))
        .await
        .unwrap();

    assert!(repo.flows_handle().lock().unwrap()[0].async_mode);
}

#[tokio::test]
async fn should_validate_destination_settings() {
    let flow = test_flow(None);
    let usecase = AddDestinationUseCase {
        resolver: test_resolver(MockFlowRepo::new(vec![flow.clone()])),
    };

    let private = usecase
        .execute(flow.id, destination_input("http://10.0.0.5/hook"))
        .await;
    assert!(matches!(private, Err(GatewayError::InvalidDestination(_))));

    let mut too_many = destination_input("https://crm.example.com/hook");
    too_many.max_retries = Some(11);
    let result = usecase.execute(flow.id, too_many).await;
    assert!(matches!(result, Err(GatewayError::InvalidDestination(_))));

    let mut too_fast = destination_input("https://crm.example.com/hook");
    too_fast.timeout_ms = Some(500);
    let result = usecase.execute(flow.id, too_fast).await;
    assert!(matches!(result, Err(GatewayError::InvalidDestination(_))));
}

#[tokio::test]
async fn should_reject_retry_delay_outside_range() {
    let flow = test_flow(None);
    let repo = MockFlowRepo::new(vec![flow.clone()]);
    let usecase = AddDestinationUseCase {
        resolver: test_resolver(repo.clone()),
    };

    for delay in [3_600_001, i32::MAX as u64 + 1, u64::MAX] {
        let mut slow = destination_input("https://crm.example.com/hook");
        slow.retry_delay_ms = Some(delay);
        let result = usecase.execute(flow.id, slow).await;
        assert!(
            matches!(result, Err(GatewayError::InvalidDestination(_))),
            "expected InvalidDestination for {delay}, got {result:?}"
        );
    }

    let mut longest = destination_input("https://crm.example.com/hook");
    longest.retry_delay_ms = Some(3_600_000);
    let record = usecase.execute(flow.id, longest).await.unwrap();
    assert_eq!(record.retry_delay_ms, 3_600_000);

    let mut immediate = destination_input("https://crm.example.com/hook");
    immediate.retry_delay_ms = Some(0);
    let record = usecase.execute(flow.id, immediate).await.unwrap();
    assert_eq!(record.retry_delay_ms, 0);
}
