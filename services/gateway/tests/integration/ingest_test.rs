use chrono::Utc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hooki_domain::status::{AttemptStatus, LogStatus};
use hooki_gateway::domain::types::{
    DELIVERY_ID_HEADER, DeliveryMode, FlowTarget, SIGNATURE_HEADER,
};
use hooki_gateway::error::DeliveryError;
use hooki_gateway::infra::events::LocalEventBus;
use hooki_gateway::infra::http::HttpDeliveryClient;
use hooki_gateway::infra::rate_limit::LocalRateLimiter;
use hooki_gateway::security::signature;
use hooki_gateway::usecase::ingest::{Dispatch, IngestWebhookUseCase};
use hooki_testing::graph::GraphBuilder;
use hooki_testing::signature::signature_header;

use crate::helpers::{
    MockAuditLog, MockFlowRepo, MockJobQueue, TEST_SECRET, test_engine, test_flow, test_gate,
    test_request,
};

const BODY: &str = r#"{"event":"invoice.paid","amount":4200}"#;

type TestIngest = IngestWebhookUseCase<
    MockFlowRepo,
    LocalRateLimiter,
    MockAuditLog,
    LocalEventBus,
    MockJobQueue,
    HttpDeliveryClient,
>;

fn ingest(flows: MockFlowRepo, logs: MockAuditLog, queue: MockJobQueue) -> TestIngest {
    IngestWebhookUseCase {
        gate: test_gate(flows),
        engine: test_engine(logs, LocalEventBus::new(), queue),
    }
}

// ── Sync mode ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_pass_single_destination_response_through() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(201).set_body_string("created"))
        .expect(1)
        .mount(&server)
        .await;

    let flow = test_flow(Some(
        GraphBuilder::new()
            .inbound("/api/webhook/billing")
            .outbound(&format!("{}/hook", server.uri()))
            .build(),
    ));
    let logs = MockAuditLog::empty();
    let usecase = ingest(
        MockFlowRepo::new(vec![flow.clone()]),
        logs.clone(),
        MockJobQueue::empty(),
    );

    let ingested = usecase
        .execute(
            test_request(
                "/api/webhook/billing",
                BODY,
                &[("content-type", "application/json")],
            ),
            FlowTarget::Path("/api/webhook/billing".to_owned()),
        )
        .await
        .unwrap();

    assert_eq!(ingested.mode, DeliveryMode::Sync);
    let Dispatch::Sync(outcomes) = ingested.dispatch else {
        panic!("expected sync dispatch");
    };
    assert_eq!(outcomes.len(), 1);
    let response = outcomes[0].result.as_ref().unwrap();
    assert_eq!(response.status, 201);
    assert_eq!(response.body, b"created");

    let log = logs.log(ingested.log_id);
    assert_eq!(log.status, LogStatus::Completed);
    assert!(log.completed_at.is_some());
    let attempts = logs.attempts_of(log.id);
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, AttemptStatus::Success);
    assert_eq!(attempts[0].attempt_number, 1);
    assert_eq!(attempts[0].response_status, Some(201));

    // The destination sees a fresh gateway signature and the attempt id.
    let received = &server.received_requests().await.unwrap()[0];
    let header = received.headers.get(SIGNATURE_HEADER).unwrap().to_str().unwrap();
    let body = String::from_utf8(received.body.clone()).unwrap();
    assert_eq!(body, BODY);
    signature::verify(
        Some(header),
        body.as_bytes(),
        TEST_SECRET,
        Utc::now().timestamp_millis(),
        signature::DEFAULT_MAX_AGE_MS,
    )
    .unwrap();
    assert_eq!(
        received.headers.get(DELIVERY_ID_HEADER).unwrap().to_str().unwrap(),
        attempts[0].id.to_string()
    );
}

#[tokio::test]
async fn should_mark_log_failed_when_destination_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let flow = test_flow(Some(
        GraphBuilder::new()
            .inbound("/api/webhook/billing")
            .outbound(&format!("{}/hook", server.uri()))
            .build(),
    ));
    let logs = MockAuditLog::empty();
    let usecase = ingest(
        MockFlowRepo::new(vec![flow.clone()]),
        logs.clone(),
        MockJobQueue::empty(),
    );

    let ingested = usecase
        .execute(test_request("/webhook/x", BODY, &[]), FlowTarget::Id(flow.id))
        .await
        .unwrap();

    let Dispatch::Sync(outcomes) = ingested.dispatch else {
        panic!("expected sync dispatch");
    };
    assert_eq!(outcomes[0].result.as_ref().unwrap().status, 503);
    assert_eq!(outcomes[0].failure_reason().as_deref(), Some("HTTP 503"));

    let log = logs.log(ingested.log_id);
    assert_eq!(log.status, LogStatus::Failed);
    let attempts = logs.attempts_of(log.id);
    assert_eq!(attempts[0].status, AttemptStatus::Failed);
    assert_eq!(attempts[0].error_message.as_deref(), Some("HTTP 503"));
}

#[tokio::test]
async fn should_report_network_error_for_unreachable_destination() {
    // Bind then drop a server so the port is known to refuse connections.
    let uri = {
        let server = MockServer::start().await;
        server.uri()
    };
    let flow = test_flow(Some(
        GraphBuilder::new()
            .inbound("/api/webhook/billing")
            .outbound(&format!("{uri}/hook"))
            .build(),
    ));
    let logs = MockAuditLog::empty();
    let usecase = ingest(
        MockFlowRepo::new(vec![flow.clone()]),
        logs.clone(),
        MockJobQueue::empty(),
    );

    let ingested = usecase
        .execute(test_request("/webhook/x", BODY, &[]), FlowTarget::Id(flow.id))
        .await
        .unwrap();

    let Dispatch::Sync(outcomes) = ingested.dispatch else {
        panic!("expected sync dispatch");
    };
    assert!(
        matches!(outcomes[0].result, Err(DeliveryError::Network(_))),
        "expected network error, got {:?}",
        outcomes[0].result
    );
    assert_eq!(logs.log(ingested.log_id).status, LogStatus::Failed);
}

#[tokio::test]
async fn should_complete_log_without_destinations() {
    let flow = test_flow(None);
    let logs = MockAuditLog::empty();
    let usecase = ingest(
        MockFlowRepo::new(vec![flow.clone()]),
        logs.clone(),
        MockJobQueue::empty(),
    );

    let ingested = usecase
        .execute(test_request("/webhook/x", BODY, &[]), FlowTarget::Id(flow.id))
        .await
        .unwrap();

    assert!(matches!(&ingested.dispatch, Dispatch::Sync(outcomes) if outcomes.is_empty()));
    assert_eq!(logs.log(ingested.log_id).status, LogStatus::Completed);
}

// ── Async mode ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_force_async_for_multiple_destinations() {
    let flow = test_flow(Some(
        GraphBuilder::new()
            .inbound("/api/webhook/orders")
            .outbound("https://erp.example.com/hook")
            .outbound("https://crm.example.com/hook")
            .build(),
    ));
    assert!(!flow.async_mode);
    let logs = MockAuditLog::empty();
    let queue = MockJobQueue::empty();
    let usecase = ingest(MockFlowRepo::new(vec![flow.clone()]), logs.clone(), queue.clone());

    let ingested = usecase
        .execute(test_request("/webhook/x", BODY, &[]), FlowTarget::Id(flow.id))
        .await
        .unwrap();

    assert_eq!(ingested.mode, DeliveryMode::Async);
    assert!(matches!(ingested.dispatch, Dispatch::Queued(2)));
    let jobs = queue.snapshot();
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|j| j.job.webhook_log_id == ingested.log_id));
    assert_eq!(jobs[0].job.spec.destination.url, "https://erp.example.com/hook");
    assert_eq!(jobs[1].job.spec.destination.url, "https://crm.example.com/hook");
    assert_eq!(jobs[0].job.max_attempts, 3);

    // Nothing was attempted inline.
    assert_eq!(logs.log(ingested.log_id).status, LogStatus::Processing);
    assert!(logs.attempts_of(ingested.log_id).is_empty());
}

#[tokio::test]
async fn should_queue_single_destination_when_flow_is_async() {
    let mut flow = test_flow(Some(
        GraphBuilder::new()
            .inbound("/api/webhook/orders")
            .outbound("https://erp.example.com/hook")
            .build(),
    ));
    flow.async_mode = true;
    let queue = MockJobQueue::empty();
    let usecase = ingest(
        MockFlowRepo::new(vec![flow.clone()]),
        MockAuditLog::empty(),
        queue.clone(),
    );

    let ingested = usecase
        .execute(test_request("/webhook/x", BODY, &[]), FlowTarget::Id(flow.id))
        .await
        .unwrap();

    assert_eq!(ingested.mode, DeliveryMode::Async);
    assert!(matches!(ingested.dispatch, Dispatch::Queued(1)));
    assert_eq!(queue.snapshot().len(), 1);
}

// ── Audit capture ────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_mask_secure_headers_but_forward_real_values() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut flow = test_flow(Some(
        GraphBuilder::new()
            .inbound("/api/webhook/billing")
            .outbound(&format!("{}/hook", server.uri()))
            .build(),
    ));
    flow.secure_headers = vec!["authorization".to_owned(), "x-api-key".to_owned()];
    let logs = MockAuditLog::empty();
    let usecase = ingest(
        MockFlowRepo::new(vec![flow.clone()]),
        logs.clone(),
        MockJobQueue::empty(),
    );

    usecase
        .execute(
            test_request(
                "/webhook/x",
                BODY,
                &[
                    ("authorization", "Bearer live-token"),
                    ("x-api-key", "key-123"),
                    ("cookie", "session=abc"),
                    ("x-event-type", "invoice.paid"),
                ],
            ),
            FlowTarget::Id(flow.id),
        )
        .await
        .unwrap();

    let log = logs.only_log();
    assert_eq!(log.headers["authorization"], "***");
    assert_eq!(log.headers["x-api-key"], "***");
    assert_eq!(log.headers["x-event-type"], "invoice.paid");
    assert!(!log.headers.contains_key("cookie"));
    assert_eq!(log.body.as_deref(), Some(BODY));
    assert_eq!(log.source_ip.as_deref(), Some("203.0.113.10"));

    let received = &server.received_requests().await.unwrap()[0];
    assert_eq!(received.headers.get("authorization").unwrap(), "Bearer live-token");
    assert_eq!(received.headers.get("x-api-key").unwrap(), "key-123");
    assert!(received.headers.get("cookie").is_none());
}

#[tokio::test]
async fn should_let_destination_headers_override_forwarded_ones() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let flow = test_flow(None);
    let mut destination =
        crate::helpers::test_destination(flow.id, &format!("{}/hook", server.uri()), 3);
    destination
        .headers
        .insert("x-tenant".to_owned(), "acme".to_owned());
    let usecase = ingest(
        MockFlowRepo::new(vec![flow.clone()]).with_destinations(vec![destination]),
        MockAuditLog::empty(),
        MockJobQueue::empty(),
    );

    usecase
        .execute(
            test_request("/webhook/x", BODY, &[("x-tenant", "spoofed")]),
            FlowTarget::Id(flow.id),
        )
        .await
        .unwrap();

    let received = &server.received_requests().await.unwrap()[0];
    let tenants: Vec<_> = received.headers.get_all("x-tenant").iter().collect();
    assert_eq!(tenants, vec!["acme"]);
}

#[tokio::test]
async fn should_verify_and_forward_non_utf8_body_unchanged() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let mut flow = test_flow(Some(
        GraphBuilder::new()
            .inbound("/api/webhook/binary")
            .outbound(&format!("{}/hook", server.uri()))
            .build(),
    ));
    flow.require_signature = true;
    let logs = MockAuditLog::empty();
    let usecase = ingest(
        MockFlowRepo::new(vec![flow.clone()]),
        logs.clone(),
        MockJobQueue::empty(),
    );

    let raw: Vec<u8> = vec![0x1f, 0x8b, 0x08, 0xff, 0xfe, 0x00, 0x80];
    let provider_signature = signature_header(TEST_SECRET, Utc::now().timestamp_millis(), &raw);
    let mut request = test_request(
        "/api/webhook/binary",
        "",
        &[
            ("content-type", "application/octet-stream"),
            (SIGNATURE_HEADER, provider_signature.as_str()),
        ],
    );
    request.body = Some(raw.clone());

    usecase
        .execute(request, FlowTarget::Path("/api/webhook/binary".to_owned()))
        .await
        .unwrap();

    let received = &server.received_requests().await.unwrap()[0];
    assert_eq!(received.body, raw);
    let header = received.headers.get(SIGNATURE_HEADER).unwrap().to_str().unwrap();
    signature::verify(
        Some(header),
        &raw,
        TEST_SECRET,
        Utc::now().timestamp_millis(),
        signature::DEFAULT_MAX_AGE_MS,
    )
    .unwrap();

    // Only the audit copy is text.
    let log = logs.only_log();
    assert_eq!(log.body, Some(String::from_utf8_lossy(&raw).into_owned()));
    assert_eq!(log.status, LogStatus::Completed);
}
