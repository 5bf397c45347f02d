//! Webhook delivery against a mock endpoint.
//!
//! Verifies the signed delivery headers and that lifecycle transitions fire
//! events without blocking the decision path.

use std::sync::Arc;
use std::time::Duration;

use greenlight::manager::{ApprovalPolicy, LifecycleManager};
use greenlight::models::approval::{ApprovalKind, Decision, NewApproval};
use greenlight::notification::webhook::{WebhookEvent, WebhookNotifier};
use greenlight::store::{ApprovalStore, MemoryStore};
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn engine() -> LifecycleManager {
    LifecycleManager::new(
        Arc::new(MemoryStore::new()) as Arc<dyn ApprovalStore>,
        ApprovalPolicy::default(),
    )
}

#[tokio::test]
async fn test_signed_delivery_carries_signature_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks/greenlight"))
        .and(header("x-greenlight-event", "request_created"))
        .and(header_exists("x-greenlight-signature"))
        .and(header_exists("x-greenlight-delivery-id"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mgr = engine();
    let rec = mgr
        .request_approval(NewApproval::new(
            ApprovalKind::Generic,
            "deploy",
            "ship it",
            "pipeline",
        ))
        .await
        .unwrap();

    let notifier = WebhookNotifier::new();
    notifier
        .send_signed(
            &format!("{}/hooks/greenlight", server.uri()),
            &WebhookEvent::request_created(&rec),
            Some("s3cret"),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unsigned_delivery_omits_signature() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header_exists("x-greenlight-signature"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mgr = engine();
    let rec = mgr
        .request_approval(NewApproval::new(
            ApprovalKind::Generic,
            "deploy",
            "ship it",
            "pipeline",
        ))
        .await
        .unwrap();

    let notifier = WebhookNotifier::new();
    notifier
        .send(&server.uri(), &WebhookEvent::request_created(&rec))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_lifecycle_dispatches_created_and_resolved_events() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("x-greenlight-event", "request_created"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(header("x-greenlight-event", "request_resolved"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mgr = LifecycleManager::new(
        Arc::new(MemoryStore::new()) as Arc<dyn ApprovalStore>,
        ApprovalPolicy::default(),
    )
    .with_webhook_targets(vec![(server.uri(), None)]);

    let rec = mgr
        .request_approval(NewApproval::new(
            ApprovalKind::PlanApproval,
            "plan",
            "step 1…",
            "pipeline",
        ))
        .await
        .unwrap();
    mgr.decide(rec.id, Decision::Approve, "alice", None)
        .await
        .unwrap();

    // Dispatch is fire-and-forget; give the detached deliveries a moment
    // before the mock verifies expectations on drop.
    tokio::time::sleep(Duration::from_millis(500)).await;
}
