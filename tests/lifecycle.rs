//! End-to-end lifecycle scenarios: creation, decisions, the timeout sweep,
//! concurrent writers, and observer fan-out.

use std::sync::Arc;
use std::time::Duration;

use greenlight::errors::AppError;
use greenlight::hub::NotificationHub;
use greenlight::manager::{ApprovalPolicy, LifecycleManager};
use greenlight::models::approval::{
    ApprovalKind, ApprovalStatus, Decision, DecisionOutcome, NewApproval,
};
use greenlight::models::event::PushMessage;
use greenlight::store::{ApprovalStore, ListFilter, MemoryStore};

fn engine_with_timeout(default_timeout: Duration) -> (Arc<MemoryStore>, Arc<LifecycleManager>) {
    let store = Arc::new(MemoryStore::new());
    let manager = Arc::new(LifecycleManager::new(
        store.clone() as Arc<dyn ApprovalStore>,
        ApprovalPolicy {
            default_timeout,
            ..ApprovalPolicy::default()
        },
    ));
    (store, manager)
}

fn submission(title: &str) -> NewApproval {
    NewApproval::new(ApprovalKind::PlanApproval, title, "step 1…", "pipeline")
}

/// Scenario: a request nobody answers is swept to `TimedOut`, and a pending
/// `wait_for_decision` call observes that as its outcome.
#[tokio::test]
async fn test_unattended_request_times_out() {
    let (_, mgr) = engine_with_timeout(Duration::from_millis(150));
    mgr.clone().spawn_timeout_sweep(Duration::from_millis(25));

    let rec = mgr.request_approval(submission("plan")).await.unwrap();

    let waiter = {
        let mgr = mgr.clone();
        let id = rec.id;
        tokio::spawn(async move { mgr.wait_for_decision(id, None).await })
    };

    let outcome = tokio::time::timeout(Duration::from_secs(3), waiter)
        .await
        .expect("waiter should resolve well before the harness timeout")
        .unwrap()
        .unwrap();
    assert_eq!(outcome, DecisionOutcome::TimedOut);

    let stored = mgr.get(rec.id).await.unwrap();
    assert_eq!(stored.status, ApprovalStatus::TimedOut);
    assert!(stored.decided_at.is_some());
    assert!(stored.decided_by.is_none());
}

/// Scenario: an approval wakes the waiting producer with the decider's
/// identity, within a bounded latency of the transition.
#[tokio::test]
async fn test_decision_wakes_waiter_promptly() {
    let (_, mgr) = engine_with_timeout(Duration::from_secs(60));
    let rec = mgr.request_approval(submission("plan")).await.unwrap();

    let waiter = {
        let mgr = mgr.clone();
        let id = rec.id;
        tokio::spawn(async move { mgr.wait_for_decision(id, None).await })
    };
    // Let the waiter subscribe before the decision lands.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let decided_at = tokio::time::Instant::now();
    mgr.decide(rec.id, Decision::Approve, "alice", None)
        .await
        .unwrap();

    let outcome = tokio::time::timeout(Duration::from_millis(500), waiter)
        .await
        .expect("waiter must wake within 500ms of the transition")
        .unwrap()
        .unwrap();
    assert!(decided_at.elapsed() < Duration::from_millis(500));
    assert_eq!(
        outcome,
        DecisionOutcome::Approved {
            decided_by: "alice".into()
        }
    );
}

/// Scenario: two humans race on the same request — exactly one wins, the
/// loser sees `Conflict`, and the stored state matches the winner only.
#[tokio::test]
async fn test_concurrent_decisions_have_one_winner() {
    let (_, mgr) = engine_with_timeout(Duration::from_secs(60));
    let rec = mgr.request_approval(submission("plan")).await.unwrap();

    let approve = {
        let mgr = mgr.clone();
        let id = rec.id;
        tokio::spawn(async move { mgr.decide(id, Decision::Approve, "alice", None).await })
    };
    let reject = {
        let mgr = mgr.clone();
        let id = rec.id;
        tokio::spawn(async move {
            mgr.decide(id, Decision::Reject, "bob", Some("not ready".into()))
                .await
        })
    };

    let approve = approve.await.unwrap();
    let reject = reject.await.unwrap();
    assert_eq!(approve.is_ok() as u8 + reject.is_ok() as u8, 1);

    let stored = mgr.get(rec.id).await.unwrap();
    match (&approve, &reject) {
        (Ok(_), Err(AppError::Conflict { current, .. })) => {
            assert_eq!(stored.status, ApprovalStatus::Approved);
            assert_eq!(stored.decided_by.as_deref(), Some("alice"));
            assert_eq!(*current, ApprovalStatus::Approved);
        }
        (Err(AppError::Conflict { current, .. }), Ok(_)) => {
            assert_eq!(stored.status, ApprovalStatus::Rejected);
            assert_eq!(stored.decided_by.as_deref(), Some("bob"));
            assert_eq!(*current, ApprovalStatus::Rejected);
        }
        other => panic!("expected exactly one winner, got {other:?}"),
    }
}

/// Scenario: a producer aborts and cancels; the waiter observes `Cancelled`
/// and the request leaves the pending set.
#[tokio::test]
async fn test_cancel_wakes_waiter_and_clears_pending() {
    let (_, mgr) = engine_with_timeout(Duration::from_secs(60));
    let rec = mgr.request_approval(submission("plan")).await.unwrap();

    let waiter = {
        let mgr = mgr.clone();
        let id = rec.id;
        tokio::spawn(async move { mgr.wait_for_decision(id, None).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    mgr.cancel(rec.id).await.unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(outcome, DecisionOutcome::Cancelled);

    let pending = mgr.list(ListFilter::pending()).await.unwrap();
    assert!(pending.is_empty());
}

/// A store outage surfaces as `StorageUnavailable` — never as "still
/// pending".
#[tokio::test]
async fn test_store_outage_propagates() {
    let (store, mgr) = engine_with_timeout(Duration::from_secs(60));
    let rec = mgr.request_approval(submission("plan")).await.unwrap();

    store.close();

    assert!(matches!(
        mgr.get(rec.id).await.unwrap_err(),
        AppError::StorageUnavailable
    ));
    assert!(matches!(
        mgr.decide(rec.id, Decision::Approve, "alice", None)
            .await
            .unwrap_err(),
        AppError::StorageUnavailable
    ));
    assert!(matches!(
        mgr.request_approval(submission("more")).await.unwrap_err(),
        AppError::StorageUnavailable
    ));
}

/// Fan-out across the whole engine: observers connected through the hub see
/// the create and the decision, in order, even while another observer drops.
#[tokio::test]
async fn test_observers_see_lifecycle_in_order() {
    let store = Arc::new(MemoryStore::new());
    let hub = Arc::new(NotificationHub::new(store.clone() as Arc<dyn ApprovalStore>));
    hub.clone().spawn();
    let mgr = Arc::new(LifecycleManager::new(
        store as Arc<dyn ApprovalStore>,
        ApprovalPolicy::default(),
    ));

    let mut surviving = hub.connect().await.unwrap();
    let doomed = hub.connect().await.unwrap();

    // Snapshot comes first on every connection.
    let snapshot = tokio::time::timeout(Duration::from_secs(1), surviving.rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        snapshot,
        PushMessage::InitialSnapshot { ref pending } if pending.is_empty()
    ));

    // One observer's connection dies; the rest keep receiving.
    drop(doomed.rx);

    let rec = mgr.request_approval(submission("plan")).await.unwrap();
    mgr.decide(rec.id, Decision::Reject, "bob", Some("redo the numbers".into()))
        .await
        .unwrap();

    let created = tokio::time::timeout(Duration::from_secs(1), surviving.rx.recv())
        .await
        .unwrap()
        .unwrap();
    match created {
        PushMessage::Created { request } => assert_eq!(request.id, rec.id),
        other => panic!("expected created, got {other:?}"),
    }

    let update = tokio::time::timeout(Duration::from_secs(1), surviving.rx.recv())
        .await
        .unwrap()
        .unwrap();
    match update {
        PushMessage::Update {
            request_id,
            status,
            decided_by,
            reason,
            ..
        } => {
            assert_eq!(request_id, rec.id);
            assert_eq!(status, ApprovalStatus::Rejected);
            assert_eq!(decided_by.as_deref(), Some("bob"));
            assert_eq!(reason.as_deref(), Some("redo the numbers"));
        }
        other => panic!("expected update, got {other:?}"),
    }
}

/// A freshly connected observer's snapshot holds pending requests only.
#[tokio::test]
async fn test_late_observer_snapshot_excludes_terminal() {
    let store = Arc::new(MemoryStore::new());
    let hub = Arc::new(NotificationHub::new(store.clone() as Arc<dyn ApprovalStore>));
    hub.clone().spawn();
    let mgr = Arc::new(LifecycleManager::new(
        store as Arc<dyn ApprovalStore>,
        ApprovalPolicy::default(),
    ));

    let open = mgr.request_approval(submission("open")).await.unwrap();
    let closed = mgr.request_approval(submission("closed")).await.unwrap();
    mgr.decide(closed.id, Decision::Approve, "alice", None)
        .await
        .unwrap();

    let mut observer = hub.connect().await.unwrap();
    let snapshot = tokio::time::timeout(Duration::from_secs(1), observer.rx.recv())
        .await
        .unwrap()
        .unwrap();
    match snapshot {
        PushMessage::InitialSnapshot { pending } => {
            assert_eq!(pending.len(), 1);
            assert_eq!(pending[0].id, open.id);
        }
        other => panic!("expected snapshot, got {other:?}"),
    }
}
