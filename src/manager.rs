//! Lifecycle manager: the state-machine authority for approval requests.
//!
//! Producers call [`LifecycleManager::request_approval`] (non-blocking) and
//! suspend in [`LifecycleManager::wait_for_decision`]; human-driven paths
//! call [`LifecycleManager::decide`] / [`LifecycleManager::cancel`]. All
//! writers funnel into the store's compare-and-swap, so a decision racing
//! the timeout sweep has exactly one winner and no manager-level locking.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::approval::{
    ApprovalRequest, ApprovalStatus, Decision, DecisionOutcome, Disposition, NewApproval,
};
use crate::models::event::{ChangeEvent, ChangeKind};
use crate::notification::webhook::{WebhookEvent, WebhookNotifier};
use crate::store::{ApprovalStore, ListFilter, TransitionOutcome};

/// Engine policy knobs, injected at construction.
#[derive(Debug, Clone)]
pub struct ApprovalPolicy {
    /// Deadline applied when a submission carries no explicit timeout.
    pub default_timeout: Duration,
    /// Reject decisions must carry a non-empty reason.
    pub require_rejection_reason: bool,
    /// Resubmission bound for the revision controller.
    pub max_revisions: u32,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(300),
            require_rejection_reason: true,
            max_revisions: 2,
        }
    }
}

/// Observer invoked after a successful transition. Runs detached from the
/// deciding call; failures are logged and never affect the transition.
#[async_trait]
pub trait DecisionHook: Send + Sync {
    async fn on_transition(&self, record: ApprovalRequest) -> anyhow::Result<()>;
}

pub struct LifecycleManager {
    store: Arc<dyn ApprovalStore>,
    policy: ApprovalPolicy,
    hooks: RwLock<Vec<Arc<dyn DecisionHook>>>,
    webhook: WebhookNotifier,
    webhook_targets: Vec<(String, Option<String>)>,
}

impl LifecycleManager {
    pub fn new(store: Arc<dyn ApprovalStore>, policy: ApprovalPolicy) -> Self {
        Self {
            store,
            policy,
            hooks: RwLock::new(Vec::new()),
            webhook: WebhookNotifier::new(),
            webhook_targets: Vec::new(),
        }
    }

    /// Configures outbound webhook targets `(url, signing_secret)`.
    pub fn with_webhook_targets(mut self, targets: Vec<(String, Option<String>)>) -> Self {
        self.webhook_targets = targets;
        self
    }

    pub fn policy(&self) -> &ApprovalPolicy {
        &self.policy
    }

    pub fn register_hook(&self, hook: Arc<dyn DecisionHook>) {
        if let Ok(mut hooks) = self.hooks.write() {
            hooks.push(hook);
        }
    }

    /// Creates a pending request and returns immediately. The store's
    /// `Created` event drives hub fan-out.
    pub async fn request_approval(&self, new: NewApproval) -> Result<ApprovalRequest, AppError> {
        let timeout = new.timeout.unwrap_or(self.policy.default_timeout);
        let timeout = chrono::Duration::from_std(timeout)
            .map_err(|_| AppError::Validation("timeout out of range".into()))?;

        let now = Utc::now();
        let record = ApprovalRequest {
            id: Uuid::new_v4(),
            kind: new.kind,
            title: new.title,
            content: new.content,
            context: new.context,
            requested_by: new.requested_by,
            status: ApprovalStatus::Pending,
            priority: new.priority,
            created_at: now,
            deadline: now + timeout,
            decided_at: None,
            decided_by: None,
            rejection_reason: None,
            revision_index: new.revision_index,
            parent_id: new.parent_id,
        };

        let stored = self.store.create(record).await?;
        tracing::info!(
            id = %stored.id,
            kind = ?stored.kind,
            requested_by = %stored.requested_by,
            deadline = %stored.deadline,
            "approval request created"
        );

        self.webhook
            .dispatch_signed(&self.webhook_targets, WebhookEvent::request_created(&stored))
            .await;

        Ok(stored)
    }

    pub async fn get(&self, id: Uuid) -> Result<ApprovalRequest, AppError> {
        Ok(self.store.get(id).await?)
    }

    pub async fn list(&self, filter: ListFilter) -> Result<Vec<ApprovalRequest>, AppError> {
        Ok(self.store.list(filter).await?)
    }

    /// Suspends until the request reaches a terminal state, or until `wait`
    /// elapses (`AppError::WaitTimeout` — distinct from the request's own
    /// `TimedOut` outcome). Returns immediately if already terminal.
    pub async fn wait_for_decision(
        &self,
        id: Uuid,
        wait: Option<Duration>,
    ) -> Result<DecisionOutcome, AppError> {
        let mut feed = self.store.subscribe();

        // Subscribe before reading: a transition committed in between is
        // either visible in the read or already queued on the feed.
        let record = self.store.get(id).await?;
        if let Some(outcome) = DecisionOutcome::from_record(&record) {
            return Ok(outcome);
        }

        let deadline = wait.map(|w| tokio::time::Instant::now() + w);
        loop {
            let event = match deadline {
                Some(at) => match tokio::time::timeout_at(at, feed.recv()).await {
                    Ok(event) => event,
                    Err(_) => return Err(AppError::WaitTimeout),
                },
                None => feed.recv().await,
            };

            match event {
                Ok(ChangeEvent {
                    kind: ChangeKind::Updated,
                    record,
                }) if record.id == id => {
                    if let Some(outcome) = DecisionOutcome::from_record(&record) {
                        return Ok(outcome);
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(%id, skipped, "change feed lagged, re-reading record");
                    let record = self.store.get(id).await?;
                    if let Some(outcome) = DecisionOutcome::from_record(&record) {
                        return Ok(outcome);
                    }
                }
                Err(RecvError::Closed) => return Err(AppError::StorageUnavailable),
            }
        }
    }

    /// Applies a human decision. `Conflict` means someone else resolved the
    /// request first (another decider, cancel, or the timeout sweep).
    pub async fn decide(
        &self,
        id: Uuid,
        decision: Decision,
        decided_by: impl Into<String>,
        reason: Option<String>,
    ) -> Result<ApprovalRequest, AppError> {
        let decided_by = decided_by.into();
        if decided_by.trim().is_empty() {
            return Err(AppError::Validation("decided_by must not be empty".into()));
        }

        let disposition = match decision {
            Decision::Approve => Disposition::Approved { decided_by },
            Decision::Reject => {
                let missing_reason =
                    reason.as_deref().map_or(true, |r| r.trim().is_empty());
                if self.policy.require_rejection_reason && missing_reason {
                    return Err(AppError::Validation(
                        "a reason is required when rejecting".into(),
                    ));
                }
                Disposition::Rejected { decided_by, reason }
            }
        };

        self.apply(id, disposition).await
    }

    /// Resolves a request whose owning producer aborted, so it stops
    /// appearing as pending. Same CAS machinery as `decide`.
    pub async fn cancel(&self, id: Uuid) -> Result<ApprovalRequest, AppError> {
        self.apply(id, Disposition::Cancelled).await
    }

    async fn apply(&self, id: Uuid, disposition: Disposition) -> Result<ApprovalRequest, AppError> {
        match self
            .store
            .transition(id, ApprovalStatus::Pending, disposition)
            .await?
        {
            TransitionOutcome::Applied(record) => {
                tracing::info!(id = %record.id, status = ?record.status, "approval request resolved");
                self.fire_hooks(record.clone());
                self.webhook
                    .dispatch_signed(
                        &self.webhook_targets,
                        WebhookEvent::request_resolved(&record),
                    )
                    .await;
                Ok(record)
            }
            TransitionOutcome::Conflict { current } => Err(AppError::Conflict { id, current }),
        }
    }

    fn fire_hooks(&self, record: ApprovalRequest) {
        let hooks = match self.hooks.read() {
            Ok(hooks) => hooks.clone(),
            Err(_) => return,
        };
        for hook in hooks {
            let record = record.clone();
            tokio::spawn(async move {
                if let Err(e) = hook.on_transition(record).await {
                    tracing::error!("post-decision hook failed: {e:#}");
                }
            });
        }
    }

    /// One sweep pass: transitions every pending request past its deadline
    /// to `TimedOut`. Returns how many expired.
    pub async fn sweep_expired(&self) -> Result<usize, AppError> {
        let now = Utc::now();
        let pending = self.store.list(ListFilter::pending()).await?;

        let mut expired = 0;
        for record in pending.into_iter().filter(|r| r.deadline <= now) {
            match self.apply(record.id, Disposition::TimedOut).await {
                Ok(_) => expired += 1,
                // A decision or cancel won the CAS race; exactly one writer
                // ever succeeds, so this is a no-op.
                Err(AppError::Conflict { current, .. }) => {
                    tracing::debug!(id = %record.id, ?current, "sweep lost transition race");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(expired)
    }

    /// Background deadline enforcement. Call once at startup.
    pub fn spawn_timeout_sweep(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep_expired().await {
                    tracing::error!("timeout sweep failed: {e}");
                }
            }
        })
    }
}
