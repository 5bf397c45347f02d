//! Durable keyed storage for approval requests.
//!
//! The engine only depends on the [`ApprovalStore`] contract: atomic
//! conditional transitions plus an ordered change feed. Any backend with a
//! compare-and-swap primitive and pub/sub can implement it; [`MemoryStore`]
//! is the in-process default.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::approval::{
    ApprovalKind, ApprovalRequest, ApprovalStatus, Disposition,
};
use crate::models::event::ChangeEvent;

pub mod memory;

pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("approval request {0} already exists")]
    DuplicateId(Uuid),

    #[error("approval request {0} not found")]
    NotFound(Uuid),

    /// The backend is unreachable. Callers must surface this — a request
    /// whose store is down is not "still pending".
    #[error("approval store unavailable")]
    Unavailable,
}

/// Result of a conditional transition. `Conflict` means the compare failed:
/// nothing was mutated and no event was emitted.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    Applied(ApprovalRequest),
    Conflict { current: ApprovalStatus },
}

/// Filter for `list`. All fields are conjunctive; `None` matches everything.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub status: Option<ApprovalStatus>,
    pub kind: Option<ApprovalKind>,
    pub requested_by: Option<String>,
}

impl ListFilter {
    pub fn pending() -> Self {
        Self {
            status: Some(ApprovalStatus::Pending),
            ..Self::default()
        }
    }

    pub fn status(mut self, status: ApprovalStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn kind(mut self, kind: ApprovalKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn requested_by(mut self, owner: impl Into<String>) -> Self {
        self.requested_by = Some(owner.into());
        self
    }

    fn matches(&self, record: &ApprovalRequest) -> bool {
        self.status.map_or(true, |s| record.status == s)
            && self.kind.map_or(true, |k| record.kind == k)
            && self
                .requested_by
                .as_deref()
                .map_or(true, |o| record.requested_by == o)
    }
}

#[async_trait]
pub trait ApprovalStore: Send + Sync {
    /// Persists a new record with status forced to `Pending` and emits a
    /// `Created` change event.
    async fn create(&self, record: ApprovalRequest) -> Result<ApprovalRequest, StoreError>;

    async fn get(&self, id: Uuid) -> Result<ApprovalRequest, StoreError>;

    /// Matching records sorted by `created_at` descending.
    async fn list(&self, filter: ListFilter) -> Result<Vec<ApprovalRequest>, StoreError>;

    /// Atomic compare-and-swap: applies `disposition` only if the current
    /// status equals `from`. This is the single serialization point for all
    /// concurrent writers (human decisions, cancellation, the timeout
    /// sweep). On success the `Updated` event is on the feed before the call
    /// returns; on conflict nothing changes.
    async fn transition(
        &self,
        id: Uuid,
        from: ApprovalStatus,
        disposition: Disposition,
    ) -> Result<TransitionOutcome, StoreError>;

    /// Subscribes to the ordered change feed. Events for the same request id
    /// appear in commit order.
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;
}
