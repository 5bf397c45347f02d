use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Category of a decision checkpoint. Informational only — the state machine
/// treats every kind identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalKind {
    PlanApproval,
    DataValidation,
    FinalArtifact,
    Generic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    TimedOut,
    Cancelled,
}

impl ApprovalStatus {
    /// Every status except `Pending` is terminal: no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
            ApprovalStatus::TimedOut => "timed_out",
            ApprovalStatus::Cancelled => "cancelled",
        }
    }
}

/// Display ordering hint for reviewers. No engine semantics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// One persisted decision checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub kind: ApprovalKind,
    pub title: String,
    pub content: String,
    /// Structured context supplied by the producer. Opaque to the engine.
    pub context: Value,
    /// Owner tag of the submitting producer (used for list filtering).
    pub requested_by: String,
    pub status: ApprovalStatus,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<String>,
    pub rejection_reason: Option<String>,
    /// 0 for the original submission, incremented per resubmission.
    pub revision_index: u32,
    /// Links a resubmission to the rejected request it revises.
    pub parent_id: Option<Uuid>,
}

/// Parameters for a new checkpoint submission.
#[derive(Debug, Clone)]
pub struct NewApproval {
    pub kind: ApprovalKind,
    pub title: String,
    pub content: String,
    pub context: Value,
    pub requested_by: String,
    pub priority: Priority,
    /// Falls back to the policy default when `None`.
    pub timeout: Option<std::time::Duration>,
    pub revision_index: u32,
    pub parent_id: Option<Uuid>,
}

impl NewApproval {
    pub fn new(
        kind: ApprovalKind,
        title: impl Into<String>,
        content: impl Into<String>,
        requested_by: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            title: title.into(),
            content: content.into(),
            context: Value::Null,
            requested_by: requested_by.into(),
            priority: Priority::default(),
            timeout: None,
            revision_index: 0,
            parent_id: None,
        }
    }

    pub fn context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A human's verdict, as submitted through the decision endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

/// Target of a store transition. `decided_by`/`reason` exist only on the
/// variants reached through an explicit decision, so a timed-out or cancelled
/// record can never carry a decider.
#[derive(Debug, Clone)]
pub enum Disposition {
    Approved { decided_by: String },
    Rejected { decided_by: String, reason: Option<String> },
    TimedOut,
    Cancelled,
}

impl Disposition {
    pub fn status(&self) -> ApprovalStatus {
        match self {
            Disposition::Approved { .. } => ApprovalStatus::Approved,
            Disposition::Rejected { .. } => ApprovalStatus::Rejected,
            Disposition::TimedOut => ApprovalStatus::TimedOut,
            Disposition::Cancelled => ApprovalStatus::Cancelled,
        }
    }
}

/// Terminal outcome observed by a waiting producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionOutcome {
    Approved { decided_by: String },
    Rejected { decided_by: String, reason: Option<String> },
    TimedOut,
    Cancelled,
}

impl DecisionOutcome {
    /// Maps a terminal record to its outcome; `None` while still pending.
    pub fn from_record(record: &ApprovalRequest) -> Option<Self> {
        match record.status {
            ApprovalStatus::Pending => None,
            ApprovalStatus::Approved => Some(DecisionOutcome::Approved {
                decided_by: record.decided_by.clone().unwrap_or_default(),
            }),
            ApprovalStatus::Rejected => Some(DecisionOutcome::Rejected {
                decided_by: record.decided_by.clone().unwrap_or_default(),
                reason: record.rejection_reason.clone(),
            }),
            ApprovalStatus::TimedOut => Some(DecisionOutcome::TimedOut),
            ApprovalStatus::Cancelled => Some(DecisionOutcome::Cancelled),
        }
    }
}
