use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::approval::{ApprovalRequest, ApprovalStatus};

/// Why a record appeared on the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
}

/// One entry on the store's change feed. Carries the full record so
/// consumers never have to read back through the store.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub record: ApprovalRequest,
}

impl ChangeEvent {
    pub fn created(record: ApprovalRequest) -> Self {
        Self {
            kind: ChangeKind::Created,
            record,
        }
    }

    pub fn updated(record: ApprovalRequest) -> Self {
        Self {
            kind: ChangeKind::Updated,
            record,
        }
    }
}

/// Wire messages delivered to push-channel observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    /// Baseline state sent once, immediately after connecting.
    InitialSnapshot { pending: Vec<ApprovalRequest> },
    /// A new request entered the pending set.
    Created { request: ApprovalRequest },
    /// A request changed state.
    Update {
        request_id: Uuid,
        status: ApprovalStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        decided_by: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        revision_index: u32,
    },
}

impl From<ChangeEvent> for PushMessage {
    fn from(event: ChangeEvent) -> Self {
        match event.kind {
            ChangeKind::Created => PushMessage::Created {
                request: event.record,
            },
            ChangeKind::Updated => PushMessage::Update {
                request_id: event.record.id,
                status: event.record.status,
                decided_by: event.record.decided_by,
                reason: event.record.rejection_reason,
                revision_index: event.record.revision_index,
            },
        }
    }
}
