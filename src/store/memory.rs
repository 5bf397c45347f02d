//! In-process store backend: DashMap-keyed records with per-status index
//! sets and a broadcast change feed.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::approval::{ApprovalRequest, ApprovalStatus, Disposition};
use crate::models::event::ChangeEvent;

use super::{ApprovalStore, ListFilter, StoreError, TransitionOutcome};

/// Capacity of the change feed. Consumers that fall further behind than this
/// observe a lag and must re-read the record directly.
const FEED_CAPACITY: usize = 256;

pub struct MemoryStore {
    records: DashMap<Uuid, ApprovalRequest>,
    // Secondary index: status -> ids. Writers take the record entry lock
    // first, then the index; readers never hold both at once.
    by_status: DashMap<ApprovalStatus, HashSet<Uuid>>,
    feed: broadcast::Sender<ChangeEvent>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            records: DashMap::new(),
            by_status: DashMap::new(),
            feed,
            closed: AtomicBool::new(false),
        }
    }

    /// Flips the store into the unavailable state. Every subsequent
    /// operation fails with `StoreError::Unavailable`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }
        Ok(())
    }

    fn index_add(&self, status: ApprovalStatus, id: Uuid) {
        self.by_status.entry(status).or_default().insert(id);
    }

    fn index_move(&self, from: ApprovalStatus, to: ApprovalStatus, id: Uuid) {
        if let Some(mut set) = self.by_status.get_mut(&from) {
            set.remove(&id);
        }
        self.index_add(to, id);
    }

    /// Ids currently indexed under `status`, cloned out so no index lock is
    /// held while records are read.
    fn ids_with_status(&self, status: ApprovalStatus) -> Vec<Uuid> {
        self.by_status
            .get(&status)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ApprovalStore for MemoryStore {
    async fn create(&self, mut record: ApprovalRequest) -> Result<ApprovalRequest, StoreError> {
        self.ensure_open()?;
        record.status = ApprovalStatus::Pending;
        record.decided_at = None;
        record.decided_by = None;
        record.rejection_reason = None;

        match self.records.entry(record.id) {
            Entry::Occupied(_) => Err(StoreError::DuplicateId(record.id)),
            Entry::Vacant(slot) => {
                let stored = slot.insert(record);
                let snapshot = stored.clone();
                self.index_add(ApprovalStatus::Pending, snapshot.id);
                // Sent while the entry lock is held: the feed sees Created
                // before any transition of the same record.
                let _ = self.feed.send(ChangeEvent::created(snapshot.clone()));
                Ok(snapshot)
            }
        }
    }

    async fn get(&self, id: Uuid) -> Result<ApprovalRequest, StoreError> {
        self.ensure_open()?;
        self.records
            .get(&id)
            .map(|r| r.clone())
            .ok_or(StoreError::NotFound(id))
    }

    async fn list(&self, filter: ListFilter) -> Result<Vec<ApprovalRequest>, StoreError> {
        self.ensure_open()?;
        let mut out: Vec<ApprovalRequest> = match filter.status {
            Some(status) => self
                .ids_with_status(status)
                .into_iter()
                .filter_map(|id| self.records.get(&id).map(|r| r.clone()))
                .filter(|r| filter.matches(r))
                .collect(),
            None => self
                .records
                .iter()
                .map(|r| r.clone())
                .filter(|r| filter.matches(r))
                .collect(),
        };
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(out)
    }

    async fn transition(
        &self,
        id: Uuid,
        from: ApprovalStatus,
        disposition: Disposition,
    ) -> Result<TransitionOutcome, StoreError> {
        self.ensure_open()?;
        let mut entry = match self.records.get_mut(&id) {
            Some(entry) => entry,
            None => return Err(StoreError::NotFound(id)),
        };

        if entry.status != from {
            return Ok(TransitionOutcome::Conflict {
                current: entry.status,
            });
        }

        let previous = entry.status;
        entry.status = disposition.status();
        entry.decided_at = Some(Utc::now());
        match disposition {
            Disposition::Approved { decided_by } => {
                entry.decided_by = Some(decided_by);
            }
            Disposition::Rejected { decided_by, reason } => {
                entry.decided_by = Some(decided_by);
                entry.rejection_reason = reason;
            }
            Disposition::TimedOut | Disposition::Cancelled => {}
        }

        let snapshot = entry.clone();
        self.index_move(previous, snapshot.status, id);
        let _ = self.feed.send(ChangeEvent::updated(snapshot.clone()));
        drop(entry);

        Ok(TransitionOutcome::Applied(snapshot))
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.feed.subscribe()
    }
}
