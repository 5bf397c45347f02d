//! Notification hub: fans change events out to live observers.
//!
//! The hub is read-only with respect to request state — it consumes the
//! store's change feed and never mutates records. Observers are mpsc-backed
//! duplex handles; a failing observer is disconnected locally and never
//! stalls delivery to the rest.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::event::PushMessage;
use crate::store::{ApprovalStore, ListFilter};

/// Per-observer queue depth. An observer that falls this far behind is
/// treated like a dropped connection.
const OBSERVER_BUFFER: usize = 64;

/// A live observer connection: receive end plus the id used to disconnect.
pub struct ObserverHandle {
    id: Uuid,
    pub rx: mpsc::Receiver<PushMessage>,
}

impl ObserverHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

pub struct NotificationHub {
    store: Arc<dyn ApprovalStore>,
    observers: DashMap<Uuid, mpsc::Sender<PushMessage>>,
    // Registration and fan-out serialize here so a connecting observer's
    // snapshot cannot miss an event committed while it registers.
    register_lock: Mutex<()>,
}

impl NotificationHub {
    pub fn new(store: Arc<dyn ApprovalStore>) -> Self {
        Self {
            store,
            observers: DashMap::new(),
            register_lock: Mutex::new(()),
        }
    }

    /// Registers a new observer. Its first message is a snapshot of all
    /// currently pending requests; everything after is live updates.
    pub async fn connect(&self) -> Result<ObserverHandle, AppError> {
        let (tx, rx) = mpsc::channel(OBSERVER_BUFFER);
        let id = Uuid::new_v4();

        let guard = self.register_lock.lock().await;
        let pending = self.store.list(ListFilter::pending()).await?;
        // Fresh channel, capacity > 0: this send cannot fail.
        let _ = tx.try_send(PushMessage::InitialSnapshot { pending });
        self.observers.insert(id, tx);
        drop(guard);

        tracing::debug!(observer = %id, "observer connected");
        Ok(ObserverHandle { id, rx })
    }

    /// Deregisters one observer. Others are unaffected.
    pub fn disconnect(&self, id: Uuid) {
        if self.observers.remove(&id).is_some() {
            tracing::debug!(observer = %id, "observer disconnected");
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Delivers `message` to every live observer. A closed or saturated
    /// observer queue disconnects that observer only; delivery to the rest
    /// proceeds.
    pub async fn broadcast(&self, message: PushMessage) {
        let guard = self.register_lock.lock().await;
        let mut dropped = Vec::new();
        for entry in self.observers.iter() {
            if entry.value().try_send(message.clone()).is_err() {
                dropped.push(*entry.key());
            }
        }
        drop(guard);

        for id in dropped {
            self.observers.remove(&id);
            tracing::warn!(observer = %id, "observer unreachable, disconnected");
        }
    }

    /// Background fan-out: consumes the store's change feed for the life of
    /// the process. Call once at startup.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let mut feed = self.store.subscribe();
        tokio::spawn(async move {
            loop {
                match feed.recv().await {
                    Ok(event) => self.broadcast(PushMessage::from(event)).await,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "hub lagged behind the change feed");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
