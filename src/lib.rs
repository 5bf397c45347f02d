//! Greenlight — human approval gate for automated pipelines.
//!
//! Producers submit decision checkpoints and suspend until a human approves,
//! rejects, or the deadline passes; rejections can drive a bounded
//! revise-and-resubmit loop. The engine is built from an [`store::ApprovalStore`]
//! (CAS transitions + change feed), a [`hub::NotificationHub`] (observer
//! fan-out), the [`manager::LifecycleManager`] (state-machine authority) and
//! the [`revision::RevisionController`].

use std::sync::Arc;

pub mod api;
pub mod cli;
pub mod config;
pub mod errors;
pub mod hub;
pub mod manager;
pub mod models;
pub mod notification;
pub mod revision;
pub mod store;

use hub::NotificationHub;
use manager::LifecycleManager;

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub manager: Arc<LifecycleManager>,
    pub hub: Arc<NotificationHub>,
    pub config: config::Config,
}
