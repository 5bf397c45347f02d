//! Bounded reject → regenerate → resubmit loop around a checkpoint.
//!
//! The controller only ever touches request state through the lifecycle
//! manager's public operations. Each resubmission is a brand-new record
//! linked to its rejected predecessor by `parent_id`/`revision_index`, so
//! the whole chain stays auditable.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::errors::AppError;
use crate::manager::LifecycleManager;
use crate::models::approval::{ApprovalKind, DecisionOutcome, NewApproval, Priority};

/// Artifact produced by the pipeline for one submission.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub title: String,
    pub content: String,
    pub context: Value,
}

impl Artifact {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            context: Value::Null,
        }
    }

    pub fn context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }
}

/// Callback into the content-producing pipeline. `feedback` carries the
/// rejection reason of the previous attempt; `None` on the first build.
#[async_trait]
pub trait ContentBuilder: Send {
    async fn build(&mut self, feedback: Option<&str>) -> anyhow::Result<Artifact>;
}

/// One submission in the audit chain.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub request_id: Uuid,
    pub revision_index: u32,
    pub title: String,
    pub outcome: DecisionOutcome,
}

/// How the loop ended. Every variant retains the full attempt chain.
#[derive(Debug)]
pub enum FinalOutcome {
    Accepted {
        artifact: Artifact,
        attempts: Vec<Attempt>,
    },
    /// The last permitted submission was rejected too. A business outcome,
    /// not an error.
    RevisionLimitExceeded { attempts: Vec<Attempt> },
    /// The pending request expired. Does not count as a revision and is
    /// never auto-resubmitted.
    TimedOut { attempts: Vec<Attempt> },
    /// The request was cancelled out from under the loop.
    Cancelled { attempts: Vec<Attempt> },
}

pub struct RevisionController {
    manager: Arc<LifecycleManager>,
    requested_by: String,
    priority: Priority,
    timeout: Option<Duration>,
}

impl RevisionController {
    pub fn new(manager: Arc<LifecycleManager>, requested_by: impl Into<String>) -> Self {
        Self {
            manager,
            requested_by: requested_by.into(),
            priority: Priority::default(),
            timeout: None,
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Per-request deadline for every submission in the loop. Falls back to
    /// the engine policy default when unset.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Runs the loop: build, submit, await. A rejection regenerates with the
    /// reviewer's feedback and resubmits, at most `max_revisions` times.
    ///
    /// Waits on each submission without a caller-side window — deadline
    /// enforcement belongs to the request itself (the timeout sweep turns an
    /// unanswered request into the `TimedOut` outcome).
    pub async fn submit_for_approval(
        &self,
        kind: ApprovalKind,
        builder: &mut dyn ContentBuilder,
        max_revisions: u32,
    ) -> Result<FinalOutcome, AppError> {
        let mut attempts: Vec<Attempt> = Vec::new();
        let mut feedback: Option<String> = None;
        let mut parent_id: Option<Uuid> = None;
        let mut revision: u32 = 0;

        loop {
            let artifact = builder
                .build(feedback.as_deref())
                .await
                .map_err(AppError::Internal)?;

            let mut new = NewApproval::new(
                kind,
                artifact.title.clone(),
                artifact.content.clone(),
                self.requested_by.clone(),
            )
            .context(artifact.context.clone())
            .priority(self.priority);
            new.revision_index = revision;
            new.parent_id = parent_id;
            if let Some(timeout) = self.timeout {
                new = new.timeout(timeout);
            }

            let record = self.manager.request_approval(new).await?;
            let outcome = self.manager.wait_for_decision(record.id, None).await?;
            attempts.push(Attempt {
                request_id: record.id,
                revision_index: revision,
                title: artifact.title.clone(),
                outcome: outcome.clone(),
            });

            match outcome {
                DecisionOutcome::Approved { decided_by } => {
                    tracing::info!(
                        id = %record.id,
                        revision,
                        %decided_by,
                        "submission accepted"
                    );
                    return Ok(FinalOutcome::Accepted { artifact, attempts });
                }
                DecisionOutcome::Rejected { reason, .. } => {
                    if revision == max_revisions {
                        tracing::warn!(
                            id = %record.id,
                            revision,
                            "revision limit reached, giving up"
                        );
                        return Ok(FinalOutcome::RevisionLimitExceeded { attempts });
                    }
                    tracing::info!(
                        id = %record.id,
                        revision,
                        reason = reason.as_deref().unwrap_or(""),
                        "submission rejected, regenerating"
                    );
                    feedback = reason;
                    parent_id = Some(record.id);
                    revision += 1;
                }
                DecisionOutcome::TimedOut => {
                    return Ok(FinalOutcome::TimedOut { attempts });
                }
                DecisionOutcome::Cancelled => {
                    return Ok(FinalOutcome::Cancelled { attempts });
                }
            }
        }
    }
}
