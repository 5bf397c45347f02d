use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::approval::{
    ApprovalKind, ApprovalRequest, ApprovalStatus, Decision, NewApproval, Priority,
};
use crate::store::ListFilter;
use crate::AppState;

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Deserialize)]
pub struct CreateRequestPayload {
    pub kind: ApprovalKind,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub context: serde_json::Value,
    pub requested_by: String,
    pub timeout_seconds: Option<u64>,
    pub priority: Option<Priority>,
}

#[derive(Serialize)]
pub struct CreateRequestResponse {
    pub request_id: Uuid,
}

#[derive(Deserialize)]
pub struct DecisionPayload {
    pub decision: Decision, // "approve" | "reject"
    pub decided_by: String,
    pub reason: Option<String>,
}

#[derive(Serialize)]
pub struct ResolutionResponse {
    pub id: Uuid,
    pub status: ApprovalStatus,
}

#[derive(Deserialize)]
pub struct ListParams {
    pub status: Option<ApprovalStatus>,
    pub kind: Option<ApprovalKind>,
    pub requested_by: Option<String>,
}

// ── Handlers ─────────────────────────────────────────────────

/// POST /api/v1/requests — submit a new decision checkpoint
pub async fn create_request(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateRequestPayload>,
) -> Result<(StatusCode, Json<CreateRequestResponse>), AppError> {
    if payload.title.trim().is_empty() {
        return Err(AppError::Validation("title must not be empty".into()));
    }
    if payload.requested_by.trim().is_empty() {
        return Err(AppError::Validation("requested_by must not be empty".into()));
    }

    let mut new = NewApproval::new(
        payload.kind,
        payload.title,
        payload.content,
        payload.requested_by,
    )
    .context(payload.context);
    if let Some(priority) = payload.priority {
        new = new.priority(priority);
    }
    if let Some(secs) = payload.timeout_seconds {
        new = new.timeout(Duration::from_secs(secs));
    }

    let record = state.manager.request_approval(new).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateRequestResponse {
            request_id: record.id,
        }),
    ))
}

/// GET /api/v1/requests/:id — full snapshot of one request
pub async fn get_request(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<Json<ApprovalRequest>, AppError> {
    let id = parse_id(&id_str)?;
    Ok(Json(state.manager.get(id).await?))
}

/// GET /api/v1/requests — filtered list, newest first
pub async fn list_requests(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<ApprovalRequest>>, AppError> {
    let filter = ListFilter {
        status: params.status,
        kind: params.kind,
        requested_by: params.requested_by,
    };
    Ok(Json(state.manager.list(filter).await?))
}

/// POST /api/v1/requests/:id/decision — approve or reject a request
pub async fn decide_request(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
    Json(payload): Json<DecisionPayload>,
) -> Result<Json<ResolutionResponse>, AppError> {
    let id = parse_id(&id_str)?;

    let record = state
        .manager
        .decide(id, payload.decision, payload.decided_by, payload.reason)
        .await?;

    Ok(Json(ResolutionResponse {
        id: record.id,
        status: record.status,
    }))
}

/// POST /api/v1/requests/:id/cancel — resolve a request whose producer aborted
pub async fn cancel_request(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<Json<ResolutionResponse>, AppError> {
    let id = parse_id(&id_str)?;
    let record = state.manager.cancel(id).await?;
    Ok(Json(ResolutionResponse {
        id: record.id,
        status: record.status,
    }))
}

fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::Validation(format!("invalid request id: {raw}")))
}
