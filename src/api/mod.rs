use std::sync::Arc;

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub mod handlers;
pub mod ws;

/// Build the Management API router.
/// All routes are relative — the caller mounts this under `/api/v1`.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/requests",
            get(handlers::list_requests).post(handlers::create_request),
        )
        .route("/requests/:id", get(handlers::get_request))
        .route("/requests/:id/decision", post(handlers::decide_request))
        .route("/requests/:id/cancel", post(handlers::cancel_request))
        .layer(middleware::from_fn(admin_auth))
        .layer(TraceLayer::new_for_http())
        .fallback(fallback_404)
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Middleware: validates `X-Admin-Key` header against the configured admin
/// key. When no key is configured (dev mode, warned at startup) requests
/// pass through.
async fn admin_auth(req: Request, next: Next) -> Result<Response, StatusCode> {
    let expected = match std::env::var("GREENLIGHT_ADMIN_KEY") {
        Ok(key) => key,
        Err(_) => return Ok(next.run(req).await),
    };

    let provided_key = req
        .headers()
        .get("x-admin-key")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            req.headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|t| t.trim())
        });

    match provided_key {
        Some(k) if k == expected => Ok(next.run(req).await),
        Some(k) => {
            // SECURITY: Never log the expected key or the full provided key
            let masked = if k.len() > 8 {
                format!("{}…{}", &k[..4], &k[k.len() - 4..])
            } else {
                "****".to_string()
            };
            tracing::warn!("management API: invalid key (provided: '{}')", masked);
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            tracing::warn!("management API: missing X-Admin-Key header");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
