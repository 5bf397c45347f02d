use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::routing::get;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use greenlight::api;
use greenlight::cli::{Cli, Commands, RequestCommands};
use greenlight::config;
use greenlight::hub::NotificationHub;
use greenlight::manager::LifecycleManager;
use greenlight::models::approval::ApprovalRequest;
use greenlight::store::{ApprovalStore, MemoryStore};
use greenlight::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "greenlight=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = config::load()?;
    let args = Cli::parse();

    let result = match args.command {
        Some(Commands::Serve { port }) => run_server(cfg, port).await,
        Some(Commands::Request { command }) => {
            handle_request_command(&cfg, &args.url, command).await
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn run_server(cfg: config::Config, port: u16) -> anyhow::Result<()> {
    let store: Arc<dyn ApprovalStore> = Arc::new(MemoryStore::new());

    tracing::info!("Starting notification hub...");
    let hub = Arc::new(NotificationHub::new(store.clone()));
    hub.clone().spawn();

    let manager = Arc::new(
        LifecycleManager::new(store, cfg.policy()).with_webhook_targets(cfg.webhook_targets()),
    );
    manager.clone().spawn_timeout_sweep(cfg.sweep_interval());
    tracing::info!("Timeout sweep started (every {:?})", cfg.sweep_interval());

    let state = Arc::new(AppState {
        manager,
        hub,
        config: cfg,
    });

    let app = axum::Router::new()
        // Health endpoints (no auth)
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readiness_check))
        // Push channel for dashboards
        .route("/stream", get(api::ws::stream_updates))
        // Management API — nested under /api/v1
        .nest("/api/v1", api::api_router())
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        // Restrict CORS origins (reads DASHBOARD_ORIGIN env var, defaults to localhost for dev)
        .layer({
            use axum::http::{HeaderName, Method};
            use tower_http::cors::AllowOrigin;
            let dashboard_origin = std::env::var("DASHBOARD_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string());
            CorsLayer::new()
                .allow_origin(AllowOrigin::predicate(move |origin, _| {
                    let origin_str = origin.to_str().unwrap_or("");
                    origin_str == dashboard_origin
                        || origin_str.starts_with("http://localhost:")
                        || origin_str.starts_with("http://127.0.0.1:")
                }))
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([
                    HeaderName::from_static("content-type"),
                    HeaderName::from_static("authorization"),
                    HeaderName::from_static("x-admin-key"),
                    HeaderName::from_static("x-request-id"),
                ])
        })
        .layer(axum::middleware::from_fn(request_id_middleware));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Greenlight listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Middleware: injects a unique X-Request-Id into every response.
/// This allows clients to correlate errors with engine logs.
async fn request_id_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = axum::http::HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

async fn readiness_check() -> &'static str {
    "ok"
}

// ── CLI client for the management API ────────────────────────
// Engine state lives in the serving process, so these subcommands talk to it
// over HTTP rather than opening a second store.

fn api_client(cfg: &config::Config) -> anyhow::Result<(reqwest::Client, Vec<(String, String)>)> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .context("failed to build API client")?;
    let mut headers = Vec::new();
    if let Some(key) = &cfg.admin_key {
        headers.push(("x-admin-key".to_string(), key.clone()));
    }
    Ok((client, headers))
}

async fn handle_request_command(
    cfg: &config::Config,
    base_url: &str,
    cmd: RequestCommands,
) -> anyhow::Result<()> {
    let (client, headers) = api_client(cfg)?;
    let with_headers = |mut req: reqwest::RequestBuilder| {
        for (name, value) in &headers {
            req = req.header(name.as_str(), value.as_str());
        }
        req
    };

    match cmd {
        RequestCommands::List {
            status,
            requested_by,
        } => {
            let mut req = client.get(format!("{base_url}/api/v1/requests"));
            if let Some(status) = status {
                req = req.query(&[("status", status)]);
            }
            if let Some(owner) = requested_by {
                req = req.query(&[("requested_by", owner)]);
            }
            let resp = with_headers(req).send().await?.error_for_status()?;
            let requests: Vec<ApprovalRequest> = resp.json().await?;

            if requests.is_empty() {
                println!("No requests found.");
                return Ok(());
            }
            println!(
                "{:<38} {:<16} {:<10} {:<20} DEADLINE",
                "ID", "KIND", "STATUS", "REQUESTED BY"
            );
            for r in requests {
                println!(
                    "{:<38} {:<16} {:<10} {:<20} {}",
                    r.id,
                    format!("{:?}", r.kind),
                    r.status.as_str(),
                    r.requested_by,
                    r.deadline.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        RequestCommands::Show { request_id } => {
            let resp = with_headers(
                client.get(format!("{base_url}/api/v1/requests/{request_id}")),
            )
            .send()
            .await?;
            if resp.status() == reqwest::StatusCode::NOT_FOUND {
                println!("Request {} not found.", request_id);
                return Ok(());
            }
            let record: ApprovalRequest = resp.error_for_status()?.json().await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        RequestCommands::Approve {
            request_id,
            decided_by,
            reason,
        } => {
            let resp = with_headers(
                client.post(format!("{base_url}/api/v1/requests/{request_id}/decision")),
            )
            .json(&serde_json::json!({
                "decision": "approve",
                "decided_by": decided_by,
                "reason": reason,
            }))
            .send()
            .await?;
            print_resolution(resp, &request_id, "approved").await?;
        }
        RequestCommands::Reject {
            request_id,
            decided_by,
            reason,
        } => {
            let resp = with_headers(
                client.post(format!("{base_url}/api/v1/requests/{request_id}/decision")),
            )
            .json(&serde_json::json!({
                "decision": "reject",
                "decided_by": decided_by,
                "reason": reason,
            }))
            .send()
            .await?;
            print_resolution(resp, &request_id, "rejected").await?;
        }
        RequestCommands::Cancel { request_id } => {
            let resp = with_headers(
                client.post(format!("{base_url}/api/v1/requests/{request_id}/cancel")),
            )
            .send()
            .await?;
            print_resolution(resp, &request_id, "cancelled").await?;
        }
    }
    Ok(())
}

async fn print_resolution(
    resp: reqwest::Response,
    request_id: &str,
    verb: &str,
) -> anyhow::Result<()> {
    match resp.status() {
        reqwest::StatusCode::OK => println!("Request {} {}.", request_id, verb),
        reqwest::StatusCode::NOT_FOUND => println!("Request {} not found.", request_id),
        reqwest::StatusCode::CONFLICT => {
            println!("Request {} was already resolved.", request_id)
        }
        status => {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("unexpected response {status}: {body}");
        }
    }
    Ok(())
}
