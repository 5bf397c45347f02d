use anyhow::Result;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::models::approval::ApprovalRequest;

// ── Webhook Event Types ───────────────────────────────────────

/// A structured event payload sent to webhook endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEvent {
    /// Event type identifier, e.g. "request_created", "request_resolved".
    pub event_type: String,
    /// ISO-8601 timestamp of when the event occurred.
    pub timestamp: String,
    /// The approval request the event is about.
    pub request_id: String,
    /// Checkpoint category.
    pub kind: String,
    /// Owner tag of the submitting producer.
    pub requested_by: String,
    /// Event-specific details (status, decider, reason, deadline, …).
    pub details: serde_json::Value,
}

impl WebhookEvent {
    /// A new request entered the pending set and awaits review.
    pub fn request_created(record: &ApprovalRequest) -> Self {
        Self {
            event_type: "request_created".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            request_id: record.id.to_string(),
            kind: format!("{:?}", record.kind),
            requested_by: record.requested_by.clone(),
            details: serde_json::json!({
                "title": record.title,
                "priority": record.priority,
                "deadline": record.deadline.to_rfc3339(),
                "revision_index": record.revision_index,
            }),
        }
    }

    /// A request reached a terminal state (decision, cancel, or timeout).
    pub fn request_resolved(record: &ApprovalRequest) -> Self {
        Self {
            event_type: "request_resolved".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            request_id: record.id.to_string(),
            kind: format!("{:?}", record.kind),
            requested_by: record.requested_by.clone(),
            details: serde_json::json!({
                "status": record.status.as_str(),
                "decided_by": record.decided_by,
                "reason": record.rejection_reason,
                "revision_index": record.revision_index,
            }),
        }
    }
}

// ── HMAC Signing ─────────────────────────────────────────────

/// Compute HMAC-SHA256 of `payload` using `secret`.
/// Returns lowercase hex digest (e.g. "sha256=<hex>").
fn hmac_sha256_hex(secret: &str, payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(payload);
    let result = mac.finalize();
    let bytes = result.into_bytes();
    format!("sha256={}", hex::encode(bytes))
}

// ── Webhook Notifier ──────────────────────────────────────────

/// Dispatches webhook events to one or more configured URLs.
/// Supports:
/// - HMAC-SHA256 signing (X-Greenlight-Signature header)
/// - Up to 3 retries with exponential back-off (1s → 5s → 25s)
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .user_agent("Greenlight-Webhook/1.0")
                .build()
                .expect("failed to build webhook HTTP client"),
        }
    }

    /// Send a signed webhook event to a single URL with retry.
    ///
    /// If `signing_secret` is `Some`, the request body is signed with
    /// HMAC-SHA256 and the signature is sent in the `X-Greenlight-Signature`
    /// header.
    ///
    /// Retries up to 3 times on failure with exponential back-off.
    /// Returns `Ok(())` if delivery succeeded on any attempt.
    pub async fn send_signed(
        &self,
        url: &str,
        event: &WebhookEvent,
        signing_secret: Option<&str>,
    ) -> Result<()> {
        let payload = serde_json::to_vec(event)
            .map_err(|e| anyhow::anyhow!("webhook serialize error: {}", e))?;
        let delivery_id = uuid::Uuid::new_v4().to_string();
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = signing_secret.map(|s| hmac_sha256_hex(s, &payload));

        let backoff_secs: &[u64] = &[0, 1, 5, 25];

        for (attempt, &delay) in backoff_secs.iter().enumerate() {
            if delay > 0 {
                debug!(
                    url,
                    attempt,
                    delay_secs = delay,
                    event_type = %event.event_type,
                    "retrying webhook delivery"
                );
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }

            let mut req = self
                .client
                .post(url)
                .header("content-type", "application/json")
                .header("x-greenlight-delivery-id", &delivery_id)
                .header("x-greenlight-timestamp", &timestamp)
                .header("x-greenlight-event", &event.event_type);

            if let Some(ref sig) = signature {
                req = req.header("x-greenlight-signature", sig.as_str());
            }

            let result = req.body(payload.clone()).send().await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    info!(
                        url,
                        event_type = %event.event_type,
                        delivery_id = %delivery_id,
                        attempt,
                        status = %resp.status(),
                        "webhook delivered successfully"
                    );
                    return Ok(());
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    warn!(
                        url,
                        event_type = %event.event_type,
                        delivery_id = %delivery_id,
                        attempt,
                        status = %status,
                        body = %body,
                        "webhook delivery failed (non-2xx), will retry"
                    );
                }
                Err(e) => {
                    warn!(
                        url,
                        event_type = %event.event_type,
                        delivery_id = %delivery_id,
                        attempt,
                        error = %e,
                        "webhook request error, will retry"
                    );
                }
            }
        }

        // All attempts exhausted
        warn!(
            url,
            event_type = %event.event_type,
            delivery_id = %delivery_id,
            "webhook delivery failed after all retries"
        );
        Err(anyhow::anyhow!(
            "webhook delivery failed after 3 retries: {}",
            url
        ))
    }

    /// Send without signing.
    pub async fn send(&self, url: &str, event: &WebhookEvent) -> Result<()> {
        self.send_signed(url, event, None).await
    }

    /// Dispatch a signed event to configured targets (URL + optional signing
    /// secret), fire-and-forget.
    ///
    /// Each target is attempted independently with retry; failures in one do
    /// not block others, and none of them block the caller.
    pub async fn dispatch_signed(&self, targets: &[(String, Option<String>)], event: WebhookEvent) {
        if targets.is_empty() {
            debug!("dispatch_signed: no webhook targets, skipping");
            return;
        }

        let notifier = self.clone();
        let targets = targets.to_vec();

        tokio::spawn(async move {
            for (url, secret) in &targets {
                if let Err(e) = notifier.send_signed(url, &event, secret.as_deref()).await {
                    warn!(url, error = %e, "webhook dispatch ultimately failed");
                }
            }
        });
    }
}

impl Default for WebhookNotifier {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────
