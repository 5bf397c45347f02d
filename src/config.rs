use std::time::Duration;

use serde::Deserialize;

use crate::manager::ApprovalPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub admin_key: Option<String>,
    /// Comma-separated list of webhook URLs to notify on lifecycle events.
    pub webhook_urls: Vec<String>,
    /// Optional shared secret for HMAC-signing webhook payloads.
    pub webhook_secret: Option<String>,
    /// Deadline applied when a submission carries no explicit timeout.
    /// Set via GREENLIGHT_DEFAULT_TIMEOUT_SECS. Default: 300.
    pub default_timeout_secs: u64,
    /// Cadence of the background timeout sweep.
    /// Set via GREENLIGHT_SWEEP_INTERVAL_SECS. Default: 1.
    pub sweep_interval_secs: u64,
    /// Whether reject decisions must carry a reason.
    /// Set via GREENLIGHT_REQUIRE_REJECTION_REASON. Default: true.
    pub require_rejection_reason: bool,
    /// Resubmission bound for the revision controller.
    /// Set via GREENLIGHT_MAX_REVISIONS. Default: 2.
    pub max_revisions: u32,
}

impl Config {
    pub fn policy(&self) -> ApprovalPolicy {
        ApprovalPolicy {
            default_timeout: Duration::from_secs(self.default_timeout_secs),
            require_rejection_reason: self.require_rejection_reason,
            max_revisions: self.max_revisions,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    /// Webhook targets as `(url, signing_secret)` pairs.
    pub fn webhook_targets(&self) -> Vec<(String, Option<String>)> {
        self.webhook_urls
            .iter()
            .map(|url| (url.clone(), self.webhook_secret.clone()))
            .collect()
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let admin_key = std::env::var("GREENLIGHT_ADMIN_KEY").ok();
    if admin_key.is_none() {
        let env_mode = std::env::var("GREENLIGHT_ENV")
            .or_else(|_| std::env::var("RUST_ENV"))
            .unwrap_or_default();
        if env_mode == "production" {
            anyhow::bail!(
                "GREENLIGHT_ADMIN_KEY is not set. The management API cannot \
                 run unauthenticated in production."
            );
        }
        eprintln!("⚠️  GREENLIGHT_ADMIN_KEY is not set — management API auth is disabled. Set a key for production.");
    }

    Ok(Config {
        port: std::env::var("GREENLIGHT_PORT")
            .unwrap_or_else(|_| "8443".into())
            .parse()
            .unwrap_or(8443),
        admin_key,
        webhook_urls: std::env::var("GREENLIGHT_WEBHOOK_URLS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        webhook_secret: std::env::var("GREENLIGHT_WEBHOOK_SECRET").ok(),
        default_timeout_secs: std::env::var("GREENLIGHT_DEFAULT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(300),
        sweep_interval_secs: std::env::var("GREENLIGHT_SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1),
        require_rejection_reason: std::env::var("GREENLIGHT_REQUIRE_REJECTION_REASON")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(true),
        max_revisions: std::env::var("GREENLIGHT_MAX_REVISIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(2),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            port: 8443,
            admin_key: None,
            webhook_urls: vec!["http://a".into(), "http://b".into()],
            webhook_secret: Some("s3cret".into()),
            default_timeout_secs: 300,
            sweep_interval_secs: 0,
            require_rejection_reason: true,
            max_revisions: 2,
        }
    }

    #[test]
    fn test_webhook_targets_pair_urls_with_secret() {
        let targets = config().webhook_targets();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].0, "http://a");
        assert_eq!(targets[0].1.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_sweep_interval_never_zero() {
        assert_eq!(config().sweep_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_policy_projection() {
        let policy = config().policy();
        assert_eq!(policy.default_timeout, Duration::from_secs(300));
        assert!(policy.require_rejection_reason);
        assert_eq!(policy.max_revisions, 2);
    }
}
