use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::{info, warn};

use super::AlertSink;

// ── Alert Event Types ─────────────────────────────────────────

/// A structured event payload sent to alert endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct AlertEvent {
    /// Event type identifier, e.g. "refresh_token_persist_failed".
    pub event_type: String,
    /// ISO-8601 timestamp of when the event occurred.
    pub timestamp: String,
    /// Event-specific details.
    pub details: serde_json::Value,
}

impl AlertEvent {
    /// The client-credentials flow handed us a rotated refresh token and we
    /// failed to persist it. An operator has to recover the credential by
    /// hand before the next refresh, so this one must reach a human.
    pub fn refresh_token_persist_failed(reason: &str) -> Self {
        Self {
            event_type: "refresh_token_persist_failed".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            details: serde_json::json!({ "reason": reason }),
        }
    }

    pub fn auth_fallback_engaged(refresh_status: u16) -> Self {
        Self {
            event_type: "auth_fallback_engaged".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            details: serde_json::json!({ "refresh_flow_status": refresh_status }),
        }
    }
}

// ── HMAC Signing ──────────────────────────────────────────────

/// Compute HMAC-SHA256 of `payload` using `secret`.
/// Returns "sha256=<lowercase hex digest>".
fn hmac_sha256_hex(secret: &str, payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(payload);
    let bytes = mac.finalize().into_bytes();
    format!("sha256={}", hex::encode(bytes))
}

// ── Webhook Alerter ───────────────────────────────────────────

/// Dispatches alert events to one or more configured URLs.
/// Supports:
/// - HMAC-SHA256 signing (X-Chapterhouse-Signature header)
/// - Up to 3 retries with exponential back-off (1s, 5s, 25s)
#[derive(Clone)]
pub struct WebhookAlerter {
    client: reqwest::Client,
    urls: Vec<String>,
    signing_secret: Option<String>,
}

impl WebhookAlerter {
    pub fn new(urls: Vec<String>, signing_secret: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .user_agent("Chapterhouse-Alert/1.0")
                .build()
                .expect("failed to build alert HTTP client"),
            urls,
            signing_secret,
        }
    }

    /// Send a signed alert to a single URL with retry.
    /// Returns `Ok(())` if delivery succeeded on any attempt.
    pub async fn send(&self, url: &str, event: &AlertEvent) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(event)
            .map_err(|e| anyhow::anyhow!("alert serialize error: {}", e))?;
        let delivery_id = uuid::Uuid::new_v4().to_string();
        let signature = self
            .signing_secret
            .as_deref()
            .map(|s| hmac_sha256_hex(s, &payload));

        let backoff_secs: &[u64] = &[0, 1, 5, 25];

        for (attempt, &delay) in backoff_secs.iter().enumerate() {
            if delay > 0 {
                tracing::debug!(
                    url,
                    attempt,
                    delay_secs = delay,
                    event_type = %event.event_type,
                    "retrying alert delivery"
                );
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }

            let mut req = self
                .client
                .post(url)
                .header("content-type", "application/json")
                .header("x-chapterhouse-delivery-id", &delivery_id)
                .header("x-chapterhouse-event", &event.event_type);

            if let Some(ref sig) = signature {
                req = req.header("x-chapterhouse-signature", sig.as_str());
            }

            match req.body(payload.clone()).send().await {
                Ok(resp) if resp.status().is_success() => {
                    info!(
                        url,
                        event_type = %event.event_type,
                        delivery_id = %delivery_id,
                        attempt,
                        "alert delivered"
                    );
                    return Ok(());
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    warn!(
                        url,
                        event_type = %event.event_type,
                        attempt,
                        status = %status,
                        body = %body,
                        "alert delivery failed (non-2xx), will retry"
                    );
                }
                Err(e) => {
                    warn!(
                        url,
                        event_type = %event.event_type,
                        attempt,
                        error = %e,
                        "alert request error, will retry"
                    );
                }
            }
        }

        Err(anyhow::anyhow!(
            "alert delivery failed after 3 retries: {}",
            url
        ))
    }
}

#[async_trait]
impl AlertSink for WebhookAlerter {
    /// Fire-and-forget dispatch to every configured URL. Each URL is
    /// attempted independently; failures in one do not block others, and
    /// nothing propagates back to the caller.
    async fn notify(&self, event: AlertEvent) {
        if self.urls.is_empty() {
            return;
        }

        let alerter = self.clone();

        tokio::spawn(async move {
            for url in &alerter.urls {
                if let Err(e) = alerter.send(url, &event).await {
                    warn!(url, error = %e, "alert dispatch ultimately failed");
                }
            }
        });
    }
}

// ── Tests ─────────────────────────────────────────────────────
