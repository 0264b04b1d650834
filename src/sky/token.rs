use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::notification::{AlertEvent, AlertSink};
use crate::store::{CredentialStore, REFRESH_TOKEN_KEY};

/// Tokens are treated as expired this long before the vendor-stated
/// expiry, so a token never dies mid-workflow.
const EXPIRY_MARGIN_SECS: u64 = 300;

/// Short-lived bearer credential for SKY calls. Replaced wholesale on
/// every acquisition, never mutated in place.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: Instant,
}

impl AccessToken {
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.value)
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Cached lifetime for a vendor-declared `expires_in`, margin applied.
fn lifetime_after_margin(expires_in_secs: u64) -> Duration {
    Duration::from_secs(expires_in_secs.saturating_sub(EXPIRY_MARGIN_SECS))
}

#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    expires_in: u64,
    refresh_token: Option<String>,
}

enum Exchange {
    Granted(TokenEndpointResponse),
    Rejected { status: u16, body: String },
}

/// Owns the access-token cache and the two-flow acquisition state machine:
/// refresh-token exchange first, client-credentials as fallback.
///
/// The cache sits behind a tokio Mutex held across the refresh, so
/// concurrent callers that miss the fast path share one upstream exchange
/// instead of racing to mint duplicate tokens.
pub struct TokenBroker {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    /// Statically configured fallback, used when the store is unreachable
    /// or has never seen a token.
    static_refresh_token: Option<String>,
    store: Arc<dyn CredentialStore>,
    alerts: Arc<dyn AlertSink>,
    cache: Mutex<Option<AccessToken>>,
}

impl TokenBroker {
    pub fn new(
        token_url: String,
        client_id: String,
        client_secret: String,
        static_refresh_token: Option<String>,
        store: Arc<dyn CredentialStore>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("failed to build token HTTP client"),
            token_url,
            client_id,
            client_secret,
            static_refresh_token,
            store,
            alerts,
            cache: Mutex::new(None),
        }
    }

    /// Return a valid access token, minting one only when the cache is
    /// empty or past its margin-adjusted expiry. The cached fast path makes
    /// no network call.
    pub async fn access_token(&self) -> Result<AccessToken, AppError> {
        let mut cache = self.cache.lock().await;

        if let Some(token) = cache.as_ref() {
            if !token.is_expired() {
                return Ok(token.clone());
            }
        }

        let token = self.acquire().await?;
        *cache = Some(token.clone());
        Ok(token)
    }

    /// Drop the cached token so the next call re-authenticates.
    pub async fn invalidate(&self) {
        *self.cache.lock().await = None;
    }

    async fn acquire(&self) -> Result<AccessToken, AppError> {
        let mut refresh_rejection: Option<(u16, String)> = None;

        if let Some(refresh_token) = self.current_refresh_token().await {
            match self.exchange_refresh_token(&refresh_token).await {
                Ok(Exchange::Granted(granted)) => {
                    self.persist_rotated_token(&refresh_token, granted.refresh_token.as_deref())
                        .await;
                    info!("access token acquired via refresh-token flow");
                    return Ok(cache_entry(granted));
                }
                Ok(Exchange::Rejected { status, body }) => {
                    warn!(
                        status,
                        "refresh-token exchange rejected, falling back to client credentials"
                    );
                    refresh_rejection = Some((status, body));
                }
                Err(e) => {
                    warn!(error = %e, "refresh-token exchange unreachable, falling back to client credentials");
                }
            }
        } else {
            debug!("no refresh token available, going straight to client credentials");
        }

        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(AppError::AuthConfig(
                "client credentials are not configured and no refresh token worked".into(),
            ));
        }

        if let Some((status, _)) = refresh_rejection {
            self.alerts
                .notify(AlertEvent::auth_fallback_engaged(status))
                .await;
        }

        match self
            .exchange(&[("grant_type", "client_credentials")])
            .await
        {
            Ok(Exchange::Granted(granted)) => {
                // Vendor-dependent: this flow occasionally returns a refresh
                // token. Losing it strands the credential, so a persist
                // failure here pages an operator.
                if let Some(new_refresh) = granted.refresh_token.as_deref() {
                    if let Err(e) = self.store.set(REFRESH_TOKEN_KEY, new_refresh).await {
                        warn!(error = %e, "failed to persist refresh token from client-credentials flow");
                        self.alerts
                            .notify(AlertEvent::refresh_token_persist_failed(&e.to_string()))
                            .await;
                    }
                }
                info!("access token acquired via client-credentials flow");
                Ok(cache_entry(granted))
            }
            Ok(Exchange::Rejected { status, body }) => {
                Err(AppError::AuthUpstream { status, body })
            }
            Err(e) => Err(AppError::AuthUpstream {
                status: 0,
                body: format!("token endpoint unreachable: {}", e),
            }),
        }
    }

    /// Store first, static config second. Store failures are logged and
    /// swallowed; the Broker decides fatality, and absence of a refresh
    /// token is not fatal while client credentials remain.
    async fn current_refresh_token(&self) -> Option<String> {
        match self.store.get(REFRESH_TOKEN_KEY).await {
            Ok(Some(token)) if !token.is_empty() => return Some(token),
            Ok(_) => debug!("credential store has no refresh token"),
            Err(e) => warn!(error = %e, "credential store unavailable, using static refresh token"),
        }
        self.static_refresh_token.clone()
    }

    async fn exchange_refresh_token(&self, refresh_token: &str) -> anyhow::Result<Exchange> {
        self.exchange(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn exchange(&self, form: &[(&str, &str)]) -> anyhow::Result<Exchange> {
        let basic = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", self.client_id, self.client_secret));

        let resp = self
            .http
            .post(&self.token_url)
            .header("authorization", format!("Basic {}", basic))
            .form(form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Ok(Exchange::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let granted: TokenEndpointResponse = resp.json().await.map_err(|e| {
            anyhow::anyhow!("token endpoint returned 2xx with unreadable body: {}", e)
        })?;
        Ok(Exchange::Granted(granted))
    }

    /// SKY may rotate the refresh token on any exchange; a newly issued one
    /// supersedes the stored one immediately. Persist failure degrades
    /// future refreshes but never fails the current request.
    async fn persist_rotated_token(&self, sent: &str, returned: Option<&str>) {
        let Some(new_token) = returned else { return };
        if new_token == sent {
            return;
        }
        match self.store.set(REFRESH_TOKEN_KEY, new_token).await {
            Ok(()) => info!("rotated refresh token persisted"),
            Err(e) => warn!(error = %e, "failed to persist rotated refresh token"),
        }
    }
}

fn cache_entry(granted: TokenEndpointResponse) -> AccessToken {
    AccessToken {
        value: granted.access_token,
        expires_at: Instant::now() + lifetime_after_margin(granted.expires_in),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn margin_is_five_minutes() {
        assert_eq!(lifetime_after_margin(3600), Duration::from_secs(3300));
    }

    #[test]
    fn short_lifetimes_saturate_to_zero() {
        assert_eq!(lifetime_after_margin(120), Duration::from_secs(0));
    }

    #[test]
    fn token_within_margin_is_expired() {
        let token = AccessToken {
            value: "t".into(),
            expires_at: Instant::now(),
        };
        assert!(token.is_expired());
    }

    #[test]
    fn bearer_header_shape() {
        let token = AccessToken {
            value: "abc123".into(),
            expires_at: Instant::now() + Duration::from_secs(60),
        };
        assert_eq!(token.bearer(), "Bearer abc123");
    }
}
