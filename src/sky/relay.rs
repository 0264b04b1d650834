use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;

use crate::errors::AppError;
use crate::sky::token::TokenBroker;

/// Normalized body of a relayed SKY response.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayBody {
    Json(Value),
    Text(String),
}

impl RelayBody {
    /// Boundary representation: JSON passes through, text is wrapped.
    pub fn into_value(self) -> Value {
        match self {
            RelayBody::Json(v) => v,
            RelayBody::Text(t) => json!({ "value": t }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelayResponse {
    pub status: u16,
    pub body: RelayBody,
}

/// Stateless proxy for SKY resource calls. Attaches the bearer token from
/// the broker and the subscription key, performs the call, and normalizes
/// the outcome:
///
/// - 2xx: JSON when the Content-Type says so, text otherwise; an empty
///   body on PATCH becomes a synthetic acknowledgement, not an error.
/// - DELETE hitting 404: success — the resource is already gone.
/// - any other non-2xx: `UpstreamCall` with the vendor body verbatim.
///
/// No automatic retries; batch workflows own their own retry story.
pub struct SkyRelay {
    http: reqwest::Client,
    api_base: String,
    subscription_key: String,
    broker: Arc<TokenBroker>,
}

impl SkyRelay {
    pub fn new(api_base: String, subscription_key: String, broker: Arc<TokenBroker>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("failed to build relay HTTP client"),
            api_base: api_base.trim_end_matches('/').to_string(),
            subscription_key,
            broker,
        }
    }

    pub async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<RelayResponse, AppError> {
        let token = self.broker.access_token().await?;
        let url = format!("{}/{}", self.api_base, path.trim_start_matches('/'));

        debug!(%method, %url, "relaying SKY call");

        let mut req = self
            .http
            .request(method.clone(), &url)
            .header("authorization", token.bearer())
            .header("bb-api-subscription-key", &self.subscription_key);

        if let Some(payload) = body {
            req = req.json(payload);
        }

        let resp = req.send().await.map_err(|e| AppError::UpstreamCall {
            status: 0,
            body: format!("transport error: {}", e),
        })?;

        let status = resp.status();
        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let text = resp.text().await.unwrap_or_default();

        classify(method, status.as_u16(), &content_type, text)
    }
}

/// Outcome classification, split from the I/O so it is unit-testable.
fn classify(
    method: Method,
    status: u16,
    content_type: &str,
    text: String,
) -> Result<RelayResponse, AppError> {
    if (200..300).contains(&status) {
        if text.is_empty() && method == Method::PATCH {
            // SKY acknowledges most PATCHes with 200 and no body.
            return Ok(RelayResponse {
                status,
                body: RelayBody::Json(json!({ "acknowledged": true })),
            });
        }
        let body = if content_type.contains("json") {
            match serde_json::from_str(&text) {
                Ok(v) => RelayBody::Json(v),
                Err(_) => RelayBody::Text(text),
            }
        } else {
            RelayBody::Text(text)
        };
        return Ok(RelayResponse { status, body });
    }

    if status == 404 && method == Method::DELETE {
        // Idempotent delete: already gone is success.
        return Ok(RelayResponse {
            status,
            body: RelayBody::Json(json!({ "acknowledged": true, "already_gone": true })),
        });
    }

    Err(AppError::UpstreamCall { status, body: text })
}
