use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub redis_url: String,
    /// SKY app client id, used for both OAuth2 grant flows.
    pub sky_client_id: String,
    pub sky_client_secret: String,
    /// Bb-Api-Subscription-Key attached to every resource call.
    pub sky_subscription_key: String,
    /// OAuth2 token endpoint.
    pub sky_token_url: String,
    /// Base URL for SKY resource and query endpoints.
    pub sky_api_base: String,
    /// Static fallback refresh token, used when the credential store is
    /// unreachable or empty. Optional: client-credentials still works
    /// without it.
    pub sky_refresh_token: Option<String>,
    /// Operational alert webhook URLs (comma-separated in the env).
    pub alert_webhook_urls: Vec<String>,
    /// Optional HMAC signing secret for alert payloads.
    pub alert_signing_secret: Option<String>,
    /// Ceiling for write bursts from batch workflows, calls per second.
    pub max_calls_per_second: u32,
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let sky_client_id = std::env::var("SKY_CLIENT_ID").unwrap_or_default();
    let sky_client_secret = std::env::var("SKY_CLIENT_SECRET").unwrap_or_default();

    if sky_client_id.is_empty() || sky_client_secret.is_empty() {
        let env_mode = std::env::var("CHAPTERHOUSE_ENV")
            .or_else(|_| std::env::var("RUST_ENV"))
            .unwrap_or_default();
        if env_mode == "production" {
            anyhow::bail!(
                "SKY_CLIENT_ID / SKY_CLIENT_SECRET are not set. \
                 Both are required to run in production."
            );
        }
        eprintln!("⚠️  SKY_CLIENT_ID / SKY_CLIENT_SECRET not set — auth flows will fail until configured.");
    }

    Ok(Config {
        port: std::env::var("CHAPTERHOUSE_PORT")
            .unwrap_or_else(|_| "8088".into())
            .parse()
            .unwrap_or(8088),
        redis_url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),
        sky_client_id,
        sky_client_secret,
        sky_subscription_key: std::env::var("SKY_SUBSCRIPTION_KEY").unwrap_or_default(),
        sky_token_url: std::env::var("SKY_TOKEN_URL")
            .unwrap_or_else(|_| "https://oauth2.sky.blackbaud.com/token".into()),
        sky_api_base: std::env::var("SKY_API_BASE")
            .unwrap_or_else(|_| "https://api.sky.blackbaud.com".into()),
        sky_refresh_token: std::env::var("SKY_REFRESH_TOKEN").ok().filter(|s| !s.is_empty()),
        alert_webhook_urls: std::env::var("CHAPTERHOUSE_ALERT_WEBHOOK_URLS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        alert_signing_secret: std::env::var("CHAPTERHOUSE_ALERT_SIGNING_SECRET").ok(),
        max_calls_per_second: std::env::var("CHAPTERHOUSE_MAX_CALLS_PER_SECOND")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5),
    })
}
