pub mod memory;
pub mod redis;

use async_trait::async_trait;

/// Key under which the current long-lived refresh token is persisted.
pub const REFRESH_TOKEN_KEY: &str = "sky:refresh_token";

/// Key holding the allowed-skips config document (one JSON object mapping
/// chapter name -> bool, read and written wholesale).
pub const ALLOWED_SKIPS_KEY: &str = "chapters:allowed_skips";

/// Abstraction over the durable key-value backend.
/// Implementations: RedisStore (production), MemoryStore (tests / dev).
///
/// Errors are reported truthfully; callers decide fatality. The Token
/// Broker treats any failure here as "value absent" and never lets a store
/// outage fail an auth flow.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
}
