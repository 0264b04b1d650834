//! Chapterhouse — membership relay for chapter officers, backed by the
//! Blackbaud SKY API.
//!
//! Library crate so integration tests in `tests/` can build the router
//! and the SKY-facing components against mock servers.

pub mod api;
pub mod batch;
pub mod chapters;
pub mod config;
pub mod errors;
pub mod notification;
pub mod sky;
pub mod store;

use std::sync::Arc;

use batch::Pacer;
use notification::AlertSink;
use sky::{QueryJobRunner, SkyRelay, TokenBroker};
use store::CredentialStore;

/// Shared application state passed to handlers.
pub struct AppState {
    pub config: config::Config,
    pub store: Arc<dyn CredentialStore>,
    pub broker: Arc<TokenBroker>,
    pub relay: Arc<SkyRelay>,
    pub query: QueryJobRunner,
    pub pacer: Pacer,
}

impl AppState {
    /// Wire the component graph from config plus injected collaborators.
    /// The store and alert sink are injectable so tests can swap in
    /// in-memory implementations.
    pub fn new(
        config: config::Config,
        store: Arc<dyn CredentialStore>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        let broker = Arc::new(TokenBroker::new(
            config.sky_token_url.clone(),
            config.sky_client_id.clone(),
            config.sky_client_secret.clone(),
            config.sky_refresh_token.clone(),
            store.clone(),
            alerts,
        ));
        let relay = Arc::new(SkyRelay::new(
            config.sky_api_base.clone(),
            config.sky_subscription_key.clone(),
            broker.clone(),
        ));
        let query = QueryJobRunner::new(relay.clone());
        let pacer = Pacer::new(config.max_calls_per_second);

        Self {
            config,
            store,
            broker,
            relay,
            query,
            pacer,
        }
    }
}
