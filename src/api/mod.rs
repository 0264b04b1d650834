use std::sync::Arc;

use axum::{
    routing::get,
    Router,
};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub mod handlers;

/// Build the relay-boundary router. The UI talks to a single endpoint
/// with an `action` selector; the caller mounts this under `/api`.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/relay",
            get(handlers::relay_dispatch).post(handlers::relay_dispatch),
        )
        .layer(TraceLayer::new_for_http())
}
