pub mod webhook;

use async_trait::async_trait;

pub use webhook::{AlertEvent, WebhookAlerter};

/// Operational alert channel, injected into the Token Broker.
///
/// Delivery is best-effort: implementations must never let an alert
/// failure propagate into the request that triggered it.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, event: AlertEvent);
}

/// Sink that drops every event. Used in tests and when no webhook URLs
/// are configured.
#[derive(Clone, Default)]
pub struct NullAlerter;

#[async_trait]
impl AlertSink for NullAlerter {
    async fn notify(&self, event: AlertEvent) {
        tracing::debug!(event_type = %event.event_type, "alert sink disabled, dropping event");
    }
}
