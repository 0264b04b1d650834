//! Integration tests for the token broker's two-flow state machine.
//!
//! All vendor traffic goes to a wiremock server; the credential store is
//! the in-memory implementation so store outages can be simulated.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chapterhouse::notification::{AlertEvent, AlertSink, NullAlerter};
use chapterhouse::sky::TokenBroker;
use chapterhouse::store::memory::MemoryStore;
use chapterhouse::store::{CredentialStore, REFRESH_TOKEN_KEY};

/// Records every event so tests can assert on the operational alerts.
#[derive(Clone, Default)]
struct RecordingAlerter {
    events: Arc<Mutex<Vec<AlertEvent>>>,
}

#[async_trait]
impl AlertSink for RecordingAlerter {
    async fn notify(&self, event: AlertEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn broker(
    server: &MockServer,
    static_refresh: Option<&str>,
    store: Arc<MemoryStore>,
    alerts: Arc<dyn AlertSink>,
) -> TokenBroker {
    TokenBroker::new(
        format!("{}/token", server.uri()),
        "client-id".into(),
        "client-secret".into(),
        static_refresh.map(String::from),
        store,
        alerts,
    )
}

fn token_response(access: &str, refresh: Option<&str>) -> ResponseTemplate {
    let mut body = json!({ "access_token": access, "expires_in": 3600 });
    if let Some(r) = refresh {
        body["refresh_token"] = json!(r);
    }
    ResponseTemplate::new(200).set_body_json(body)
}

#[tokio::test]
async fn cached_token_makes_no_second_network_call() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::with_entry(REFRESH_TOKEN_KEY, "rt-1"));

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(token_response("tok-1", None))
        .expect(1)
        .mount(&server)
        .await;

    let broker = broker(&server, None, store, Arc::new(NullAlerter));

    let first = broker.access_token().await.unwrap();
    let second = broker.access_token().await.unwrap();
    assert_eq!(first.value, "tok-1");
    assert_eq!(second.value, "tok-1");
    // The expect(1) on the mock enforces the fast path when dropped.
}

#[tokio::test]
async fn expiry_margin_is_300_seconds() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::with_entry(REFRESH_TOKEN_KEY, "rt-1"));

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(token_response("tok-1", None))
        .mount(&server)
        .await;

    let broker = broker(&server, None, store, Arc::new(NullAlerter));
    let before = std::time::Instant::now();
    let token = broker.access_token().await.unwrap();
    let after = std::time::Instant::now();

    // expires_in=3600 must cache for 3600-300=3300s from acquisition,
    // bounded here by the instants taken around the call.
    let margin = std::time::Duration::from_secs(3300);
    assert!(token.expires_at.duration_since(before) >= margin);
    assert!(token.expires_at.saturating_duration_since(after) <= margin);
}

#[tokio::test]
async fn rejected_refresh_flow_falls_back_to_client_credentials() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::with_entry(REFRESH_TOKEN_KEY, "rt-expired"));

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid_grant"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(token_response("tok-cc", None))
        .expect(1)
        .mount(&server)
        .await;

    let broker = broker(&server, None, store, Arc::new(NullAlerter));
    let token = broker.access_token().await.unwrap();
    assert_eq!(token.value, "tok-cc");
}

#[tokio::test]
async fn exchange_sends_basic_auth() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::with_entry(REFRESH_TOKEN_KEY, "rt-1"));

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(header_exists("authorization"))
        .respond_with(token_response("tok-1", None))
        .expect(1)
        .mount(&server)
        .await;

    let broker = broker(&server, None, store, Arc::new(NullAlerter));
    broker.access_token().await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let auth = requests[0]
        .headers
        .get("authorization")
        .unwrap()
        .to_str()
        .unwrap();
    // base64("client-id:client-secret")
    assert_eq!(auth, "Basic Y2xpZW50LWlkOmNsaWVudC1zZWNyZXQ=");
}

#[tokio::test]
async fn rotated_refresh_token_is_persisted() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::with_entry(REFRESH_TOKEN_KEY, "rt-old"));

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("refresh_token=rt-old"))
        .respond_with(token_response("tok-1", Some("rt-new")))
        .mount(&server)
        .await;

    let broker = broker(&server, None, store.clone(), Arc::new(NullAlerter));
    broker.access_token().await.unwrap();

    assert_eq!(
        store.get(REFRESH_TOKEN_KEY).await.unwrap(),
        Some("rt-new".to_string())
    );
}

#[tokio::test]
async fn store_outage_uses_static_refresh_token() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::new());
    store.set_poisoned(true);

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("refresh_token=rt-static"))
        .respond_with(token_response("tok-1", None))
        .expect(1)
        .mount(&server)
        .await;

    let broker = broker(&server, Some("rt-static"), store, Arc::new(NullAlerter));
    let token = broker.access_token().await.unwrap();
    assert_eq!(token.value, "tok-1");
}

#[tokio::test]
async fn persist_failure_on_client_credentials_fires_alert() {
    let server = MockServer::start().await;
    // No refresh token anywhere, so the broker goes straight to client
    // credentials; that flow unexpectedly returns a refresh token, and the
    // poisoned store cannot persist it.
    let store = Arc::new(MemoryStore::new());
    store.set_poisoned(true);

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(token_response("tok-cc", Some("rt-surprise")))
        .mount(&server)
        .await;

    let alerter = RecordingAlerter::default();
    let broker = broker(&server, None, store, Arc::new(alerter.clone()));

    // The auth flow itself must still succeed.
    let token = broker.access_token().await.unwrap();
    assert_eq!(token.value, "tok-cc");

    let events = alerter.events.lock().unwrap();
    assert!(events
        .iter()
        .any(|e| e.event_type == "refresh_token_persist_failed"));
}

#[tokio::test]
async fn both_flows_rejected_is_auth_upstream_error() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::with_entry(REFRESH_TOKEN_KEY, "rt-1"));

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
        .mount(&server)
        .await;

    let broker = broker(&server, None, store, Arc::new(NullAlerter));
    let err = broker.access_token().await.unwrap_err();
    match err {
        chapterhouse::errors::AppError::AuthUpstream { status, body } => {
            assert_eq!(status, 403);
            assert_eq!(body, "denied");
        }
        other => panic!("wrong error: {other:?}"),
    }
}

#[tokio::test]
async fn no_credentials_at_all_is_auth_config_error() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::new());

    let broker = TokenBroker::new(
        format!("{}/token", server.uri()),
        String::new(),
        String::new(),
        None,
        store,
        Arc::new(NullAlerter),
    );

    let err = broker.access_token().await.unwrap_err();
    assert!(matches!(
        err,
        chapterhouse::errors::AppError::AuthConfig(_)
    ));
    // No credential path means no network traffic at all.
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn invalidate_forces_reacquisition() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::with_entry(REFRESH_TOKEN_KEY, "rt-1"));

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(token_response("tok-1", None))
        .expect(2)
        .mount(&server)
        .await;

    let broker = broker(&server, None, store, Arc::new(NullAlerter));
    broker.access_token().await.unwrap();
    broker.invalidate().await;
    broker.access_token().await.unwrap();
}
