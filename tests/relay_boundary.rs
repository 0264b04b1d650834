//! Tests for the single action-dispatch endpoint the UI consumes.
//! The router runs in-process via tower's oneshot; SKY traffic goes to a
//! wiremock server.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chapterhouse::config::Config;
use chapterhouse::notification::NullAlerter;
use chapterhouse::store::memory::MemoryStore;
use chapterhouse::store::REFRESH_TOKEN_KEY;
use chapterhouse::{api, AppState};

fn test_config(base: &str) -> Config {
    Config {
        port: 0,
        redis_url: String::new(),
        sky_client_id: "client-id".into(),
        sky_client_secret: "client-secret".into(),
        sky_subscription_key: "sub-key".into(),
        sky_token_url: format!("{}/token", base),
        sky_api_base: base.to_string(),
        sky_refresh_token: None,
        alert_webhook_urls: vec![],
        alert_signing_secret: None,
        max_calls_per_second: 1000,
    }
}

async fn app(server: &MockServer) -> axum::Router {
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-ui",
            "expires_in": 3600
        })))
        .mount(server)
        .await;

    let store = Arc::new(MemoryStore::with_entry(REFRESH_TOKEN_KEY, "rt-1"));
    let state = Arc::new(AppState::new(
        test_config(&server.uri()),
        store,
        Arc::new(NullAlerter),
    ));
    axum::Router::new()
        .nest("/api", api::api_router())
        .with_state(state)
}

async fn get_json(app: &axum::Router, uri: &str) -> (StatusCode, Value) {
    let resp = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn post_json(app: &axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn chapter_lookup_is_case_insensitive() {
    let server = MockServer::start().await;
    let app = app(&server).await;

    let (status, lower) = get_json(&app, "/api/relay?action=chapter&name=mu%20tau").await;
    assert_eq!(status, StatusCode::OK);

    let (_, mixed) = get_json(&app, "/api/relay?action=chapter&name=Mu%20Tau").await;
    assert_eq!(lower, mixed);
    assert_eq!(lower["display_name"], "Mu Tau");
    assert!(lower["constituent_id"].is_string());
}

#[tokio::test]
async fn unknown_chapter_is_404_with_error_shape() {
    let server = MockServer::start().await;
    let app = app(&server).await;

    let (status, body) = get_json(&app, "/api/relay?action=chapter&name=Omega%20Omega").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("Omega Omega"));
}

#[tokio::test]
async fn missing_action_is_bad_request() {
    let server = MockServer::start().await;
    let app = app(&server).await;

    let (status, body) = get_json(&app, "/api/relay").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn unknown_action_is_bad_request() {
    let server = MockServer::start().await;
    let app = app(&server).await;

    let (status, _) = get_json(&app, "/api/relay?action=frobnicate").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn skips_config_round_trips_wholesale() {
    let server = MockServer::start().await;
    let app = app(&server).await;

    // Absent document reads as an empty object.
    let (status, body) = get_json(&app, "/api/relay?action=getskips").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));

    let doc = json!({ "Mu Tau": true, "Alpha Rho": false });
    let (status, body) = post_json(&app, "/api/relay?action=setskips", doc.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], true);

    let (_, body) = get_json(&app, "/api/relay?action=getskips").await;
    assert_eq!(body, doc);
}

#[tokio::test]
async fn setskips_rejects_non_object_documents() {
    let server = MockServer::start().await;
    let app = app(&server).await;

    let (status, _) = post_json(&app, "/api/relay?action=setskips", json!([1, 2])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn auth_action_touches_the_token_endpoint() {
    let server = MockServer::start().await;
    let app = app(&server).await;

    let (status, body) = get_json(&app, "/api/relay?action=auth").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["authenticated"], true);

    let token_calls = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/token")
        .count();
    assert_eq!(token_calls, 1);
}

#[tokio::test]
async fn advisor_chapters_filters_ended_and_non_advisor_relationships() {
    let server = MockServer::start().await;
    let app = app(&server).await;

    Mock::given(method("GET"))
        .and(path("/constituent/v1/constituents/280/relationships"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                { "type": "Chapter Advisor", "name": "Mu Tau" },
                { "type": "Chapter Advisor", "name": "Alpha Rho", "end": { "y": 2024 } },
                { "type": "Parent", "name": "Beta Theta" },
                { "type": "Faculty Advisor", "name": "Gamma Chi", "end": null }
            ]
        })))
        .mount(&server)
        .await;

    let (status, body) =
        get_json(&app, "/api/relay?action=advisorchapters&constituent_id=280").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chapters"], json!(["Gamma Chi", "Mu Tau"]));
}

#[tokio::test]
async fn delete_action_masks_404_as_success() {
    let server = MockServer::start().await;
    let app = app(&server).await;

    Mock::given(method("DELETE"))
        .and(path("/constituent/v1/constituentcodes/9"))
        .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
        .mount(&server)
        .await;

    let (status, body) =
        get_json(&app, "/api/relay?action=delete&kind=constituentcode&id=9").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["acknowledged"], true);
}

#[tokio::test]
async fn create_action_posts_to_the_resource_path() {
    let server = MockServer::start().await;
    let app = app(&server).await;

    Mock::given(method("POST"))
        .and(path("/constituent/v1/notes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "note-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let (status, body) = post_json(
        &app,
        "/api/relay?action=create&kind=note",
        json!({ "constituent_id": "280", "text": "approved" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "note-1");
}

#[tokio::test]
async fn upstream_error_becomes_error_document() {
    let server = MockServer::start().await;
    let app = app(&server).await;

    Mock::given(method("POST"))
        .and(path("/constituent/v1/notes"))
        .respond_with(ResponseTemplate::new(400).set_body_string("note_type is required"))
        .mount(&server)
        .await;

    let (status, body) =
        post_json(&app, "/api/relay?action=create&kind=note", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("note_type is required"));
}

#[tokio::test]
async fn batch_action_reports_partial_success() {
    let server = MockServer::start().await;
    let app = app(&server).await;

    Mock::given(method("POST"))
        .and(path("/constituent/v1/constituentcodes"))
        .and(wiremock::matchers::body_string_contains("rec-2"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/constituent/v1/constituentcodes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "ok" })))
        .mount(&server)
        .await;

    let jobs = json!([
        { "entity": "rec-1", "steps": [
            { "name": "create-code", "method": "POST", "path": "constituent/v1/constituentcodes",
              "body": { "constituent_id": "rec-1" } } ] },
        { "entity": "rec-2", "steps": [
            { "name": "create-code", "method": "POST", "path": "constituent/v1/constituentcodes",
              "body": { "constituent_id": "rec-2" } } ] }
    ]);

    let (status, body) = post_json(&app, "/api/relay?action=batch", jobs).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["succeeded"], json!(["rec-1"]));
    assert_eq!(body["failed"][0]["entity"], "rec-2");
    assert_eq!(body["failed"][0]["step"], "create-code");
}

#[tokio::test]
async fn passthrough_action_relays_arbitrary_calls() {
    let server = MockServer::start().await;
    let app = app(&server).await;

    Mock::given(method("GET"))
        .and(path("/constituent/v1/memberships/77"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "77" })))
        .mount(&server)
        .await;

    let (status, body) = get_json(
        &app,
        "/api/relay?action=api&method=GET&path=constituent/v1/memberships/77",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "77");
}
