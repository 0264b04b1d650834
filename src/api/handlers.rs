use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use reqwest::Method;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::batch::{self, EntityJob};
use crate::chapters;
use crate::errors::AppError;
use crate::store::ALLOWED_SKIPS_KEY;
use crate::AppState;

/// Resource kinds the generic create/delete/patch actions know about.
/// Everything else must go through the `api` passthrough.
fn resource_path(kind: &str) -> Option<&'static str> {
    match kind {
        "constituentcode" => Some("constituent/v1/constituentcodes"),
        "note" => Some("constituent/v1/notes"),
        "relationship" => Some("constituent/v1/relationships"),
        "customfield" => Some("constituent/v1/constituents/customfields"),
        "address" => Some("constituent/v1/addresses"),
        "phone" => Some("constituent/v1/phones"),
        "email" => Some("constituent/v1/emailaddresses"),
        "membership" => Some("constituent/v1/memberships"),
        _ => None,
    }
}

/// The single boundary endpoint. Dispatches on the `action` query
/// parameter; action-specific inputs arrive as further query parameters
/// or as the JSON body. Success is JSON; failures render as
/// `{"error": message}` via `AppError`.
pub async fn relay_dispatch(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    body: Option<Json<Value>>,
) -> Result<Json<Value>, AppError> {
    let action = params
        .get("action")
        .map(String::as_str)
        .ok_or_else(|| AppError::BadRequest("missing action parameter".into()))?;
    let body = body.map(|Json(v)| v);

    match action {
        "chapter" => chapter_lookup(&params),
        "chapters" => Ok(Json(json!(chapters::all_chapters()))),
        "getskips" => get_skips(&state).await,
        "setskips" => set_skips(&state, body).await,
        "advisorchapters" => advisor_chapters(&state, &params).await,
        "auth" => {
            state.broker.access_token().await?;
            Ok(Json(json!({ "authenticated": true })))
        }
        "queryexec" => query_exec(&state, body).await,
        "querystatus" => query_status(&state, &params).await,
        "queryresults" => query_results(&state, &params).await,
        "query" => query_run(&state, body).await,
        "create" => create_resource(&state, &params, body).await,
        "delete" => delete_resource(&state, &params).await,
        "patch" => patch_resource(&state, &params, body).await,
        "batch" => run_batch(&state, body).await,
        "api" => passthrough(&state, &params, body).await,
        other => Err(AppError::BadRequest(format!("unknown action: {}", other))),
    }
}

fn require<'a>(params: &'a HashMap<String, String>, key: &str) -> Result<&'a str, AppError> {
    params
        .get(key)
        .map(String::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("missing {} parameter", key)))
}

fn chapter_lookup(params: &HashMap<String, String>) -> Result<Json<Value>, AppError> {
    let name = require(params, "name")?;
    let record = chapters::get_chapter_data(name)
        .ok_or_else(|| AppError::UnknownChapter(name.to_string()))?;
    Ok(Json(json!(record)))
}

/// The allowed-skips config is one JSON document, read wholesale. An
/// absent document reads as an empty object.
async fn get_skips(state: &AppState) -> Result<Json<Value>, AppError> {
    let raw = state
        .store
        .get(ALLOWED_SKIPS_KEY)
        .await
        .map_err(AppError::Internal)?;
    let doc = match raw {
        Some(text) => serde_json::from_str(&text)
            .map_err(|e| AppError::Protocol(format!("stored skips config is corrupt: {}", e)))?,
        None => json!({}),
    };
    Ok(Json(doc))
}

/// Written wholesale — not per-key transactional.
async fn set_skips(state: &AppState, body: Option<Value>) -> Result<Json<Value>, AppError> {
    let doc = body.ok_or_else(|| AppError::BadRequest("missing skips document body".into()))?;
    if !doc.is_object() {
        return Err(AppError::BadRequest(
            "skips document must be a JSON object of chapter name -> bool".into(),
        ));
    }
    let text = serde_json::to_string(&doc).map_err(|e| AppError::Internal(e.into()))?;
    state
        .store
        .set(ALLOWED_SKIPS_KEY, &text)
        .await
        .map_err(AppError::Internal)?;
    Ok(Json(json!({ "updated": true })))
}

/// Chapter names an advisor serves: active advisor-type relationships
/// (no end date) on the advisor's constituent record.
async fn advisor_chapters(
    state: &AppState,
    params: &HashMap<String, String>,
) -> Result<Json<Value>, AppError> {
    let constituent_id = require(params, "constituent_id")?;
    let resp = state
        .relay
        .call(
            Method::GET,
            &format!("constituent/v1/constituents/{}/relationships", constituent_id),
            None,
        )
        .await?;

    let body = resp.body.into_value();
    let relationships = body
        .get("value")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let mut names: Vec<String> = relationships
        .iter()
        .filter(|rel| {
            let is_advisor = rel
                .get("type")
                .and_then(|v| v.as_str())
                .map(|t| t.to_ascii_lowercase().contains("advisor"))
                .unwrap_or(false);
            let ended = rel.get("end").map(|e| !e.is_null()).unwrap_or(false);
            is_advisor && !ended
        })
        .filter_map(|rel| rel.get("name").and_then(|v| v.as_str()).map(String::from))
        .collect();
    names.sort();
    names.dedup();

    Ok(Json(json!({ "chapters": names })))
}

async fn query_exec(state: &AppState, body: Option<Value>) -> Result<Json<Value>, AppError> {
    let definition =
        body.ok_or_else(|| AppError::BadRequest("missing query definition body".into()))?;
    let job = state.query.submit(definition).await?;
    Ok(Json(json!({ "id": job.id, "status": format!("{:?}", job.status) })))
}

async fn query_status(
    state: &AppState,
    params: &HashMap<String, String>,
) -> Result<Json<Value>, AppError> {
    let id = require(params, "id")?;
    let job = state.query.job_status(id).await?;
    Ok(Json(json!({
        "id": job.id,
        "status": format!("{:?}", job.status),
        "sas_uri": job.sas_uri,
        "row_count": job.row_count,
        "message": job.message,
    })))
}

async fn query_results(
    state: &AppState,
    params: &HashMap<String, String>,
) -> Result<Json<Value>, AppError> {
    let sas_uri = require(params, "sas_uri")?;
    let rows = state.query.fetch_results(sas_uri).await?;
    Ok(Json(Value::Array(rows)))
}

/// Server-side orchestration of the whole submit/poll/fetch protocol.
/// If the client disconnects, axum drops this future, which cancels the
/// poll loop through the token.
async fn query_run(state: &AppState, body: Option<Value>) -> Result<Json<Value>, AppError> {
    let definition =
        body.ok_or_else(|| AppError::BadRequest("missing query definition body".into()))?;
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let rows = state.query.run(definition, cancel).await?;
    Ok(Json(Value::Array(rows)))
}

async fn create_resource(
    state: &AppState,
    params: &HashMap<String, String>,
    body: Option<Value>,
) -> Result<Json<Value>, AppError> {
    let kind = require(params, "kind")?;
    let path = resource_path(kind)
        .ok_or_else(|| AppError::BadRequest(format!("unknown resource kind: {}", kind)))?;
    let payload = body.ok_or_else(|| AppError::BadRequest("missing resource body".into()))?;

    let resp = state.relay.call(Method::POST, path, Some(&payload)).await?;
    Ok(Json(resp.body.into_value()))
}

async fn delete_resource(
    state: &AppState,
    params: &HashMap<String, String>,
) -> Result<Json<Value>, AppError> {
    let kind = require(params, "kind")?;
    let id = require(params, "id")?;
    let path = resource_path(kind)
        .ok_or_else(|| AppError::BadRequest(format!("unknown resource kind: {}", kind)))?;

    let resp = state
        .relay
        .call(Method::DELETE, &format!("{}/{}", path, id), None)
        .await?;
    Ok(Json(resp.body.into_value()))
}

async fn patch_resource(
    state: &AppState,
    params: &HashMap<String, String>,
    body: Option<Value>,
) -> Result<Json<Value>, AppError> {
    let kind = require(params, "kind")?;
    let id = require(params, "id")?;
    let path = resource_path(kind)
        .ok_or_else(|| AppError::BadRequest(format!("unknown resource kind: {}", kind)))?;
    let payload = body.ok_or_else(|| AppError::BadRequest("missing resource body".into()))?;

    let resp = state
        .relay
        .call(Method::PATCH, &format!("{}/{}", path, id), Some(&payload))
        .await?;
    Ok(Json(resp.body.into_value()))
}

/// Throttled multi-entity workflow: each entity's named steps run in
/// order through the pacer; the report surfaces partial success.
async fn run_batch(state: &AppState, body: Option<Value>) -> Result<Json<Value>, AppError> {
    let jobs: Vec<EntityJob> = serde_json::from_value(
        body.ok_or_else(|| AppError::BadRequest("missing batch body".into()))?,
    )
    .map_err(|e| AppError::BadRequest(format!("malformed batch body: {}", e)))?;

    let report = batch::run_batch(&state.relay, &state.pacer, jobs).await;
    Ok(Json(json!(report)))
}

/// Generic passthrough for calls the named actions don't cover. Still
/// goes through the relay, so token and subscription key are attached
/// and the outcome is normalized.
async fn passthrough(
    state: &AppState,
    params: &HashMap<String, String>,
    body: Option<Value>,
) -> Result<Json<Value>, AppError> {
    let method = require(params, "method")?;
    let path = require(params, "path")?;
    let method = Method::from_str(&method.to_uppercase())
        .map_err(|_| AppError::BadRequest(format!("invalid method: {}", method)))?;

    let resp = state.relay.call(method, path, body.as_ref()).await?;
    Ok(Json(resp.body.into_value()))
}
