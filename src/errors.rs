use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// No usable credential path exists (missing client id/secret and no
    /// refresh token anywhere). Not retryable without operator intervention.
    #[error("auth configuration error: {0}")]
    AuthConfig(String),

    /// The vendor rejected every auth flow we attempted.
    #[error("vendor rejected authentication: status={status}")]
    AuthUpstream { status: u16, body: String },

    /// Non-2xx from a SKY resource call. The body is kept verbatim so the
    /// caller can show the vendor's own diagnostics.
    #[error("upstream call failed: status={status}")]
    UpstreamCall { status: u16, body: String },

    /// Vendor responded 2xx but violated the expected shape (e.g. a query
    /// submit that came back without a job id).
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A query job never reached a terminal state within the poll budget.
    #[error("query job did not complete within {attempts} poll attempts")]
    PollTimeout { attempts: u32 },

    /// The caller stopped waiting on an in-flight query poll.
    #[error("operation cancelled")]
    Cancelled,

    /// The caller asked about a chapter the static table doesn't know.
    #[error("unknown chapter: {0}")]
    UnknownChapter(String),

    /// Malformed or missing parameters at the relay boundary.
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Status code surfaced at the relay boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::AuthConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::AuthUpstream { .. } => StatusCode::BAD_GATEWAY,
            AppError::UpstreamCall { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            AppError::Protocol(_) => StatusCode::BAD_GATEWAY,
            AppError::PollTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AppError::Cancelled => StatusCode::REQUEST_TIMEOUT,
            AppError::UnknownChapter(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // The UI contract is a bare {"error": message} document. For
        // upstream failures the vendor body is appended verbatim so chapter
        // officers can paste the literal text into a support request.
        let msg = match &self {
            AppError::AuthUpstream { status, body } => {
                format!(
                    "vendor rejected authentication (status {}): {}",
                    status, body
                )
            }
            AppError::UpstreamCall { status, body } => {
                format!("upstream call failed (status {}): {}", status, body)
            }
            AppError::Internal(e) => {
                tracing::error!("internal error: {:#}", e);
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": msg }))).into_response()
    }
}
