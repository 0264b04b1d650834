use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::sky::relay::{RelayBody, SkyRelay};

/// Poll cadence and budget: one status check per second, sixty checks.
const POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const MAX_POLL_ATTEMPTS: u32 = 60;

/// Fixed execution parameters merged into every submitted definition.
const RESULTS_FILE_NAME: &str = "chapterhouse_query_results";

/// Query string shared by the execute and job-status endpoints.
const QUERY_PRODUCT_PARAMS: &str = "product=query&module=None";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Submitted,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Vendor status strings are a closed set, matched case-insensitively.
    /// Anything unrecognized keeps the poll loop going.
    fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            "submitted" | "pending" => JobStatus::Submitted,
            _ => JobStatus::Running,
        }
    }
}

/// A vendor-side asynchronous bulk-query execution tracked by id.
/// Created by submit, mutated only by polling.
#[derive(Debug, Clone)]
pub struct QueryJob {
    pub id: String,
    pub status: JobStatus,
    pub sas_uri: Option<String>,
    pub row_count: Option<u64>,
    /// Vendor-supplied failure message, present only on Failed.
    pub message: Option<String>,
}

/// Implements the three-phase submit / poll / fetch protocol for SKY bulk
/// queries. Submit and poll go through the relay; the fetch hits the
/// pre-signed result locator directly with a bare client, because relay
/// auth-header injection would break the SAS signature.
pub struct QueryJobRunner {
    relay: Arc<SkyRelay>,
    fetch_client: reqwest::Client,
    poll_interval: Duration,
}

impl QueryJobRunner {
    pub fn new(relay: Arc<SkyRelay>) -> Self {
        Self {
            relay,
            fetch_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .expect("failed to build result-fetch HTTP client"),
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Override the poll cadence. The attempt budget stays fixed; this
    /// only compresses the wait, which tests rely on.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Full protocol: submit, poll to a terminal state, fetch the rows.
    pub async fn run(
        &self,
        definition: Value,
        cancel: CancellationToken,
    ) -> Result<Vec<Value>, AppError> {
        let job = self.submit(definition).await?;
        let job = self.poll_until_terminal(&job.id, cancel).await?;
        let sas_uri = job
            .sas_uri
            .ok_or_else(|| AppError::Protocol("completed job carried no result locator".into()))?;
        self.fetch_results(&sas_uri).await
    }

    /// Phase 1: POST the definition merged with fixed execution parameters.
    /// A 2xx response without a job id means the vendor claimed success but
    /// gave us no way to retrieve results, which is fatal.
    pub async fn submit(&self, definition: Value) -> Result<QueryJob, AppError> {
        let mut payload = definition;
        if let Some(obj) = payload.as_object_mut() {
            obj.insert("ux_mode".into(), json!("Synchronous"));
            obj.insert("output_format".into(), json!("Json"));
            obj.insert("results_file_name".into(), json!(RESULTS_FILE_NAME));
        } else {
            return Err(AppError::BadRequest(
                "query definition must be a JSON object".into(),
            ));
        }

        let resp = self
            .relay
            .call(
                Method::POST,
                &format!("query/queries/execute?{}", QUERY_PRODUCT_PARAMS),
                Some(&payload),
            )
            .await?;

        let body = match resp.body {
            RelayBody::Json(v) => v,
            RelayBody::Text(t) => {
                return Err(AppError::Protocol(format!(
                    "query submit returned non-JSON body: {}",
                    t
                )))
            }
        };

        let id = body
            .get("id")
            .and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .ok_or_else(|| AppError::Protocol("query submit response carried no job id".into()))?;

        info!(job_id = %id, "query job submitted");
        Ok(QueryJob {
            id,
            status: body
                .get("status")
                .and_then(|v| v.as_str())
                .map(JobStatus::parse)
                .unwrap_or(JobStatus::Submitted),
            sas_uri: None,
            row_count: None,
            message: None,
        })
    }

    /// Phase 2: poll job status once per second, at most
    /// `MAX_POLL_ATTEMPTS` times. The cancellation token ends the loop
    /// promptly when the caller stops waiting.
    pub async fn poll_until_terminal(
        &self,
        job_id: &str,
        cancel: CancellationToken,
    ) -> Result<QueryJob, AppError> {
        for attempt in 1..=MAX_POLL_ATTEMPTS {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }

            let job = self.job_status(job_id).await?;
            match job.status {
                JobStatus::Completed => {
                    if job.sas_uri.is_none() {
                        return Err(AppError::Protocol(
                            "completed job carried no result locator".into(),
                        ));
                    }
                    info!(job_id, attempt, rows = ?job.row_count, "query job completed");
                    return Ok(job);
                }
                JobStatus::Failed => {
                    warn!(job_id, attempt, "query job failed");
                    return Err(AppError::UpstreamCall {
                        status: 200,
                        body: job
                            .message
                            .unwrap_or_else(|| format!("query job {} failed", job_id)),
                    });
                }
                JobStatus::Submitted | JobStatus::Running => {
                    debug!(job_id, attempt, "query job still running");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(AppError::Cancelled),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        Err(AppError::PollTimeout {
            attempts: MAX_POLL_ATTEMPTS,
        })
    }

    /// One status check. Public so the boundary can expose a bare
    /// `querystatus` action for UI-driven polling.
    pub async fn job_status(&self, job_id: &str) -> Result<QueryJob, AppError> {
        let resp = self
            .relay
            .call(
                Method::GET,
                &format!(
                    "query/jobs/{}?{}&include_read_url=OnceCompleted",
                    job_id, QUERY_PRODUCT_PARAMS
                ),
                None,
            )
            .await?;

        let body = match resp.body {
            RelayBody::Json(v) => v,
            RelayBody::Text(t) => {
                return Err(AppError::Protocol(format!(
                    "job status returned non-JSON body: {}",
                    t
                )))
            }
        };

        let raw_status = body.get("status").and_then(|v| v.as_str()).unwrap_or("");

        Ok(QueryJob {
            id: job_id.to_string(),
            status: JobStatus::parse(raw_status),
            sas_uri: body
                .get("sas_uri")
                .and_then(|v| v.as_str())
                .map(String::from),
            row_count: body.get("row_count").and_then(|v| v.as_u64()),
            message: body
                .get("message")
                .and_then(|v| v.as_str())
                .map(String::from),
        })
    }

    /// Phase 3: GET the pre-signed locator directly. No relay headers; the
    /// URL itself is the credential.
    pub async fn fetch_results(&self, sas_uri: &str) -> Result<Vec<Value>, AppError> {
        let url = decode_until_stable(sas_uri);
        debug!(%url, "fetching query results");

        let resp = self
            .fetch_client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::UpstreamCall {
                status: 0,
                body: format!("result fetch transport error: {}", e),
            })?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(AppError::UpstreamCall {
                status: status.as_u16(),
                body: text,
            });
        }

        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Array(rows)) => Ok(rows),
            Ok(other) => {
                // Some result files wrap the rows in an envelope.
                if let Some(rows) = other.get("rows").and_then(|v| v.as_array()) {
                    return Ok(rows.clone());
                }
                Err(AppError::Protocol(
                    "result file was JSON but not a row array".into(),
                ))
            }
            Err(e) => Err(AppError::Protocol(format!(
                "result file was not valid JSON: {}",
                e
            ))),
        }
    }
}

/// Percent-decode repeatedly until the string stops changing. Tolerates
/// double-encoded delivery of the SAS URL without corrupting one that
/// needed only a single pass. Capped to guard against pathological input.
pub fn decode_until_stable(raw: &str) -> String {
    let mut current = raw.to_string();
    for _ in 0..5 {
        match urlencoding::decode(&current) {
            Ok(decoded) if decoded != current => current = decoded.into_owned(),
            _ => break,
        }
    }
    current
}
