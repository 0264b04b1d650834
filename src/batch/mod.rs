//! Multi-entity write workflows: an ordered pipeline of named relay steps
//! per entity, throttled by the pacer, with per-entity failure tracking so
//! a batch reports partial success instead of aborting on first error.

pub mod pacer;

pub use pacer::Pacer;

use std::str::FromStr;
use std::sync::Arc;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::sky::SkyRelay;

/// One relay call inside an entity's pipeline. Steps run strictly in
/// order; a failure is tagged with the step name for diagnostics.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayStep {
    pub name: String,
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub body: Option<Value>,
}

/// One entity's worth of work, keyed so the batch report can say which
/// entity failed.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityJob {
    pub entity: String,
    pub steps: Vec<RelayStep>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub entity: String,
    pub step: String,
    pub error: String,
}

/// Partial-success summary surfaced to the caller. Failed entities carry
/// the step name and the literal error text so the officer can retry or
/// paste it into a support request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn summary(&self) -> String {
        format!(
            "{} succeeded, {} failed",
            self.succeeded.len(),
            self.failed.len()
        )
    }
}

/// Failure of one named step; the pipeline stops for that entity only.
#[derive(Debug)]
pub struct StepError {
    pub step: String,
    pub source: AppError,
}

/// Run every entity sequentially, each entity's steps in order, each call
/// paced. One entity fully completes (or fails) before the next begins;
/// the call sequence within an entity is order-dependent and is never
/// parallelized.
pub async fn run_batch(
    relay: &Arc<SkyRelay>,
    pacer: &Pacer,
    jobs: Vec<EntityJob>,
) -> BatchReport {
    let mut report = BatchReport::default();

    for job in jobs {
        match run_entity(relay, pacer, &job).await {
            Ok(()) => report.succeeded.push(job.entity),
            Err(e) => {
                warn!(
                    entity = %job.entity,
                    step = %e.step,
                    error = %e.source,
                    "entity pipeline failed, continuing batch"
                );
                report.failed.push(BatchFailure {
                    entity: job.entity,
                    step: e.step,
                    error: e.source.to_string(),
                });
            }
        }
    }

    info!(summary = %report.summary(), "batch complete");
    report
}

async fn run_entity(
    relay: &Arc<SkyRelay>,
    pacer: &Pacer,
    job: &EntityJob,
) -> Result<(), StepError> {
    for step in &job.steps {
        let method = Method::from_str(&step.method.to_uppercase()).map_err(|_| StepError {
            step: step.name.clone(),
            source: AppError::BadRequest(format!("invalid method: {}", step.method)),
        })?;

        pacer.pace().await;

        relay
            .call(method, &step.path, step.body.as_ref())
            .await
            .map_err(|source| StepError {
                step: step.name.clone(),
                source,
            })?;
    }
    Ok(())
}
