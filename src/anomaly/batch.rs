//! Batch detection jobs.
//!
//! Jobs advance one step per poll: `pending` becomes `running`, then each
//! subsequent poll processes one source. No background task touches a job.

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::parse_algorithm;
use crate::error::{ApiError, ApiResult, StoreResult};
use crate::factories::{self, round_to};
use crate::models::{
    AnomalyAlgorithm, BatchDetectionJob, BatchJobStatus, BatchSourceResult, DetectionStatus,
};
use crate::storage::FixtureStore;

/// Chance that one source of a batch fails.
const SOURCE_FAILURE_RATE: f64 = 0.08;

/// Body of a batch job request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchRequest {
    /// Sources to process.
    pub source_ids: Vec<String>,
    /// Algorithm name.
    pub algorithm: Option<String>,
    /// Algorithm configuration.
    pub config: Option<Value>,
    /// Job name.
    pub name: Option<String>,
}

/// Recompute `progress_percent` from the counters.
pub fn refresh_progress(job: &mut BatchDetectionJob) {
    let processed = job.completed_sources + job.failed_sources;
    job.progress_percent = if job.total_sources == 0 {
        0.0
    } else {
        round_to(processed as f64 * 100.0 / job.total_sources as f64, 1)
    };
}

/// A pending job over `source_ids`.
pub fn new_job(
    rng: &mut impl Rng,
    name: String,
    source_ids: Vec<String>,
    algorithm: AnomalyAlgorithm,
    config: Value,
) -> BatchDetectionJob {
    BatchDetectionJob {
        id: factories::new_id(rng),
        name,
        total_sources: source_ids.len(),
        current_source_id: None,
        source_ids,
        algorithm,
        config,
        status: BatchJobStatus::Pending,
        completed_sources: 0,
        failed_sources: 0,
        progress_percent: 0.0,
        total_anomalies: 0,
        results: Vec::new(),
        created_at: Utc::now(),
        started_at: None,
        completed_at: None,
    }
}

/// Create and store a job. Unknown source ids are dropped.
pub fn create(store: &mut FixtureStore, request: &BatchRequest) -> ApiResult<BatchDetectionJob> {
    let algorithm = match request.algorithm.as_deref() {
        Some(name) => parse_algorithm(name)?,
        None => AnomalyAlgorithm::default(),
    };

    let mut source_ids: Vec<String> = Vec::new();
    for id in &request.source_ids {
        if store.sources.contains(id) && !source_ids.contains(id) {
            source_ids.push(id.clone());
        } else if !store.sources.contains(id) {
            warn!(source_id = %id, "Dropping unknown source from batch job");
        }
    }
    if source_ids.is_empty() {
        return Err(ApiError::bad_request(
            "source_ids must contain at least one known source",
        ));
    }

    let name = request
        .name
        .clone()
        .unwrap_or_else(|| format!("Batch detection ({} sources)", source_ids.len()));
    let config = request.config.clone().unwrap_or_else(|| json!({}));
    let job = new_job(&mut store.rng, name, source_ids, algorithm, config);
    info!(job_id = %job.id, sources = job.total_sources, "Batch job created");
    Ok(store.batch_jobs.add(job)?.clone())
}

/// Advance a job by one step and return its new state.
pub fn advance(store: &mut FixtureStore, job_id: &str) -> StoreResult<BatchDetectionJob> {
    let job = store.batch_jobs.require(job_id)?.clone();
    let job = match job.status {
        BatchJobStatus::Pending => start(job),
        BatchJobStatus::Running => process_next(store, job)?,
        _ => return Ok(job),
    };
    store.batch_jobs.replace(job.clone())?;
    Ok(job)
}

fn start(mut job: BatchDetectionJob) -> BatchDetectionJob {
    job.status = BatchJobStatus::Running;
    job.started_at = Some(Utc::now());
    job.current_source_id = job.source_ids.first().cloned();
    job
}

fn process_next(store: &mut FixtureStore, mut job: BatchDetectionJob) -> StoreResult<BatchDetectionJob> {
    let index = job.completed_sources + job.failed_sources;
    if let Some(source_id) = job.source_ids.get(index).cloned() {
        let result = match store.sources.get(&source_id).cloned() {
            Some(source) if !store.rng.random_bool(SOURCE_FAILURE_RATE) => {
                let columns = source.numeric_columns();
                let detection = factories::detection(
                    &mut store.rng,
                    &source,
                    job.algorithm,
                    &columns,
                    job.config.clone(),
                );
                let result = BatchSourceResult {
                    source_id: source.id.clone(),
                    source_name: source.name.clone(),
                    detection_id: Some(detection.id.clone()),
                    status: DetectionStatus::Success,
                    anomaly_count: detection.anomaly_count,
                    anomaly_rate: detection.anomaly_rate,
                    total_rows: detection.total_rows,
                    error_message: None,
                };
                store.detections.add(detection)?;
                result
            }
            Some(source) => {
                let detection = factories::failed_detection(
                    &mut store.rng,
                    &source,
                    job.algorithm,
                    "Detector crashed while reading the source",
                );
                let result = BatchSourceResult {
                    source_id: source.id.clone(),
                    source_name: source.name.clone(),
                    detection_id: Some(detection.id.clone()),
                    status: DetectionStatus::Error,
                    anomaly_count: 0,
                    anomaly_rate: 0.0,
                    total_rows: 0,
                    error_message: detection.error_message.clone(),
                };
                store.detections.add(detection)?;
                result
            }
            None => BatchSourceResult {
                source_id: source_id.clone(),
                source_name: String::new(),
                detection_id: None,
                status: DetectionStatus::Error,
                anomaly_count: 0,
                anomaly_rate: 0.0,
                total_rows: 0,
                error_message: Some(format!("Source not found: {}", source_id)),
            },
        };

        if result.status == DetectionStatus::Success {
            job.completed_sources += 1;
            job.total_anomalies += result.anomaly_count;
        } else {
            job.failed_sources += 1;
        }
        job.results.push(result);
    }

    let processed = job.completed_sources + job.failed_sources;
    job.current_source_id = job.source_ids.get(processed).cloned();
    refresh_progress(&mut job);

    if processed >= job.total_sources {
        job.status = if job.completed_sources == 0 {
            BatchJobStatus::Failed
        } else {
            BatchJobStatus::Completed
        };
        job.completed_at = Some(Utc::now());
        info!(
            job_id = %job.id,
            status = %job.status,
            completed = job.completed_sources,
            failed = job.failed_sources,
            "Batch job finished"
        );
    }
    Ok(job)
}

/// Cancel a job that has not finished.
pub fn cancel(store: &mut FixtureStore, job_id: &str) -> ApiResult<BatchDetectionJob> {
    let job = store.batch_jobs.require_mut(job_id)?;
    if job.status.is_terminal() {
        warn!(job_id, status = %job.status, "Cancel rejected for finished job");
        return Err(ApiError::bad_request(format!(
            "Cannot cancel a job in status '{}'",
            job.status
        )));
    }
    job.status = BatchJobStatus::Cancelled;
    job.current_source_id = None;
    job.completed_at = Some(Utc::now());
    info!(job_id, "Batch job cancelled");
    Ok(job.clone())
}

/// Drive a job until it reaches a terminal state.
pub fn run_to_completion(store: &mut FixtureStore, job_id: &str) -> StoreResult<BatchDetectionJob> {
    loop {
        let job = advance(store, job_id)?;
        if job.status.is_terminal() {
            return Ok(job);
        }
    }
}
