//! Streaming anomaly detection sessions.
//!
//! Each session owns a [`StreamDetector`] holding a rolling window per
//! column. A pushed point is scored against the window as it was before the
//! point arrived, then added to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, info};

use crate::error::{ApiError, ApiResult};
use crate::factories::{self, round_to};
use crate::models::{
    AlertDetails, ColumnStatistics, StreamingAlert, StreamingAlgorithm, StreamingDataPoint,
    StreamingSession, StreamingStatus,
};
use crate::storage::FixtureStore;

/// Default rolling window length.
pub const DEFAULT_WINDOW_SIZE: usize = 100;
/// Default score threshold.
pub const DEFAULT_THRESHOLD: f64 = 3.0;
/// Smoothing factor of the EWMA scorer.
pub const EWMA_ALPHA: f64 = 0.1;
/// Values a window needs before it scores anything.
const WARMUP_POINTS: usize = 10;
/// Recent points kept per session for `GET /data`.
pub const RECENT_POINTS: usize = 1_000;
/// Upper bound on a reported score.
const MAX_SCORE: f64 = 1e6;

/// Body of a session start request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StartRequest {
    /// Source the stream belongs to.
    pub source_id: Option<String>,
    /// Algorithm.
    pub algorithm: Option<StreamingAlgorithm>,
    /// Rolling window length.
    pub window_size: Option<usize>,
    /// Score threshold.
    pub threshold: Option<f64>,
    /// Columns to track.
    pub columns: Option<Vec<String>>,
}

/// One pushed point.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PointRequest {
    /// Column values.
    pub data: BTreeMap<String, f64>,
    /// Event time; defaults to now.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Several pushed points.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchPointsRequest {
    /// Points in arrival order.
    pub data_points: Vec<PointRequest>,
}

/// Outcome of pushing one point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushResponse {
    /// Session.
    pub session_id: String,
    /// Index assigned to the point.
    pub point_index: u64,
    /// Points received so far.
    pub total_points: u64,
    /// Alerts raised so far.
    pub total_alerts: u64,
    /// Alert raised by this point.
    pub alert: Option<StreamingAlert>,
}

/// Outcome of pushing several points.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchPushResponse {
    /// Session.
    pub session_id: String,
    /// Points accepted.
    pub processed: usize,
    /// Points received so far.
    pub total_points: u64,
    /// Alerts raised so far.
    pub total_alerts: u64,
    /// Alerts raised by these points.
    pub alerts: Vec<StreamingAlert>,
}

/// Catalogue entry for a streaming algorithm.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamingAlgorithmInfo {
    /// Algorithm.
    pub name: StreamingAlgorithm,
    /// Display name.
    pub display_name: String,
    /// Description.
    pub description: String,
    /// Whether the algorithm needs a warm-up window.
    pub requires_warmup: bool,
}

#[derive(Debug, Clone, Default)]
struct ColumnWindow {
    values: VecDeque<f64>,
    ewma_mean: f64,
    ewma_var: f64,
    seen: u64,
    min: f64,
    max: f64,
    anomalies: u64,
}

impl ColumnWindow {
    fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    fn std(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let var = self.values.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
            / self.values.len() as f64;
        var.sqrt()
    }

    /// Baseline `(mean, std)` the next value is compared against.
    fn baseline(&self, algorithm: StreamingAlgorithm) -> (f64, f64) {
        match algorithm {
            StreamingAlgorithm::Ewma => (self.ewma_mean, self.ewma_var.sqrt()),
            _ => (self.mean(), self.std()),
        }
    }

    fn push(&mut self, value: f64, window_size: usize) {
        if self.seen == 0 {
            self.ewma_mean = value;
            self.ewma_var = 0.0;
            self.min = value;
            self.max = value;
        } else {
            let diff = value - self.ewma_mean;
            self.ewma_mean += EWMA_ALPHA * diff;
            self.ewma_var = (1.0 - EWMA_ALPHA) * (self.ewma_var + EWMA_ALPHA * diff * diff);
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.seen += 1;
        self.values.push_back(value);
        while self.values.len() > window_size {
            self.values.pop_front();
        }
    }

    fn statistics(&self) -> ColumnStatistics {
        ColumnStatistics {
            count: self.seen,
            mean: round_to(self.mean(), 6),
            std: round_to(self.std(), 6),
            min: self.min,
            max: self.max,
            anomaly_count: self.anomalies,
        }
    }
}

/// Score of `value` against a baseline.
fn score(value: f64, mean: f64, std: f64) -> f64 {
    let deviation = (value - mean).abs();
    if std <= f64::EPSILON {
        return if deviation <= f64::EPSILON { 0.0 } else { MAX_SCORE };
    }
    (deviation / std).min(MAX_SCORE)
}

/// Rolling-window detector behind a session.
#[derive(Debug, Clone)]
pub struct StreamDetector {
    algorithm: StreamingAlgorithm,
    window_size: usize,
    threshold: f64,
    tracked: Vec<String>,
    windows: BTreeMap<String, ColumnWindow>,
}

impl StreamDetector {
    /// A detector with empty windows.
    pub fn new(
        algorithm: StreamingAlgorithm,
        window_size: usize,
        threshold: f64,
        columns: Vec<String>,
    ) -> Self {
        Self {
            algorithm,
            window_size: window_size.max(1),
            threshold,
            tracked: columns,
            windows: BTreeMap::new(),
        }
    }

    fn warmup(&self) -> usize {
        WARMUP_POINTS.min(self.window_size)
    }

    /// Score a point, fold it into the windows and return the details of
    /// the highest-scoring column if it crossed the threshold.
    pub fn observe(&mut self, data: &BTreeMap<String, f64>) -> Option<AlertDetails> {
        let warmup = self.warmup();
        let mut worst: Option<AlertDetails> = None;

        for (column, &value) in data {
            if !value.is_finite() {
                continue;
            }
            if !self.tracked.is_empty() && !self.tracked.contains(column) {
                continue;
            }
            let window = self.windows.entry(column.clone()).or_default();

            if window.values.len() >= warmup {
                let (mean, std) = window.baseline(self.algorithm);
                let s = score(value, mean, std);
                if s > self.threshold {
                    window.anomalies += 1;
                    if worst.as_ref().map_or(true, |w| s > w.score) {
                        worst = Some(AlertDetails {
                            column: column.clone(),
                            value,
                            mean: round_to(mean, 6),
                            std: round_to(std, 6),
                            score: round_to(s, 4),
                        });
                    }
                }
            }
            window.push(value, self.window_size);
        }
        worst
    }

    /// Current per-column statistics.
    pub fn statistics(&self) -> BTreeMap<String, ColumnStatistics> {
        self.windows
            .iter()
            .map(|(column, window)| (column.clone(), window.statistics()))
            .collect()
    }
}

/// The streaming algorithm catalogue.
pub fn algorithms() -> Vec<StreamingAlgorithmInfo> {
    StreamingAlgorithm::ALL
        .into_iter()
        .map(|algorithm| StreamingAlgorithmInfo {
            name: algorithm,
            display_name: algorithm.display_name().to_string(),
            description: match algorithm {
                StreamingAlgorithm::Zscore => "Distance from the rolling mean in standard deviations.",
                StreamingAlgorithm::Ewma => "Distance from an exponentially weighted mean (alpha 0.1).",
                StreamingAlgorithm::IsolationForest => "Isolation forest refit over the rolling window.",
                StreamingAlgorithm::HalfSpaceTrees => "Mass estimates over random half-space partitions.",
                StreamingAlgorithm::Rrcf => "Collusive displacement in a random cut forest.",
            }
            .to_string(),
            requires_warmup: true,
        })
        .collect()
}

/// Open a session and its detector.
pub fn start(store: &mut FixtureStore, request: &StartRequest) -> ApiResult<StreamingSession> {
    let window_size = request.window_size.unwrap_or(DEFAULT_WINDOW_SIZE);
    if window_size == 0 {
        return Err(ApiError::bad_request("window_size must be at least 1"));
    }
    let threshold = request.threshold.unwrap_or(DEFAULT_THRESHOLD);
    if !(threshold.is_finite() && threshold > 0.0) {
        return Err(ApiError::bad_request("threshold must be a positive number"));
    }
    if let Some(source_id) = &request.source_id {
        store.sources.require(source_id)?;
    }

    let now = Utc::now();
    let algorithm = request.algorithm.unwrap_or_default();
    let columns = request.columns.clone().unwrap_or_default();
    let session = StreamingSession {
        id: factories::new_id(&mut store.rng),
        source_id: request.source_id.clone(),
        algorithm,
        window_size,
        threshold,
        columns: columns.clone(),
        status: StreamingStatus::Running,
        total_points: 0,
        total_alerts: 0,
        statistics: BTreeMap::new(),
        created_at: now,
        started_at: now,
        stopped_at: None,
    };

    store.detectors.insert(
        session.id.clone(),
        StreamDetector::new(algorithm, window_size, threshold, columns),
    );
    store.stream_points.insert(session.id.clone(), VecDeque::new());
    info!(session_id = %session.id, algorithm = ?algorithm, window_size, "Streaming session started");
    Ok(store.streaming_sessions.add(session)?.clone())
}

/// Push one point into a running session.
pub fn push(store: &mut FixtureStore, session_id: &str, point: &PointRequest) -> ApiResult<PushResponse> {
    let session = store.streaming_sessions.require(session_id)?;
    if session.status == StreamingStatus::Stopped {
        return Err(ApiError::bad_request(format!(
            "Streaming session {} is stopped",
            session_id
        )));
    }
    if point.data.is_empty() {
        return Err(ApiError::bad_request("data must contain at least one column"));
    }
    let algorithm = session.algorithm;
    let session = session.clone();

    let detector = store
        .detectors
        .entry(session_id.to_string())
        .or_insert_with(|| {
            StreamDetector::new(
                session.algorithm,
                session.window_size,
                session.threshold,
                session.columns.clone(),
            )
        });
    let details = detector.observe(&point.data);
    let statistics = detector.statistics();

    let timestamp = point.timestamp.unwrap_or_else(Utc::now);
    let point_index = session.total_points;
    let alert = match details {
        Some(details) => Some(StreamingAlert {
            id: factories::new_id(&mut store.rng),
            session_id: session_id.to_string(),
            point_index,
            timestamp,
            data_point: point.data.clone(),
            anomaly_score: details.score,
            algorithm,
            details,
        }),
        None => None,
    };

    let recent = store.stream_points.entry(session_id.to_string()).or_default();
    recent.push_back(StreamingDataPoint {
        point_index,
        timestamp,
        data: point.data.clone(),
        is_anomaly: alert.is_some(),
    });
    while recent.len() > RECENT_POINTS {
        recent.pop_front();
    }

    let raised = alert.is_some();
    let session = store.streaming_sessions.update(session_id, |s| {
        s.total_points += 1;
        if raised {
            s.total_alerts += 1;
        }
        s.statistics = statistics;
        s.clone()
    })?;
    if let Some(alert) = &alert {
        debug!(session_id, point_index, score = alert.anomaly_score, "Streaming alert raised");
        store.streaming_alerts.add(alert.clone())?;
    }

    Ok(PushResponse {
        session_id: session.id,
        point_index,
        total_points: session.total_points,
        total_alerts: session.total_alerts,
        alert,
    })
}

/// Push several points in order.
pub fn push_batch(
    store: &mut FixtureStore,
    session_id: &str,
    request: &BatchPointsRequest,
) -> ApiResult<BatchPushResponse> {
    let session = store.streaming_sessions.require(session_id)?;
    if session.status == StreamingStatus::Stopped {
        return Err(ApiError::bad_request(format!(
            "Streaming session {} is stopped",
            session_id
        )));
    }
    if request.data_points.iter().any(|p| p.data.is_empty()) {
        return Err(ApiError::bad_request("every data point must contain at least one column"));
    }

    let mut alerts = Vec::new();
    let mut last = None;
    for point in &request.data_points {
        let resp = push(store, session_id, point)?;
        alerts.extend(resp.alert.clone());
        last = Some(resp);
    }

    let (total_points, total_alerts) = match last {
        Some(resp) => (resp.total_points, resp.total_alerts),
        None => {
            let session = store.streaming_sessions.require(session_id)?;
            (session.total_points, session.total_alerts)
        }
    };
    Ok(BatchPushResponse {
        session_id: session_id.to_string(),
        processed: request.data_points.len(),
        total_points,
        total_alerts,
        alerts,
    })
}

/// Close a session. Stopping twice is harmless.
pub fn stop(store: &mut FixtureStore, session_id: &str) -> ApiResult<StreamingSession> {
    let session = store.streaming_sessions.update(session_id, |s| {
        if s.status == StreamingStatus::Running {
            s.status = StreamingStatus::Stopped;
            s.stopped_at = Some(Utc::now());
        }
        s.clone()
    })?;
    info!(session_id, points = session.total_points, alerts = session.total_alerts, "Streaming session stopped");
    Ok(session)
}

/// Delete a session with its detector, points and alerts.
pub fn delete(store: &mut FixtureStore, session_id: &str) -> ApiResult<()> {
    store.streaming_sessions.remove(session_id)?;
    store.detectors.remove(session_id);
    store.stream_points.remove(session_id);
    store.streaming_alerts.retain(|a| a.session_id != session_id);
    Ok(())
}

/// The most recent `limit` points of a session, oldest first.
pub fn recent_points(store: &FixtureStore, session_id: &str, limit: usize) -> ApiResult<Vec<StreamingDataPoint>> {
    store.streaming_sessions.require(session_id)?;
    let points = store
        .stream_points
        .get(session_id)
        .map(|points| {
            let skip = points.len().saturating_sub(limit);
            points.iter().skip(skip).cloned().collect()
        })
        .unwrap_or_default();
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FixtureConfig;

    fn point(value: f64) -> BTreeMap<String, f64> {
        BTreeMap::from([("value".to_string(), value)])
    }

    #[test]
    fn test_no_alert_during_warmup() {
        let mut d = StreamDetector::new(StreamingAlgorithm::Zscore, 100, 3.0, Vec::new());
        for i in 0..WARMUP_POINTS {
            assert!(d.observe(&point(if i == 5 { 1e9 } else { 1.0 })).is_none());
        }
    }

    #[test]
    fn test_zscore_flags_spike() {
        let mut d = StreamDetector::new(StreamingAlgorithm::Zscore, 50, 3.0, Vec::new());
        for i in 0..30 {
            assert!(d.observe(&point(10.0 + (i % 3) as f64)).is_none());
        }
        let alert = d.observe(&point(100.0)).expect("spike should alert");
        assert_eq!(alert.column, "value");
        assert!(alert.score > 3.0);
        assert_eq!(d.statistics()["value"].anomaly_count, 1);
    }

    #[test]
    fn test_ewma_flags_spike() {
        let mut d = StreamDetector::new(StreamingAlgorithm::Ewma, 50, 3.0, Vec::new());
        for i in 0..40 {
            d.observe(&point(10.0 + (i % 2) as f64));
        }
        assert!(d.observe(&point(60.0)).is_some());
    }

    #[test]
    fn test_untracked_columns_are_ignored() {
        let mut d = StreamDetector::new(
            StreamingAlgorithm::Zscore,
            10,
            3.0,
            vec!["tracked".to_string()],
        );
        d.observe(&BTreeMap::from([
            ("tracked".to_string(), 1.0),
            ("other".to_string(), 2.0),
        ]));
        let stats = d.statistics();
        assert!(stats.contains_key("tracked"));
        assert!(!stats.contains_key("other"));
    }

    #[test]
    fn test_window_is_bounded() {
        let mut d = StreamDetector::new(StreamingAlgorithm::Zscore, 5, 3.0, Vec::new());
        for i in 0..20 {
            d.observe(&point(i as f64));
        }
        let stats = &d.statistics()["value"];
        assert_eq!(stats.count, 20);
        assert_eq!(stats.mean, 17.0);
        assert_eq!(stats.min, 0.0);
        assert_eq!(stats.max, 19.0);
    }

    #[test]
    fn test_session_counts_alerts_per_push() {
        let mut store = FixtureStore::seeded(&FixtureConfig::default());
        let session = start(&mut store, &StartRequest::default()).unwrap();
        let mut flagged = 0;
        for i in 0..100 {
            let value = if i > 0 && i % 25 == 0 { 500.0 } else { (i % 7) as f64 };
            let resp = push(
                &mut store,
                &session.id,
                &PointRequest {
                    data: point(value),
                    timestamp: None,
                },
            )
            .unwrap();
            if resp.alert.is_some() {
                flagged += 1;
            }
        }
        let session = store.streaming_sessions.get(&session.id).unwrap();
        assert_eq!(session.total_points, 100);
        assert_eq!(session.total_alerts, flagged);
        assert!(flagged >= 1);
        assert_eq!(store.alerts_for_session(&session.id).len() as u64, flagged);
    }

    #[test]
    fn test_stopped_session_rejects_data() {
        let mut store = FixtureStore::seeded(&FixtureConfig::default());
        let session = start(&mut store, &StartRequest::default()).unwrap();
        stop(&mut store, &session.id).unwrap();
        let err = push(
            &mut store,
            &session.id,
            &PointRequest {
                data: point(1.0),
                timestamp: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest { .. }));
        assert_eq!(store.streaming_sessions.get(&session.id).unwrap().total_points, 0);
    }

    #[test]
    fn test_start_rejects_zero_window() {
        let mut store = FixtureStore::seeded(&FixtureConfig::default());
        let err = start(
            &mut store,
            &StartRequest {
                window_size: Some(0),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest { .. }));
    }
}
