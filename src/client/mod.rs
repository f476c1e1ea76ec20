//! Typed REST client for the mock API.
//!
//! Mirrors the calls the dashboard makes. Non-2xx responses surface as
//! [`ClientError::Api`] with the server's `detail` message.

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::anomaly::batch::BatchRequest;
use crate::anomaly::comparison::CompareRequest;
use crate::anomaly::streaming::{PointRequest, PushResponse, StartRequest};
use crate::config::RequestConfig;
use crate::error::{ClientError, ClientResult};
use crate::models::{
    AlgorithmComparisonResult, BatchDetectionJob, ListResponse, Plugin, StreamingSession,
    TierPolicy, VersionInfo,
};
use crate::plugins::{InstallResponse, TransitionRequest, TransitionResponse};
use crate::server::{ResetRequest, ResetResponse};
use crate::versioning::RollbackResponse;

/// Client for the mock API's `/api/v1` endpoints.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    timeout_ms: u64,
}

impl ApiClient {
    /// Create a client for the server at `base_url`.
    pub fn new(base_url: &str, request_config: &RequestConfig) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(ClientError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_ms: request_config.timeout_ms,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ClientResult<T> {
        let start = Instant::now();
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ClientError::Timeout {
                    timeout_ms: self.timeout_ms,
                }
            } else {
                ClientError::Http(e)
            }
        })?;
        let response = check_status(response).await?;
        debug!(
            url = %response.url(),
            status = response.status().as_u16(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Mock API call succeeded"
        );

        response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse {
                message: format!("Failed to parse response: {}", e),
            })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        self.send(self.request(Method::GET, path)).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        self.send(self.request(Method::POST, path).json(body)).await
    }

    // ========================================================================
    // Plugins
    // ========================================================================

    /// List marketplace plugins, optionally filtered by free text.
    pub async fn list_plugins(
        &self,
        search: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> ClientResult<ListResponse<Plugin>> {
        let mut query = vec![
            ("offset", offset.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(search) = search {
            query.push(("search", search.to_string()));
        }
        self.send(self.request(Method::GET, "/api/v1/plugins").query(&query))
            .await
    }

    /// Fetch a plugin.
    pub async fn get_plugin(&self, plugin_id: &str) -> ClientResult<Plugin> {
        self.get(&format!("/api/v1/plugins/{}", plugin_id)).await
    }

    /// Create a plugin from a partial JSON body; `name` is required.
    pub async fn create_plugin(&self, body: &Value) -> ClientResult<Plugin> {
        self.post("/api/v1/plugins", body).await
    }

    /// Install a plugin, optionally pinning a version.
    pub async fn install_plugin(
        &self,
        plugin_id: &str,
        version: Option<&str>,
    ) -> ClientResult<InstallResponse> {
        self.post(
            &format!("/api/v1/plugins/{}/install", plugin_id),
            &json!({ "version": version }),
        )
        .await
    }

    /// Request a lifecycle transition.
    pub async fn transition_lifecycle(
        &self,
        plugin_id: &str,
        request: &TransitionRequest,
    ) -> ClientResult<TransitionResponse> {
        self.post(
            &format!("/api/v1/plugins/{}/lifecycle/transition", plugin_id),
            request,
        )
        .await
    }

    // ========================================================================
    // Anomaly detection
    // ========================================================================

    /// Start a batch detection job.
    pub async fn create_batch_job(&self, request: &BatchRequest) -> ClientResult<BatchDetectionJob> {
        self.post("/api/v1/anomaly/batch", request).await
    }

    /// Poll a batch job. Each poll advances it.
    pub async fn get_batch_job(&self, job_id: &str) -> ClientResult<BatchDetectionJob> {
        self.get(&format!("/api/v1/anomaly/batch/{}", job_id)).await
    }

    /// Cancel a batch job.
    pub async fn cancel_batch_job(&self, job_id: &str) -> ClientResult<BatchDetectionJob> {
        self.send(self.request(
            Method::POST,
            &format!("/api/v1/anomaly/batch/{}/cancel", job_id),
        ))
        .await
    }

    /// Compare algorithms on one source.
    pub async fn compare_algorithms(
        &self,
        source_id: &str,
        request: &CompareRequest,
    ) -> ClientResult<AlgorithmComparisonResult> {
        self.send(
            self.request(Method::POST, "/api/v1/anomaly/compare")
                .query(&[("source_id", source_id)])
                .json(request),
        )
        .await
    }

    // ========================================================================
    // Streaming
    // ========================================================================

    /// Open a streaming session.
    pub async fn start_streaming(&self, request: &StartRequest) -> ClientResult<StreamingSession> {
        self.post("/api/v1/anomaly/streaming/start", request).await
    }

    /// Push one point into a session.
    pub async fn push_stream_point(
        &self,
        session_id: &str,
        point: &PointRequest,
    ) -> ClientResult<PushResponse> {
        self.post(
            &format!("/api/v1/anomaly/streaming/{}/data", session_id),
            point,
        )
        .await
    }

    /// Current state of a session.
    pub async fn streaming_status(&self, session_id: &str) -> ClientResult<StreamingSession> {
        self.get(&format!("/api/v1/anomaly/streaming/{}/status", session_id))
            .await
    }

    /// Stop a session.
    pub async fn stop_streaming(&self, session_id: &str) -> ClientResult<StreamingSession> {
        self.send(self.request(
            Method::POST,
            &format!("/api/v1/anomaly/streaming/{}/stop", session_id),
        ))
        .await
    }

    // ========================================================================
    // Tiering and versions
    // ========================================================================

    /// Create a tier policy from a partial JSON body.
    pub async fn create_tier_policy(&self, body: &Value) -> ClientResult<TierPolicy> {
        self.post("/api/v1/tiering/policies", body).await
    }

    /// List versions, optionally for one source.
    pub async fn list_versions(
        &self,
        source_id: Option<&str>,
    ) -> ClientResult<ListResponse<VersionInfo>> {
        let builder = self.request(Method::GET, "/api/v1/versions");
        let builder = match source_id {
            Some(source_id) => builder.query(&[("source_id", source_id)]),
            None => builder,
        };
        self.send(builder).await
    }

    /// Roll a source back to `version_id`.
    pub async fn rollback_version(&self, version_id: &str) -> ClientResult<RollbackResponse> {
        self.send(self.request(
            Method::POST,
            &format!("/api/v1/versions/{}/rollback", version_id),
        ))
        .await
    }

    /// Rebuild the server's fixture store.
    pub async fn reset(&self, seed: Option<u64>) -> ClientResult<ResetResponse> {
        self.post("/api/v1/mock/reset", &ResetRequest { seed }).await
    }
}

/// Turn a non-2xx response into [`ClientError::Api`].
async fn check_status(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("detail").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(body);
    warn!(status = status.as_u16(), detail = %detail, "Mock API call failed");
    Err(ClientError::Api {
        status: status.as_u16(),
        detail,
    })
}
