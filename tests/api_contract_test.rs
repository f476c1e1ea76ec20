//! HTTP contract tests
//!
//! Each test binds the real router to an ephemeral port and talks to it over
//! HTTP, either with raw reqwest calls or through the typed client.

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::net::TcpListener;

use dashboard_mock_api::anomaly::batch::BatchRequest;
use dashboard_mock_api::anomaly::comparison::CompareRequest;
use dashboard_mock_api::anomaly::streaming::{PointRequest, StartRequest};
use dashboard_mock_api::client::ApiClient;
use dashboard_mock_api::config::{Config, LatencyConfig, RequestConfig};
use dashboard_mock_api::error::ClientError;
use dashboard_mock_api::models::{
    AgreementLevel, BatchJobStatus, ListResponse, Plugin, PluginStatus, StreamingStatus,
    TierPolicy,
};
use dashboard_mock_api::server::{build_router, AppState};

fn test_config() -> Config {
    Config {
        latency: LatencyConfig::disabled(),
        ..Config::default()
    }
}

/// Serve the router on 127.0.0.1:0 and return its base URL.
async fn spawn_server(config: Config) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let app = build_router(Arc::new(AppState::new(config)));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", address)
}

async fn setup() -> (String, reqwest::Client, ApiClient) {
    let base = spawn_server(test_config()).await;
    let client = ApiClient::new(&base, &RequestConfig { timeout_ms: 5000 }).unwrap();
    (base, reqwest::Client::new(), client)
}

async fn get_json(http: &reqwest::Client, url: &str) -> (u16, Value) {
    let resp = http.get(url).send().await.unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap_or(Value::Null))
}

async fn post_json(http: &reqwest::Client, url: &str, body: Value) -> (u16, Value) {
    let resp = http.post(url).json(&body).send().await.unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap_or(Value::Null))
}

async fn first_source_id(http: &reqwest::Client, base: &str) -> String {
    let (_, body) = get_json(http, &format!("{}/api/v1/sources?limit=1", base)).await;
    body["data"][0]["id"].as_str().unwrap().to_string()
}

// ============================================================================
// Admin and error envelope
// ============================================================================

#[tokio::test]
async fn test_health() {
    let (base, http, _) = setup().await;
    let (status, body) = get_json(&http, &format!("{}/health", base)).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_unknown_id_returns_detail() {
    let (base, http, _) = setup().await;
    let (status, body) = get_json(&http, &format!("{}/api/v1/plugins/nope", base)).await;
    assert_eq!(status, 404);
    assert!(body["detail"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn test_missing_body_is_rejected() {
    let (base, http, _) = setup().await;
    let resp = http
        .post(format!("{}/api/v1/plugins", base))
        .header("content-type", "application/json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["detail"], "Request body is required");
}

#[tokio::test]
async fn test_reset_restores_counts() {
    let (base, http, client) = setup().await;
    let (_, before) = get_json(&http, &format!("{}/api/v1/mock/state", base)).await;

    client.create_plugin(&json!({ "name": "scratch" })).await.unwrap();
    let (_, changed) = get_json(&http, &format!("{}/api/v1/mock/state", base)).await;
    assert_eq!(
        changed["plugins"].as_u64().unwrap(),
        before["plugins"].as_u64().unwrap() + 1
    );

    let reset = client.reset(None).await.unwrap();
    assert_eq!(reset.seed, 42);
    assert_eq!(serde_json::to_value(&reset.counts).unwrap(), before);

    let reseeded = client.reset(Some(7)).await.unwrap();
    assert_eq!(reseeded.seed, 7);
}

// ============================================================================
// Lists and CRUD
// ============================================================================

#[tokio::test]
async fn test_list_total_counts_filtered_records() {
    let (base, http, _) = setup().await;
    let (_, all) = get_json(&http, &format!("{}/api/v1/plugins?limit=500", base)).await;
    let validators = all["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|p| p["type"] == "validator")
        .count();

    let (status, page) = get_json(
        &http,
        &format!("{}/api/v1/plugins?type=validator&offset=1&limit=2", base),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(page["total"].as_u64().unwrap() as usize, validators);
    assert!(page["data"].as_array().unwrap().len() <= 2);
    assert_eq!(page["offset"], 1);
}

#[tokio::test]
async fn test_invalid_filter_value_is_rejected() {
    let (base, http, _) = setup().await;
    let (status, _) = get_json(&http, &format!("{}/api/v1/plugins?type=bogus", base)).await;
    assert_eq!(status, 400);
    let (status, _) = get_json(&http, &format!("{}/api/v1/sources?limit=abc", base)).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_create_plugin_then_get() {
    let (base, http, client) = setup().await;
    let (status, created) =
        post_json(&http, &format!("{}/api/v1/plugins", base), json!({ "name": "x" })).await;
    assert_eq!(status, 201);
    assert_eq!(created["status"], "available");
    assert_eq!(created["display_name"], "x");

    let id = created["id"].as_str().unwrap();
    let fetched = client.get_plugin(id).await.unwrap();
    assert_eq!(fetched.name, "x");
    let created: Plugin = serde_json::from_value(created).unwrap();
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn test_plugins_cannot_be_deleted() {
    let (base, http, client) = setup().await;
    let (_, plugins) = get_json(&http, &format!("{}/api/v1/plugins?limit=1", base)).await;
    let id = plugins["data"][0]["id"].as_str().unwrap();

    let resp = http
        .delete(format!("{}/api/v1/plugins/{}", base, id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 405);
    assert_eq!(client.get_plugin(id).await.unwrap().id, id);
}

#[tokio::test]
async fn test_plugin_search_through_client() {
    let (_, _, client) = setup().await;
    client
        .create_plugin(&json!({ "name": "zz-unique-search-target" }))
        .await
        .unwrap();
    let page: ListResponse<Plugin> = client
        .list_plugins(Some("UNIQUE-SEARCH"), 0, 20)
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.data[0].status, PluginStatus::Available);
}

#[tokio::test]
async fn test_install_unknown_plugin_reports_failure() {
    let (_, _, client) = setup().await;
    let resp = client.install_plugin("missing", None).await.unwrap();
    assert!(!resp.success);
}

#[tokio::test]
async fn test_validator_create_requires_existing_plugin() {
    let (base, http, _) = setup().await;
    let (status, _) = post_json(
        &http,
        &format!("{}/api/v1/validators/custom", base),
        json!({ "plugin_id": "missing", "name": "v" }),
    )
    .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_report_download_headers() {
    let (base, http, _) = setup().await;
    let (_, reporters) =
        get_json(&http, &format!("{}/api/v1/reporters/custom?limit=1", base)).await;
    let reporter = &reporters["data"][0];
    let id = reporter["id"].as_str().unwrap();
    let format = reporter["output_formats"][0].as_str().unwrap();

    let resp = http
        .post(format!("{}/api/v1/reporters/custom/{}/generate", base, id))
        .json(&json!({ "format": format }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let disposition = resp.headers()["content-disposition"].to_str().unwrap().to_string();
    assert!(disposition.starts_with("attachment; filename="));
    assert!(!resp.bytes().await.unwrap().is_empty());
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_lifecycle_transitions() {
    let (base, http, _) = setup().await;
    let (_, plugins) = get_json(&http, &format!("{}/api/v1/plugins?limit=1", base)).await;
    let id = plugins["data"][0]["id"].as_str().unwrap();
    let url = format!("{}/api/v1/plugins/{}/lifecycle", base, id);

    let (status, body) = post_json(
        &http,
        &format!("{}/transition", url),
        json!({ "target_state": "running" }),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["current_state"], "unloaded");
    assert_eq!(body["allowed_transitions"], json!(["loading", "disabled"]));

    let (_, lifecycle) = get_json(&http, &url).await;
    assert_eq!(lifecycle["current_state"], "unloaded");
    assert_eq!(lifecycle["state_history"], json!([]));

    let (status, body) = post_json(
        &http,
        &format!("{}/transition", url),
        json!({ "target_state": "running", "force": true }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["forced"], true);

    let (_, lifecycle) = get_json(&http, &url).await;
    assert_eq!(lifecycle["current_state"], "running");
    assert_eq!(lifecycle["state_history"].as_array().unwrap().len(), 1);
}

// ============================================================================
// Anomaly detection
// ============================================================================

#[tokio::test]
async fn test_detect_then_latest() {
    let (base, http, _) = setup().await;
    let source_id = first_source_id(&http, &base).await;
    let (status, detection) = post_json(
        &http,
        &format!("{}/api/v1/sources/{}/anomaly/detect", base, source_id),
        json!({ "algorithm": "lof" }),
    )
    .await;
    assert_eq!(status, 201);
    assert_eq!(detection["algorithm"], "lof");

    let (_, latest) = get_json(
        &http,
        &format!("{}/api/v1/sources/{}/anomaly/latest", base, source_id),
    )
    .await;
    assert_eq!(latest["id"], detection["id"]);

    let (status, _) = post_json(
        &http,
        &format!("{}/api/v1/sources/{}/anomaly/detect", base, source_id),
        json!({ "algorithm": "magic" }),
    )
    .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_batch_job_progresses_on_poll() {
    let (base, http, client) = setup().await;
    let (_, sources) = get_json(&http, &format!("{}/api/v1/sources?limit=3", base)).await;
    let source_ids: Vec<String> = sources["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap().to_string())
        .collect();

    let job = client
        .create_batch_job(&BatchRequest {
            source_ids,
            ..BatchRequest::default()
        })
        .await
        .unwrap();
    assert_eq!(job.status, BatchJobStatus::Pending);

    let mut current = job;
    for _ in 0..10 {
        current = client.get_batch_job(&current.id).await.unwrap();
        assert!(current.completed_sources + current.failed_sources <= current.total_sources);
        if current.status.is_terminal() {
            break;
        }
    }
    assert!(current.status.is_terminal());

    match client.cancel_batch_job(&current.id).await {
        Err(ClientError::Api { status, .. }) => assert_eq!(status, 400),
        other => panic!("expected a 400, got {:?}", other),
    }
    let after = client.get_batch_job(&current.id).await.unwrap();
    assert_eq!(after.status, current.status);
}

#[tokio::test]
async fn test_cancel_pending_batch_job() {
    let (base, http, client) = setup().await;
    let source_id = first_source_id(&http, &base).await;
    let job = client
        .create_batch_job(&BatchRequest {
            source_ids: vec![source_id],
            ..BatchRequest::default()
        })
        .await
        .unwrap();
    let cancelled = client.cancel_batch_job(&job.id).await.unwrap();
    assert_eq!(cancelled.status, BatchJobStatus::Cancelled);
}

#[tokio::test]
async fn test_comparison_agreement_levels() {
    let (base, http, client) = setup().await;
    let source_id = first_source_id(&http, &base).await;
    let result = client
        .compare_algorithms(
            &source_id,
            &CompareRequest {
                algorithms: vec!["isolation_forest".to_string(), "lof".to_string()],
                ..CompareRequest::default()
            },
        )
        .await
        .unwrap();

    let sets: Vec<&Vec<u64>> = result
        .algorithm_results
        .iter()
        .map(|r| &r.anomaly_indices)
        .collect();
    for record in &result.agreement_records {
        let in_both = sets.iter().all(|s| s.contains(&record.row_index));
        if in_both {
            assert_eq!(record.detection_count, 2);
            assert_eq!(record.agreement_level, AgreementLevel::All);
        } else {
            assert_eq!(record.detection_count, 1);
            assert_eq!(record.agreement_level, AgreementLevel::One);
        }
    }

    let matrix = &result.agreement_summary.agreement_matrix;
    assert_eq!(matrix[0][1], matrix[1][0]);
    assert_eq!(matrix[0][0], sets[0].len());
}

#[tokio::test]
async fn test_comparison_input_errors() {
    let (base, http, _) = setup().await;
    let body = json!({ "algorithms": ["lof", "dbscan"] });
    let (status, _) = post_json(&http, &format!("{}/api/v1/anomaly/compare", base), body.clone()).await;
    assert_eq!(status, 400);

    let (status, _) = post_json(
        &http,
        &format!("{}/api/v1/anomaly/compare?source_id=missing", base),
        body,
    )
    .await;
    assert_eq!(status, 404);

    let source_id = first_source_id(&http, &base).await;
    let (status, _) = post_json(
        &http,
        &format!("{}/api/v1/anomaly/compare?source_id={}", base, source_id),
        json!({ "algorithms": ["lof"] }),
    )
    .await;
    assert_eq!(status, 400);
}

// ============================================================================
// Streaming
// ============================================================================

#[tokio::test]
async fn test_streaming_session_counts_pushes() {
    let (base, http, client) = setup().await;
    let session = client
        .start_streaming(&StartRequest {
            window_size: Some(20),
            ..StartRequest::default()
        })
        .await
        .unwrap();
    assert_eq!(session.status, StreamingStatus::Running);

    let mut flagged = 0;
    for i in 0..100 {
        let value = if i % 25 == 24 { 1_000.0 } else { (i % 7) as f64 };
        let point = PointRequest {
            data: BTreeMap::from([("latency_ms".to_string(), value)]),
            timestamp: None,
        };
        let resp = client.push_stream_point(&session.id, &point).await.unwrap();
        if resp.alert.is_some() {
            flagged += 1;
        }
    }

    let status = client.streaming_status(&session.id).await.unwrap();
    assert_eq!(status.total_points, 100);
    assert_eq!(status.total_alerts, flagged);

    let (_, alerts) = get_json(
        &http,
        &format!("{}/api/v1/anomaly/streaming/{}/alerts", base, session.id),
    )
    .await;
    assert_eq!(alerts["total"].as_u64().unwrap(), flagged);

    let (_, recent) = get_json(
        &http,
        &format!("{}/api/v1/anomaly/streaming/{}/data?limit=10", base, session.id),
    )
    .await;
    assert_eq!(recent.as_array().unwrap().len(), 10);

    let stopped = client.stop_streaming(&session.id).await.unwrap();
    assert_eq!(stopped.status, StreamingStatus::Stopped);
    let point = PointRequest {
        data: BTreeMap::from([("latency_ms".to_string(), 1.0)]),
        timestamp: None,
    };
    assert!(client.push_stream_point(&session.id, &point).await.is_err());
    let status = client.streaming_status(&session.id).await.unwrap();
    assert_eq!(status.total_points, 100);
}

// ============================================================================
// Tiering
// ============================================================================

async fn same_tier_policy(client: &ApiClient, http: &reqwest::Client, base: &str) -> Result<TierPolicy, ClientError> {
    let (_, tiers) = get_json(http, &format!("{}/api/v1/tiering/tiers", base)).await;
    let tier_id = tiers["data"][0]["id"].as_str().unwrap().to_string();
    client
        .create_tier_policy(&json!({
            "name": "loopback",
            "from_tier_id": tier_id,
            "to_tier_id": tier_id,
        }))
        .await
}

#[tokio::test]
async fn test_same_tier_policy_accepted_by_default() {
    let (base, http, client) = setup().await;
    let policy = same_tier_policy(&client, &http, &base).await.unwrap();
    assert_eq!(policy.from_tier_id, policy.to_tier_id);
}

#[tokio::test]
async fn test_same_tier_policy_rejected_when_strict() {
    let mut config = test_config();
    config.validation.strict = true;
    let base = spawn_server(config).await;
    let client = ApiClient::new(&base, &RequestConfig::default()).unwrap();
    let http = reqwest::Client::new();

    match same_tier_policy(&client, &http, &base).await {
        Err(ClientError::Api { status, detail }) => {
            assert_eq!(status, 400);
            assert!(detail.contains("different tiers"));
        }
        other => panic!("expected a 400, got {:?}", other),
    }
}

#[tokio::test]
async fn test_composite_children_endpoints() {
    let (base, http, _) = setup().await;
    let (_, composites) = get_json(
        &http,
        &format!("{}/api/v1/tiering/policies?policy_type=composite", base),
    )
    .await;
    let parent = composites["data"][0]["id"].as_str().unwrap().to_string();

    let (_, roots) = get_json(
        &http,
        &format!("{}/api/v1/tiering/policies?root_only=true&policy_type=age_based", base),
    )
    .await;
    let child = roots["data"][0]["id"].as_str().unwrap().to_string();

    let (_, tree) = get_json(&http, &format!("{}/api/v1/tiering/policies/{}/tree", base, parent)).await;
    let before = tree["children"].as_array().unwrap().len();

    let (status, updated) = post_json(
        &http,
        &format!("{}/api/v1/tiering/policies/{}/children", base, parent),
        json!({ "child_policy_id": child }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(updated["child_count"].as_u64().unwrap() as usize, before + 1);

    // Nesting a composite is refused.
    let (status, _) = post_json(
        &http,
        &format!("{}/api/v1/tiering/policies/{}/children", base, child),
        json!({ "child_policy_id": parent }),
    )
    .await;
    assert_eq!(status, 400);

    let resp = http
        .delete(format!(
            "{}/api/v1/tiering/policies/{}/children/{}",
            base, parent, child
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
}

#[tokio::test]
async fn test_child_policy_cannot_become_composite() {
    let (base, http, _) = setup().await;
    let (_, composites) = get_json(
        &http,
        &format!("{}/api/v1/tiering/policies?policy_type=composite", base),
    )
    .await;
    let parent = composites["data"][0]["id"].as_str().unwrap().to_string();
    let tree_url = format!("{}/api/v1/tiering/policies/{}/tree", base, parent);
    let (_, tree) = get_json(&http, &tree_url).await;
    let child = tree["children"][0]["id"].as_str().unwrap().to_string();

    let resp = http
        .put(format!("{}/api/v1/tiering/policies/{}", base, child))
        .json(&json!({ "policy_type": "composite" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    let (_, after) = get_json(&http, &tree_url).await;
    assert_eq!(after, tree);
    assert_ne!(after["children"][0]["policy_type"], "composite");
}

#[tokio::test]
async fn test_dry_run_records_no_migrations() {
    let (base, http, _) = setup().await;
    let (_, before) = get_json(&http, &format!("{}/api/v1/tiering/stats", base)).await;
    let (status, result) = post_json(
        &http,
        &format!("{}/api/v1/tiering/process-all", base),
        json!({ "dry_run": true }),
    )
    .await;
    assert_eq!(status, 200);
    assert!(result["results"].as_array().is_some());
    let (_, after) = get_json(&http, &format!("{}/api/v1/tiering/stats", base)).await;
    assert_eq!(before["total_migrations"], after["total_migrations"]);
}

// ============================================================================
// Versioning
// ============================================================================

#[tokio::test]
async fn test_version_rollback_creates_latest() {
    let (base, http, client) = setup().await;
    let source_id = first_source_id(&http, &base).await;
    let versions = client.list_versions(Some(&source_id)).await.unwrap();
    assert!(versions.total >= 2);
    let newest = &versions.data[0];
    let oldest = versions.data.last().unwrap();
    assert!(newest.version_number > oldest.version_number);

    let resp = client.rollback_version(&oldest.id).await.unwrap();
    assert!(resp.success);
    let new_version = resp.new_version.unwrap();
    assert_eq!(new_version.version_number, newest.version_number + 1);
    assert_eq!(new_version.content_hash, oldest.content_hash);
    assert_eq!(new_version.metadata["rolled_back_from"], json!(oldest.id));

    let again = client.rollback_version(&new_version.id).await.unwrap();
    assert!(!again.success);

    let (_, latest) = get_json(
        &http,
        &format!("{}/api/v1/sources/{}/versions/latest", base, source_id),
    )
    .await;
    assert_eq!(latest["id"], json!(new_version.id));
}
