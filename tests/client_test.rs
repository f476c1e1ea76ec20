//! Integration tests for the typed client
//!
//! Tests HTTP client behavior using wiremock for request/response mocking.

use serde_json::json;
use std::time::Duration;
use wiremock::{
    matchers::{body_json, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

use dashboard_mock_api::client::ApiClient;
use dashboard_mock_api::config::RequestConfig;
use dashboard_mock_api::error::ClientError;
use dashboard_mock_api::models::{LifecycleState, PluginStatus};
use dashboard_mock_api::plugins::TransitionRequest;

/// Create a test client pointing to mock server
fn create_test_client(base_url: &str) -> ApiClient {
    ApiClient::new(base_url, &RequestConfig { timeout_ms: 5000 }).expect("Failed to create client")
}

fn plugin_json(id: &str, name: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": name,
        "display_name": name,
        "description": "",
        "version": "1.0.0",
        "latest_version": "1.0.0",
        "type": "validator",
        "status": "available",
        "is_installed": false,
        "install_count": 0,
        "installed_at": null,
        "rating": 4.5,
        "author": "tests",
        "tags": [],
        "security_level": "verified",
        "validators_count": 1,
        "reporters_count": 0,
        "created_at": "2026-01-01T00:00:00Z",
        "updated_at": "2026-01-01T00:00:00Z"
    })
}

#[cfg(test)]
mod success_tests {
    use super::*;

    #[tokio::test]
    async fn test_get_plugin() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/plugins/p-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(plugin_json("p-1", "nulls")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let plugin = client.get_plugin("p-1").await.unwrap();
        assert_eq!(plugin.id, "p-1");
        assert_eq!(plugin.name, "nulls");
        assert_eq!(plugin.status, PluginStatus::Available);
    }

    #[tokio::test]
    async fn test_list_plugins_sends_paging_and_search() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/plugins"))
            .and(query_param("offset", "10"))
            .and(query_param("limit", "5"))
            .and(query_param("search", "csv"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [plugin_json("p-2", "csv-checks")],
                "total": 11,
                "offset": 10,
                "limit": 5
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let page = client.list_plugins(Some("csv"), 10, 5).await.unwrap();
        assert_eq!(page.total, 11);
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].name, "csv-checks");
    }

    #[tokio::test]
    async fn test_transition_sends_request_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/plugins/p-1/lifecycle/transition"))
            .and(body_json(json!({
                "target_state": "loading",
                "trigger": null,
                "force": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "plugin_id": "p-1",
                "from_state": "unloaded",
                "to_state": "loading",
                "forced": false,
                "allowed_transitions": ["loaded", "error"]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let resp = client
            .transition_lifecycle(
                "p-1",
                &TransitionRequest {
                    target_state: LifecycleState::Loading,
                    trigger: None,
                    force: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(resp.to_state, LifecycleState::Loading);
        assert_eq!(
            resp.allowed_transitions,
            vec![LifecycleState::Loaded, LifecycleState::Error]
        );
    }

    #[tokio::test]
    async fn test_reset_sends_seed() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/mock/reset"))
            .and(body_json(json!({ "seed": 9 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "seed": 9,
                "counts": {
                    "sources": 8, "plugins": 24, "hooks": 10, "signers": 4,
                    "validators": 12, "reporters": 9, "detections": 16,
                    "explanations": 0, "batch_jobs": 1, "streaming_sessions": 0,
                    "streaming_alerts": 0, "tiers": 4, "policies": 6,
                    "tiering_configs": 2, "migrations": 12, "versions": 32
                }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let resp = client.reset(Some(9)).await.unwrap();
        assert_eq!(resp.seed, 9);
        assert_eq!(resp.counts.versions, 32);
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[tokio::test]
    async fn test_error_detail_is_extracted() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/plugins/missing"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(json!({ "detail": "Plugin not found: missing" })),
            )
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        match client.get_plugin("missing").await {
            Err(ClientError::Api { status, detail }) => {
                assert_eq!(status, 404);
                assert_eq!(detail, "Plugin not found: missing");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_plain_text_error_body_is_kept() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/anomaly/batch/j-1/cancel"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        match client.cancel_batch_job("j-1").await {
            Err(ClientError::Api { status, detail }) => {
                assert_eq!(status, 502);
                assert_eq!(detail, "Bad Gateway");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_json_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/anomaly/streaming/s-1/status"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let result = client.streaming_status("s-1").await;
        assert!(matches!(result, Err(ClientError::InvalidResponse { .. })));
    }

    #[tokio::test]
    async fn test_timeout() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/plugins/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(plugin_json("slow", "slow"))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&mock_server)
            .await;

        let client = ApiClient::new(&mock_server.uri(), &RequestConfig { timeout_ms: 50 }).unwrap();
        match client.get_plugin("slow").await {
            Err(ClientError::Timeout { timeout_ms }) => assert_eq!(timeout_ms, 50),
            other => panic!("Expected timeout, got {:?}", other),
        }
    }
}
