//! Common test utilities for E2E testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with mock stage capabilities injected, so the whole pipeline can be
//! driven over HTTP without provider credentials.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use aurora_core::{
    testing::MockStages, Config, DlqStore, RunStore, SqliteDlqStore, SqliteRunStore,
};
use aurora_server::{create_router, AppState};

/// Re-export fixtures for test convenience
pub use aurora_core::testing::fixtures;

/// Test fixture for E2E testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_trigger() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.post("/api/v1/runs/trigger", json!({})).await;
///     assert_eq!(response.status, 202);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Shared state, for starting or inspecting the background loops
    pub state: Arc<AppState>,
    /// Mock capabilities - inspect call counts
    pub stages: MockStages,
    /// Temporary directory for the test database and run artifacts
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture where every stage succeeds.
    pub async fn new() -> Self {
        Self::with_stages(MockStages::new(&["twitter", "youtube"]), TestConfig::default()).await
    }

    /// Create a test fixture with custom mocks and configuration.
    pub async fn with_stages(stages: MockStages, test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let executor = Arc::new(stages.executor(&temp_dir.path().join("runs")));
        let platforms = executor.platforms();
        let platforms: Vec<&str> = platforms.iter().map(String::as_str).collect();

        let mut config: Config = fixtures::config(temp_dir.path(), &platforms);
        config.pipeline.allow_concurrent_runs = test_config.allow_concurrent_runs;
        // Keep retry backoff in the millisecond range
        config.retry.backoff_base_ms = 1;
        config.retry.rate_limit_backoff_base_ms = 2;
        config.retry.max_backoff_ms = 10;
        config.dlq.max_retries = test_config.dlq_max_retries;

        std::fs::create_dir_all(&config.storage.runs_dir).expect("Failed to create runs dir");

        let run_store: Arc<dyn RunStore> = Arc::new(
            SqliteRunStore::new(&config.database.path).expect("Failed to create run store"),
        );
        let dlq_store: Arc<dyn DlqStore> = Arc::new(
            SqliteDlqStore::new(&config.database.path).expect("Failed to create DLQ store"),
        );

        let state = Arc::new(AppState::new(config, run_store, dlq_store, executor));
        let router = create_router(Arc::clone(&state));

        Self {
            router,
            state,
            stages,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Fetch the raw text body of a GET request.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        (status, String::from_utf8_lossy(&body_bytes).to_string())
    }

    /// Trigger a run over HTTP and wait until it is completed or failed.
    pub async fn run_to_completion(&self) -> Value {
        let response = self.post_empty("/api/v1/runs/trigger").await;
        assert_eq!(response.status, StatusCode::ACCEPTED, "Body: {}", response.body);
        let run_id = response.body["run_id"]
            .as_str()
            .expect("run_id missing")
            .to_string();
        self.wait_for_run(&run_id).await
    }

    /// Poll a run until it reaches a terminal status.
    pub async fn wait_for_run(&self, run_id: &str) -> Value {
        for _ in 0..200 {
            let response = self.get(&format!("/api/v1/runs/{}", run_id)).await;
            if response.status == StatusCode::OK {
                let status = response.body["status"].as_str().unwrap_or_default();
                if status == "completed" || status == "failed" {
                    return response.body;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("Run {} did not finish in time", run_id);
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Configuration for test fixture.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Allow overlapping runs
    pub allow_concurrent_runs: bool,
    /// Replay budget per DLQ entry
    pub dlq_max_retries: u32,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            allow_concurrent_runs: false,
            dlq_max_retries: 3,
        }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}

/// Helper to assert a JSON path equals expected value.
#[macro_export]
macro_rules! assert_json_path {
    ($json:expr, $path:expr, $expected:expr) => {
        let actual = &$json[$path];
        assert_eq!(
            actual, &$expected,
            "Path '{}' expected {:?}, got {:?}",
            $path, $expected, actual
        );
    };
}
