//! Common test utilities for in-process API testing.
//!
//! This module provides a test fixture that wires a real SQLite store and
//! event log in a temp directory into the router, without binding a port.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tower::ServiceExt;

use queueline_core::{
    create_publish_system, testing::FailingEventLog, Config, DispatcherSupervisor, EventLog,
    EventPublisher, QueueService, SqliteEventLog, SqliteTicketStore, TicketStore,
    TopicBroadcaster,
};
use queueline_server::state::AppState;

/// Re-export fixtures for test convenience
pub use queueline_core::testing::fixtures;

/// Test fixture with an in-process router.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_ticket_creation() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.post("/api/v1/tickets", json!({
///         "queue_id": 1,
///         "customer_name": "A"
///     })).await;
///
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    pub state: Arc<AppState>,
    pub store: Arc<dyn TicketStore>,
    pub publisher: EventPublisher,
    pub writer: JoinHandle<()>,
    /// Temporary directory for the test database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a fixture with dispatchers disabled.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let mut config: Config =
            fixtures::test_config(db_path.to_str().expect("temp path is not UTF-8"));
        config.dispatcher.enabled = test_config.enable_dispatcher;

        let store: Arc<dyn TicketStore> = Arc::new(
            SqliteTicketStore::new(&db_path).expect("Failed to create ticket store"),
        );
        let event_log: Arc<dyn EventLog> = if test_config.failing_event_log {
            Arc::new(FailingEventLog::new())
        } else {
            Arc::new(
                SqliteEventLog::new(&db_path, config.database.busy_timeout())
                    .expect("Failed to create event log"),
            )
        };
        let broadcaster = Arc::new(TopicBroadcaster::new(config.publisher.broadcast_capacity));

        let (publisher, log_writer) =
            create_publish_system(event_log, broadcaster, &config.publisher);
        let writer = tokio::spawn(log_writer.run());

        let supervisor = Arc::new(DispatcherSupervisor::new(
            Arc::clone(&store),
            publisher.clone(),
            config.dispatcher.clone(),
        ));
        if test_config.enable_dispatcher {
            for &queue_id in &config.dispatcher.queues {
                supervisor
                    .start(queue_id)
                    .await
                    .expect("Failed to start dispatcher");
            }
        }

        let service = QueueService::new(Arc::clone(&store), publisher.clone());
        let state = Arc::new(AppState::new(config, service, supervisor));
        let router = queueline_server::api::create_router(Arc::clone(&state));

        Self {
            router,
            state,
            store,
            publisher,
            writer,
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

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Create a ticket and return its id.
    pub async fn create_ticket(&self, queue_id: i64, customer: &str) -> i64 {
        let response = self
            .post(
                "/api/v1/tickets",
                serde_json::json!({ "queue_id": queue_id, "customer_name": customer }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body["id"].as_i64().expect("id in create response")
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
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
            serde_json::from_slice(&body_bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body_bytes).into()))
        };

        TestResponse { status, body }
    }
}

/// Configuration for test fixture.
#[derive(Debug, Clone, Default)]
pub struct TestConfig {
    /// Start dispatchers for the configured queues
    pub enable_dispatcher: bool,
    /// Use an event log whose every append fails
    pub failing_event_log: bool,
}

impl TestConfig {
    pub fn with_dispatcher() -> Self {
        Self {
            enable_dispatcher: true,
            ..Default::default()
        }
    }

    pub fn with_failing_log() -> Self {
        Self {
            failing_event_log: true,
            ..Default::default()
        }
    }
}
