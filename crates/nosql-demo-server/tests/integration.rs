use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use chrono::Utc;
use http_body_util::BodyExt;
use nosql_demo_core::{
    AccessToken, ChatClient, ChatCompletion, ConfigMap, ConnectionSettings, Container,
    ContentPart, Item, ItemResponse, ServiceFactory, TokenCredential, TokenUsage,
};
use nosql_demo_server::{build_router, AppState};
use tokio::sync::Semaphore;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Fake services
// ---------------------------------------------------------------------------

struct FakeToken;

#[async_trait]
impl TokenCredential for FakeToken {
    async fn get_token(&self, _scopes: &[&str]) -> nosql_demo_core::Result<AccessToken> {
        Ok(AccessToken {
            token: "fake".into(),
            expires_on: Utc::now(),
        })
    }
}

/// Upserts wait for a permit so tests can hold a run in flight. The permit is
/// returned on drop, so one permit opens the gate for good.
struct FakeContainer {
    gate: Arc<Semaphore>,
}

#[async_trait]
impl Container for FakeContainer {
    async fn upsert_item(&self, item: &Item) -> nosql_demo_core::Result<ItemResponse<Item>> {
        let _permit = self.gate.acquire().await;
        Ok(ItemResponse {
            resource: item.clone(),
            request_charge: 10.29,
            activity_id: "write-1".into(),
        })
    }

    async fn read_item(
        &self,
        _id: &str,
        _partition_key: &str,
    ) -> nosql_demo_core::Result<ItemResponse<Item>> {
        Ok(ItemResponse {
            resource: Item::demo(),
            request_charge: 1.0,
            activity_id: "read-1".into(),
        })
    }
}

struct FakeChat;

#[async_trait]
impl ChatClient for FakeChat {
    async fn complete_chat(&self, _prompt: &str) -> nosql_demo_core::Result<ChatCompletion> {
        Ok(ChatCompletion {
            id: "chatcmpl-1".into(),
            content: vec![ContentPart {
                text: "German: Hallo\nSpanish: Hola\n".into(),
            }],
            usage: TokenUsage {
                input_tokens: 21,
                output_tokens: 9,
            },
        })
    }
}

struct FakeServices {
    gate: Arc<Semaphore>,
}

impl ServiceFactory for FakeServices {
    fn credential(&self) -> Arc<dyn TokenCredential> {
        Arc::new(FakeToken)
    }

    fn container(
        &self,
        _endpoint: &str,
        _credential: Arc<dyn TokenCredential>,
        _database: &str,
        _container: &str,
    ) -> nosql_demo_core::Result<Box<dyn Container>> {
        Ok(Box::new(FakeContainer {
            gate: self.gate.clone(),
        }))
    }

    fn chat_client(
        &self,
        _endpoint: &str,
        _credential: Arc<dyn TokenCredential>,
        _deployment: &str,
    ) -> nosql_demo_core::Result<Box<dyn ChatClient>> {
        Ok(Box::new(FakeChat))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn full_settings() -> ConnectionSettings {
    let mut config = ConfigMap::new();
    config.set(
        "Connection:AzureCosmosDB:Endpoint",
        "https://demo.documents.azure.com:443/",
    );
    config.set("Connection:AzureCosmosDB:DatabaseName", "cosmicworks");
    config.set("Connection:AzureCosmosDB:ContainerName", "products");
    config.set(
        "Connection:AzureOpenAI:Endpoint",
        "https://demo.openai.azure.com/",
    );
    config.set("Connection:AzureOpenAI:DeploymentName", "gpt-4o");
    ConnectionSettings::bind(&config)
}

/// State with a closed gate: upserts block until `gate.add_permits` is called.
fn state_with(settings: ConnectionSettings) -> (AppState, Arc<Semaphore>) {
    let gate = Arc::new(Semaphore::new(0));
    let services = FakeServices { gate: gate.clone() };
    (AppState::new(Arc::new(settings), Arc::new(services)), gate)
}

/// Send a request via `oneshot` and return (status, content-type, raw body).
async fn send(
    app: axum::Router,
    method: &str,
    uri: &str,
) -> (StatusCode, String, axum::body::Bytes) {
    let req = axum::http::Request::builder()
        .method(method)
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, content_type, body)
}

/// Send a request via `oneshot` and return (status, parsed JSON body).
async fn json(app: axum::Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
    let (status, _, body) = send(app, method, uri).await;
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// POST with extra request headers and return (status, parsed JSON body).
async fn post_with_headers(
    app: axum::Router,
    uri: &str,
    headers: &[(&str, &str)],
) -> (StatusCode, serde_json::Value) {
    let mut builder = axum::http::Request::builder().method("POST").uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let req = builder.body(axum::body::Body::empty()).unwrap();
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Poll `/api/demo` until the run is no longer in flight.
async fn wait_for_idle(state: &AppState) -> serde_json::Value {
    for _ in 0..200 {
        let (status, body) = json(build_router(state.clone()), "GET", "/api/demo").await;
        assert_eq!(status, StatusCode::OK);
        if body["running"] == false {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("demo run did not finish");
}

fn messages(snapshot: &serde_json::Value) -> Vec<String> {
    snapshot["lines"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["message"].as_str().unwrap().to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Page and assets
// ---------------------------------------------------------------------------

#[tokio::test]
async fn index_renders_run_button() {
    let (state, _) = state_with(full_settings());
    let (status, content_type, body) = send(build_router(state), "GET", "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.starts_with("text/html"));
    let html = String::from_utf8(body.to_vec()).unwrap();
    assert!(html.contains("Run demo"));
    assert!(html.contains("/assets/app.js"));
}

#[tokio::test]
async fn embedded_assets_are_served_with_mime_type() {
    let (state, _) = state_with(full_settings());
    let (status, content_type, _) = send(build_router(state.clone()), "GET", "/assets/app.css").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "text/css");

    let (status, content_type, _) = send(build_router(state), "GET", "/assets/app.js").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.contains("javascript"));
}

#[tokio::test]
async fn unknown_asset_returns_404_json() {
    let (state, _) = state_with(full_settings());
    let (status, body) = json(build_router(state), "GET", "/assets/missing.png").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("missing.png"));
}

#[tokio::test]
async fn events_endpoint_is_an_sse_stream() {
    let (state, _) = state_with(full_settings());
    let req = axum::http::Request::builder()
        .uri("/api/events")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = build_router(state).oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let ct = response
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(ct.starts_with("text/event-stream"));
}

// ---------------------------------------------------------------------------
// Demo runs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn snapshot_is_empty_before_first_run() {
    let (state, _) = state_with(full_settings());
    let (status, body) = json(build_router(state), "GET", "/api/demo").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["loading"], false);
    assert_eq!(body["running"], false);
    assert_eq!(body["lines"], serde_json::json!([]));
    assert!(body["error"].is_null());
}

#[tokio::test]
async fn second_trigger_while_running_returns_409() {
    let (state, gate) = state_with(full_settings());

    let (status, body) = json(build_router(state.clone()), "POST", "/api/demo/run").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let run_id = body["id"].as_str().unwrap().to_string();
    assert!(!run_id.is_empty());

    let (status, body) = json(build_router(state.clone()), "POST", "/api/demo/run").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains(&run_id));

    let (_, running) = json(build_router(state.clone()), "GET", "/api/demo").await;
    assert_eq!(running["running"], true);
    assert_eq!(running["loading"], true);

    gate.add_permits(1);
    let done = wait_for_idle(&state).await;
    assert_eq!(done["run_id"], run_id.as_str());

    // Idle again: a new run is accepted.
    let (status, _) = json(build_router(state.clone()), "POST", "/api/demo/run").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    wait_for_idle(&state).await;
}

#[tokio::test]
async fn completed_run_is_reflected_in_snapshot() {
    let (state, gate) = state_with(full_settings());
    gate.add_permits(1);

    let (status, _) = json(build_router(state.clone()), "POST", "/api/demo/run").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let body = wait_for_idle(&state).await;

    assert_eq!(body["loading"], false);
    assert!(body["error"].is_null());
    let lines = messages(&body);
    assert_eq!(lines.first().unwrap(), "Welcome to the Azure Cosmos DB for NoSQL demo!");
    assert_eq!(lines.last().unwrap(), "Demo finished!");
    assert!(lines.contains(&"Request charge of the operation: 10.29".to_string()));
    assert!(lines.contains(&"Input token usage: 021".to_string()));
    assert!(lines.contains(&"Chat completion response: German: Hallo\nSpanish: Hola".to_string()));
    assert_eq!(body["lines"][0]["highlight"], true);

    // The page renders the same log server-side.
    let (_, _, html) = send(build_router(state), "GET", "/").await;
    let html = String::from_utf8(html.to_vec()).unwrap();
    assert!(html.contains("Demo finished!"));
}

#[tokio::test]
async fn missing_setting_fails_run_and_keeps_loading() {
    let mut settings = full_settings();
    settings.azure_open_ai.deployment_name = None;
    let (state, gate) = state_with(settings);
    gate.add_permits(1);

    let (status, _) = json(build_router(state.clone()), "POST", "/api/demo/run").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let body = wait_for_idle(&state).await;

    assert_eq!(body["loading"], true);
    assert_eq!(
        body["error"],
        "Azure OpenAI deployment name is not configured. Please configure the \"Connection:AzureOpenAI:DeploymentName\" configuration setting."
    );
    let lines = messages(&body);
    // Both AI settings are checked before the AI client is announced.
    assert_eq!(lines.last().unwrap(), "Activity ID of the operation: read-1");
    assert!(!lines.iter().any(|l| l.starts_with("Connecting to Azure OpenAI")));
}

#[tokio::test]
async fn cross_site_trigger_is_refused_without_starting_a_run() {
    let (state, gate) = state_with(full_settings());
    gate.add_permits(1);

    let (status, body) = post_with_headers(
        build_router(state.clone()),
        "/api/demo/run",
        &[
            ("host", "localhost:5000"),
            ("origin", "https://evil.example"),
            ("sec-fetch-site", "cross-site"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].as_str().unwrap().contains("cross-site"));

    let (status, _) = post_with_headers(
        build_router(state.clone()),
        "/api/demo/run",
        &[("host", "localhost:5000"), ("origin", "https://evil.example")],
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, snapshot) = json(build_router(state.clone()), "GET", "/api/demo").await;
    assert_eq!(snapshot["running"], false);
    assert!(snapshot["run_id"].is_null());
    assert_eq!(snapshot["lines"], serde_json::json!([]));

    // The page's own same-origin request is accepted.
    let (status, _) = post_with_headers(
        build_router(state.clone()),
        "/api/demo/run",
        &[
            ("host", "localhost:5000"),
            ("origin", "http://localhost:5000"),
            ("sec-fetch-site", "same-origin"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    wait_for_idle(&state).await;
}
