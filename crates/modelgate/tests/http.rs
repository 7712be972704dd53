//! HTTP surface tests driven through the router with `oneshot`.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use modelgate::chat::{ChatOrchestrator, with_properties};
use modelgate::config::ChatConfig;
use modelgate::llm::{
    ChatRequest, ChatStream, FinishReason, LLMError, LLMProvider, ModelInfo, ProviderConfig,
    ProviderRegistry, ResolvedCredentials, StreamEvent, Usage,
};
use modelgate::server::{AppState, build_app};
use modelgate_protocol::ErrorBody;

// ============================================================================
// Test provider
// ============================================================================

struct ScriptedProvider {
    name: &'static str,
    config: ProviderConfig,
    models: Vec<ModelInfo>,
    scripts: Mutex<VecDeque<Vec<StreamEvent>>>,
}

impl ScriptedProvider {
    fn keyless(name: &'static str, scripts: Vec<Vec<StreamEvent>>) -> Self {
        Self {
            name,
            config: ProviderConfig::default(),
            models: vec![ModelInfo::new(
                format!("{}-model", name.to_lowercase()),
                format!("{name} Model"),
                name,
                4000,
            )],
            scripts: Mutex::new(scripts.into()),
        }
    }

    fn keyed(name: &'static str, key: &str) -> Self {
        let mut provider = Self::keyless(name, Vec::new());
        provider.config = ProviderConfig::new(Some(key), None);
        provider
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn static_models(&self) -> &[ModelInfo] {
        &self.models
    }

    async fn chat_stream(
        &self,
        _request: ChatRequest,
        _credentials: &ResolvedCredentials,
    ) -> Result<ChatStream, LLMError> {
        let events = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(LLMError::Stream("script exhausted".to_string()))?;
        Ok(Box::pin(futures::stream::iter(events.into_iter().map(Ok))))
    }
}

fn done(reason: FinishReason) -> StreamEvent {
    StreamEvent::Done {
        usage: Some(Usage {
            prompt_tokens: 12,
            completion_tokens: 3,
            total_tokens: 15,
        }),
        finish_reason: reason,
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn app_with(providers: Vec<ScriptedProvider>) -> Router {
    let mut registry = ProviderRegistry::new();
    for provider in providers {
        registry.register(Arc::new(provider));
    }
    let orchestrator = ChatOrchestrator::new(registry, ChatConfig::default());
    build_app(AppState::new(orchestrator, HashMap::new()), 30)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn livez_is_always_ok() {
    let response = app_with(Vec::new()).oneshot(get("/livez")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok");
}

#[tokio::test]
async fn readyz_requires_a_provider() {
    let empty = app_with(Vec::new()).oneshot(get("/readyz")).await.unwrap();
    assert_eq!(empty.status(), StatusCode::SERVICE_UNAVAILABLE);

    let ready = app_with(vec![ScriptedProvider::keyless("Echo", Vec::new())])
        .oneshot(get("/readyz"))
        .await
        .unwrap();
    assert_eq!(ready.status(), StatusCode::OK);
}

// ============================================================================
// Models and providers
// ============================================================================

#[tokio::test]
async fn refresh_lists_static_models_sorted_by_name() {
    let app = app_with(vec![
        ScriptedProvider::keyless("Zeta", Vec::new()),
        ScriptedProvider::keyless("Alpha", Vec::new()),
    ]);

    let response = app
        .oneshot(json_request("POST", "/api/models", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    let names: Vec<&str> = body["modelList"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["alpha-model", "zeta-model"]);
    assert_eq!(body["modelList"][0]["maxTokenAllowed"], 4000);
}

#[tokio::test]
async fn providers_report_configuration() {
    let app = app_with(vec![
        ScriptedProvider::keyed("Keyed", "KEYED_API_KEY"),
        ScriptedProvider::keyless("Echo", Vec::new()),
    ]);

    let response = app.oneshot(get("/api/providers")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["providers"][0]["name"], "Keyed");
    assert_eq!(body["providers"][0]["configured"], false);
    assert_eq!(body["providers"][0]["requiresApiKey"], true);
    assert_eq!(body["providers"][1]["configured"], true);
    assert_eq!(body["defaultProvider"], "Echo");
}

// ============================================================================
// Chat
// ============================================================================

#[tokio::test]
async fn chat_without_key_is_rejected_before_streaming() {
    let app = app_with(vec![ScriptedProvider::keyed("Keyed", "KEYED_API_KEY")]);
    let content = with_properties("keyed-model", "Keyed", "hello");

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/chat",
            json!({ "messages": [{ "role": "user", "content": content }] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body: ErrorBody = serde_json::from_str(&body_text(response).await).unwrap();
    assert!(body.error);
    assert_eq!(body.status_code, 401);
    assert_eq!(body.provider, "Keyed");
    assert!(!body.is_retryable);
}

#[tokio::test]
async fn chat_rejects_malformed_body() {
    let app = app_with(vec![ScriptedProvider::keyless("Echo", Vec::new())]);

    let response = app
        .oneshot(json_request("POST", "/api/chat", json!({ "messages": "nope" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn chat_streams_data_protocol_lines() {
    let app = app_with(vec![ScriptedProvider::keyless(
        "Echo",
        vec![vec![
            StreamEvent::Reasoning("thinking".to_string()),
            StreamEvent::Token("Hello".to_string()),
            done(FinishReason::Stop),
        ]],
    )]);
    let content = with_properties("echo-model", "Echo", "hi");

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/chat",
            json!({ "messages": [{ "role": "user", "content": content }] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream; charset=utf-8"
    );

    let text = body_text(response).await;
    let lines: Vec<&str> = text.lines().collect();

    assert!(lines.iter().any(|l| l.contains("Context optimization complete")));
    assert!(lines.iter().any(|l| l.contains("Generating Response")));
    assert!(!lines.iter().any(|l| l.starts_with("g:")));

    let open = lines
        .iter()
        .position(|l| l.starts_with("0:") && l.contains("__reasoningThought__"))
        .unwrap();
    let hello = lines.iter().position(|l| *l == "0:\"Hello\"").unwrap();
    assert_eq!(lines[open + 1], "0:\"thinking\"");
    assert!(open < hello);

    assert!(lines.iter().any(|l| l.starts_with("8:") && l.contains("\"usage\"")));
    assert!(lines.iter().any(|l| l.contains("Response Generated")));
    assert!(lines.last().unwrap().starts_with("d:"));
}
