use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::timeout::TimeoutLayer;

use crate::chat::ChatOrchestrator;
use crate::handlers;
use crate::llm::{CredentialContext, ProviderRegistry};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ChatOrchestrator>,
    /// Process environment snapshot, the fallback credential source.
    pub server_env: Arc<HashMap<String, String>>,
}

impl AppState {
    pub fn new(orchestrator: ChatOrchestrator, server_env: HashMap<String, String>) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            server_env: Arc::new(server_env),
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        self.orchestrator.registry()
    }

    /// Credential context with only the server environment.
    pub fn server_credentials(&self) -> CredentialContext {
        CredentialContext::new(self.server_env.clone())
    }
}

pub fn build_app(state: AppState, request_timeout_secs: u64) -> Router {
    let api = Router::new()
        .route("/chat", post(handlers::chat))
        .route("/models", get(handlers::list_models).post(handlers::refresh_models))
        .route("/providers", get(handlers::list_providers))
        .with_state(state.clone());

    Router::new()
        .route("/livez", get(handlers::livez))
        .route("/readyz", get(handlers::readyz))
        .with_state(state)
        .nest("/api", api)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(request_timeout_secs),
        ))
}
