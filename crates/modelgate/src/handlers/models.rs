//! Model catalog and provider handlers.

use std::collections::HashMap;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::llm::{CredentialContext, ModelInfo, ProviderFilter, ProviderSetting};
use crate::response;
use crate::server::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshModelsRequest {
    #[serde(default)]
    api_keys: HashMap<String, String>,
    #[serde(default)]
    provider_settings: HashMap<String, ProviderSetting>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelsResponse {
    model_list: Vec<ModelInfo>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvidersResponse {
    providers: Vec<ProviderEntry>,
    default_provider: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderEntry {
    name: String,
    configured: bool,
    requires_api_key: bool,
    dynamic_models: bool,
    static_models: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/models
pub async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        model_list: state.registry().catalog().to_vec(),
    })
}

/// POST /api/models
///
/// Rebuilds the catalog with the credentials in the body.
pub async fn refresh_models(
    State(state): State<AppState>,
    body: Result<Json<RefreshModelsRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return response::bad_request(rejection.body_text()),
    };

    let registry = state.registry();
    let filter = ProviderFilter::from_settings(
        &body.provider_settings,
        registry.providers().iter().map(|p| p.name()),
    );
    let credentials = CredentialContext::new(state.server_env.clone())
        .with_api_keys(body.api_keys)
        .with_provider_settings(body.provider_settings);

    let model_list = registry.rebuild_catalog(&credentials, &filter).await.to_vec();
    Json(ModelsResponse { model_list }).into_response()
}

/// GET /api/providers
pub async fn list_providers(State(state): State<AppState>) -> Json<ProvidersResponse> {
    let registry = state.registry();
    let credentials = state.server_credentials();

    let providers = registry
        .providers()
        .iter()
        .map(|p| ProviderEntry {
            name: p.name().to_string(),
            configured: registry.is_configured(p.as_ref(), &credentials),
            requires_api_key: p.config().requires_api_key(),
            dynamic_models: p.supports_dynamic_models(),
            static_models: p.static_models().len(),
        })
        .collect();
    let default_provider = registry
        .default_provider(&credentials)
        .ok()
        .map(|p| p.name().to_string());

    Json(ProvidersResponse {
        providers,
        default_provider,
    })
}
