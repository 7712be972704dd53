//! Streaming chat handler.

use std::collections::HashMap;

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::warn;

use crate::chat::ChatTurnRequest;
use crate::llm::{CredentialContext, ProviderSetting};
use crate::response;
use crate::server::AppState;
use crate::wire;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBody {
    #[serde(flatten)]
    turn: ChatTurnRequest,
    #[serde(default)]
    api_keys: HashMap<String, String>,
    #[serde(default)]
    provider_settings: HashMap<String, ProviderSetting>,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/chat
pub async fn chat(
    State(state): State<AppState>,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return response::bad_request(rejection.body_text()),
    };

    let credentials = CredentialContext::new(state.server_env.clone())
        .with_api_keys(body.api_keys)
        .with_provider_settings(body.provider_settings);

    let turn = match state.orchestrator.prepare(body.turn, credentials).await {
        Ok(turn) => turn,
        Err(e) => {
            warn!(error = %e, "Chat turn rejected");
            return response::chat_error(&e);
        }
    };

    let events = state.orchestrator.spawn(turn);
    let stream = wire::encode_stream(events);

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/event-stream; charset=utf-8"),
            (header::CONNECTION, "keep-alive"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}
