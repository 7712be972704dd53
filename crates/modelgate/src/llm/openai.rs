//! OpenAI-compatible LLM provider.
//!
//! Works with OpenAI, OpenRouter, xAI, Ollama, LMStudio and other compatible APIs.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use reqwest::Client;
use tracing::{debug, warn};

use super::catalog::ModelInfo;
use super::credentials::ResolvedCredentials;
use super::error::{LLMError, error_from_response};
use super::provider::{LLMProvider, ProviderConfig, endpoint, require_api_key};
use super::types::{
    ChatRequest, ChatStream, FinishReason, FunctionCall, Role, StreamEvent, ToolCall, ToolChoice,
    ToolDefinition, Usage,
};
use crate::sse_parser::{SseEvent, SseEventStream};

/// Context ceiling assumed for listed models that do not report one.
const DEFAULT_LISTED_CONTEXT: u32 = 8000;

/// OpenAI-compatible provider, parameterised by its descriptor data.
pub struct OpenAICompatibleProvider {
    client: Client,
    name: String,
    config: ProviderConfig,
    default_base_url: String,
    static_models: Vec<ModelInfo>,
    dynamic_models: bool,
}

impl OpenAICompatibleProvider {
    #[must_use]
    pub fn new(client: Client, name: impl Into<String>, default_base_url: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
            config: ProviderConfig::default(),
            default_base_url: default_base_url.into(),
            static_models: Vec::new(),
            dynamic_models: false,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ProviderConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_static_models(mut self, models: Vec<ModelInfo>) -> Self {
        self.static_models = models;
        self
    }

    /// Enable listing models through `GET {base}/models`.
    #[must_use]
    pub fn with_dynamic_models(mut self) -> Self {
        self.dynamic_models = true;
        self
    }

    fn base_url<'a>(&'a self, credentials: &'a ResolvedCredentials) -> &'a str {
        credentials
            .base_url
            .as_deref()
            .unwrap_or(&self.default_base_url)
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn static_models(&self) -> &[ModelInfo] {
        &self.static_models
    }

    fn supports_dynamic_models(&self) -> bool {
        self.dynamic_models
    }

    async fn fetch_dynamic_models(
        &self,
        credentials: &ResolvedCredentials,
    ) -> Result<Vec<ModelInfo>, LLMError> {
        let api_key = require_api_key(self, credentials)?;
        let url = endpoint(self.base_url(credentials), "models")?;

        let mut req = self.client.get(url);
        if let Some(key) = api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let listing: ModelsResponse = response.json().await?;
        Ok(listing
            .data
            .into_iter()
            .map(|entry| {
                let label = entry.name.unwrap_or_else(|| entry.id.clone());
                ModelInfo::new(
                    entry.id,
                    label,
                    self.name.clone(),
                    entry.context_length.unwrap_or(DEFAULT_LISTED_CONTEXT),
                )
            })
            .collect())
    }

    async fn chat_stream(
        &self,
        request: ChatRequest,
        credentials: &ResolvedCredentials,
    ) -> Result<ChatStream, LLMError> {
        let api_key = require_api_key(self, credentials)?;
        let url = endpoint(self.base_url(credentials), "chat/completions")?;

        let body = StreamRequest {
            model: &request.model,
            messages: request
                .messages
                .iter()
                .map(|m| RequestMessage {
                    role: m.role,
                    content: &m.content,
                })
                .collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            tools: request.tools.as_ref(),
            tool_choice: request.tool_choice,
            stream: true,
            stream_options: StreamOptions {
                include_usage: true,
            },
        };

        let mut req = self
            .client
            .post(url)
            .header("Content-Type", "application/json");
        if let Some(key) = api_key {
            req = req.bearer_auth(key);
        }

        let response = req.json(&body).send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let sse_stream = SseEventStream::new(response.bytes_stream());
        Ok(Box::pin(OpenAIStreamAdapter::new(sse_stream)))
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(serde::Serialize)]
struct StreamRequest<'a> {
    model: &'a str,
    messages: Vec<RequestMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
    stream: bool,
    stream_options: StreamOptions,
}

#[derive(serde::Serialize)]
struct RequestMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(serde::Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(serde::Deserialize)]
struct ModelsResponse {
    data: Vec<ModelEntry>,
}

#[derive(serde::Deserialize)]
struct ModelEntry {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    context_length: Option<u32>,
}

// ============================================================================
// Streaming
// ============================================================================

/// Adapter that converts SSE events into StreamEvents.
struct OpenAIStreamAdapter<S> {
    inner: SseEventStream<S>,
    pending: VecDeque<StreamEvent>,
    tool_calls: Vec<ToolCallAccumulator>,
    usage: Option<Usage>,
    finish_reason: Option<FinishReason>,
    done: bool,
}

/// Accumulates tool call data from streaming chunks.
#[derive(Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
}

impl<S> OpenAIStreamAdapter<S> {
    fn new(inner: SseEventStream<S>) -> Self {
        Self {
            inner,
            pending: VecDeque::new(),
            tool_calls: Vec::new(),
            usage: None,
            finish_reason: None,
            done: false,
        }
    }

    fn handle_event(&mut self, event: SseEvent) -> Result<(), LLMError> {
        if event.data == "[DONE]" {
            self.finish();
            return Ok(());
        }

        let chunk = match serde_json::from_str::<StreamChunk>(&event.data) {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!(data = %event.data, error = %e, "failed to parse OpenAI SSE chunk");
                return Ok(());
            }
        };

        // Some compatible backends report failures mid-stream as an error chunk.
        if let Some(error) = chunk.error {
            self.done = true;
            warn!(message = %error.message, code = ?error.code, "OpenAI-compatible stream returned an error");
            return Err(LLMError::Stream(error.message));
        }

        if let Some(usage) = chunk.usage {
            self.usage = Some(usage);
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            return Ok(());
        };

        let delta = choice.delta;
        if let Some(reasoning) = delta.reasoning.or(delta.reasoning_content)
            && !reasoning.is_empty()
        {
            self.pending.push_back(StreamEvent::Reasoning(reasoning));
        }
        if let Some(content) = delta.content
            && !content.is_empty()
        {
            self.pending.push_back(StreamEvent::Token(content));
        }
        for call in delta.tool_calls.unwrap_or_default() {
            let idx = call.index;
            while self.tool_calls.len() <= idx {
                self.tool_calls.push(ToolCallAccumulator::default());
            }
            let acc = &mut self.tool_calls[idx];
            if let Some(id) = call.id {
                acc.id = id;
            }
            if let Some(function) = call.function {
                if let Some(name) = function.name {
                    acc.name.push_str(&name);
                }
                if let Some(arguments) = function.arguments {
                    acc.arguments.push_str(&arguments);
                }
            }
        }
        if let Some(reason) = choice.finish_reason {
            self.finish_reason = Some(FinishReason::from_openai(&reason));
        }
        Ok(())
    }

    fn finish(&mut self) {
        if self.done {
            return;
        }
        self.done = true;

        let tool_calls: Vec<ToolCall> = std::mem::take(&mut self.tool_calls)
            .into_iter()
            .filter(|tc| !tc.id.is_empty())
            .map(|tc| ToolCall {
                id: tc.id,
                tool_type: "function".to_string(),
                function: FunctionCall {
                    name: tc.name,
                    arguments: tc.arguments,
                },
            })
            .collect();
        if !tool_calls.is_empty() {
            self.pending.push_back(StreamEvent::ToolCalls(tool_calls));
        }

        self.pending.push_back(StreamEvent::Done {
            usage: self.usage.take(),
            finish_reason: self.finish_reason.take().unwrap_or(FinishReason::Stop),
        });
    }
}

impl<S, E> Stream for OpenAIStreamAdapter<S>
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Unpin,
    E: Into<LLMError>,
{
    type Item = Result<StreamEvent, LLMError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }
            if self.done {
                return Poll::Ready(None);
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => {
                    if let Err(e) = self.handle_event(event) {
                        return Poll::Ready(Some(Err(e)));
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(e.into())));
                }
                Poll::Ready(None) => self.finish(),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[derive(serde::Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    error: Option<StreamErrorBody>,
}

#[derive(serde::Deserialize)]
struct StreamErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

#[derive(serde::Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Default, serde::Deserialize)]
struct StreamDelta {
    content: Option<String>,
    reasoning: Option<String>,
    reasoning_content: Option<String>,
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(serde::Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(serde::Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}
