//! Anthropic LLM provider with native API format.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use reqwest::Client;
use tracing::debug;

use super::catalog::ModelInfo;
use super::credentials::ResolvedCredentials;
use super::error::{LLMError, error_from_response};
use super::provider::{LLMProvider, ProviderConfig, endpoint, require_api_key};
use super::types::{
    ChatRequest, ChatStream, FinishReason, FunctionCall, Role, StreamEvent, ToolCall, ToolChoice,
    Usage,
};
use crate::sse_parser::{SseEvent, SseEventStream};

pub const PROVIDER_NAME: &str = "Anthropic";
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Context ceiling assumed for listed models.
const LISTED_CONTEXT: u32 = 200_000;
/// Anthropic requires `max_tokens` on every request.
const FALLBACK_MAX_TOKENS: u32 = 4096;

/// Anthropic provider with native API format.
pub struct AnthropicProvider {
    client: Client,
    config: ProviderConfig,
    api_version: String,
    static_models: Vec<ModelInfo>,
}

impl AnthropicProvider {
    pub const DEFAULT_API_VERSION: &'static str = "2023-06-01";

    pub fn new(client: Client) -> Self {
        Self {
            client,
            config: ProviderConfig::new(Some("ANTHROPIC_API_KEY"), Some("ANTHROPIC_API_BASE_URL")),
            api_version: Self::DEFAULT_API_VERSION.to_string(),
            static_models: vec![
                ModelInfo::new(
                    "claude-3-7-sonnet-latest",
                    "Claude 3.7 Sonnet",
                    PROVIDER_NAME,
                    LISTED_CONTEXT,
                ),
                ModelInfo::new(
                    "claude-3-5-haiku-latest",
                    "Claude 3.5 Haiku",
                    PROVIDER_NAME,
                    LISTED_CONTEXT,
                ),
            ],
        }
    }

    fn base_url<'a>(&self, credentials: &'a ResolvedCredentials) -> &'a str {
        credentials.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    fn authorized(
        &self,
        req: reqwest::RequestBuilder,
        api_key: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let req = req.header("anthropic-version", &self.api_version);
        match api_key {
            Some(key) => req.header("x-api-key", key),
            None => req,
        }
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn static_models(&self) -> &[ModelInfo] {
        &self.static_models
    }

    fn supports_dynamic_models(&self) -> bool {
        true
    }

    async fn fetch_dynamic_models(
        &self,
        credentials: &ResolvedCredentials,
    ) -> Result<Vec<ModelInfo>, LLMError> {
        let api_key = require_api_key(self, credentials)?;
        let url = endpoint(self.base_url(credentials), "v1/models")?;

        let response = self.authorized(self.client.get(url), api_key).send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let listing: ModelsResponse = response.json().await?;
        Ok(listing
            .data
            .into_iter()
            .map(|m| {
                let label = m.display_name.unwrap_or_else(|| m.id.clone());
                ModelInfo::new(m.id, label, PROVIDER_NAME, LISTED_CONTEXT)
            })
            .collect())
    }

    async fn chat_stream(
        &self,
        request: ChatRequest,
        credentials: &ResolvedCredentials,
    ) -> Result<ChatStream, LLMError> {
        let api_key = require_api_key(self, credentials)?;
        let url = endpoint(self.base_url(credentials), "v1/messages")?;
        let body = to_stream_request(&request);

        let response = self
            .authorized(self.client.post(url), api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let sse_stream = SseEventStream::new(response.bytes_stream());
        Ok(Box::pin(AnthropicStreamAdapter::new(sse_stream)))
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(serde::Serialize)]
struct StreamRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<RequestMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<RequestTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<RequestToolChoice>,
    stream: bool,
}

#[derive(Debug, serde::Serialize)]
struct RequestMessage {
    role: &'static str,
    content: String,
}

#[derive(serde::Serialize)]
struct RequestTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(serde::Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RequestToolChoice {
    Auto,
    Any,
    None,
}

#[derive(serde::Deserialize)]
struct ModelsResponse {
    data: Vec<ModelEntry>,
}

#[derive(serde::Deserialize)]
struct ModelEntry {
    id: String,
    #[serde(default)]
    display_name: Option<String>,
}

// ============================================================================
// Conversions
// ============================================================================

fn to_stream_request(request: &ChatRequest) -> StreamRequest {
    let mut system: Vec<&str> = Vec::new();
    let mut messages: Vec<RequestMessage> = Vec::new();

    for msg in &request.messages {
        let role = match msg.role {
            Role::System => {
                system.push(&msg.content);
                continue;
            }
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        // The messages API rejects consecutive turns from the same role.
        match messages.last_mut() {
            Some(last) if last.role == role => {
                last.content.push_str("\n\n");
                last.content.push_str(&msg.content);
            }
            _ => messages.push(RequestMessage {
                role,
                content: msg.content.clone(),
            }),
        }
    }

    let tools: Vec<RequestTool> = request
        .tools
        .iter()
        .flatten()
        .map(|tool| RequestTool {
            name: tool.function.name.clone(),
            description: tool.function.description.clone(),
            input_schema: tool
                .function
                .parameters
                .clone()
                .unwrap_or_else(|| serde_json::json!({"type": "object", "properties": {}})),
        })
        .collect();

    let tool_choice = request.tool_choice.map(|choice| match choice {
        ToolChoice::Auto => RequestToolChoice::Auto,
        ToolChoice::Required => RequestToolChoice::Any,
        ToolChoice::None => RequestToolChoice::None,
    });

    StreamRequest {
        model: request.model.clone(),
        max_tokens: request.max_tokens.unwrap_or(FALLBACK_MAX_TOKENS),
        system: (!system.is_empty()).then(|| system.join("\n\n")),
        messages,
        temperature: request.temperature,
        tools,
        tool_choice,
        stream: true,
    }
}

// ============================================================================
// Streaming
// ============================================================================

struct AnthropicStreamAdapter<S> {
    inner: SseEventStream<S>,
    pending: VecDeque<StreamEvent>,
    tool_calls: Vec<PendingToolUse>,
    prompt_tokens: u32,
    completion_tokens: u32,
    saw_usage: bool,
    finish_reason: Option<FinishReason>,
    done: bool,
}

struct PendingToolUse {
    index: u32,
    id: String,
    name: String,
    input: String,
}

impl<S> AnthropicStreamAdapter<S> {
    fn new(inner: SseEventStream<S>) -> Self {
        Self {
            inner,
            pending: VecDeque::new(),
            tool_calls: Vec::new(),
            prompt_tokens: 0,
            completion_tokens: 0,
            saw_usage: false,
            finish_reason: None,
            done: false,
        }
    }

    /// Handle one SSE event. Returns an error for in-stream `error` events.
    fn handle_event(&mut self, event: SseEvent) -> Result<(), LLMError> {
        let parsed = match serde_json::from_str::<WireEvent>(&event.data) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(data = %event.data, error = %e, "failed to parse Anthropic SSE event");
                return Ok(());
            }
        };

        match parsed {
            WireEvent::MessageStart { message } => {
                if let Some(usage) = message.usage {
                    self.saw_usage = true;
                    self.prompt_tokens = usage.input_tokens.unwrap_or(0);
                    self.completion_tokens = usage.output_tokens.unwrap_or(0);
                }
            }
            WireEvent::ContentBlockStart {
                index,
                content_block: ContentBlock::ToolUse { id, name },
            } => {
                self.tool_calls.push(PendingToolUse {
                    index,
                    id,
                    name,
                    input: String::new(),
                });
            }
            WireEvent::ContentBlockStart { .. } => {}
            WireEvent::ContentBlockDelta { index, delta } => match delta {
                Delta::TextDelta { text } if !text.is_empty() => {
                    self.pending.push_back(StreamEvent::Token(text));
                }
                Delta::ThinkingDelta { thinking } if !thinking.is_empty() => {
                    self.pending.push_back(StreamEvent::Reasoning(thinking));
                }
                Delta::InputJsonDelta { partial_json } => {
                    if let Some(call) = self.tool_calls.iter_mut().find(|c| c.index == index) {
                        call.input.push_str(&partial_json);
                    }
                }
                _ => {}
            },
            WireEvent::MessageDelta { delta, usage } => {
                if let Some(reason) = delta.stop_reason {
                    self.finish_reason = Some(FinishReason::from_anthropic(&reason));
                }
                if let Some(usage) = usage {
                    self.saw_usage = true;
                    if let Some(input) = usage.input_tokens {
                        self.prompt_tokens = input;
                    }
                    if let Some(output) = usage.output_tokens {
                        self.completion_tokens = output;
                    }
                }
            }
            WireEvent::MessageStop => self.finish(),
            WireEvent::Error { error } => {
                self.done = true;
                return Err(LLMError::Stream(error.message));
            }
            WireEvent::Other => {}
        }
        Ok(())
    }

    fn finish(&mut self) {
        if self.done {
            return;
        }
        self.done = true;

        let calls: Vec<ToolCall> = std::mem::take(&mut self.tool_calls)
            .into_iter()
            .map(|c| ToolCall {
                id: c.id,
                tool_type: "function".to_string(),
                function: FunctionCall {
                    name: c.name,
                    arguments: if c.input.is_empty() {
                        "{}".to_string()
                    } else {
                        c.input
                    },
                },
            })
            .collect();
        if !calls.is_empty() {
            self.pending.push_back(StreamEvent::ToolCalls(calls));
        }

        let usage = self.saw_usage.then(|| Usage {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_tokens: self.prompt_tokens + self.completion_tokens,
        });
        self.pending.push_back(StreamEvent::Done {
            usage,
            finish_reason: self.finish_reason.take().unwrap_or(FinishReason::Stop),
        });
    }
}

impl<S, E> Stream for AnthropicStreamAdapter<S>
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
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    MessageStart {
        message: StartMessage,
    },
    ContentBlockStart {
        index: u32,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: u32,
        delta: Delta,
    },
    MessageDelta {
        delta: MessageDeltaBody,
        #[serde(default)]
        usage: Option<WireUsage>,
    },
    MessageStop,
    Error {
        error: WireError,
    },
    #[serde(other)]
    Other,
}

#[derive(serde::Deserialize)]
struct StartMessage {
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
    TextDelta {
        text: String,
    },
    ThinkingDelta {
        thinking: String,
    },
    InputJsonDelta {
        partial_json: String,
    },
    #[serde(other)]
    Other,
}

#[derive(serde::Deserialize)]
struct MessageDeltaBody {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(serde::Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: Option<u32>,
    #[serde(default)]
    output_tokens: Option<u32>,
}

#[derive(serde::Deserialize)]
struct WireError {
    message: String,
}
