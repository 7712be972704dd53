//! Streaming chat turn with segmented continuation.
//!
//! A turn runs one or more generation calls ("segments") against a single
//! provider:
//! 1. Resolve provider, model and credentials from the request
//! 2. Optionally reduce the file context
//! 3. Stream a segment, forwarding every delta as it arrives
//! 4. On a `length` finish, append the segment and a continue prompt, then go to 3
//! 5. On any other finish, emit the cumulative usage and end the turn

use std::sync::Arc;

use futures::StreamExt;
use modelgate_protocol::{
    FinishMessagePart, FinishStepPart, MessageAnnotation, ProgressStatus, ToolCallPart,
};
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};
use ulid::Ulid;

use crate::chat::collaborators::{
    ContextReducer, FileEntry, FileMap, NoTools, ReducedContext, ToolService, context_message,
    file_paths,
};
use crate::chat::error::ChatError;
use crate::chat::event::{ChatEvent, EventSink, SinkClosed};
use crate::chat::properties::{extract_properties, strip_user_properties, with_properties};
use crate::chat::tokens::count_message_tokens;
use crate::chat::usage::{CONTINUE_PROMPT, ContinuationState, CumulativeUsage};
use crate::config::ChatConfig;
use crate::llm::{
    ChatRequest, CredentialContext, FinishReason, LLMProvider, Message, ModelInfo,
    ProviderRegistry, ResolvedCredentials, Role, StreamEvent, ToolCall, ToolChoice, Usage,
};

/// Path prefix of the client's workspace, stripped from code context paths.
const WORK_DIR: &str = "/home/project/";

/// Client payload of one chat turn.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurnRequest {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub files: Option<FileMap>,
    #[serde(default)]
    pub context_optimization: bool,
}

/// A turn whose provider, model and credentials are resolved.
pub struct PreparedTurn {
    provider: Arc<dyn LLMProvider>,
    model: ModelInfo,
    credentials: ResolvedCredentials,
    context: CredentialContext,
    messages: Vec<Message>,
    files: Option<FileMap>,
    context_optimization: bool,
}

impl PreparedTurn {
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &ModelInfo {
        &self.model
    }
}

/// Result of a finished turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub finish_reason: FinishReason,
    pub usage: CumulativeUsage,
    /// Generation calls made, continuations included.
    pub segments: u32,
    /// Text generated across all segments.
    pub text: String,
}

/// Drives chat turns against the provider registry.
pub struct ChatOrchestrator {
    registry: ProviderRegistry,
    config: ChatConfig,
    reducer: Option<Arc<dyn ContextReducer>>,
    tools: Arc<dyn ToolService>,
}

impl ChatOrchestrator {
    pub fn new(registry: ProviderRegistry, config: ChatConfig) -> Self {
        Self {
            registry,
            config,
            reducer: None,
            tools: Arc::new(NoTools),
        }
    }

    pub fn with_reducer(mut self, reducer: Arc<dyn ContextReducer>) -> Self {
        self.reducer = Some(reducer);
        self
    }

    pub fn with_tools(mut self, tools: Arc<dyn ToolService>) -> Self {
        self.tools = tools;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Resolve the provider, model and credentials of a turn.
    ///
    /// Failures here happen before any event is streamed.
    pub async fn prepare(
        &self,
        request: ChatTurnRequest,
        context: CredentialContext,
    ) -> Result<PreparedTurn, ChatError> {
        let selector = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .or(request.messages.first())
            .map(|m| extract_properties(&m.content))
            .unwrap_or_default();

        let provider = self.select_provider(selector.provider.as_deref(), &context)?;
        let name = provider.name().to_string();

        // Credentials first: a missing key must not surface as a missing model.
        let credentials = context.resolve(&name, provider.config());
        if provider.config().requires_api_key() && credentials.api_key.is_none() {
            return Err(ChatError::Credential {
                provider: name,
                detail: "no API key resolved".to_string(),
            });
        }

        let models = self.registry.models_for_provider(&name, &context).await?;
        let model_name = selector
            .model
            .or_else(|| self.config.default_model.clone())
            .or_else(|| models.first().map(|m| m.name.clone()))
            .ok_or_else(|| ChatError::NoModel {
                provider: name.clone(),
            })?;
        let model = models
            .iter()
            .find(|m| m.name == model_name)
            .cloned()
            .unwrap_or_else(|| {
                ModelInfo::new(
                    model_name.clone(),
                    model_name.clone(),
                    name.clone(),
                    self.config.default_context_window,
                )
            });

        self.log_request_size(&request, &model);

        Ok(PreparedTurn {
            provider,
            model,
            credentials,
            context,
            messages: request.messages,
            files: request.files,
            context_optimization: request.context_optimization,
        })
    }

    fn select_provider(
        &self,
        requested: Option<&str>,
        context: &CredentialContext,
    ) -> Result<Arc<dyn LLMProvider>, ChatError> {
        let requested = requested.or(self.config.default_provider.as_deref());
        if let Some(name) = requested {
            if let Some(provider) = self.registry.get(name) {
                return Ok(provider);
            }
            warn!(provider = %name, "Unknown provider requested, using default");
        }
        Ok(self.registry.default_provider(context)?)
    }

    fn log_request_size(&self, request: &ChatTurnRequest, model: &ModelInfo) {
        let message_tokens = count_message_tokens(&request.messages);
        info!(
            model = %model.name,
            provider = %model.provider,
            context_window = model.max_token_allowed,
            message_tokens,
            "Preparing chat turn"
        );

        let size_bytes = serde_json::to_vec(&request.messages).map_or(0, |v| v.len())
            + request
                .files
                .as_ref()
                .and_then(|f| serde_json::to_vec(f).ok())
                .map_or(0, |v| v.len());
        let size_kb = size_bytes as f64 / 1024.0;
        debug!(size_kb, "Request size");
        if size_kb > self.config.large_request_warn_kb as f64 {
            warn!(size_kb, "Large request detected, consider context optimization");
        }
    }

    /// Run a prepared turn, writing its events to `sink`.
    pub async fn run(&self, turn: PreparedTurn, sink: &EventSink) -> Result<TurnOutcome, ChatError> {
        let PreparedTurn {
            provider,
            model,
            credentials,
            context,
            messages,
            files,
            context_optimization,
        } = turn;
        let mut run = TurnRun {
            sink,
            order: 0,
            usage: CumulativeUsage::default(),
        };
        let provider_name = provider.name().to_string();

        let mut messages = self
            .tools
            .preprocess(messages)
            .await
            .map_err(|source| ChatError::ToolCall {
                provider: provider_name.clone(),
                source,
            })?;

        let mut preamble = Vec::new();
        if let Some(prompt) = &self.config.system_prompt {
            preamble.push(Message::system(prompt.clone()));
        }

        let files = files.unwrap_or_default();
        if context_optimization && !file_paths(&files).is_empty() {
            run.progress("context", ProgressStatus::InProgress, "Analyzing codebase")
                .await?;
            let reduced = self
                .reduce_context(&messages, files, &context)
                .await;
            if let Some(usage) = &reduced.usage {
                run.usage.add(usage);
            }
            run.emit(ChatEvent::Annotation(MessageAnnotation::CodeContext {
                files: file_paths(&reduced.files)
                    .into_iter()
                    .map(|p| p.strip_prefix(WORK_DIR).map(str::to_string).unwrap_or(p))
                    .collect(),
            }))
            .await?;
            preamble.extend(context_message(&reduced));
        }
        run.progress(
            "context",
            ProgressStatus::Complete,
            "Context optimization complete",
        )
        .await?;

        run.progress("response", ProgressStatus::InProgress, "Generating Response")
            .await?;

        let max_tokens = self.config.max_tokens.min(model.max_token_allowed);
        let tools = self.tools.tools();
        let mut continuation = ContinuationState::new(self.config.max_segments);
        let mut text = String::new();
        let mut segments = 0u32;

        loop {
            segments += 1;

            let mut outbound: Vec<Message> =
                preamble.iter().chain(messages.iter()).cloned().collect();
            strip_user_properties(&mut outbound);
            let request = ChatRequest::with_tools(
                &model.name,
                outbound,
                Some(max_tokens),
                tools.clone(),
                ToolChoice::Auto,
            );

            debug!(
                provider = %provider_name,
                segment = segments,
                messages = request.messages.len(),
                "Starting generation segment"
            );

            let segment = self
                .stream_segment(provider.as_ref(), &credentials, request, &mut run)
                .await?;
            text.push_str(&segment.text);

            if let Some(usage) = &segment.usage {
                run.usage.add(usage);
            }
            let segment_usage = segment.usage.unwrap_or_default();

            if segment.finish_reason != FinishReason::Length {
                run.emit(ChatEvent::FinishStep(FinishStepPart {
                    finish_reason: segment.finish_reason.as_str().to_string(),
                    usage: segment_usage.into(),
                    is_continued: false,
                }))
                .await?;
                run.emit(ChatEvent::Annotation(MessageAnnotation::Usage {
                    value: run.usage.value(),
                }))
                .await?;
                run.progress("response", ProgressStatus::Complete, "Response Generated")
                    .await?;
                run.emit(ChatEvent::FinishMessage(FinishMessagePart {
                    finish_reason: segment.finish_reason.as_str().to_string(),
                    usage: run.usage.value(),
                }))
                .await?;

                info!(provider = %provider_name, segments, "Chat turn finished");
                return Ok(TurnOutcome {
                    finish_reason: segment.finish_reason,
                    usage: run.usage,
                    segments,
                    text,
                });
            }

            let advanced = continuation.advance(&provider_name);
            run.emit(ChatEvent::FinishStep(FinishStepPart {
                finish_reason: segment.finish_reason.as_str().to_string(),
                usage: segment_usage.into(),
                is_continued: advanced.is_ok(),
            }))
            .await?;
            advanced?;

            info!(
                provider = %provider_name,
                max_tokens,
                switches_left = continuation.switches_left(),
                "Reached max token limit, continuing message"
            );

            messages.push(Message::assistant(segment.text).with_id(Ulid::new().to_string()));
            messages.push(
                Message::user(with_properties(
                    &model.name,
                    &provider_name,
                    CONTINUE_PROMPT,
                ))
                .with_id(Ulid::new().to_string()),
            );
        }
    }

    /// Consume one generation call, forwarding deltas as they arrive.
    async fn stream_segment(
        &self,
        provider: &dyn LLMProvider,
        credentials: &ResolvedCredentials,
        request: ChatRequest,
        run: &mut TurnRun<'_>,
    ) -> Result<Segment, ChatError> {
        let provider_name = provider.name();
        let mut stream = provider
            .chat_stream(request, credentials)
            .await
            .map_err(|e| ChatError::from_llm(provider_name, e))?;

        let mut segment = Segment {
            text: String::new(),
            usage: None,
            finish_reason: FinishReason::Stop,
        };

        while let Some(event) = stream.next().await {
            let event = event.map_err(|e| {
                error!(provider = %provider_name, error = %e, "Generation stream failed");
                ChatError::from_llm(provider_name, e)
            })?;
            match event {
                StreamEvent::Token(token) => {
                    segment.text.push_str(&token);
                    run.emit(ChatEvent::Text(token)).await?;
                }
                StreamEvent::Reasoning(reasoning) => {
                    run.emit(ChatEvent::Reasoning(reasoning)).await?;
                }
                StreamEvent::ToolCalls(calls) => {
                    for call in calls {
                        self.forward_tool_call(provider_name, call, run).await?;
                    }
                }
                StreamEvent::Done {
                    usage,
                    finish_reason,
                } => {
                    segment.usage = usage;
                    segment.finish_reason = finish_reason;
                    break;
                }
            }
        }
        Ok(segment)
    }

    async fn forward_tool_call(
        &self,
        provider: &str,
        call: ToolCall,
        run: &mut TurnRun<'_>,
    ) -> Result<(), ChatError> {
        let args = serde_json::from_str(&call.function.arguments)
            .unwrap_or_else(|_| serde_json::Value::String(call.function.arguments.clone()));
        run.emit(ChatEvent::ToolCall(ToolCallPart {
            tool_call_id: call.id.clone(),
            tool_name: call.function.name.clone(),
            args,
        }))
        .await?;

        match self.tools.on_tool_call(&call).await {
            Ok(Some(value)) => {
                run.emit(ChatEvent::Annotation(MessageAnnotation::Tool { value }))
                    .await
            }
            Ok(None) => Ok(()),
            Err(source) => {
                warn!(provider = %provider, tool = %call.function.name, error = %source, "Tool call failed");
                Err(ChatError::ToolCall {
                    provider: provider.to_string(),
                    source,
                })
            }
        }
    }

    /// Reduce the file context, falling back to every file on failure.
    async fn reduce_context(
        &self,
        messages: &[Message],
        files: FileMap,
        context: &CredentialContext,
    ) -> ReducedContext {
        let Some(reducer) = &self.reducer else {
            return unreduced(files);
        };
        match reducer.reduce(messages, &files, context).await {
            Ok(reduced) => {
                debug!(files = reduced.files.len(), "Context reduced");
                reduced
            }
            Err(e) => {
                error!(error = %e, "Context reduction failed, using full context");
                unreduced(files)
            }
        }
    }

    /// Run a turn on its own task and stream its events.
    ///
    /// Failures after the stream started are sent in-band as [`ChatEvent::Error`].
    /// Dropping the returned stream cancels the turn at its next event.
    pub fn spawn(self: &Arc<Self>, turn: PreparedTurn) -> ReceiverStream<ChatEvent> {
        let (sink, rx) = EventSink::channel(self.config.channel_capacity);
        let this = Arc::clone(self);

        tokio::spawn(async move {
            match this.run(turn, &sink).await {
                Ok(outcome) => {
                    debug!(segments = outcome.segments, "Turn task complete");
                }
                Err(ChatError::Disconnected) => {
                    debug!("Client disconnected, turn abandoned");
                }
                Err(e) => {
                    error!(error = %e, "Chat turn failed");
                    let _ = sink.send(ChatEvent::Error(e.to_string())).await;
                }
            }
        });

        ReceiverStream::new(rx)
    }
}

fn unreduced(files: FileMap) -> ReducedContext {
    let files = files
        .into_iter()
        .filter(|(_, entry)| matches!(entry, FileEntry::File { .. }))
        .collect();
    ReducedContext {
        files,
        summary: None,
        usage: None,
    }
}

struct Segment {
    text: String,
    usage: Option<Usage>,
    finish_reason: FinishReason,
}

/// Mutable state of one running turn.
struct TurnRun<'a> {
    sink: &'a EventSink,
    order: u32,
    usage: CumulativeUsage,
}

impl TurnRun<'_> {
    async fn emit(&mut self, event: ChatEvent) -> Result<(), ChatError> {
        self.sink.send(event).await.map_err(ChatError::from)
    }

    async fn progress(
        &mut self,
        label: &str,
        status: ProgressStatus,
        message: &str,
    ) -> Result<(), ChatError> {
        self.order += 1;
        let event = ChatEvent::progress(label, status, self.order, message);
        self.emit(event).await
    }
}

impl From<SinkClosed> for ChatError {
    fn from(_: SinkClosed) -> Self {
        ChatError::Disconnected
    }
}
