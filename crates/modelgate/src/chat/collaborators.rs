//! Seams to the context reducer and the tool service.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chat::error::{ReductionError, ToolCallError};
use crate::llm::{CredentialContext, Message, ToolCall, ToolDefinition, Usage};

/// A file or folder of the client's workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FileEntry {
    File {
        content: String,
        #[serde(default, rename = "isBinary")]
        is_binary: bool,
    },
    Folder,
}

/// Workspace files keyed by path.
pub type FileMap = BTreeMap<String, FileEntry>;

/// Paths of the files in a map, folders excluded.
pub fn file_paths(files: &FileMap) -> Vec<String> {
    files
        .iter()
        .filter(|(_, entry)| matches!(entry, FileEntry::File { .. }))
        .map(|(path, _)| path.clone())
        .collect()
}

/// Output of a context reduction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReducedContext {
    /// Files kept for generation.
    pub files: FileMap,
    /// Summary of the conversation so far.
    pub summary: Option<String>,
    /// Tokens spent by the reducer's own backend calls.
    pub usage: Option<Usage>,
}

/// Shrinks the file and message payload before generation.
#[async_trait]
pub trait ContextReducer: Send + Sync {
    async fn reduce(
        &self,
        messages: &[Message],
        files: &FileMap,
        credentials: &CredentialContext,
    ) -> Result<ReducedContext, ReductionError>;
}

/// Tool preprocessing, catalog and invocation hooks.
#[async_trait]
pub trait ToolService: Send + Sync {
    /// Rewrite the conversation before generation.
    async fn preprocess(&self, messages: Vec<Message>) -> Result<Vec<Message>, ToolCallError> {
        Ok(messages)
    }

    /// Tools offered to the backend.
    fn tools(&self) -> Vec<ToolDefinition> {
        Vec::new()
    }

    /// Observe a tool call requested by the model.
    ///
    /// A returned value is forwarded to the client as a tool annotation.
    async fn on_tool_call(&self, call: &ToolCall) -> Result<Option<serde_json::Value>, ToolCallError>;
}

/// Tool service with no tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTools;

#[async_trait]
impl ToolService for NoTools {
    async fn on_tool_call(&self, call: &ToolCall) -> Result<Option<serde_json::Value>, ToolCallError> {
        Err(ToolCallError::UnknownTool(call.function.name.clone()))
    }
}

/// Render reduced context into a system message for generation.
pub fn context_message(reduced: &ReducedContext) -> Option<Message> {
    if reduced.files.is_empty() && reduced.summary.is_none() {
        return None;
    }

    let mut text = String::new();
    if let Some(summary) = &reduced.summary {
        text.push_str("Below is the chat history till now:\n\n");
        text.push_str(summary);
        text.push_str("\n\n");
    }
    for (path, entry) in &reduced.files {
        if let FileEntry::File {
            content,
            is_binary: false,
        } = entry
        {
            text.push_str(&format!("<file path=\"{path}\">\n{content}\n</file>\n"));
        }
    }
    Some(Message::system(text.trim_end()))
}
