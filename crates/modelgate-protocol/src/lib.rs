//! Data stream protocol shared between modelgate and its chat clients.
//!
//! A chat turn is streamed as newline-terminated lines. Each line starts with
//! a single-character channel code, a `:` separator and a JSON payload:
//!
//! ```text
//! 2:[{"type":"progress","label":"response","status":"in-progress","order":2,"message":"Generating Response"}]
//! 0:"Hello"
//! 8:[{"type":"usage","value":{"completionTokens":20,"promptTokens":10,"totalTokens":30}}]
//! d:{"finishReason":"stop","usage":{"completionTokens":20,"promptTokens":10,"totalTokens":30}}
//! ```
//!
//! Failures that happen before streaming starts are returned as a JSON
//! [`ErrorBody`] with a non-200 status instead.

use serde::{Deserialize, Serialize};

/// Channel codes used as line prefixes.
pub mod channel {
    /// Plain generated text.
    pub const TEXT: char = '0';
    /// Out-of-band data records (progress markers).
    pub const DATA: char = '2';
    /// In-band error message.
    pub const ERROR: char = '3';
    /// Message annotations (usage, code context, tool annotations).
    pub const ANNOTATION: char = '8';
    /// A tool invocation requested by the model.
    pub const TOOL_CALL: char = '9';
    /// End of one generation segment.
    pub const FINISH_STEP: char = 'e';
    /// End of the whole turn.
    pub const FINISH_MESSAGE: char = 'd';
    /// Intermediate reasoning text. Rewritten onto [`TEXT`] before leaving the server.
    pub const REASONING: char = 'g';
}

// ============================================================================
// Data records
// ============================================================================

/// Status of a progress marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressStatus {
    InProgress,
    Complete,
}

/// Records sent on the [`channel::DATA`] channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DataRecord {
    Progress {
        label: String,
        status: ProgressStatus,
        /// Monotonic within a turn, starting at 1.
        order: u32,
        message: String,
    },
}

/// Records sent on the [`channel::ANNOTATION`] channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MessageAnnotation {
    /// Cumulative token usage for the turn.
    Usage { value: UsageValue },
    /// Files selected for the generation context.
    CodeContext { files: Vec<String> },
    /// Free-form annotation produced by the tool service.
    Tool { value: serde_json::Value },
}

/// Token counters as seen by the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageValue {
    pub completion_tokens: u32,
    pub prompt_tokens: u32,
    pub total_tokens: u32,
}

// ============================================================================
// Tool and finish parts
// ============================================================================

/// Payload of a [`channel::TOOL_CALL`] line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallPart {
    pub tool_call_id: String,
    pub tool_name: String,
    pub args: serde_json::Value,
}

/// Payload of a [`channel::FINISH_STEP`] line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishStepPart {
    pub finish_reason: String,
    pub usage: UsageValue,
    /// True when another segment follows to continue this one.
    pub is_continued: bool,
}

/// Payload of a [`channel::FINISH_MESSAGE`] line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishMessagePart {
    pub finish_reason: String,
    pub usage: UsageValue,
}

// ============================================================================
// Error body
// ============================================================================

/// JSON body returned when a turn fails before streaming starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Always `true`.
    pub error: bool,
    pub message: String,
    pub status_code: u16,
    pub is_retryable: bool,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_error: Option<bool>,
}

// ============================================================================
// Line helpers
// ============================================================================

/// Split a stream line into its channel code and JSON payload.
///
/// Returns `None` for lines without a single-character channel prefix or
/// with a payload that is not valid JSON.
pub fn parse_line(line: &str) -> Option<(char, serde_json::Value)> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let (code, payload) = line.split_once(':')?;
    let mut chars = code.chars();
    let channel = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    let value = serde_json::from_str(payload.trim_start()).ok()?;
    Some((channel, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_record_wire_shape() {
        let record = DataRecord::Progress {
            label: "context".to_string(),
            status: ProgressStatus::InProgress,
            order: 3,
            message: "Analyzing".to_string(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["status"], "in-progress");
        assert_eq!(json["order"], 3);
    }

    #[test]
    fn usage_annotation_is_camel_case() {
        let annotation = MessageAnnotation::Usage {
            value: UsageValue {
                completion_tokens: 20,
                prompt_tokens: 10,
                total_tokens: 30,
            },
        };
        let json = serde_json::to_string(&annotation).unwrap();
        assert_eq!(
            json,
            r#"{"type":"usage","value":{"completionTokens":20,"promptTokens":10,"totalTokens":30}}"#
        );
    }

    #[test]
    fn code_context_annotation() {
        let annotation = MessageAnnotation::CodeContext {
            files: vec!["src/main.rs".to_string()],
        };
        let json = serde_json::to_value(&annotation).unwrap();
        assert_eq!(json["type"], "codeContext");
        assert_eq!(json["files"][0], "src/main.rs");
    }

    #[test]
    fn error_body_omits_context_flag_when_unset() {
        let body = ErrorBody {
            error: true,
            message: "Invalid or missing API key".to_string(),
            status_code: 401,
            is_retryable: false,
            provider: "OpenAI".to_string(),
            context_error: None,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"statusCode\":401"));
        assert!(json.contains("\"isRetryable\":false"));
        assert!(!json.contains("contextError"));
    }

    #[test]
    fn parse_line_splits_channel_and_payload() {
        let (channel, value) = parse_line("0:\"hello: world\"\n").unwrap();
        assert_eq!(channel, channel::TEXT);
        assert_eq!(value, serde_json::json!("hello: world"));
    }

    #[test]
    fn parse_line_rejects_garbage() {
        assert!(parse_line("no separator").is_none());
        assert!(parse_line("ab:\"x\"").is_none());
        assert!(parse_line("0:not json").is_none());
    }
}
