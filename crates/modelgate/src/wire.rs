//! Client-facing encoding of chat events.
//!
//! Events become `<channel>:<json>\n` lines. Reasoning deltas travel on the
//! plain text channel, wrapped in an opening and a closing marker so clients
//! can render them apart from the answer.

use std::convert::Infallible;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use modelgate_protocol::channel;
use serde::Serialize;
use tracing::error;

use crate::chat::ChatEvent;

/// Text emitted before the first reasoning delta of a run.
pub const REASONING_OPEN: &str = "<div class=\"__reasoningThought__\">";
/// Text emitted after the last reasoning delta of a run.
pub const REASONING_CLOSE: &str = "</div>\n";

/// Encode one event as a line, before the reasoning rewrite.
pub fn encode_event(event: &ChatEvent) -> String {
    match event {
        ChatEvent::Data(record) => line(channel::DATA, &[record]),
        ChatEvent::Annotation(annotation) => line(channel::ANNOTATION, &[annotation]),
        ChatEvent::Text(text) => line(channel::TEXT, text),
        ChatEvent::Reasoning(text) => line(channel::REASONING, text),
        ChatEvent::ToolCall(part) => line(channel::TOOL_CALL, part),
        ChatEvent::FinishStep(part) => line(channel::FINISH_STEP, part),
        ChatEvent::FinishMessage(part) => line(channel::FINISH_MESSAGE, part),
        ChatEvent::Error(message) => line(channel::ERROR, message),
    }
}

fn line<T: Serialize + ?Sized>(code: char, payload: &T) -> String {
    let json = serde_json::to_string(payload).unwrap_or_else(|e| {
        error!(error = %e, "Failed to encode stream payload");
        "null".to_string()
    });
    format!("{code}:{json}\n")
}

/// Stateful rewrite of encoded lines into the client stream.
#[derive(Debug, Default)]
pub struct WireTransform {
    last: Option<char>,
}

impl WireTransform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrite one encoded line, injecting wrapper markers on reasoning edges.
    pub fn transform(&mut self, line: &str) -> Vec<String> {
        let code = line.chars().next();
        let is_reasoning = code == Some(channel::REASONING);
        let was_reasoning = self.last == Some(channel::REASONING);
        self.last = code;

        let mut out = Vec::with_capacity(2);
        if is_reasoning && !was_reasoning {
            out.push(text_line(REASONING_OPEN));
        }
        if was_reasoning && !is_reasoning {
            out.push(text_line(REASONING_CLOSE));
        }

        if is_reasoning {
            let payload = line
                .split_once(':')
                .map_or("", |(_, rest)| rest)
                .trim_end_matches('\n');
            out.push(format!("{}:{payload}\n", channel::TEXT));
        } else {
            out.push(line.to_string());
        }
        out
    }

    /// Encode and rewrite one event.
    pub fn push(&mut self, event: &ChatEvent) -> Bytes {
        Bytes::from(self.transform(&encode_event(event)).concat())
    }

    /// Close a reasoning run left open at end of stream.
    pub fn finish(&mut self) -> Option<Bytes> {
        if self.last.take() == Some(channel::REASONING) {
            Some(Bytes::from(text_line(REASONING_CLOSE)))
        } else {
            None
        }
    }
}

fn text_line(text: &str) -> String {
    line(channel::TEXT, text)
}

/// Turn a stream of chat events into the byte stream sent to the client.
pub fn encode_stream<S>(events: S) -> impl Stream<Item = Result<Bytes, Infallible>> + Send
where
    S: Stream<Item = ChatEvent> + Send + Unpin + 'static,
{
    futures::stream::unfold(
        Some((events, WireTransform::new())),
        |state| async move {
            let (mut events, mut transform) = state?;
            match events.next().await {
                Some(event) => {
                    let bytes = transform.push(&event);
                    Some((Ok::<_, Infallible>(bytes), Some((events, transform))))
                }
                None => transform.finish().map(|bytes| (Ok::<_, Infallible>(bytes), None)),
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use modelgate_protocol::{MessageAnnotation, UsageValue, parse_line};

    use super::*;

    fn wire(events: Vec<ChatEvent>) -> Vec<String> {
        let mut transform = WireTransform::new();
        let mut lines: Vec<String> = events
            .iter()
            .flat_map(|e| transform.transform(&encode_event(e)))
            .collect();
        if let Some(tail) = transform.finish() {
            lines.push(String::from_utf8(tail.to_vec()).unwrap());
        }
        lines
    }

    #[test]
    fn reasoning_run_is_wrapped_once() {
        let lines = wire(vec![
            ChatEvent::Text("a".to_string()),
            ChatEvent::Reasoning("b".to_string()),
            ChatEvent::Reasoning("c".to_string()),
            ChatEvent::Text("d".to_string()),
        ]);

        assert_eq!(
            lines,
            vec![
                "0:\"a\"\n".to_string(),
                text_line(REASONING_OPEN),
                "0:\"b\"\n".to_string(),
                "0:\"c\"\n".to_string(),
                text_line(REASONING_CLOSE),
                "0:\"d\"\n".to_string(),
            ]
        );
    }

    #[test]
    fn open_wrapper_is_closed_at_end() {
        let lines = wire(vec![ChatEvent::Reasoning("thinking".to_string())]);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2], text_line(REASONING_CLOSE));
    }

    #[test]
    fn reasoning_payload_keeps_colons() {
        let mut transform = WireTransform::new();
        let lines = transform.transform("g:\"a: b\"\n");
        assert_eq!(lines[1], "0:\"a: b\"\n");
    }

    #[test]
    fn annotations_are_arrays() {
        let line = encode_event(&ChatEvent::Annotation(MessageAnnotation::Usage {
            value: UsageValue {
                completion_tokens: 1,
                prompt_tokens: 2,
                total_tokens: 3,
            },
        }));
        let (code, value) = parse_line(&line).unwrap();
        assert_eq!(code, '8');
        assert_eq!(value[0]["type"], "usage");
        assert_eq!(value[0]["value"]["totalTokens"], 3);
    }

    #[test]
    fn text_is_json_escaped() {
        let line = encode_event(&ChatEvent::Text("line\n\"quoted\"".to_string()));
        assert_eq!(line, "0:\"line\\n\\\"quoted\\\"\"\n");
    }

    #[tokio::test]
    async fn byte_stream_closes_trailing_reasoning() {
        let events = futures::stream::iter(vec![
            ChatEvent::Text("x".to_string()),
            ChatEvent::Reasoning("y".to_string()),
        ]);
        let chunks: Vec<Bytes> = encode_stream(events)
            .map(|r| r.unwrap())
            .collect()
            .await;

        let body: String = chunks
            .iter()
            .map(|c| String::from_utf8(c.to_vec()).unwrap())
            .collect();
        assert!(body.ends_with(&text_line(REASONING_CLOSE)));
        assert_eq!(body.matches("__reasoningThought__").count(), 1);
    }
}
