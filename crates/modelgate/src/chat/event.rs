//! Structured events produced by a chat turn.

use modelgate_protocol::{
    DataRecord, FinishMessagePart, FinishStepPart, MessageAnnotation, ProgressStatus, ToolCallPart,
};
use tokio::sync::mpsc;

/// One event of a chat turn, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    Data(DataRecord),
    Annotation(MessageAnnotation),
    Text(String),
    Reasoning(String),
    ToolCall(ToolCallPart),
    FinishStep(FinishStepPart),
    FinishMessage(FinishMessagePart),
    /// In-band failure after the response has started.
    Error(String),
}

impl ChatEvent {
    pub fn progress(
        label: impl Into<String>,
        status: ProgressStatus,
        order: u32,
        message: impl Into<String>,
    ) -> Self {
        ChatEvent::Data(DataRecord::Progress {
            label: label.into(),
            status,
            order,
            message: message.into(),
        })
    }
}

/// The receiving side of a turn went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("event receiver closed")]
pub struct SinkClosed;

/// Single ordered output channel of a turn.
///
/// Closing the receiver is the only cancellation signal: the next send fails
/// with [`SinkClosed`].
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<ChatEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<ChatEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink and its receiver.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ChatEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    pub async fn send(&self, event: ChatEvent) -> Result<(), SinkClosed> {
        self.tx.send(event).await.map_err(|_| SinkClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_fails_after_receiver_drops() {
        let (sink, mut rx) = EventSink::channel(4);
        sink.send(ChatEvent::Text("a".to_string())).await.unwrap();
        assert_eq!(rx.recv().await, Some(ChatEvent::Text("a".to_string())));

        drop(rx);
        assert!(sink.is_closed());
        assert_eq!(sink.send(ChatEvent::Text("b".to_string())).await, Err(SinkClosed));
    }
}
