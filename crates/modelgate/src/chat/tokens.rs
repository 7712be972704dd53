//! Rough token estimates used for request monitoring.

use crate::llm::Message;

/// Per-message framing overhead.
const MESSAGE_OVERHEAD: usize = 4;

/// Estimate the tokens of a text at roughly four characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Estimate the tokens of a conversation.
pub fn count_message_tokens(messages: &[Message]) -> usize {
    messages
        .iter()
        .map(|m| estimate_tokens(&m.content) + MESSAGE_OVERHEAD)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn adds_overhead_per_message() {
        let messages = vec![Message::user("abcd"), Message::assistant("")];
        assert_eq!(count_message_tokens(&messages), 1 + 4 + 4);
    }
}
