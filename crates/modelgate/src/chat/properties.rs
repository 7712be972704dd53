//! `[Model: ...]` / `[Provider: ...]` prefixes carried in user messages.

use crate::llm::{Message, Role};

/// Model and provider named by a user message, plus the text without prefixes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageProperties {
    pub model: Option<String>,
    pub provider: Option<String>,
    pub content: String,
}

/// Read the model/provider prefixes of a message.
pub fn extract_properties(content: &str) -> MessageProperties {
    let (model, rest) = take_tag(content, "Model");
    let (provider, rest) = take_tag(rest, "Provider");
    MessageProperties {
        model,
        provider,
        content: rest.to_string(),
    }
}

/// Format the prefixes onto a message body.
pub fn with_properties(model: &str, provider: &str, content: &str) -> String {
    format!("[Model: {model}]\n\n[Provider: {provider}]\n\n{content}")
}

/// Strip prefixes from every user message in place.
pub fn strip_user_properties(messages: &mut [Message]) {
    for message in messages.iter_mut().filter(|m| m.role == Role::User) {
        let props = extract_properties(&message.content);
        if props.model.is_some() || props.provider.is_some() {
            message.content = props.content;
        }
    }
}

/// Split a leading `[Tag: value]` off `text`, with its trailing blank lines.
fn take_tag<'a>(text: &'a str, tag: &str) -> (Option<String>, &'a str) {
    let trimmed = text.trim_start();
    let Some(rest) = trimmed
        .strip_prefix('[')
        .and_then(|r| r.strip_prefix(tag))
        .and_then(|r| r.strip_prefix(':'))
    else {
        return (None, text);
    };
    let Some(end) = rest.find(']') else {
        return (None, text);
    };

    let value = rest[..end].trim();
    let rest = rest[end + 1..].trim_start_matches(['\r', '\n']);
    if value.is_empty() {
        (None, rest)
    } else {
        (Some(value.to_string()), rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_both_prefixes() {
        let props = extract_properties("[Model: grok-beta]\n\n[Provider: xAI]\n\nHello there");
        assert_eq!(props.model.as_deref(), Some("grok-beta"));
        assert_eq!(props.provider.as_deref(), Some("xAI"));
        assert_eq!(props.content, "Hello there");
    }

    #[test]
    fn plain_text_is_untouched() {
        let props = extract_properties("[Note] just text");
        assert!(props.model.is_none());
        assert!(props.provider.is_none());
        assert_eq!(props.content, "[Note] just text");
    }

    #[test]
    fn model_only_prefix() {
        let props = extract_properties("[Model: gpt-4o]\n\nhi");
        assert_eq!(props.model.as_deref(), Some("gpt-4o"));
        assert!(props.provider.is_none());
        assert_eq!(props.content, "hi");
    }

    #[test]
    fn formatting_round_trips() {
        let text = with_properties("grok-beta", "xAI", "continue");
        let props = extract_properties(&text);
        assert_eq!(props.model.as_deref(), Some("grok-beta"));
        assert_eq!(props.content, "continue");
    }

    #[test]
    fn strips_only_user_messages() {
        let mut messages = vec![
            Message::assistant("[Model: x]\n\nkept"),
            Message::user("[Model: x]\n\n[Provider: y]\n\nasked"),
        ];
        strip_user_properties(&mut messages);
        assert_eq!(messages[0].content, "[Model: x]\n\nkept");
        assert_eq!(messages[1].content, "asked");
    }
}
