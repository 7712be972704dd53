//! Per-turn token accounting and continuation bookkeeping.

use modelgate_protocol::UsageValue;

use crate::chat::error::ChatError;
use crate::llm::Usage;

/// Instruction sent to the backend when a segment was cut off by its output limit.
pub const CONTINUE_PROMPT: &str = "Continue your prior response. IMPORTANT: Immediately begin from where you left off without any interruptions.\nDo not repeat any content, including artifact and action tags.";

/// Running token totals across every call of a turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CumulativeUsage {
    pub completion_tokens: u32,
    pub prompt_tokens: u32,
    pub total_tokens: u32,
}

impl CumulativeUsage {
    pub fn add(&mut self, usage: &Usage) {
        self.completion_tokens = self.completion_tokens.saturating_add(usage.completion_tokens);
        self.prompt_tokens = self.prompt_tokens.saturating_add(usage.prompt_tokens);
        self.total_tokens = self.total_tokens.saturating_add(usage.total_tokens);
    }

    pub fn value(&self) -> UsageValue {
        UsageValue {
            completion_tokens: self.completion_tokens,
            prompt_tokens: self.prompt_tokens,
            total_tokens: self.total_tokens,
        }
    }
}

impl From<Usage> for UsageValue {
    fn from(usage: Usage) -> Self {
        UsageValue {
            completion_tokens: usage.completion_tokens,
            prompt_tokens: usage.prompt_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

/// Segment handoffs used so far in a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContinuationState {
    switches_used: u32,
    max_switches: u32,
}

impl ContinuationState {
    pub fn new(max_switches: u32) -> Self {
        Self {
            switches_used: 0,
            max_switches,
        }
    }

    pub fn switches_used(&self) -> u32 {
        self.switches_used
    }

    pub fn switches_left(&self) -> u32 {
        self.max_switches - self.switches_used
    }

    /// Claim one more segment, failing once the ceiling is reached.
    pub fn advance(&mut self, provider: &str) -> Result<(), ChatError> {
        if self.switches_used >= self.max_switches {
            return Err(ChatError::SegmentLimitExceeded {
                provider: provider.to_string(),
                max: self.max_switches,
            });
        }
        self.switches_used += 1;
        Ok(())
    }
}
