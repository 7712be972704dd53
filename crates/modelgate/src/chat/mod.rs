//! Chat turn orchestration.

mod collaborators;
mod error;
mod event;
mod orchestrator;
mod properties;
mod tokens;
mod usage;

pub use collaborators::{
    ContextReducer, FileEntry, FileMap, NoTools, ReducedContext, ToolService, context_message,
    file_paths,
};
pub use error::{ChatError, ReductionError, ToolCallError};
pub use event::{ChatEvent, EventSink, SinkClosed};
pub use orchestrator::{ChatOrchestrator, ChatTurnRequest, PreparedTurn, TurnOutcome};
pub use properties::{MessageProperties, extract_properties, strip_user_properties, with_properties};
pub use tokens::{count_message_tokens, estimate_tokens};
pub use usage::{CONTINUE_PROMPT, ContinuationState, CumulativeUsage};
