//! Core types shared by the registry, dispatcher, session store and turn loop

mod message;
mod tool;
mod turn;
mod cancellation;

pub use message::{ChatMessage, ContentPart, InboundMessage, MessageContent, MessageRole};
pub use tool::{
    wire_name, ToolCallRequest, ToolCallResult, ToolErrorKind, ToolFailure, ToolOutcome, ToolSpec,
};
pub use turn::{ToolSegment, Turn, TurnStatus};
pub use cancellation::{CancelOnDrop, CancellationToken};
