//! Orchestration loop
//!
//! One task per user turn. Suspends only while waiting on the model and on a
//! batch of tool calls.

mod error;
mod orchestrator;
mod prompt;
mod state;

pub use error::{TurnError, TurnResult};
pub use orchestrator::{
    failure_reply, Orchestrator, OrchestratorSettings, TurnReport, AUTH_FAILURE_REPLY,
    MODEL_FAILURE_REPLY, RATE_LIMIT_REPLY, TIMEOUT_REPLY, TURN_LIMIT_REPLY,
};
pub use prompt::build_messages;
pub use state::TurnState;
