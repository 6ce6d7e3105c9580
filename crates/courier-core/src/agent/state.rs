//! Turn states

use std::fmt;

use serde::Serialize;

/// Where a turn is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    AwaitingUserInput,
    QueryingModel,
    /// Waiting on the n-th batch of tool calls (1-based)
    DispatchingTools(usize),
    Responding,
    Done,
    Failed,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnState::AwaitingUserInput => write!(f, "awaiting_user_input"),
            TurnState::QueryingModel => write!(f, "querying_model"),
            TurnState::DispatchingTools(round) => write!(f, "dispatching_tools#{}", round),
            TurnState::Responding => write!(f, "responding"),
            TurnState::Done => write!(f, "done"),
            TurnState::Failed => write!(f, "failed"),
        }
    }
}
