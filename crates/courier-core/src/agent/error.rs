//! Turn errors

use thiserror::Error;

use crate::llm::ModelError;
use crate::sessions::SessionError;

/// Why a turn did not complete normally
#[derive(Error, Debug)]
pub enum TurnError {
    /// The model call failed for good
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// The model kept asking for tools past the round limit
    #[error("turn exceeded {limit} tool rounds")]
    TurnLimitExceeded { limit: usize },

    /// The caller went away; nothing was recorded
    #[error("turn cancelled")]
    Cancelled,

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl TurnError {
    /// Whether this failure is recorded as a failed turn with an apology
    pub fn is_recorded(&self) -> bool {
        matches!(self, TurnError::Model(_) | TurnError::TurnLimitExceeded { .. })
    }
}

pub type TurnResult<T> = Result<T, TurnError>;
