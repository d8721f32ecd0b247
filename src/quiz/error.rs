use thiserror::Error;

use crate::quiz::RunId;

/// Everything that can go wrong while driving a run.
///
/// None of these are fatal to the process, and none of them leave a run
/// half-updated: a transition either applies completely or not at all.
#[derive(Debug, Error)]
pub enum QuizError {
    /// Malformed answer payload (empty code, coordinates out of range, wrong shape for the question)
    #[error("invalid answer: {0}")]
    Validation(String),

    #[error("run {0} not found")]
    NotFound(RunId),

    #[error("run {run_id} cannot accept this answer: {reason}")]
    InvalidState { run_id: RunId, reason: InvalidState },

    /// A country code the run carries has no dataset entry
    #[error("country {iso3} is missing from the dataset")]
    DatasetGap { iso3: String },

    /// Not enough unused countries left to build a question
    #[error("not enough countries left for a {mode} question")]
    PoolExhausted { mode: String },

    #[error("run storage failed: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidState {
    RunEnded,
    OutOfSequence,
}

impl std::fmt::Display for InvalidState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidState::RunEnded => write!(f, "the run has already ended"),
            InvalidState::OutOfSequence => write!(f, "the question is on a different step"),
        }
    }
}

impl QuizError {
    pub fn validation(message: impl Into<String>) -> Self {
        QuizError::Validation(message.into())
    }

    pub fn is_terminal_state(&self) -> bool {
        matches!(
            self,
            QuizError::InvalidState {
                reason: InvalidState::RunEnded,
                ..
            }
        )
    }
}

pub type QuizResult<T> = std::result::Result<T, QuizError>;
