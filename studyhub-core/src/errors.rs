use crate::{ExamStatus, QuestionId};
use thiserror::Error;

/// Message shown to users for infrastructure failures; details go to the log.
pub const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(&'static str),
    #[error("invalid input: {0}")]
    Invalid(&'static str),
    #[error("quality must be between 0 and 5, got {0}")]
    InvalidQuality(i64),
    #[error("not enough questions: requested {requested} but only {available} available with the given filters")]
    InsufficientQuestions { requested: usize, available: usize },
    #[error("exam has {remaining} unanswered question(s); submit with force to finish early")]
    Incomplete { remaining: usize },

    #[error("question {got} is not the current question")]
    QuestionMismatch { got: QuestionId },
    #[error("exam session has no more questions")]
    SessionComplete,
    #[error("exam session is already {0}")]
    SessionTerminal(ExamStatus),
    #[error("exam session is still in progress")]
    SessionInProgress,
    #[error("conflict: {0}")]
    Conflict(&'static str),
    #[error("stale version: {0}")]
    VersionConflict(&'static str),

    #[error("storage error: {0}")]
    Storage(&'static str),
    #[error("storage unavailable: {0}")]
    Unavailable(&'static str),
    #[error("write outcome unknown: {0}")]
    WriteOutcomeUnknown(&'static str),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    StateConflict,
    NotFound,
    Infrastructure,
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Invalid(_)
            | CoreError::InvalidQuality(_)
            | CoreError::InsufficientQuestions { .. }
            | CoreError::Incomplete { .. } => ErrorKind::Validation,
            CoreError::QuestionMismatch { .. }
            | CoreError::SessionComplete
            | CoreError::SessionTerminal(_)
            | CoreError::SessionInProgress
            | CoreError::Conflict(_)
            | CoreError::VersionConflict(_) => ErrorKind::StateConflict,
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::Storage(_) | CoreError::Unavailable(_) | CoreError::WriteOutcomeUnknown(_) => {
                ErrorKind::Infrastructure
            }
        }
    }

    /// Transient failures may be retried, but only on reads.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Unavailable(_))
    }

    /// Text that is safe to show to an end user.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Infrastructure => GENERIC_FAILURE.to_string(),
            _ => self.to_string(),
        }
    }
}
