//! Error types reported by reader/creator/updater/deleter/refresh services.
use thiserror::Error;

/// Failure of one service call.
///
/// Table code never propagates these to its caller: they are converted into a
/// message attached to the affected row (see [`ServiceError::user_message`]),
/// except for cancellation which silently restores prior state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Service call timed out")]
    Timeout,

    #[error("Service call was interrupted")]
    Interrupted,

    #[error("Service call was cancelled")]
    Cancelled,

    #[error("Record {id} was modified by someone else")]
    StaleBean { id: String },

    #[error("Record {id} no longer exists")]
    DeletedBean { id: String },

    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl ServiceError {
    /// `true` for the cooperative-cancellation outcome, which is not an error.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Text attached to a row when this error affects it.
    pub fn user_message(&self) -> String {
        match self {
            Self::Timeout => "The server did not answer in time.".to_string(),
            Self::Interrupted => "The request was interrupted.".to_string(),
            Self::StaleBean { .. } => {
                "The record was changed by someone else. Reload and try again.".to_string()
            }
            Self::DeletedBean { .. } => "The record was deleted in the meantime.".to_string(),
            other => other.to_string(),
        }
    }
}
