//! Caller-facing errors for the session orchestrator.

use concierge_core::error::ConciergeError;

/// Errors surfaced by [`SessionOrchestrator`](crate::SessionOrchestrator).
///
/// Degraded auxiliary signals (retrieval, sentiment, audit writes) never
/// show up here; they are logged and replaced with safe defaults.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("session expired: {0}")]
    SessionExpired(uuid::Uuid),
    #[error("generation failed: {0}")]
    GenerationFailed(String),
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("storage error: {0}")]
    Storage(String),
}

impl ChatError {
    /// Whether repeating the same call may succeed.
    ///
    /// An expired session has to be re-initialized, and invalid input or a
    /// missing customer will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChatError::GenerationFailed(_) | ChatError::Storage(_))
    }
}

impl From<ConciergeError> for ChatError {
    fn from(err: ConciergeError) -> Self {
        match err {
            ConciergeError::NotFound(what) => ChatError::NotFound(what),
            ConciergeError::Generation(msg) => ChatError::GenerationFailed(msg),
            other => ChatError::Storage(other.to_string()),
        }
    }
}
