//! Error taxonomy for the chat pipeline.

use thiserror::Error;

/// Everything that can go wrong during one chat turn.
///
/// Only `Validation` and `Execution` are retried by the pipeline loop;
/// all other kinds end the turn immediately.
#[derive(Debug, Clone, Error)]
pub enum ChatError {
    #[error("llm backend error: {0}")]
    Backend(String),

    #[error("generated code rejected: {0}")]
    Validation(String),

    #[error("generated code failed: {kind}: {message}")]
    Execution { kind: String, message: String },

    #[error("generated code timed out after {0}s")]
    Timeout(u64),

    #[error("malformed result: {0}")]
    InvalidResult(String),

    #[error("dataset error: {0}")]
    Dataset(String),
}

impl ChatError {
    /// Whether the pipeline may regenerate code and try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChatError::Validation(_) | ChatError::Execution { .. })
    }

    /// Short tag used in logs and rendered failure output.
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::Backend(_) => "backend",
            ChatError::Validation(_) => "validation",
            ChatError::Execution { .. } => "execution",
            ChatError::Timeout(_) => "timeout",
            ChatError::InvalidResult(_) => "invalid-result",
            ChatError::Dataset(_) => "dataset",
        }
    }
}

/// Terminal failure of a chat turn, surfaced to the caller as a value.
#[derive(Debug, Clone)]
pub struct TurnFailure {
    pub error: ChatError,
    /// The last code the backend produced, when any attempt got that far.
    pub last_code: Option<String>,
    /// Regeneration attempts consumed before giving up.
    pub attempts: usize,
}

impl TurnFailure {
    pub fn message(&self) -> String {
        self.error.to_string()
    }
}

impl std::fmt::Display for TurnFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (after {} retries)", self.error, self.attempts)
    }
}

impl std::error::Error for TurnFailure {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(ChatError::Validation("import os".into()).is_retryable());
        assert!(ChatError::Execution { kind: "ZeroDivisionError".into(), message: "x".into() }
            .is_retryable());
        assert!(!ChatError::Backend("503".into()).is_retryable());
        assert!(!ChatError::Timeout(30).is_retryable());
        assert!(!ChatError::InvalidResult("no type".into()).is_retryable());
    }
}
