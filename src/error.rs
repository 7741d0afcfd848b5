use thiserror::Error;

/// Error types for the quiz session engine
#[derive(Debug, Error)]
pub enum QuizError {
    /// Malformed or out-of-range payloads, rejected before any mutation
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Unknown pin, session, participant or quiz
    #[error("{0} not found")]
    NotFound(String),

    /// Operation not legal in the session's current phase
    #[error("{0}")]
    InvalidState(String),

    /// PIN allocation ran out of attempts; the caller may retry the create
    #[error("Could not allocate a game PIN after {attempts} attempts")]
    PinExhaustion { attempts: u32 },

    /// Summary sink failures
    #[error("Failed to persist session summary: {0}")]
    Persistence(String),

    #[error("Failed to serialize message: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results using QuizError
pub type Result<T> = std::result::Result<T, QuizError>;

impl QuizError {
    pub fn validation(msg: impl Into<String>) -> Self {
        QuizError::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        QuizError::NotFound(what.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        QuizError::InvalidState(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        QuizError::Internal(msg.into())
    }

    /// Stable machine-readable code sent alongside error messages
    pub fn code(&self) -> &'static str {
        match self {
            QuizError::Validation(_) => "validation",
            QuizError::NotFound(_) => "not_found",
            QuizError::InvalidState(_) => "invalid_state",
            QuizError::PinExhaustion { .. } => "pin_exhausted",
            QuizError::Persistence(_) => "persistence",
            QuizError::Serialization(_) => "serialization",
            QuizError::Io(_) | QuizError::Internal(_) => "internal",
        }
    }

    /// Whether the caller can retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, QuizError::PinExhaustion { .. })
    }
}
