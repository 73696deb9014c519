use thiserror::Error;

use crate::session::SessionStatus;

pub type Result<T> = std::result::Result<T, ProctorError>;

/// Everything the engine can refuse or fail at.
///
/// Violations and timer expiry are not errors. The session reacts to them
/// and reports them through its observers.
#[derive(Debug, Error)]
pub enum ProctorError {
    /// Camera or microphone access was refused. The caller may retry.
    #[error("camera/microphone permission denied: {0}")]
    PermissionDenied(String),

    /// The recorder or its device failed. Retryable, never counted as a violation.
    #[error("recording failed: {0}")]
    RecordingFailure(String),

    #[error("session was disqualified")]
    Disqualified,

    #[error("session is not active (status: {status})")]
    NotActive { status: SessionStatus },

    #[error("invalid session configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid action: {0}")]
    InvalidAction(String),

    /// The persistence collaborator rejected the result; the result is kept
    /// so the submission can be retried.
    #[error("result submission failed: {0}")]
    Submission(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl ProctorError {
    /// Whether the same operation may succeed if the user tries again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProctorError::PermissionDenied(_)
                | ProctorError::RecordingFailure(_)
                | ProctorError::Submission(_)
        )
    }
}
