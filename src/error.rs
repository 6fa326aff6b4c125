//! Error types for the call orchestrator

use thiserror::Error;

/// Result type alias for call operations
pub type CallResult<T> = Result<T, CallError>;

/// Errors that can occur while running a voice call.
///
/// Only `PermissionDenied` and `AlreadyStarted` ever reach the caller of
/// `start_call`; everything else is absorbed by the orchestrator and turned
/// into a forward transition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Speech recognition failed: {0}")]
    Recognition(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication rejected: {0}")]
    Auth(String),

    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("Audio playback error: {0}")]
    Playback(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Call already started")]
    AlreadyStarted,
}

impl CallError {
    /// Short, content-free label used in logs and telemetry.
    pub fn kind(&self) -> &'static str {
        match self {
            CallError::PermissionDenied(_) => "permission_denied",
            CallError::Recognition(_) => "recognition",
            CallError::Network(_) => "network",
            CallError::Auth(_) => "auth",
            CallError::Synthesis(_) => "synthesis",
            CallError::Playback(_) => "playback",
            CallError::Config(_) => "config",
            CallError::AlreadyStarted => "already_started",
        }
    }
}

impl From<reqwest::Error> for CallError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) if status.as_u16() == 401 || status.as_u16() == 403 => {
                CallError::Auth(err.to_string())
            }
            _ => CallError::Network(err.to_string()),
        }
    }
}
