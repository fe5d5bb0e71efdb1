use thiserror::Error;

use crate::agent::TransportError;
use crate::codec::CodecError;

/// Errors surfaced by the sync client and carried by settled sync outcomes.
///
/// Cloneable so one settled outcome can be observed through any number of
/// handles.
#[derive(Error, Debug, Clone)]
pub enum SyncError {
    #[error("initialise first with init()")]
    NotInitialized,

    #[error("init() called multiple times")]
    AlreadyInitialized,

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("sync operation already exists with name '{0}'")]
    DuplicateName(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already cancelled or complete")]
    AlreadySettled,

    #[error("environment not supported")]
    EnvironmentUnsupported,

    #[error("cancellation is not available for direct requests")]
    CancelUnavailable,

    #[error("sync was cancelled")]
    Cancelled,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Initialisation failed: {0}")]
    InitFailed(String),
}

impl SyncError {
    /// Errors caused by calling the API incorrectly rather than by the agent
    /// or the network.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::NotInitialized
                | Self::AlreadyInitialized
                | Self::InvalidArguments(_)
                | Self::DuplicateName(_)
                | Self::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            SyncError::NotInitialized.to_string(),
            "initialise first with init()"
        );
        assert_eq!(
            SyncError::DuplicateName("upload-1".into()).to_string(),
            "sync operation already exists with name 'upload-1'"
        );
        assert_eq!(
            SyncError::AlreadySettled.to_string(),
            "already cancelled or complete"
        );
        assert_eq!(
            SyncError::Transport(TransportError::Closed).to_string(),
            "Transport error: channel closed"
        );
    }

    #[test]
    fn test_usage_error_classification() {
        assert!(SyncError::NotInitialized.is_usage_error());
        assert!(SyncError::AlreadyInitialized.is_usage_error());
        assert!(SyncError::DuplicateName("a".into()).is_usage_error());
        assert!(SyncError::InvalidArguments("bad".into()).is_usage_error());
        assert!(!SyncError::NotFound("a".into()).is_usage_error());
        assert!(!SyncError::AlreadySettled.is_usage_error());
        assert!(!SyncError::EnvironmentUnsupported.is_usage_error());
    }
}
