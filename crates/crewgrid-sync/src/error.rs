use crewgrid_core::GridError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by the remote store, already sorted into a kind
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} error: {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

/// Kind of remote failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// Row-level authorization denied the write
    Privilege,
    /// Uniqueness, foreign-key or not-null violation
    Constraint,
    /// Transport failure or timeout
    Network,
    Other,
}

impl std::fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteErrorKind::Privilege => write!(f, "privilege"),
            RemoteErrorKind::Constraint => write!(f, "constraint"),
            RemoteErrorKind::Network => write!(f, "network"),
            RemoteErrorKind::Other => write!(f, "remote"),
        }
    }
}

/// User-facing message category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The user's role does not allow the change
    Privilege,
    Generic,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn privilege(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Privilege, message)
    }

    pub fn constraint(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Constraint, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Network, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Other, message)
    }

    /// Privilege vs everything else
    pub fn category(&self) -> ErrorCategory {
        match self.kind {
            RemoteErrorKind::Privilege => ErrorCategory::Privilege,
            _ => ErrorCategory::Generic,
        }
    }
}

/// Engine error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Permission denied: {0}")]
    Privilege(String),

    #[error("Constraint violated: {0}")]
    Constraint(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Remote store error: {0}")]
    Remote(String),

    #[error("Invalid operation: {0}")]
    Validation(#[from] GridError),
}

impl From<RemoteError> for SyncError {
    fn from(err: RemoteError) -> Self {
        match err.kind {
            RemoteErrorKind::Privilege => SyncError::Privilege(err.message),
            RemoteErrorKind::Constraint => SyncError::Constraint(err.message),
            RemoteErrorKind::Network => SyncError::Network(err.message),
            RemoteErrorKind::Other => SyncError::Remote(err.message),
        }
    }
}

impl SyncError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SyncError::Privilege(_) => ErrorCategory::Privilege,
            _ => ErrorCategory::Generic,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, SyncError::Validation(_))
    }

    /// Short message for a toast or banner
    pub fn user_message(&self) -> &'static str {
        match self {
            SyncError::Privilege(_) => "You do not have permission to change this schedule",
            SyncError::Validation(_) => "That change is not allowed here",
            SyncError::Network(_) => "Connection problem, the schedule was reloaded",
            _ => "Could not save the change, the schedule was reloaded",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(RemoteError::privilege("rls").category(), ErrorCategory::Privilege);
        assert_eq!(RemoteError::constraint("fk").category(), ErrorCategory::Generic);
        assert_eq!(RemoteError::network("timeout").category(), ErrorCategory::Generic);
    }

    #[test]
    fn test_conversion_keeps_kind() {
        assert_eq!(
            SyncError::from(RemoteError::privilege("denied")),
            SyncError::Privilege("denied".to_string())
        );
        assert_eq!(
            SyncError::from(RemoteError::network("reset")),
            SyncError::Network("reset".to_string())
        );
        assert_eq!(
            SyncError::from(RemoteError::other("boom")).category(),
            ErrorCategory::Generic
        );
        assert!(SyncError::from(GridError::NoOpMove).is_validation());
    }

    #[test]
    fn test_display() {
        let err = RemoteError::constraint("duplicate key");
        assert_eq!(err.to_string(), "constraint error: duplicate key");
    }
}
