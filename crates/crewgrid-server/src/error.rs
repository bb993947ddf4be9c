use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use crewgrid_core::GridError;
use crewgrid_sync::{RemoteError, RemoteErrorKind};
use serde_json::json;
use thiserror::Error;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Invalid assignment: {0}")]
    Validation(#[from] GridError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Sort a database failure into the kinds the grid engine reacts to
pub fn classify(err: &sqlx::Error) -> RemoteErrorKind {
    match err {
        sqlx::Error::Database(db) => match db.code().as_deref() {
            // insufficient_privilege, raised by row-level security
            Some("42501") => RemoteErrorKind::Privilege,
            Some("23505") | Some("23503") | Some("23502") | Some("23514") => RemoteErrorKind::Constraint,
            _ => RemoteErrorKind::Other,
        },
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            RemoteErrorKind::Network
        }
        _ => RemoteErrorKind::Other,
    }
}

/// Convert a database failure for the remote store interface
pub fn remote_error(err: sqlx::Error) -> RemoteError {
    RemoteError::new(classify(&err), err.to_string())
}

fn remote_status(kind: RemoteErrorKind) -> StatusCode {
    match kind {
        RemoteErrorKind::Privilege => StatusCode::FORBIDDEN,
        RemoteErrorKind::Constraint => StatusCode::CONFLICT,
        RemoteErrorKind::Network | RemoteErrorKind::Other => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Database(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
            AppError::Database(e) => remote_status(classify(e)),
            AppError::Remote(e) => remote_status(e.kind),
            AppError::Validation(_) | AppError::BadRequest(_) | AppError::Serialization(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "Database error".to_string()
            }
            AppError::Remote(e) => {
                tracing::warn!("Remote store error: {}", e);
                match e.kind {
                    RemoteErrorKind::Privilege => "Permission denied".to_string(),
                    RemoteErrorKind::Constraint => "Conflicting change".to_string(),
                    _ => "Database error".to_string(),
                }
            }
            AppError::Validation(e) => e.to_string(),
            AppError::BadRequest(msg) => msg.clone(),
            AppError::Serialization(e) => {
                tracing::error!("Serialization error: {:?}", e);
                "Invalid JSON".to_string()
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_are_network() {
        assert_eq!(classify(&sqlx::Error::PoolTimedOut), RemoteErrorKind::Network);
        assert_eq!(classify(&sqlx::Error::PoolClosed), RemoteErrorKind::Network);
        assert_eq!(classify(&sqlx::Error::RowNotFound), RemoteErrorKind::Other);
        assert_eq!(remote_error(sqlx::Error::PoolTimedOut).kind, RemoteErrorKind::Network);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::from(RemoteError::privilege("rls")).status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::from(RemoteError::constraint("fk")).status(), StatusCode::CONFLICT);
        assert_eq!(AppError::from(GridError::NoOpMove).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Database(sqlx::Error::RowNotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::BadRequest("week".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::Database(sqlx::Error::PoolTimedOut).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
