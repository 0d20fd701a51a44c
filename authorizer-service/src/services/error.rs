use service_core::error::AppError;
use thiserror::Error;

/// Coarse failure categories surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Unauthorized,
    Conflict,
    DependencyFailure,
    Internal,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Dependency failure: {0}")]
    Dependency(String),

    #[error("Operation '{operation}' timed out")]
    Timeout { operation: &'static str },

    #[error("Permission sync failed at batch {batch} of {batches} ({committed} records committed): {source}")]
    SyncBatchFailed {
        batch: usize,
        batches: usize,
        committed: usize,
        #[source]
        source: Box<ServiceError>,
    },

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn not_found(entity: &str, key: impl std::fmt::Display) -> Self {
        ServiceError::NotFound(format!("{} '{}'", entity, key))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::InvalidInput(_) => ErrorKind::InvalidInput,
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::InvalidCredentials | ServiceError::InvalidToken => {
                ErrorKind::Unauthorized
            }
            ServiceError::Conflict(_) => ErrorKind::Conflict,
            ServiceError::Database(_)
            | ServiceError::Redis(_)
            | ServiceError::Dependency(_)
            | ServiceError::Timeout { .. }
            | ServiceError::SyncBatchFailed { .. } => ErrorKind::DependencyFailure,
            ServiceError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidInput(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            ServiceError::NotFound(what) => {
                AppError::NotFound(anyhow::anyhow!("{} not found", what))
            }
            ServiceError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid credentials"))
            }
            ServiceError::InvalidToken => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token"))
            }
            ServiceError::Conflict(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
            ServiceError::Database(e) => {
                tracing::error!(error = %e, "Database operation failed");
                AppError::ServiceUnavailable(anyhow::anyhow!("Authorization store unavailable"))
            }
            ServiceError::Redis(e) => {
                tracing::error!(error = %e, "Session store operation failed");
                AppError::ServiceUnavailable(anyhow::anyhow!("Session store unavailable"))
            }
            ServiceError::Dependency(msg) => {
                tracing::error!(error = %msg, "Dependency failure");
                AppError::ServiceUnavailable(anyhow::anyhow!("Dependency unavailable"))
            }
            ServiceError::Timeout { operation } => {
                AppError::GatewayTimeout(format!("{} exceeded its deadline", operation))
            }
            err @ ServiceError::SyncBatchFailed { .. } => {
                tracing::error!(error = %err, "Partial permission sync");
                AppError::BadGateway(err.to_string())
            }
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use service_core::axum::{http::StatusCode, response::IntoResponse};

    #[test]
    fn test_kinds() {
        assert_eq!(
            ServiceError::InvalidInput("email is required".into()).kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(ServiceError::InvalidToken.kind(), ErrorKind::Unauthorized);
        assert_eq!(
            ServiceError::Timeout { operation: "login" }.kind(),
            ErrorKind::DependencyFailure
        );
        assert_eq!(
            ServiceError::SyncBatchFailed {
                batch: 2,
                batches: 3,
                committed: 100,
                source: Box::new(ServiceError::Dependency("tx aborted".into())),
            }
            .kind(),
            ErrorKind::DependencyFailure
        );
    }

    #[test]
    fn test_http_mapping() {
        let cases = [
            (ServiceError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (ServiceError::not_found("application", "APP1"), StatusCode::NOT_FOUND),
            (ServiceError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (ServiceError::Conflict("dup".into()), StatusCode::CONFLICT),
            (
                ServiceError::Dependency("down".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ServiceError::Timeout { operation: "sync" },
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                ServiceError::SyncBatchFailed {
                    batch: 1,
                    batches: 1,
                    committed: 0,
                    source: Box::new(ServiceError::Dependency("down".into())),
                },
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (err, expected) in cases {
            let app_err: AppError = err.into();
            assert_eq!(app_err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_batch_failure_message_names_batch() {
        let err = ServiceError::SyncBatchFailed {
            batch: 3,
            batches: 4,
            committed: 200,
            source: Box::new(ServiceError::Dependency("deadlock detected".into())),
        };
        let msg = err.to_string();
        assert!(msg.contains("batch 3 of 4"));
        assert!(msg.contains("200 records committed"));
    }
}
