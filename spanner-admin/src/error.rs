//! Admin facade error types.

use thiserror::Error;

/// Errors returned by Spanner admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    /// The addressed instance, database or operation does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The API rejected the request.
    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    /// A long-running operation finished with an error.
    #[error("operation {name} failed: {message}")]
    Operation { name: String, message: String },

    /// A long-running operation did not finish before its deadline.
    #[error("operation {0} did not complete before the deadline")]
    Timeout(String),

    /// Caller supplied an unusable argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No usable access token.
    #[error("credentials: {0}")]
    Credentials(String),

    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl AdminError {
    /// True if the error means the addressed resource does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            AdminError::NotFound(_) => true,
            AdminError::Api { status, .. } => *status == 404,
            AdminError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Result type for admin operations.
pub type Result<T> = std::result::Result<T, AdminError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        assert!(AdminError::NotFound("x".into()).is_not_found());
        assert!(
            AdminError::Api {
                status: 404,
                message: "gone".into()
            }
            .is_not_found()
        );
        assert!(
            AdminError::Io(std::io::Error::from(std::io::ErrorKind::NotFound)).is_not_found()
        );

        assert!(
            !AdminError::Api {
                status: 503,
                message: "unavailable".into()
            }
            .is_not_found()
        );
        assert!(!AdminError::Timeout("op".into()).is_not_found());
        assert!(
            !AdminError::Io(std::io::Error::from(std::io::ErrorKind::PermissionDenied))
                .is_not_found()
        );
    }
}
