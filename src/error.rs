//! Error taxonomy for the device registry.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Payload missing or mistyped a required field. Raised before any write.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A positional device update no longer matches the stored array.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    Store(#[from] rocksdb::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored data that cannot be interpreted (dangling index, bad key).
    #[error("Corrupt store data: {0}")]
    Corrupt(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Error::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Error::Store(_) | Error::Corrupt(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR")
            }
            Error::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SERIALIZATION_ERROR"),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();
        // Store internals stay in the log.
        let message = match &self {
            Error::Validation(msg) | Error::NotFound(msg) | Error::Conflict(msg) => msg.clone(),
            Error::Store(_) | Error::Corrupt(_) => "store operation failed".to_string(),
            Error::Serialization(_) => "stored record could not be encoded".to_string(),
        };

        tracing::error!(
            status = %status,
            error_code = %error_code,
            error = %self,
            "Request error"
        );

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}
