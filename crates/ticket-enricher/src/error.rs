//! Error types for the enrichment service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for enrichment operations
pub type Result<T> = std::result::Result<T, Error>;

/// Enrichment service errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input table could not be read
    #[error("Failed to read table '{filename}': {message}")]
    FileParse { filename: String, message: String },

    /// Unsupported file type
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// Required columns are absent from the input table
    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    /// Input table has a header but no data rows
    #[error("The input table has no rows")]
    EmptyTable,

    /// Output artifact could not be written
    #[error("Failed to write output file: {0}")]
    Write(String),

    /// LLM service answered with an error or an unusable body
    #[error("LLM error: {0}")]
    Llm(String),

    /// Inference service could not be reached
    #[error("Service unreachable: {0}")]
    Transport(String),

    /// Requested model is not served by the inference service
    #[error("Model '{0}' is not available")]
    ModelUnavailable(String),

    /// Unknown task id
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Malformed client request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a file parse error
    pub fn file_parse(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FileParse {
            filename: filename.into(),
            message: message.into(),
        }
    }

    /// Create an LLM error
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm(message.into())
    }

    /// Create a write error
    pub fn write(message: impl Into<String>) -> Self {
        Self::Write(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Failure to reach the service at all (connect, timeout, broken body stream)
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Http(_) | Error::Transport(_))
    }

    /// Errors whose message is safe and meaningful to show in a task status.
    ///
    /// Anything else is reported externally as a generic failure.
    pub fn is_operational(&self) -> bool {
        matches!(
            self,
            Error::FileParse { .. }
                | Error::UnsupportedFileType(_)
                | Error::MissingColumns(_)
                | Error::EmptyTable
                | Error::Write(_)
        )
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            Error::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error", msg.clone()),
            Error::FileParse { .. } => (StatusCode::BAD_REQUEST, "parse_error", self.to_string()),
            Error::UnsupportedFileType(_) => {
                (StatusCode::BAD_REQUEST, "unsupported_type", self.to_string())
            }
            Error::MissingColumns(_) => {
                (StatusCode::BAD_REQUEST, "missing_columns", self.to_string())
            }
            Error::EmptyTable => (StatusCode::BAD_REQUEST, "empty_table", self.to_string()),
            Error::Write(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "write_error", msg.clone()),
            Error::Llm(msg) => (StatusCode::SERVICE_UNAVAILABLE, "llm_error", msg.clone()),
            Error::Transport(msg) => (StatusCode::BAD_GATEWAY, "transport_error", msg.clone()),
            Error::ModelUnavailable(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "model_unavailable",
                self.to_string(),
            ),
            Error::TaskNotFound(_) => (StatusCode::NOT_FOUND, "not_found", self.to_string()),
            Error::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            Error::Io(err) => {
                tracing::error!("IO error while serving request: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "io_error",
                    "File system error".to_string(),
                )
            }
            Error::Json(err) => (StatusCode::BAD_REQUEST, "json_error", err.to_string()),
            Error::Http(err) => (StatusCode::BAD_GATEWAY, "http_error", err.to_string()),
            Error::Internal(msg) => {
                tracing::error!("Internal error while serving request: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
