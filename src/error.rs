use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::io;

/// Custom error type for gitea_hook_runner operations
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cannot listen on {address}: {source}")]
    BindFailed { address: String, source: io::Error },

    #[error("{0}")]
    AuthFailed(String),

    #[error("unhandled event {0}")]
    UnsupportedEvent(String),

    #[error("reading body: {0}")]
    BodyRead(String),

    #[error("decoding push payload: {0}")]
    DecodeError(String),

    #[error("{command}: {reason}")]
    ExecutionFailed { command: String, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("JSON parsing error: {0}")]
    JsonParseError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParseError(#[from] toml::de::Error),
}

impl HookError {
    /// HTTP status a request-scoped failure is answered with.
    pub fn status(&self) -> StatusCode {
        match self {
            HookError::AuthFailed(_) => StatusCode::UNAUTHORIZED,
            HookError::UnsupportedEvent(_)
            | HookError::BodyRead(_)
            | HookError::DecodeError(_)
            | HookError::JsonParseError(_) => StatusCode::BAD_REQUEST,
            HookError::ConfigError(_)
            | HookError::BindFailed { .. }
            | HookError::ExecutionFailed { .. }
            | HookError::IoError(_)
            | HookError::TomlParseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Renders an error body as `<Status Text>\n<code>:<reason>\n`.
pub fn error_body(status: StatusCode, reason: impl std::fmt::Display) -> String {
    format!(
        "{}\n{}:{}\n",
        status.canonical_reason().unwrap_or("Error"),
        status.as_u16(),
        reason
    )
}

impl IntoResponse for HookError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, error_body(status, &self)).into_response()
    }
}

/// Helper type for Results that use HookError
pub type Result<T> = std::result::Result<T, HookError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_carries_status_text_and_reason() {
        let body = error_body(StatusCode::BAD_REQUEST, "unhandled event issues");
        assert_eq!(body, "Bad Request\n400:unhandled event issues\n");
    }

    #[test]
    fn request_errors_map_to_client_statuses() {
        assert_eq!(
            HookError::AuthFailed("bad".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            HookError::UnsupportedEvent("issues".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            HookError::DecodeError("eof".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            HookError::ExecutionFailed {
                command: "false".into(),
                reason: "exit status 1".into()
            }
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
