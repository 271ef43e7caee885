//! Error types for the HTTP service

use archive_relay_core::{RelayError, SignatureError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use tracing::{error, warn};

/// Webhook handler errors with HTTP status code mapping
///
/// - `400 Bad Request`: missing body or a payload that is not valid JSON
/// - `403 Forbidden`: missing or mismatched signature
/// - `500 Internal Server Error`: configuration, credential, archive or
///   upload failures
///
/// Messages for server-side failures are replaced with a generic text; the
/// detail is logged.
#[derive(Debug, thiserror::Error)]
pub enum WebhookHandlerError {
    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl WebhookHandlerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Relay(RelayError::MissingBody) => StatusCode::BAD_REQUEST,
            // The body is authenticated but not an event payload; retrying
            // the same delivery cannot succeed.
            Self::Relay(RelayError::Payload(_)) => StatusCode::BAD_REQUEST,
            Self::Relay(RelayError::Signature(_)) => StatusCode::FORBIDDEN,
            Self::Relay(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Relay(RelayError::MissingBody) => "Body missing".to_string(),
            Self::Relay(RelayError::Signature(SignatureError::Missing)) => {
                "Signature missing".to_string()
            }
            Self::Relay(RelayError::Signature(_)) => "Signature mismatch".to_string(),
            Self::Relay(RelayError::Payload(e)) => e.to_string(),
            Self::Relay(_) => "Internal server error occurred.".to_string(),
        }
    }
}

impl IntoResponse for WebhookHandlerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Webhook processing failed");
        } else {
            warn!(error = %self, status = status.as_u16(), "Rejected webhook request");
        }

        let body = serde_json::json!({
            "error": self.client_message(),
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        (status, Json(body)).into_response()
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

impl ServiceError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BindFailed { .. } => 1,
            Self::ServerFailed { .. } => 2,
            Self::Configuration(_) => 3,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;
