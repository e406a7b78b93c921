//! Error responses for the relay API
//!
//! Every failing route answers with `{error, message, details?}`: `error` is
//! a short route-specific title ("Authentication failed"), `message` the
//! underlying reason, and `details` the provider's raw error body if any.

use crate::RelayError;
use crate::model::ErrorResponse;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Error type for HTTP handlers
#[derive(Debug)]
pub struct AppError {
    title: String,
    error: RelayError,
    status: Option<StatusCode>,
}

impl AppError {
    pub fn new(title: impl Into<String>, error: RelayError) -> Self {
        Self {
            title: title.into(),
            error,
            status: None,
        }
    }

    /// Adapter for `map_err`: attach a route title to any error
    pub fn titled(title: &'static str) -> impl FnOnce(RelayError) -> AppError {
        move |error| AppError::new(title, error)
    }

    /// Answer with `status` whatever the error kind
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or_else(|| status_for(&self.error))
    }
}

/// Default status for each error kind
fn status_for(error: &RelayError) -> StatusCode {
    match error {
        RelayError::Validation(_) => StatusCode::BAD_REQUEST,
        RelayError::Unauthorized(_)
        | RelayError::RefreshRejected(_)
        | RelayError::RefreshTimeout(_) => StatusCode::UNAUTHORIZED,
        RelayError::Forbidden(_) => StatusCode::FORBIDDEN,
        RelayError::Network(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (message, details) = match self.error {
            RelayError::Validation(msg)
            | RelayError::Unauthorized(msg)
            | RelayError::Forbidden(msg)
            | RelayError::RefreshRejected(msg) => (msg, None),
            RelayError::Provider {
                message, details, ..
            } => (message, details),
            RelayError::Network(e) => {
                tracing::error!("Network error: {:?}", e);
                ("A network error occurred".to_string(), None)
            }
            other @ (RelayError::Io(_) | RelayError::Json(_) | RelayError::Storage(_)) => {
                // Full details stay in the log
                tracing::error!("Internal error: {:?}", other);
                ("An internal error occurred".to_string(), None)
            }
            other => (other.to_string(), None),
        };

        if status.is_server_error() {
            tracing::error!(status = %status, "{}: {}", self.title, message);
        } else {
            tracing::debug!(status = %status, "{}: {}", self.title, message);
        }

        let body = ErrorResponse {
            error: self.title,
            message,
            details,
        };
        (status, Json(body)).into_response()
    }
}
