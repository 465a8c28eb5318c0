use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::core::bridge::BridgeError;
use crate::core::call::TrackerError;

/// Errors surfaced by HTTP and WebSocket handlers.
///
/// Rendered as `{"error": <kind>, "message": <text>}` with a matching status code.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Call not found: {0}")]
    CallNotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Call has already ended: {0}")]
    Gone(String),

    #[error("Server at capacity ({0} calls)")]
    AtCapacity(usize),

    #[error("{0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::CallNotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Gone(_) => StatusCode::GONE,
            Self::AtCapacity(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable kind used in the `error` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CallNotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Conflict(_) => "conflict",
            Self::Gone(_) => "gone",
            Self::AtCapacity(_) => "at_capacity",
            Self::Internal(_) => "internal",
        }
    }

    /// Map a bridge failure on `call_sid` to the HTTP error it represents.
    pub fn from_bridge(call_sid: &str, error: BridgeError) -> Self {
        match error {
            BridgeError::NotStarted | BridgeError::NotFound(_) => {
                Self::CallNotFound(call_sid.to_string())
            }
            BridgeError::Closed => Self::Gone(call_sid.to_string()),
            BridgeError::NotOnHold => Self::Conflict(error.to_string()),
            BridgeError::Tracker(TrackerError::NotFound(_)) => {
                Self::CallNotFound(call_sid.to_string())
            }
            BridgeError::Tracker(e) => Self::Conflict(e.to_string()),
            BridgeError::InvalidDigits(_) => Self::BadRequest(error.to_string()),
            BridgeError::AtCapacity(max) => Self::AtCapacity(max),
            BridgeError::Backend(e) => Self::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(error = %self, "Request failed");
        }
        (
            status,
            Json(json!({"error": self.kind(), "message": self.to_string()})),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::call::CallStatus;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::CallNotFound("CA1".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::AtCapacity(4).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_bridge_error_mapping() {
        assert!(matches!(
            AppError::from_bridge("CA1", BridgeError::NotStarted),
            AppError::CallNotFound(_)
        ));
        assert!(matches!(
            AppError::from_bridge("CA1", BridgeError::Closed),
            AppError::Gone(_)
        ));
        assert!(matches!(
            AppError::from_bridge("CA1", BridgeError::NotOnHold),
            AppError::Conflict(_)
        ));
        let rejected = TrackerError::InvalidTransition {
            from: CallStatus::Completed,
            to: CallStatus::OnHold,
        };
        assert!(matches!(
            AppError::from_bridge("CA1", BridgeError::Tracker(rejected)),
            AppError::Conflict(_)
        ));
    }

    #[test]
    fn test_response_body_shape() {
        let response = AppError::Gone("CA9".into()).into_response();
        assert_eq!(response.status(), StatusCode::GONE);
    }
}
