use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// The main error type for the Saucier service.
///
/// Every variant carries a stable machine-readable category (see
/// [`SaucierError::category`]) so callers can branch on the kind of failure
/// without parsing message text.
#[derive(Debug, thiserror::Error)]
pub enum SaucierError {
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A required piece of configuration (provider API key, webhook secret,
    /// JWT secret) is missing. Distinct from transient failures so operators
    /// can alert on it.
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// Transient upstream failure that exhausted its retry budget. The
    /// caller/platform may retry the whole request.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SaucierError>;

impl SaucierError {
    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self::Unauthenticated(msg.into())
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn failed_precondition(msg: impl Into<String>) -> Self {
        Self::FailedPrecondition(msg.into())
    }

    pub fn unsupported_media_type(msg: impl Into<String>) -> Self {
        Self::UnsupportedMediaType(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn resource_exhausted(msg: impl Into<String>) -> Self {
        Self::ResourceExhausted(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable category string for this error.
    ///
    /// Clients branch on this rather than on the human-readable message.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "unauthenticated",
            Self::PermissionDenied(_) => "permission-denied",
            Self::InvalidArgument(_) => "invalid-argument",
            Self::NotFound(_) => "not-found",
            Self::FailedPrecondition(_) => "failed-precondition",
            Self::UnsupportedMediaType(_) => "unsupported-media-type",
            Self::Unavailable(_) => "unavailable",
            Self::ResourceExhausted(_) => "resource-exhausted",
            Self::Internal(_) | Self::Anyhow(_) => "internal",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::ResourceExhausted(_) => StatusCode::TOO_MANY_REQUESTS,
            // Configuration failures surface as 500 so webhook providers
            // keep retrying until the deployment is fixed.
            Self::FailedPrecondition(_) | Self::Internal(_) | Self::Anyhow(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Standard JSON error response body.
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub category: &'static str,
}

impl IntoResponse for SaucierError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(
                target: "saucier::error",
                category = self.category(),
                error = %self,
                "Request failed"
            );
        }

        // 5xx responses get a generic message so internal details never
        // leak to callers; the full error is in the logs above.
        let message = if status.is_server_error() {
            "internal error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            error: message,
            category: self.category(),
        };

        (status, Json(body)).into_response()
    }
}
