use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// The main error type for the trekmate service.
///
/// Variants map one-to-one onto the HTTP statuses the API returns; the
/// billing and travel modules define richer domain errors that convert
/// into these via `From`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// A free-tier or capacity ceiling was hit. The message names the limit.
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The external billing authority rejected or failed a call.
    #[error("Billing authority error: {0}")]
    ExternalAuthority(String),

    /// The external billing authority could not be reached in time.
    /// The caller may retry; no local state was committed.
    #[error("Billing authority unavailable: {0}")]
    AuthorityUnavailable(String),

    /// An inert payment backend that is kept as a stub.
    #[error("Not implemented: {0}")]
    Unimplemented(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(String),
}

impl AppError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn quota_exceeded(msg: impl Into<String>) -> Self {
        Self::QuotaExceeded(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::QuotaExceeded(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::ExternalAuthority(_) => StatusCode::BAD_GATEWAY,
            Self::AuthorityUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Unimplemented(_) => StatusCode::NOT_IMPLEMENTED,
            Self::Internal(_) | Self::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
            #[cfg(feature = "database")]
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to clients.
    ///
    /// Client errors (4xx) carry their message; server-side failures are
    /// collapsed to a generic line so connection strings and upstream
    /// details never leak into responses. Full details go to the log.
    fn safe_message(&self) -> String {
        match self {
            Self::Unauthorized(_)
            | Self::Forbidden(_)
            | Self::NotFound(_)
            | Self::Conflict(_)
            | Self::QuotaExceeded(_)
            | Self::BadRequest(_)
            | Self::Unimplemented(_) => self.to_string(),
            Self::ExternalAuthority(_) => "Billing authority error".to_string(),
            Self::AuthorityUnavailable(_) => {
                "Billing authority unavailable, please retry".to_string()
            }
            Self::Internal(_) | Self::Anyhow(_) => "Internal server error".to_string(),
            #[cfg(feature = "database")]
            Self::Database(_) => "Internal server error".to_string(),
        }
    }

    /// Whether retrying the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AuthorityUnavailable(_))
    }
}

/// Standard error response body.
#[derive(Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            success: false,
            message: self.safe_message(),
            retryable: self.is_retryable(),
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }

        (status, Json(body)).into_response()
    }
}

/// Result type alias for trekmate handlers and services.
pub type Result<T> = std::result::Result<T, AppError>;

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            AppError::BadRequest(format!("JSON error: {}", err))
        } else {
            AppError::Internal(format!("JSON serialization error: {}", err))
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            AppError::AuthorityUnavailable(err.to_string())
        } else {
            AppError::ExternalAuthority(err.to_string())
        }
    }
}

#[cfg(feature = "database")]
impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        match &err {
            sea_orm::DbErr::RecordNotFound(msg) => AppError::NotFound(if msg.is_empty() {
                "Record not found".to_string()
            } else {
                msg.clone()
            }),
            _ => AppError::Database(err.to_string()),
        }
    }
}
