use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use roster_types::api::ErrorResponse;

pub type ModerationResult<T> = Result<T, ModerationError>;

#[derive(Debug, Error)]
pub enum ModerationError {
    /// Missing, too-short or malformed field
    #[error("{0}")]
    InvalidInput(String),

    #[error("username '{0}' is already taken")]
    Conflict(String),

    #[error("user '{0}' not found")]
    NotFound(String),

    /// Wrong password
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Banned account attempting to log in
    #[error("account is banned: {reason}")]
    Forbidden { reason: String },

    /// Caller lacks admin rights, or the master key did not match
    #[error("admin privileges required")]
    Unauthorized,

    #[error("{0}")]
    InvalidOperation(&'static str),

    /// Store or other infrastructure fault
    #[error("internal error: {0:#}")]
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ModerationError {
    fn from(err: anyhow::Error) -> Self {
        ModerationError::Internal(err)
    }
}

impl ModerationError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ModerationError::InvalidInput(_) | ModerationError::InvalidOperation(_) => {
                StatusCode::BAD_REQUEST
            }
            ModerationError::Conflict(_) => StatusCode::CONFLICT,
            ModerationError::NotFound(_) => StatusCode::NOT_FOUND,
            ModerationError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ModerationError::Forbidden { .. } | ModerationError::Unauthorized => {
                StatusCode::FORBIDDEN
            }
            ModerationError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// HTTP rendering of a failed action.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    /// Internal faults are logged here and reduced to a generic message unless
    /// `dev_mode` is set.
    pub fn from_moderation(err: ModerationError, dev_mode: bool) -> Self {
        let status = err.status_code();
        let body = match &err {
            ModerationError::Internal(inner) => {
                error!("Internal error: {:?}", inner);
                let mut body = ErrorResponse::new("internal server error");
                if dev_mode {
                    body.detail = Some(format!("{:?}", inner));
                }
                body
            }
            ModerationError::Forbidden { reason } => {
                let mut body = ErrorResponse::new(err.to_string());
                body.reason = Some(reason.clone());
                body
            }
            _ => ErrorResponse::new(err.to_string()),
        };
        Self { status, body }
    }

    /// Login reports an unknown username as an authentication failure.
    pub fn from_login_failure(err: ModerationError, dev_mode: bool) -> Self {
        if let ModerationError::NotFound(_) = &err {
            return Self {
                status: StatusCode::UNAUTHORIZED,
                body: ErrorResponse::new(err.to_string()),
            };
        }
        Self::from_moderation(err, dev_mode)
    }

    pub fn unknown_action(action: &str) -> Self {
        let mut body = ErrorResponse::new("unknown action");
        body.action = Some(action.to_string());
        Self {
            status: StatusCode::NOT_FOUND,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
