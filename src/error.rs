//! Error taxonomy shared by HTTP handlers and the WebSocket dispatch path.
//!
//! Every fallible operation returns [`AppResult`]; callers are forced to
//! handle absence and conflict explicitly instead of relying on fallthrough.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Authentication/authorization failure. Terminal for the attempted
    /// operation, surfaced to the actor only.
    #[error("access denied: {0}")]
    AccessDenied(&'static str),

    /// Malformed input: empty/oversized message, bad field, unknown event.
    #[error("{0}")]
    Validation(String),

    /// The operation conflicts with current state (muted sender, disabled
    /// feature). Surfaced to the sender, then dropped.
    #[error("{0}")]
    StateConflict(&'static str),

    /// A chat message matched the room's banned-word set.
    #[error("message contains a banned word")]
    BannedContent,

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Unexpected storage or channel failure. Logged; surfaced as a generic
    /// error to the actor.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable code carried on wire `error` frames and HTTP bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::AccessDenied(_) => "access_denied",
            AppError::Validation(_) => "validation",
            AppError::StateConflict(_) => "state_conflict",
            AppError::BannedContent => "banned_content",
            AppError::NotFound(_) => "not_found",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, AppError::Internal(_))
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::AccessDenied(_) => StatusCode::FORBIDDEN,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::StateConflict(_) | AppError::BannedContent => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show the actor. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Internal(_) => "internal error".to_owned(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(err) = &self {
            tracing::error!(error = %err, "internal error in handler");
        }
        let body = json!({
            "error": { "code": self.code(), "message": self.public_message() }
        });
        (self.status(), Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("row"),
            other => AppError::Internal(other.into()),
        }
    }
}

impl From<tower_sessions::session::Error> for AppError {
    fn from(err: tower_sessions::session::Error) -> Self {
        AppError::Internal(err.into())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(err.into())
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::Internal(err.into())
    }
}
