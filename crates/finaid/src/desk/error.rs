use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Failure outcomes of every core operation.
///
/// Messages are safe to hand to callers: they never echo stored state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeskError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("operation not permitted for this account")]
    Forbidden,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("amount must be a positive number")]
    InvalidAmount,
    #[error("application is no longer pending and cannot be edited")]
    InvalidState,
    #[error("application has already been reviewed")]
    AlreadyReviewed,
    #[error("email address is already registered")]
    DuplicateEmail,
    #[error("invalid credentials")]
    InvalidCredential,
    #[error("authentication required")]
    Unauthenticated,
    #[error("password change required before continuing")]
    CredentialChangeRequired,
    #[error("credential backend failure")]
    Credential(String),
}

impl DeskError {
    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            DeskError::NotFound(_) => StatusCode::NOT_FOUND,
            DeskError::Forbidden | DeskError::CredentialChangeRequired => StatusCode::FORBIDDEN,
            DeskError::InvalidInput(_)
            | DeskError::InvalidAmount
            | DeskError::InvalidState
            | DeskError::AlreadyReviewed => StatusCode::BAD_REQUEST,
            DeskError::DuplicateEmail => StatusCode::CONFLICT,
            DeskError::InvalidCredential | DeskError::Unauthenticated => StatusCode::UNAUTHORIZED,
            DeskError::Credential(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DeskError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        }
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
