use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Admission conflict. Expected and recoverable: the new connection is turned away,
/// the existing session is left as it was.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AdmitError {
    #[error("user {0} is already online")]
    AlreadyOnline(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no credential presented")]
    MissingCredential,
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let msg = match self {
            AuthError::MissingCredential => "Missing auth token",
            AuthError::InvalidToken(_) => "Invalid token",
        };
        (StatusCode::UNAUTHORIZED, msg).into_response()
    }
}

/// Inbound frame that could not be handled. Logged and dropped, never fatal.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("connection is not active")]
    NotActive,
}
