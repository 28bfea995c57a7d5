//! Server and API error types.
//!
//! [`ServerError`] covers startup and runtime failures. [`ApiError`] is the
//! HTTP boundary type: it is where the core's precise error taxonomy gets
//! collapsed into a single generic unauthorized response, so responses never
//! reveal whether a fingerprint exists, a challenge was wrong, or a token
//! was reused. The precise cause is logged server-side instead.

use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use alcove_core::{AuthError, StoreError};

/// Errors that can occur while starting or running the server.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, malformed secret, etc.).
    ///
    /// Fatal; fix configuration and restart.
    Config(String),

    /// Transport/network error (bind failure, accept loop I/O error).
    Transport(String),

    /// Storage backend failed to open or initialize.
    Storage(StoreError),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Storage(err) => write!(f, "storage error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        Self::Storage(err)
    }
}

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Boundary error type rendered as a JSON response.
#[derive(Debug, PartialEq, Eq)]
pub enum ApiError {
    /// Any authentication-path failure, deliberately undifferentiated.
    Unauthorized,
    /// Authenticated but not allowed to act on this resource.
    Forbidden,
    /// Referenced resource does not exist.
    NotFound(&'static str),
    /// Resource already exists.
    Conflict(&'static str),
    /// Structurally invalid request.
    InvalidInput(String),
    /// Unexpected server-side failure; details stay in the logs.
    Internal,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    fn message(&self) -> String {
        match self {
            // One message for every auth failure: no oracle
            Self::Unauthorized => "session invalid, please sign in again".to_string(),
            Self::Forbidden => "access denied".to_string(),
            Self::NotFound(what) => format!("{what} not found"),
            Self::Conflict(what) => (*what).to_string(),
            Self::InvalidInput(what) => format!("invalid input: {what}"),
            Self::Internal => "internal server error".to_string(),
        }
    }
}

/// JSON error body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody { code: self.code(), message: self.message() };
        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            // Collapse every distinction an attacker could use to
            // enumerate fingerprints or probe the verifier. The precise
            // cause goes to the log, not the wire.
            AuthError::IdentityNotFound
            | AuthError::ChallengeNotFound
            | AuthError::ChallengeExpired
            | AuthError::InvalidSignature
            | AuthError::TokenExpired
            | AuthError::TokenInvalid
            | AuthError::Suspended => {
                tracing::warn!(cause = %err, "authentication failure");
                Self::Unauthorized
            },

            // Reuse is a security event; the family is already revoked by
            // the time this surfaces
            AuthError::TokenReuseDetected => {
                tracing::warn!(cause = %err, "token reuse incident surfaced to client");
                Self::Unauthorized
            },

            AuthError::DuplicateFingerprint => Self::Conflict("identity already exists"),
            AuthError::InvalidPublicKey => Self::InvalidInput("public key".to_string()),
            AuthError::Forbidden => Self::Forbidden,
            AuthError::NotFound(what) => Self::NotFound(what),
            AuthError::InvalidInput(what) => Self::InvalidInput(what.to_string()),

            AuthError::TokenSigning(_) | AuthError::Store(_) => {
                tracing::error!(cause = %err, "internal error in auth core");
                Self::Internal
            },
        }
    }
}
