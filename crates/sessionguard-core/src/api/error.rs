use thiserror::Error;

use crate::store::StorageError;

/// Shown when a failure carries no message of its own
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error during login";

#[derive(Error, Debug)]
pub enum AuthError {
    /// Bad email or password; the user can correct it
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Transient connectivity problem; safe to retry, never evicts a session
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The remote authority failed
    #[error("Server error: {0}")]
    ServerError(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl AuthError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            400 | 401 | 403 => AuthError::InvalidCredentials(truncated),
            500..=599 => AuthError::ServerError(truncated),
            _ => AuthError::ServerError(format!("Unexpected status {}: {}", status, truncated)),
        }
    }

    /// Human-readable cause, suitable for an `AuthState::Error`
    pub fn user_message(&self) -> String {
        let message = match self {
            AuthError::InvalidCredentials(m)
            | AuthError::NetworkError(m)
            | AuthError::ServerError(m) => m.trim().to_string(),
            AuthError::Storage(e) => e.to_string(),
        };
        if message.is_empty() {
            UNKNOWN_ERROR_MESSAGE.to_string()
        } else {
            message
        }
    }

    /// Whether the failure says nothing about the token's validity
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::NetworkError(_))
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            AuthError::ServerError(format!("Invalid response: {}", e))
        } else {
            AuthError::NetworkError(e.to_string())
        }
    }
}
