// Error handling module
// Defines the error kinds surfaced by login, persistence and authorized requests

use thiserror::Error;

/// Maximum length for error response bodies carried in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Login failures. Only `SessionManager::login` produces these.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The authentication endpoint rejected the credentials (HTTP 401)
    #[error("Unauthorized: invalid username or password")]
    Unauthorized,

    /// Any other failure: network, non-401 status, malformed response, storage
    #[error("API error: {0}")]
    Api(String),
}

impl AuthError {
    /// True for the credential-rejected kind
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, AuthError::Unauthorized)
    }
}

/// Raw transport failures, before classification
#[derive(Error, Debug)]
pub enum TransportError {
    /// Request never produced a response (connect, timeout, TLS, ...)
    #[error("Request failed ({kind}): {message}")]
    Request { kind: &'static str, message: String },

    /// Response arrived but the body could not be read
    #[error("Failed to read response body: {0}")]
    Body(String),
}

/// Persistent key-value store failures
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem error while preparing the store location
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Blocking store task panicked or was cancelled
    #[error("Store task failed: {0}")]
    Task(String),
}

/// Errors from requests issued through an `AuthorizedClient`
#[derive(Error, Debug)]
pub enum ClientError {
    /// Non-success status after retries were exhausted
    #[error("API returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Network error from reqwest
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Request could not be built or cloned
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ClientError {
    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            ClientError::Network(e) => e.status().map(|s| s.as_u16()),
            ClientError::InvalidRequest(_) => None,
        }
    }
}

/// Truncate a response body to avoid carrying excessive data in errors
pub(crate) fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!(
        "{}... (truncated, {} total bytes)",
        &body[..end],
        body.len()
    )
}

/// Result type alias for login operations
pub type Result<T> = std::result::Result<T, AuthError>;
