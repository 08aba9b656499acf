// Authentication types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store key for the last authenticated username
pub const STORED_USERNAME_KEY: &str = "session.username";

/// Store key for the last access token
pub const STORED_ACCESS_TOKEN_KEY: &str = "session.access_token";

/// Store key for the last refresh token
pub const STORED_REFRESH_TOKEN_KEY: &str = "session.refresh_token";

/// All persisted session keys, in write order
pub const STORED_SESSION_KEYS: [&str; 3] = [
    STORED_USERNAME_KEY,
    STORED_ACCESS_TOKEN_KEY,
    STORED_REFRESH_TOKEN_KEY,
];

/// An authenticated principal and its tokens
///
/// Equality covers the principal and tokens only; `established_at` is ignored.
#[derive(Clone)]
pub struct Session {
    pub username: String,
    pub access_token: String,

    /// Stored only; nothing refreshes with it yet
    pub refresh_token: String,

    /// When this process installed the session (not persisted)
    pub established_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        username: impl Into<String>,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            established_at: Utc::now(),
        }
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.username == other.username
            && self.access_token == other.access_token
            && self.refresh_token == other.refresh_token
    }
}

impl Eq for Session {}

// Tokens are redacted so sessions can be logged with `?`
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.username)
            .field("access_token", &token_preview(&self.access_token))
            .field("refresh_token", &token_preview(&self.refresh_token))
            .field("established_at", &self.established_at)
            .finish()
    }
}

/// Short token prefix for logs
pub fn token_preview(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    if prefix.len() < token.len() {
        format!("{}...", prefix)
    } else {
        "***".to_string()
    }
}

/// Login request body
#[derive(Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Login response body
#[derive(Deserialize)]
pub struct TokenResponse {
    pub access: Option<String>,
    pub refresh: Option<String>,
}
