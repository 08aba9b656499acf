// Authentication module
// Manages the session lifecycle: login, persistence, restoration

mod credentials;
mod manager;
mod types;

pub use credentials::StoredCredentials;
pub use manager::SessionManager;
pub use types::{
    token_preview, Session, STORED_ACCESS_TOKEN_KEY, STORED_REFRESH_TOKEN_KEY,
    STORED_USERNAME_KEY,
};
