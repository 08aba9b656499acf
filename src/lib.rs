// API Session - library root

pub mod auth;
pub mod config;
pub mod error;
pub mod http_client;
pub mod store;
pub mod transport;

pub use auth::{Session, SessionManager};
pub use error::{AuthError, ClientError, StoreError};
pub use http_client::AuthorizedClient;
