use anyhow::{Context, Result};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

use super::credentials;
use super::types::{token_preview, LoginRequest, Session, TokenResponse};
use crate::config::Config;
use crate::error::{truncate_body, AuthError, StoreError};
use crate::http_client::AuthorizedClient;
use crate::store::KeyValueStore;
use crate::transport::AuthTransport;

/// Session manager
/// Owns the current session, performs login and hands out authorized clients
pub struct SessionManager {
    /// Current session; swapped whole so readers never see a torn value
    current: RwLock<Option<Arc<Session>>>,

    /// Serializes persist + install (login, restore, clear, logout)
    install_lock: Mutex<()>,

    /// Transport for the login exchange
    transport: Arc<dyn AuthTransport>,

    /// Persistent storage for the last session
    store: Arc<dyn KeyValueStore>,

    /// Shared pool for authorized clients
    client: Client,

    /// Full URL of the token endpoint
    auth_url: String,

    /// API root for authorized clients
    api_base_url: String,

    /// Retry policy handed to authorized clients
    max_retries: u32,
    retry_base_delay_ms: u64,
}

impl SessionManager {
    /// Create a new SessionManager with no current session
    pub fn new(
        config: &Config,
        transport: Arc<dyn AuthTransport>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.http_connect_timeout))
            .timeout(Duration::from_secs(config.http_request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            current: RwLock::new(None),
            install_lock: Mutex::new(()),
            transport,
            store,
            client,
            auth_url: config.auth_url(),
            api_base_url: config.api_base_url.clone(),
            max_retries: config.http_max_retries,
            retry_base_delay_ms: config.http_retry_base_delay_ms,
        })
    }

    /// The current session, if any
    pub async fn current_session(&self) -> Option<Session> {
        self.current.read().await.as_deref().cloned()
    }

    /// True iff a session is current
    pub async fn is_authenticated(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Drop the current session. Persisted credentials are left alone; see `logout`.
    pub async fn clear(&self) {
        let _guard = self.install_lock.lock().await;
        if self.current.write().await.take().is_some() {
            tracing::info!("Session cleared");
        }
    }

    /// Drop the current session and erase the persisted credentials
    pub async fn logout(&self) -> Result<(), StoreError> {
        let _guard = self.install_lock.lock().await;
        credentials::erase(self.store.as_ref()).await?;
        self.current.write().await.take();
        tracing::info!("Logged out, stored session removed");
        Ok(())
    }

    /// Exchange username/password for tokens, persist them and install the session
    ///
    /// On any failure the current session is left untouched.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, AuthError> {
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::Api(
                "username and password must not be empty".to_string(),
            ));
        }

        tracing::info!(username = %username, "Logging in");

        let body = serde_json::to_value(LoginRequest { username, password })
            .map_err(|e| AuthError::Api(format!("Failed to encode login request: {}", e)))?;

        // The round-trip runs without holding the install lock
        let response = self
            .transport
            .post_json(&self.auth_url, &body)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Login request failed");
                AuthError::Api(e.to_string())
            })?;

        if response.status == 401 {
            tracing::warn!(username = %username, "Login rejected: invalid credentials");
            return Err(AuthError::Unauthorized);
        }

        if !response.is_success() {
            tracing::error!(
                status = response.status,
                body = %truncate_body(&response.body),
                "Login failed with error response"
            );
            return Err(AuthError::Api(format!(
                "Authentication endpoint returned {}: {}",
                response.status,
                truncate_body(&response.body)
            )));
        }

        let (access, refresh) = parse_tokens(&response.body)?;

        let _guard = self.install_lock.lock().await;

        credentials::persist(self.store.as_ref(), username, &access, &refresh)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to persist session");
                AuthError::Api(format!("Failed to persist session: {}", e))
            })?;

        let session = self.install(Session::new(username, access, refresh)).await;

        tracing::info!(
            username = %session.username,
            token = %token_preview(&session.access_token),
            "Login successful"
        );
        Ok(session)
    }

    /// Install an already-known credential triple as the current session
    ///
    /// No validation, no persistence; never fails.
    pub async fn from_credentials(
        &self,
        username: &str,
        access_token: &str,
        refresh_token: &str,
    ) -> Session {
        let _guard = self.install_lock.lock().await;
        let session = self
            .install(Session::new(username, access_token, refresh_token))
            .await;
        tracing::debug!(username = %session.username, "Session installed from credentials");
        session
    }

    /// Install the persisted session, if a complete one is stored
    pub async fn restore(&self) -> Result<Option<Session>, StoreError> {
        let stored = credentials::load(self.store.as_ref()).await?;

        match stored {
            Some(stored) => {
                tracing::info!(username = %stored.username, "Restoring stored session");
                let session = self
                    .from_credentials(&stored.username, &stored.access_token, &stored.refresh_token)
                    .await;
                Ok(Some(session))
            }
            None => {
                tracing::debug!("No stored session to restore");
                Ok(None)
            }
        }
    }

    /// Last persisted username, for pre-filling a login prompt
    pub async fn stored_username(&self) -> Result<Option<String>, StoreError> {
        credentials::load_username(self.store.as_ref()).await
    }

    /// Request-sending capability bound to this session's access token
    pub fn authenticated_client(&self, session: &Session) -> AuthorizedClient {
        AuthorizedClient::new(
            self.client.clone(),
            self.api_base_url.clone(),
            session.access_token.clone(),
            self.max_retries,
            self.retry_base_delay_ms,
        )
    }

    /// Caller must hold `install_lock`
    async fn install(&self, session: Session) -> Session {
        let installed = Arc::new(session);
        *self.current.write().await = Some(Arc::clone(&installed));
        Session::clone(&installed)
    }
}

/// Extract access/refresh tokens from a successful login body
fn parse_tokens(body: &str) -> Result<(String, String), AuthError> {
    let data: TokenResponse = serde_json::from_str(body).map_err(|e| {
        tracing::error!(error = %e, "Malformed login response");
        AuthError::Api(format!("Failed to parse login response: {}", e))
    })?;

    let access = data
        .access
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::Api("Login response does not contain access".to_string()))?;
    let refresh = data
        .refresh
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::Api("Login response does not contain refresh".to_string()))?;

    Ok((access, refresh))
}
