use reqwest::header::{self, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::config::join_url;
use crate::error::{truncate_body, ClientError};
use crate::transport::error_kind;

/// Request-sending capability bound to an API root and one access token
///
/// Every request built through it carries `Authorization: Bearer <token>`.
/// The token is fixed at construction; derive a new client after a new login.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct AuthorizedClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// API root every path is resolved against
    base_url: String,

    /// Bearer token attached to every request
    access_token: String,

    /// Maximum number of retries for 429/5xx/network errors (idempotent methods only)
    max_retries: u32,

    /// Base delay for exponential backoff (milliseconds)
    base_delay_ms: u64,
}

impl AuthorizedClient {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        access_token: impl Into<String>,
        max_retries: u32,
        base_delay_ms: u64,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            access_token: access_token.into(),
            max_retries,
            base_delay_ms,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Absolute URL for a path under the API root
    pub fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    /// Start a request with the bearer header already attached
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(&self.access_token)
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.request(Method::GET, path)
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.request(Method::POST, path)
    }

    pub fn put(&self, path: &str) -> RequestBuilder {
        self.request(Method::PUT, path)
    }

    pub fn patch(&self, path: &str) -> RequestBuilder {
        self.request(Method::PATCH, path)
    }

    pub fn delete(&self, path: &str) -> RequestBuilder {
        self.request(Method::DELETE, path)
    }

    /// GET a path and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self.send(self.get(path)).await?;
        Ok(response.json().await?)
    }

    /// Execute a request with retry logic
    /// - 429 and 5xx: exponential backoff
    /// - network errors: exponential backoff
    /// - anything else non-2xx (401/403 included): returned immediately
    ///
    /// Only idempotent methods are retried; POST and PATCH are sent once.
    /// The bearer header is (re)applied here, whatever client built the request.
    /// Never touches session state; reacting to an expired token is up to the caller.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, ClientError> {
        let mut request = builder.build()?;
        request
            .headers_mut()
            .insert(header::AUTHORIZATION, self.bearer_header()?);

        let method = request.method().clone();
        let url = request.url().clone();
        let max_retries = if is_idempotent(&method) {
            self.max_retries
        } else {
            0
        };
        let mut attempt = 0;

        tracing::debug!(method = %method, url = %url, "Sending authorized request");

        loop {
            let req = request.try_clone().ok_or_else(|| {
                ClientError::InvalidRequest("Request body is not cloneable".to_string())
            })?;

            match self.client.execute(req).await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        tracing::debug!(status = %status, "Request successful");
                        return Ok(response);
                    }

                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    if retryable && attempt < max_retries {
                        let delay = self.calculate_backoff_delay(attempt);
                        tracing::warn!(
                            "Received {}, retrying after {}ms (attempt {}/{})",
                            status,
                            delay,
                            attempt + 1,
                            max_retries
                        );

                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        attempt += 1;
                        continue;
                    }

                    let error_text = response.text().await.unwrap_or_default();
                    tracing::warn!(
                        status = status.as_u16(),
                        url = %url,
                        attempt = attempt + 1,
                        "HTTP request failed with error response"
                    );
                    return Err(ClientError::Status {
                        status: status.as_u16(),
                        message: truncate_body(&error_text),
                    });
                }

                Err(e) => {
                    let kind = error_kind(&e);

                    if attempt < max_retries {
                        let delay = self.calculate_backoff_delay(attempt);
                        tracing::warn!(
                            error_kind = kind,
                            error = %e,
                            "Request failed, retrying after {}ms (attempt {}/{})",
                            delay,
                            attempt + 1,
                            max_retries
                        );

                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        attempt += 1;
                        continue;
                    }

                    tracing::error!(
                        error_kind = kind,
                        error = %e,
                        url = %url,
                        total_attempts = attempt + 1,
                        "HTTP request failed after all retries"
                    );
                    return Err(ClientError::Network(e));
                }
            }
        }
    }

    fn bearer_header(&self) -> Result<HeaderValue, ClientError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.access_token))
            .map_err(|e| ClientError::InvalidRequest(format!("Invalid access token: {}", e)))?;
        value.set_sensitive(true);
        Ok(value)
    }

    /// Calculate exponential backoff delay
    fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        // base_delay * 2^attempt, plus up to 10% jitter
        let delay = self.base_delay_ms.saturating_mul(2_u64.saturating_pow(attempt));
        let jitter = (delay as f64 * 0.1 * jitter::random()) as u64;
        delay + jitter
    }
}

/// Methods that are safe to send more than once
fn is_idempotent(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS
    )
}

// Cheap jitter source; no need for cryptographic randomness here
mod jitter {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hash, Hasher};

    pub fn random() -> f64 {
        let mut hasher = RandomState::new().build_hasher();
        std::time::SystemTime::now().hash(&mut hasher);
        (hasher.finish() % 1000) as f64 / 1000.0
    }
}
