// HTTP transport used for the login exchange
// Kept behind a trait so the session manager can run against a test double

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::error::TransportError;

/// Status and body of a completed HTTP exchange
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends JSON POST requests
#[async_trait]
pub trait AuthTransport: Send + Sync {
    /// POST `body` as JSON to `url`
    ///
    /// Any response, including error statuses, is `Ok`; `Err` means no response.
    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<HttpResponse, TransportError>;
}

/// reqwest-backed transport with connect and overall request timeouts
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(connect_timeout: u64, request_timeout: u64) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout))
            .timeout(Duration::from_secs(request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// Wrap an existing client (shares its connection pool)
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

/// Categorize a reqwest error for logs
pub(crate) fn error_kind(e: &reqwest::Error) -> &'static str {
    if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connection_failed"
    } else if e.is_request() {
        "request_error"
    } else if e.is_body() {
        "body_error"
    } else if e.is_decode() {
        "decode_error"
    } else {
        "unknown"
    }
}

#[async_trait]
impl AuthTransport for ReqwestTransport {
    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<HttpResponse, TransportError> {
        tracing::debug!(url = %url, "Sending login request");

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                let kind = error_kind(&e);
                tracing::warn!(error_kind = kind, error = %e, url = %url, "Login request error");
                TransportError::Request {
                    kind,
                    message: e.to_string(),
                }
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?;

        tracing::debug!(status = status, "Received login response");
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_response_is_success() {
        let ok = HttpResponse {
            status: 204,
            body: String::new(),
        };
        assert!(ok.is_success());

        let unauthorized = HttpResponse {
            status: 401,
            body: String::new(),
        };
        assert!(!unauthorized.is_success());
    }

    #[tokio::test]
    async fn test_post_json_returns_error_status_as_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/token/")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::Json(
                serde_json::json!({"username": "bob", "password": "wrong"}),
            ))
            .with_status(401)
            .with_body(r#"{"detail":"No active account"}"#)
            .create_async()
            .await;

        let transport = ReqwestTransport::new(5, 5).unwrap();
        let url = format!("{}/api/token/", server.url());
        let response = transport
            .post_json(
                &url,
                &serde_json::json!({"username": "bob", "password": "wrong"}),
            )
            .await
            .unwrap();

        assert_eq!(response.status, 401);
        assert!(response.body.contains("No active account"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_json_connection_refused() {
        // Bind then drop a listener to get a port nothing listens on
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let transport = ReqwestTransport::new(2, 2).unwrap();
        let err = transport
            .post_json(
                &format!("http://127.0.0.1:{}/api/token/", port),
                &serde_json::json!({}),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Request { .. }));
    }
}
