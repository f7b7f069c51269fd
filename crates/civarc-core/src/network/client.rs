//! HTTP client wrapper shared by the catalog client and the asset downloader.
//!
//! Provides a reqwest client with:
//! - A per-request timeout (a timeout surfaces as a retryable error)
//! - A fixed user agent
//! - Optional bearer authentication
//! - Status classification into success / permanent / transient

use crate::config::NetworkConfig;
use crate::error::{ArchiveError, Result};
use reqwest::{header, Client, Response, StatusCode};
use std::time::Duration;
use tracing::debug;

/// How a response status should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    /// The resource does not exist or will never be served to us.
    Permanent,
    /// Worth retrying later.
    Transient,
}

impl StatusClass {
    pub fn of(status: StatusCode) -> Self {
        if status.is_success() {
            StatusClass::Success
        } else if is_permanent_failure(status) {
            StatusClass::Permanent
        } else {
            StatusClass::Transient
        }
    }
}

/// Check if an HTTP status code indicates a permanent failure.
pub fn is_permanent_failure(status: StatusCode) -> bool {
    matches!(status.as_u16(), 400 | 401 | 403 | 404 | 410)
}

/// HTTP client with a fixed timeout and optional API key.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    api_key: Option<String>,
}

impl HttpClient {
    /// Create a client with the default API request timeout.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_timeout(NetworkConfig::REQUEST_TIMEOUT, api_key)
    }

    /// Create a client with a custom timeout.
    pub fn with_timeout(timeout: Duration, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(NetworkConfig::CONNECT_TIMEOUT)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| ArchiveError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(e),
            })?;

        Ok(Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    /// Make a GET request. Non-success statuses are returned, not raised.
    pub async fn get(&self, url: &str) -> Result<Response> {
        let mut request = self.client.get(url);
        if let Some(ref key) = self.api_key {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ArchiveError::from_request(e, url))?;
        debug!("GET {} -> {}", url, response.status());
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classes() {
        assert_eq!(StatusClass::of(StatusCode::OK), StatusClass::Success);
        assert_eq!(StatusClass::of(StatusCode::NOT_FOUND), StatusClass::Permanent);
        assert_eq!(StatusClass::of(StatusCode::FORBIDDEN), StatusClass::Permanent);
        assert_eq!(
            StatusClass::of(StatusCode::TOO_MANY_REQUESTS),
            StatusClass::Transient
        );
        assert_eq!(
            StatusClass::of(StatusCode::BAD_GATEWAY),
            StatusClass::Transient
        );
    }

    #[test]
    fn test_blank_api_key_ignored() {
        let client = HttpClient::new(Some("   ".to_string())).unwrap();
        assert!(client.api_key.is_none());
    }
}
