//! Remote catalog lookups.

use crate::catalog::types::{CatalogModel, CatalogVersion, Fetched, LookupOutcome};
use crate::error::{ArchiveError, Result};
use crate::model_files::ContentHash;
use crate::network::{HttpClient, StatusClass};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

/// Read access to the remote catalog.
///
/// A definitive "no such resource" is [`LookupOutcome::NotFound`]; anything
/// worth retrying is an `Err` whose [`ArchiveError::is_retryable`] is true.
/// Implementations never retry on their own.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn lookup_by_hash(&self, hash: &ContentHash) -> Result<LookupOutcome<Fetched<CatalogVersion>>>;

    async fn lookup_version_by_id(&self, id: u64) -> Result<LookupOutcome<Fetched<CatalogVersion>>>;

    async fn lookup_model_by_id(&self, id: u64) -> Result<LookupOutcome<Fetched<CatalogModel>>>;
}

/// HTTP client for a Civitai-shaped catalog API.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: HttpClient,
    base_url: String,
}

impl CatalogClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        Ok(Self::with_client(HttpClient::new(api_key)?, base_url))
    }

    pub fn with_client(http: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<LookupOutcome<Fetched<T>>> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.get(&url).await?;
        let status = response.status();

        match StatusClass::of(status) {
            StatusClass::Success => {}
            StatusClass::Permanent => {
                debug!("Catalog has no entry at {} (HTTP {})", url, status.as_u16());
                return Ok(LookupOutcome::NotFound {
                    status: status.as_u16(),
                });
            }
            StatusClass::Transient => {
                return Err(ArchiveError::CatalogStatus {
                    url,
                    status: status.as_u16(),
                });
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| ArchiveError::from_request(e, &url))?;
        let raw: Value = serde_json::from_str(&body).map_err(|e| ArchiveError::MalformedPayload {
            url: url.clone(),
            message: e.to_string(),
        })?;
        let fetched = Fetched::from_value(raw).map_err(|e| ArchiveError::MalformedPayload {
            url: url.clone(),
            message: e.to_string(),
        })?;

        Ok(LookupOutcome::Found(fetched))
    }
}

#[async_trait]
impl CatalogSource for CatalogClient {
    async fn lookup_by_hash(&self, hash: &ContentHash) -> Result<LookupOutcome<Fetched<CatalogVersion>>> {
        self.get_json(&format!("/model-versions/by-hash/{}", hash)).await
    }

    async fn lookup_version_by_id(&self, id: u64) -> Result<LookupOutcome<Fetched<CatalogVersion>>> {
        self.get_json(&format!("/model-versions/{}", id)).await
    }

    async fn lookup_model_by_id(&self, id: u64) -> Result<LookupOutcome<Fetched<CatalogModel>>> {
        self.get_json(&format!("/models/{}", id)).await
    }
}
