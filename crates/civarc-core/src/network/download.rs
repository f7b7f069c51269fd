//! Preview asset downloads.
//!
//! Assets are streamed to `<dest>.part` and renamed into place once complete,
//! so a crash never leaves a truncated file under the final name.

use crate::config::NetworkConfig;
use crate::error::{ArchiveError, Result};
use crate::network::client::HttpClient;
use async_trait::async_trait;
use futures::StreamExt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

/// Fetches a remote asset to a local path.
///
/// Implementations do not retry; the caller owns the retry policy.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Download `url` to `dest`, returning the number of bytes written.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// Asset fetcher backed by [`HttpClient`].
#[derive(Debug, Clone)]
pub struct HttpAssetFetcher {
    http: HttpClient,
}

impl HttpAssetFetcher {
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Ok(Self {
            http: HttpClient::with_timeout(NetworkConfig::DOWNLOAD_TIMEOUT, api_key)?,
        })
    }

    pub fn with_client(http: HttpClient) -> Self {
        Self { http }
    }

    async fn stream_to(&self, url: &str, temp_path: &Path) -> Result<u64> {
        let response = self.http.get(url).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ArchiveError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut file =
            std::fs::File::create(temp_path).map_err(|e| ArchiveError::io_with_path(e, temp_path))?;
        let mut bytes_downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ArchiveError::from_request(e, url))?;
            file.write_all(&chunk)
                .map_err(|e| ArchiveError::io_with_path(e, temp_path))?;
            bytes_downloaded += chunk.len() as u64;
        }

        file.flush()
            .map_err(|e| ArchiveError::io_with_path(e, temp_path))?;
        Ok(bytes_downloaded)
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ArchiveError::io_with_path(e, parent))?;
        }

        let temp_path = temp_path_for(dest);
        match self.stream_to(url, &temp_path).await {
            Ok(bytes) => {
                std::fs::rename(&temp_path, dest).map_err(|e| {
                    let _ = std::fs::remove_file(&temp_path);
                    ArchiveError::io_with_path(e, dest)
                })?;
                info!("Downloaded {} bytes to {}", bytes, dest.display());
                Ok(bytes)
            }
            Err(e) => {
                let _ = std::fs::remove_file(&temp_path);
                Err(e)
            }
        }
    }
}

/// Path of the in-progress download for `dest`.
pub fn temp_path_for(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(NetworkConfig::DOWNLOAD_TEMP_SUFFIX);
    PathBuf::from(name)
}

/// Drop a `width=NNN` path segment so the catalog serves the original size.
pub fn full_size_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            let segments: Vec<String> = match parsed.path_segments() {
                Some(segments) => segments.map(str::to_string).collect(),
                None => return url.to_string(),
            };
            if segments.len() >= 2 && segments[segments.len() - 2].starts_with("width=") {
                let mut kept = segments;
                kept.remove(kept.len() - 2);
                parsed.set_path(&kept.join("/"));
                debug!("Full-size URL for {} is {}", url, parsed);
            }
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}

/// File extension (with the dot) for an asset.
///
/// Videos are always stored as `.mp4`; images keep the URL's extension.
pub fn asset_extension(url: &str, is_video: bool) -> String {
    if is_video {
        return ".mp4".to_string();
    }
    let last_segment = Url::parse(url)
        .ok()
        .and_then(|u| u.path_segments().and_then(|mut s| s.next_back().map(str::to_string)))
        .unwrap_or_default();

    match Path::new(&last_segment).extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => format!(".{}", ext.to_ascii_lowercase()),
        _ => ".jpeg".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_size_url_drops_width() {
        assert_eq!(
            full_size_url("https://image.civitai.com/abc/uuid/width=450/1234.jpeg"),
            "https://image.civitai.com/abc/uuid/1234.jpeg"
        );
        assert_eq!(
            full_size_url("https://image.civitai.com/abc/uuid/1234.jpeg"),
            "https://image.civitai.com/abc/uuid/1234.jpeg"
        );
    }

    #[test]
    fn test_asset_extension() {
        assert_eq!(asset_extension("https://i.test/a/width=450/1.PNG", false), ".png");
        assert_eq!(asset_extension("https://i.test/a/1.webm", true), ".mp4");
        assert_eq!(asset_extension("https://i.test/a/noext", false), ".jpeg");
        assert_eq!(asset_extension("not a url", false), ".jpeg");
    }

    #[test]
    fn test_temp_path() {
        assert_eq!(
            temp_path_for(Path::new("/out/m/m_preview_0.jpeg")),
            PathBuf::from("/out/m/m_preview_0.jpeg.part")
        );
    }
}
