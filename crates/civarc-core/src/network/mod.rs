//! Network utilities for HTTP operations, retries, and asset downloads.
//!
//! This module provides:
//! - HTTP client with timeouts, bearer auth and status classification
//! - Retry logic with exponential backoff and jitter
//! - Streaming asset downloader writing through a temp file

mod client;
mod download;
mod retry;

pub use client::{is_permanent_failure, HttpClient, StatusClass};
pub use download::{asset_extension, full_size_url, temp_path_for, AssetFetcher, HttpAssetFetcher};
pub use retry::RetryPolicy;
