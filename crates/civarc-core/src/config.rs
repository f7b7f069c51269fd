//! Centralized configuration for civarc.
//!
//! Constant holders for network, pacing and on-disk layout, plus the
//! `config.json` file format accepted by the CLI.

use crate::error::{ArchiveError, Result};
use crate::sync::{ImagePolicy, SyncOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const CATALOG_API_BASE: &'static str = "https://civitai.com/api/v1";
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    pub const USER_AGENT: &'static str = concat!("civarc/", env!("CARGO_PKG_VERSION"));
    pub const MAX_ATTEMPTS: u32 = 3;
    pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(2);
    pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(30);
    pub const DOWNLOAD_TEMP_SUFFIX: &'static str = ".part";
}

/// Delays between remote operations.
pub struct PacingConfig;

impl PacingConfig {
    pub const MODEL_DELAY_MIN: Duration = Duration::from_secs(3);
    pub const MODEL_DELAY_MAX: Duration = Duration::from_secs(6);
    pub const ASSET_DELAY_MIN: Duration = Duration::from_millis(500);
    pub const ASSET_DELAY_MAX: Duration = Duration::from_millis(1500);
}

/// File names and suffixes of the archive layout.
pub struct PathsConfig;

impl PathsConfig {
    pub const MODEL_EXTENSION: &'static str = "safetensors";
    pub const CONFIG_FILE_NAME: &'static str = "config.json";
    pub const PROCESSED_LEDGER_NAME: &'static str = "processed_files.json";
    pub const MISSING_LEDGER_NAME: &'static str = "missing_from_civitai.txt";
    pub const DUPLICATE_LEDGER_NAME: &'static str = "duplicate_models.txt";
    pub const INDEX_PAGE_NAME: &'static str = "index.html";
    pub const RECORD_SUFFIX: &'static str = "_archive.json";
    pub const METADATA_SUFFIX: &'static str = "_metadata.json";
    pub const HASH_SUFFIX: &'static str = "_hash.json";
    pub const MODEL_SUFFIX: &'static str = "_civitai_model.json";
    pub const VERSION_SUFFIX: &'static str = "_civitai_model_version.json";
    pub const PREVIEW_INFIX: &'static str = "_preview_";
    pub const PAGE_SUFFIX: &'static str = ".html";
}

/// Settings read from `config.json`.
///
/// Field names match the command-line flags so a config file can stand in
/// for a full invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveConfig {
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub single: Option<PathBuf>,
    pub all: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub notimeout: bool,
    pub images: bool,
    pub noimages: bool,
    pub generateimagejson: bool,
    pub onlynew: bool,
    pub skipmissing: bool,
    pub onlyhtml: bool,
    pub onlyupdate: bool,
    pub clean: bool,
    pub api_key: Option<String>,
    pub api_base: Option<String>,
}

impl ArchiveConfig {
    /// Reject flag combinations that contradict each other.
    pub fn validate(&self) -> Result<()> {
        if self.single.is_some() && self.all.is_some() {
            return Err(config_error("specify either 'single' or 'all', not both"));
        }
        if self.images && self.noimages {
            return Err(config_error("cannot use both 'images' and 'noimages'"));
        }
        if self.onlynew && self.onlyhtml {
            return Err(config_error("cannot use both 'onlynew' and 'onlyhtml'"));
        }
        if self.onlyupdate && self.onlynew {
            return Err(config_error("cannot use both 'onlyupdate' and 'onlynew'"));
        }
        if self.onlyupdate && self.onlyhtml {
            return Err(config_error("cannot use both 'onlyupdate' and 'onlyhtml'"));
        }
        if self.clean {
            if self.single.is_some() {
                return Err(config_error("'clean' can only be used with 'all'"));
            }
            if self.onlyhtml || self.onlyupdate || self.onlynew {
                return Err(config_error(
                    "'clean' cannot be combined with 'onlyhtml', 'onlyupdate' or 'onlynew'",
                ));
            }
        }
        Ok(())
    }

    /// Image download policy implied by the `images`/`noimages` flags.
    pub fn image_policy(&self) -> ImagePolicy {
        if self.noimages {
            ImagePolicy::None
        } else if self.images {
            ImagePolicy::All
        } else {
            ImagePolicy::FirstOnly
        }
    }

    /// Engine options for this configuration.
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            image_policy: self.image_policy(),
            only_new: self.onlynew,
            only_update: self.onlyupdate,
            only_html: self.onlyhtml,
            skip_missing: self.skipmissing,
            no_timeout: self.notimeout,
        }
    }

    /// Catalog base URL, falling back to the public API.
    pub fn api_base(&self) -> &str {
        self.api_base
            .as_deref()
            .unwrap_or(NetworkConfig::CATALOG_API_BASE)
    }
}

/// Load and validate `config.json`.
///
/// Returns `Ok(None)` when the file does not exist.
pub fn load_config(path: &Path) -> Result<Option<ArchiveConfig>> {
    if !path.exists() {
        debug!("No config file at {}", path.display());
        return Ok(None);
    }

    let contents =
        std::fs::read_to_string(path).map_err(|e| ArchiveError::io_with_path(e, path))?;
    let config: ArchiveConfig = serde_json::from_str(&contents).map_err(|e| ArchiveError::Config {
        message: format!("invalid JSON in {}: {}", path.display(), e),
    })?;
    config.validate()?;

    debug!("Loaded config from {}", path.display());
    Ok(Some(config))
}

fn config_error(message: &str) -> ArchiveError {
    ArchiveError::Config {
        message: message.to_string(),
    }
}
