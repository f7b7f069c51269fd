//! Command-line arguments and their merge with `config.json`.

use anyhow::{bail, Context, Result};
use civarc_core::config::PathsConfig;
use civarc_core::{load_config, ArchiveConfig};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug, Default)]
#[command(name = "civarc")]
#[command(about = "Archive Civitai metadata and previews for local SafeTensors models")]
#[command(version)]
pub struct Args {
    /// Process a single .safetensors file
    #[arg(long, value_name = "PATH", conflicts_with = "all")]
    pub single: Option<PathBuf>,

    /// Process every .safetensors file under a directory
    #[arg(long, value_name = "DIR")]
    pub all: Option<PathBuf>,

    /// Archive output directory
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Download all preview images
    #[arg(long, conflicts_with = "noimages")]
    pub images: bool,

    /// Do not download preview images
    #[arg(long)]
    pub noimages: bool,

    /// Rebuild preview image JSON files from archived version data
    #[arg(long)]
    pub generateimagejson: bool,

    /// Only process files that have not been archived yet
    #[arg(long, conflicts_with_all = ["onlyhtml", "onlyupdate"])]
    pub onlynew: bool,

    /// With --onlynew, also skip files previously not found on Civitai
    #[arg(long)]
    pub skipmissing: bool,

    /// Only regenerate HTML pages from archived data
    #[arg(long, conflicts_with = "onlyupdate")]
    pub onlyhtml: bool,

    /// Only refresh models that are already archived
    #[arg(long)]
    pub onlyupdate: bool,

    /// Remove archive data for duplicate and deleted models
    #[arg(long, conflicts_with_all = ["single", "onlyhtml", "onlyupdate", "onlynew"])]
    pub clean: bool,

    /// Disable the delay between API calls
    #[arg(long)]
    pub notimeout: bool,

    /// Civitai API key
    #[arg(long, value_name = "KEY")]
    pub api_key: Option<String>,

    /// Catalog API base URL
    #[arg(long, value_name = "URL", hide = true)]
    pub api_base: Option<String>,

    /// Read settings from this file instead of ./config.json
    #[arg(long, value_name = "PATH", conflicts_with = "noconfig")]
    pub config: Option<PathBuf>,

    /// Ignore config.json
    #[arg(long)]
    pub noconfig: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,
}

impl Args {
    /// Load the config file (unless disabled) and apply the flags over it.
    pub fn resolve_config(&self) -> Result<ArchiveConfig> {
        let base = if self.noconfig {
            ArchiveConfig::default()
        } else {
            let path = self
                .config
                .clone()
                .unwrap_or_else(|| PathBuf::from(PathsConfig::CONFIG_FILE_NAME));
            match load_config(&path)? {
                Some(config) => {
                    info!("Using settings from {}", path.display());
                    config
                }
                None if self.config.is_some() => {
                    bail!("config file {} does not exist", path.display())
                }
                None => ArchiveConfig::default(),
            }
        };

        let merged = self.apply(base);
        merged
            .validate()
            .context("conflicting options")?;
        Ok(merged)
    }

    /// Flags override the config file; a set boolean flag always wins.
    fn apply(&self, mut config: ArchiveConfig) -> ArchiveConfig {
        if self.single.is_some() || self.all.is_some() {
            config.single = self.single.clone();
            config.all = self.all.clone();
        }
        if self.output.is_some() {
            config.output = self.output.clone();
        }
        if self.api_key.is_some() {
            config.api_key = self.api_key.clone();
        }
        if self.api_base.is_some() {
            config.api_base = self.api_base.clone();
        }
        if self.images {
            config.images = true;
            config.noimages = false;
        }
        if self.noimages {
            config.noimages = true;
            config.images = false;
        }
        config.generateimagejson |= self.generateimagejson;
        config.onlynew |= self.onlynew;
        config.skipmissing |= self.skipmissing;
        config.onlyhtml |= self.onlyhtml;
        config.onlyupdate |= self.onlyupdate;
        config.clean |= self.clean;
        config.notimeout |= self.notimeout;
        config
    }
}

/// Input path and output directory of a resolved configuration.
pub fn io_paths(config: &ArchiveConfig) -> Result<(PathBuf, PathBuf)> {
    let input = match (&config.single, &config.all) {
        (Some(single), None) => single.clone(),
        (None, Some(all)) => all.clone(),
        _ => bail!("specify exactly one of --single or --all"),
    };
    let output = config
        .output
        .clone()
        .context("--output is required (or set \"output\" in config.json)")?;
    Ok((input, output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_flags_parse() {
        let args = Args::try_parse_from([
            "civarc", "--all", "/models", "--output", "/out", "--images", "--onlynew",
        ])
        .unwrap();
        assert_eq!(args.all, Some(PathBuf::from("/models")));
        assert!(args.images && args.onlynew);
    }

    #[test]
    fn test_conflicting_flags_rejected() {
        assert!(Args::try_parse_from(["civarc", "--images", "--noimages"]).is_err());
        assert!(Args::try_parse_from(["civarc", "--onlynew", "--onlyhtml"]).is_err());
        assert!(Args::try_parse_from(["civarc", "--single", "a", "--clean"]).is_err());
        assert!(Args::try_parse_from(["civarc", "--single", "a", "--all", "b"]).is_err());
    }

    #[test]
    fn test_flags_override_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"all": "/models", "output": "/out", "noimages": true, "onlynew": true}"#,
        )
        .unwrap();

        let args = Args {
            config: Some(path),
            output: Some(PathBuf::from("/elsewhere")),
            images: true,
            ..Default::default()
        };
        let config = args.resolve_config().unwrap();
        assert_eq!(config.output, Some(PathBuf::from("/elsewhere")));
        assert!(config.images && !config.noimages);
        assert!(config.onlynew);

        let (input, output) = io_paths(&config).unwrap();
        assert_eq!(input, PathBuf::from("/models"));
        assert_eq!(output, PathBuf::from("/elsewhere"));
    }

    #[test]
    fn test_explicit_missing_config_is_error() {
        let args = Args {
            config: Some(PathBuf::from("/no/such/config.json")),
            ..Default::default()
        };
        assert!(args.resolve_config().is_err());
    }

    #[test]
    fn test_missing_input_is_error() {
        let args = Args {
            noconfig: true,
            output: Some(PathBuf::from("/out")),
            ..Default::default()
        };
        let config = args.resolve_config().unwrap();
        assert!(io_paths(&config).is_err());
    }
}
