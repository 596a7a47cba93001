//! Configuration file support for wordlog.
//!
//! Loads `wordlog.toml` from the working directory, falling back to
//! `<config_dir>/wordlog/config.toml`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use wordlog_store::CompressPolicy;

/// Settings read from a config file. Every key is optional.
#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory holding in-progress logs
    pub log_dir: Option<PathBuf>,
    /// Root of the archive repository
    pub archive_dir: Option<PathBuf>,
    /// Payloads at least this many bytes long are written compressed; 0 disables
    pub compress_threshold: Option<usize>,
    /// Default tracing filter
    pub log_level: Option<String>,
}

/// The config file name looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "wordlog.toml";

impl Config {
    /// Load configuration for `working_dir`.
    ///
    /// Returns:
    /// - `Ok(Some(config))` if a file exists and parses successfully
    /// - `Ok(None)` if neither location has a file
    /// - `Err(...)` if a file exists but fails to parse (hard error)
    pub fn load(working_dir: &Path) -> Result<Option<Self>> {
        let local = working_dir.join(CONFIG_FILE_NAME);
        if local.exists() {
            return Self::load_file(&local).map(Some);
        }

        match dirs::config_dir().map(|d| d.join("wordlog").join("config.toml")) {
            Some(global) if global.exists() => Self::load_file(&global).map(Some),
            _ => Ok(None),
        }
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

/// Effective settings after defaults, the config file and CLI flags.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub log_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub policy: CompressPolicy,
    pub log_level: String,
}

/// Values given on the command line; these win over the config file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub archive_dir: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl Settings {
    pub fn resolve(config: Option<Config>, overrides: Overrides) -> Result<Self> {
        let config = config.unwrap_or_default();
        let data_dir = || -> Result<PathBuf> {
            Ok(dirs::data_dir()
                .context("Could not determine data directory")?
                .join("wordlog"))
        };

        let log_dir = match config.log_dir {
            Some(dir) => dir,
            None => data_dir()?.join("logs"),
        };
        let archive_dir = match overrides.archive_dir.or(config.archive_dir) {
            Some(dir) => dir,
            None => data_dir()?.join("archive"),
        };
        let policy = config
            .compress_threshold
            .map_or_else(CompressPolicy::default, |threshold| CompressPolicy {
                threshold,
            });
        let log_level = overrides
            .log_level
            .or(config.log_level)
            .unwrap_or_else(|| "info".to_string());

        Ok(Self {
            log_dir,
            archive_dir,
            policy,
            log_level,
        })
    }
}
