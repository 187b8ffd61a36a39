//! Configuration file parser for ~/.config/papershelf/config.toml.
//!
//! The config file is optional. A missing file yields `Config::default()`,
//! and any subset of keys can be specified; the rest fall back to defaults.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be
/// specified. Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Categories fetched when none are given on the command line.
    pub default_categories: Vec<String>,

    /// Default keyword filter. Empty string means no keyword filter.
    pub keywords: String,

    /// Upstream page size per fetch.
    pub max_results: u32,

    /// Background refresh interval in minutes. 0 = manual refresh only.
    pub refresh_interval_minutes: u64,

    /// Base URL of the feed API service.
    pub feed_base_url: String,

    /// Document cache size cap in megabytes.
    pub document_cache_mb: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_categories: vec![
                "cs.AI".to_string(),
                "cs.LG".to_string(),
                "cs.CL".to_string(),
            ],
            keywords: String::new(),
            max_results: 50,
            refresh_interval_minutes: 15,
            feed_base_url: "https://papershelf-api.fly.dev".to_string(),
            document_cache_mb: 500,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    pub fn document_cache_bytes(&self) -> i64 {
        (self.document_cache_mb as i64).saturating_mul(1024 * 1024)
    }

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as a warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse as a raw table first to warn about likely typos
        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "default_categories",
                "keywords",
                "max_results",
                "refresh_interval_minutes",
                "feed_base_url",
                "document_cache_mb",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            categories = ?config.default_categories,
            "Loaded configuration"
        );
        Ok(config)
    }
}

// ============================================================================
// Tests
// ============================================================================
