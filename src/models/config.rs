// src/models/config.rs

//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Crawl engine behavior settings
    #[serde(default)]
    pub crawl: CrawlConfig,

    /// Local state and export settings
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.api.endpoint.trim().is_empty() {
            return Err(AppError::validation("api.endpoint is empty"));
        }
        if self.api.user_agent.trim().is_empty() {
            return Err(AppError::validation("api.user_agent is empty"));
        }
        if self.api.timeout_secs == 0 {
            return Err(AppError::validation("api.timeout_secs must be > 0"));
        }
        if self.crawl.batch_size == 0 {
            return Err(AppError::validation("crawl.batch_size must be > 0"));
        }
        if self.crawl.item_delay_ms == 0 {
            return Err(AppError::validation("crawl.item_delay_ms must be > 0"));
        }
        Ok(())
    }
}

/// Remote API and HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// GraphQL endpoint URL
    #[serde(default = "defaults::endpoint")]
    pub endpoint: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Client identifier sent with every request
    #[serde(default = "defaults::client_id")]
    pub client_id: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Minimum spacing between consecutive requests in milliseconds
    #[serde(default = "defaults::min_request_interval")]
    pub min_request_interval_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::endpoint(),
            user_agent: defaults::user_agent(),
            client_id: defaults::client_id(),
            timeout_secs: defaults::timeout(),
            min_request_interval_ms: defaults::min_request_interval(),
        }
    }
}

/// Crawl engine behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Number of projects requested per page
    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,

    /// Stop after this many projects; 0 means unbounded
    #[serde(default)]
    pub max_records: usize,

    /// Base delay between per-project detail fetches in milliseconds
    #[serde(default = "defaults::item_delay")]
    pub item_delay_ms: u64,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::batch_size(),
            max_records: 0,
            item_delay_ms: defaults::item_delay(),
        }
    }
}

/// Local state and export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding cursor state, the session marker, and exports
    #[serde(default = "defaults::data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: defaults::data_dir(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    pub fn endpoint() -> String {
        "https://www.kickstarter.com/graph".to_string()
    }

    pub fn user_agent() -> String {
        "fundcrawl/0.1 (dataset collection)".to_string()
    }

    pub fn client_id() -> String {
        String::new()
    }

    pub fn timeout() -> u64 {
        60
    }

    pub fn min_request_interval() -> u64 {
        2000
    }

    pub fn batch_size() -> usize {
        15
    }

    pub fn item_delay() -> u64 {
        1000
    }

    pub fn data_dir() -> PathBuf {
        PathBuf::from("data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let mut config = Config::default();
        config.crawl.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_endpoint() {
        let mut config = Config::default();
        config.api.endpoint = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [crawl]
            batch_size = 25
            "#,
        )
        .unwrap();
        assert_eq!(config.crawl.batch_size, 25);
        assert_eq!(config.api.timeout_secs, 60);
        assert_eq!(config.storage.data_dir, PathBuf::from("data"));
    }
}
