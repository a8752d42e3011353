//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use tracing::info;

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "config.toml",
    "application.toml",
    "immersion.toml",
    "./config/config.toml",
    "./config/application.toml",
    "/etc/immersion/config.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable overrides
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        // Start with defaults
        let mut config = AppConfig::default();

        // Try to load from file
        if let Some(path) = self.find_config_file() {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        // Apply environment variable overrides
        self.apply_env_overrides(&mut config);

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(&self) -> Option<PathBuf> {
        // Check explicit path first
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        // Check IMMERSION_CONFIG env var
        if let Ok(path) = env::var("IMMERSION_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        // Search standard paths
        for path in CONFIG_PATHS {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&self, config: &mut AppConfig) {
        // HTTP
        if let Ok(val) = env::var("IMMERSION_HTTP_PORT") {
            if let Ok(port) = val.parse() {
                config.http.port = port;
            }
        }
        if let Ok(val) = env::var("IMMERSION_HTTP_HOST") {
            config.http.host = val;
        }

        // Database
        if let Ok(val) = env::var("IMMERSION_DATABASE_URL") {
            config.database.url = val;
        }
        if let Ok(val) = env::var("IMMERSION_DATABASE_MAX_CONNECTIONS") {
            if let Ok(max) = val.parse() {
                config.database.max_connections = max;
            }
        }

        // Crawler
        if let Ok(val) = env::var("IMMERSION_CRAWLER_POLL_INTERVAL_MS") {
            if let Ok(interval) = val.parse() {
                config.crawler.poll_interval_ms = interval;
            }
        }
        if let Ok(val) = env::var("IMMERSION_CRAWLER_RETRY_INTERVAL_MS") {
            if let Ok(interval) = val.parse() {
                config.crawler.retry_interval_ms = interval;
            }
        }

        // Events
        if let Ok(val) = env::var("IMMERSION_QUARANTINED_TOPICS") {
            config.events.quarantined_topics =
                val.split(',').map(|s| s.trim().to_string()).collect();
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
