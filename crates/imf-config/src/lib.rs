//! Immersion Facilitée Configuration System
//!
//! This crate provides TOML-based configuration with environment variable override support.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Root application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub crawler: CrawlerConfig,
    pub events: EventsConfig,
    pub webhooks: Vec<WebhookBinding>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            database: DatabaseConfig::default(),
            crawler: CrawlerConfig::default(),
            events: EventsConfig::default(),
            webhooks: Vec::new(),
        }
    }
}

/// HTTP server configuration (health and readiness endpoints)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    pub host: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// PostgreSQL configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost:5432/immersion".to_string(),
            max_connections: 10,
        }
    }
}

/// Event crawler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Interval between new-events passes
    pub poll_interval_ms: u64,
    /// Interval between retry passes over failed events
    pub retry_interval_ms: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            retry_interval_ms: 30000,
        }
    }
}

/// Event pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Topic names excluded from automatic dispatch. Events on these
    /// topics are stored but flagged as quarantined at creation time.
    pub quarantined_topics: Vec<String>,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            quarantined_topics: Vec::new(),
        }
    }
}

/// One outbound webhook subscription
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookBinding {
    /// Stable identifier recorded in publication failures
    pub subscription_id: String,
    /// Topic name this webhook subscribes to
    pub topic: String,
    pub url: String,
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with environment variable override
    pub fn load() -> Result<Self, ConfigError> {
        let loader = ConfigLoader::new();
        loader.load()
    }

    /// Generate an example TOML configuration
    pub fn example_toml() -> String {
        r#"# Immersion Facilitée Configuration
# Environment variables override these settings

[http]
port = 8080
host = "0.0.0.0"

[database]
url = "postgres://localhost:5432/immersion"
max_connections = 10

[crawler]
poll_interval_ms = 1000
retry_interval_ms = 30000

[events]
quarantined_topics = []

[[webhooks]]
subscription_id = "crm-agency-sync"
topic = "AgencyActivated"
url = "http://crm.example.com/hooks/agency-activated"
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.crawler.poll_interval_ms, 1000);
        assert_eq!(config.crawler.retry_interval_ms, 30000);
        assert!(config.events.quarantined_topics.is_empty());
        assert!(config.webhooks.is_empty());
    }

    #[test]
    fn test_example_toml_parses() {
        let config: AppConfig = toml::from_str(&AppConfig::example_toml()).unwrap();
        assert_eq!(config.webhooks.len(), 1);
        assert_eq!(config.webhooks[0].subscription_id, "crm-agency-sync");
        assert_eq!(config.webhooks[0].topic, "AgencyActivated");
        assert!(config.webhooks[0].auth_token.is_none());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [crawler]
            poll_interval_ms = 250

            [events]
            quarantined_topics = ["ConventionRejected"]
            "#
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.crawler.poll_interval_ms, 250);
        // Unspecified sections fall back to defaults.
        assert_eq!(config.crawler.retry_interval_ms, 30000);
        assert_eq!(config.events.quarantined_topics, vec!["ConventionRejected"]);
    }
}
