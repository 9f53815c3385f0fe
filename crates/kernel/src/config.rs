//! Configuration loaded from environment variables.

use std::env;

use anyhow::{Context, Result};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL. When None, the kernel runs in mock mode.
    pub database_url: Option<String>,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// HTTP translation provider endpoint. When None, text passes through untranslated.
    pub translation_api_url: Option<String>,

    /// API key sent to the translation provider.
    pub translation_api_key: Option<String>,

    /// Per-request translation timeout in seconds (default: 30).
    pub translation_timeout_secs: u64,

    /// Capacity of the translation fan-out queue (default: 64).
    pub translation_queue_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let database_url = non_empty_var("DATABASE_URL");

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let translation_api_url = non_empty_var("TRANSLATION_API_URL");
        let translation_api_key = non_empty_var("TRANSLATION_API_KEY");

        let translation_timeout_secs = env::var("TRANSLATION_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .context("TRANSLATION_TIMEOUT_SECS must be a valid u64")?;

        let translation_queue_capacity: usize = env::var("TRANSLATION_QUEUE_CAPACITY")
            .unwrap_or_else(|_| "64".to_string())
            .parse()
            .context("TRANSLATION_QUEUE_CAPACITY must be a valid usize")?;

        if translation_queue_capacity == 0 {
            anyhow::bail!("TRANSLATION_QUEUE_CAPACITY must be greater than zero");
        }

        Ok(Self {
            database_url,
            database_max_connections,
            translation_api_url,
            translation_api_key,
            translation_timeout_secs,
            translation_queue_capacity,
        })
    }

    /// Whether no backing datastore is configured.
    pub fn is_mock_mode(&self) -> bool {
        self.database_url.is_none()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: 10,
            translation_api_url: None,
            translation_api_key: None,
            translation_timeout_secs: 30,
            translation_queue_capacity: 64,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
