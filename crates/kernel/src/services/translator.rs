//! Translation providers.
//!
//! The fan-out calls [`Translator::translate_text`] once per text leaf and
//! target language. Errors are handled by the caller, leaf by leaf.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::models::DEFAULT_LANGUAGE;

/// External translation collaborator.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` from `source_language` into `target_language`.
    async fn translate_text(
        &self,
        text: &str,
        target_language: &str,
        source_language: &str,
    ) -> Result<String>;
}

/// Returns text unchanged. Used when no provider is configured.
#[derive(Debug, Clone, Default)]
pub struct PassthroughTranslator;

#[async_trait]
impl Translator for PassthroughTranslator {
    async fn translate_text(
        &self,
        text: &str,
        target_language: &str,
        _source_language: &str,
    ) -> Result<String> {
        debug!(target_language = %target_language, "no translation provider; copying text");
        Ok(text.to_string())
    }
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

/// Client for a LibreTranslate-compatible HTTP endpoint.
#[derive(Clone)]
pub struct HttpTranslator {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpTranslator {
    /// Create a client for `endpoint` (the full `/translate` URL).
    pub fn new(endpoint: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        url::Url::parse(endpoint).context("TRANSLATION_API_URL is not a valid URL")?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build translation HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key,
        })
    }

    /// Provider language code for a layout language key.
    fn source_code(source_language: &str) -> &str {
        if source_language == DEFAULT_LANGUAGE {
            "auto"
        } else {
            source_language
        }
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate_text(
        &self,
        text: &str,
        target_language: &str,
        source_language: &str,
    ) -> Result<String> {
        let request = TranslateRequest {
            q: text,
            source: Self::source_code(source_language),
            target: target_language,
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .context("translation request failed")?
            .error_for_status()
            .context("translation provider returned an error status")?;

        let body: TranslateResponse = response
            .json()
            .await
            .context("translation provider returned an unexpected body")?;

        Ok(body.translated_text)
    }
}

impl std::fmt::Debug for HttpTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTranslator")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Build the translator selected by configuration.
pub fn from_config(config: &Config) -> Result<std::sync::Arc<dyn Translator>> {
    match config.translation_api_url.as_deref() {
        Some(endpoint) => Ok(std::sync::Arc::new(HttpTranslator::new(
            endpoint,
            config.translation_api_key.clone(),
            Duration::from_secs(config.translation_timeout_secs),
        )?)),
        None => Ok(std::sync::Arc::new(PassthroughTranslator)),
    }
}
