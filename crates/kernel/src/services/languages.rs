//! Tenant language settings.
//!
//! Languages are configured per tenant in the settings table:
//! `site_content_languages` holds a comma-joined list of language codes and
//! `site_language` names the default (source) language.

use crate::error::DbError;
use crate::models::DEFAULT_LANGUAGE;
use crate::storage::SettingsStorage;

/// Setting holding the comma-joined list of content languages.
pub const CONTENT_LANGUAGES_KEY: &str = "site_content_languages";

/// Setting holding the default language code.
pub const DEFAULT_LANGUAGE_KEY: &str = "site_language";

/// Split a comma-joined language list, dropping blanks and repeats.
pub fn parse_language_list(raw: &str) -> Vec<String> {
    let mut languages: Vec<String> = Vec::new();
    for code in raw.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        if !languages.iter().any(|l| l == code) {
            languages.push(code.to_string());
        }
    }
    languages
}

/// Languages to translate into: configured minus the default minus `"default"`.
pub fn target_languages_from(configured: &[String], default_language: &str) -> Vec<String> {
    configured
        .iter()
        .filter(|l| l.as_str() != default_language && l.as_str() != DEFAULT_LANGUAGE)
        .cloned()
        .collect()
}

/// Configured content languages for a tenant; empty when unset.
pub async fn configured_languages<S>(settings: &S, tenant_id: &str) -> Result<Vec<String>, DbError>
where
    S: SettingsStorage + ?Sized,
{
    let raw = settings.get_setting(tenant_id, CONTENT_LANGUAGES_KEY).await?;
    Ok(raw.as_deref().map(parse_language_list).unwrap_or_default())
}

/// Default language for a tenant; `"default"` when unset.
pub async fn default_language<S>(settings: &S, tenant_id: &str) -> Result<String, DbError>
where
    S: SettingsStorage + ?Sized,
{
    let raw = settings.get_setting(tenant_id, DEFAULT_LANGUAGE_KEY).await?;
    Ok(raw
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()))
}

/// Languages a default-language save should fan out to.
pub async fn target_languages<S>(settings: &S, tenant_id: &str) -> Result<Vec<String>, DbError>
where
    S: SettingsStorage + ?Sized,
{
    let configured = configured_languages(settings, tenant_id).await?;
    if configured.is_empty() {
        return Ok(Vec::new());
    }
    let default = default_language(settings, tenant_id).await?;
    Ok(target_languages_from(&configured, &default))
}

/// Whether `language` is the tenant's source language.
pub fn is_default_language(language: &str, tenant_default: &str) -> bool {
    language == DEFAULT_LANGUAGE || language == tenant_default
}
