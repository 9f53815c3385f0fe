//! Translation fan-out.
//!
//! A default-language save is propagated into one translated layout row per
//! configured target language. Languages are processed sequentially and one
//! provider call is made per text leaf. A failed leaf keeps its original text;
//! a failed language is logged and skipped without affecting its siblings.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::LayoutResult;
use crate::metrics::Metrics;
use crate::models::PageKey;
use crate::services::languages;
use crate::services::layout_text::{TextMap, extract_translatable_text, inject_translated_text};
use crate::services::translator::Translator;
use crate::services::upsert::{LayoutUpsert, UpsertOutcome};
use crate::storage::Storage;

/// Result of one fan-out pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FanoutReport {
    pub page_id: i64,

    /// Languages whose row was written.
    pub translated: Vec<String>,

    /// Languages that failed, as `language: error`.
    pub failed: Vec<String>,

    /// Leaves that fell back to the original text, across all languages.
    pub leaf_failures: u64,

    /// Set when the pass could not start (e.g. settings unreadable).
    pub error: Option<String>,
}

impl FanoutReport {
    fn new(page_id: i64) -> Self {
        Self {
            page_id,
            ..Default::default()
        }
    }

    /// Nothing was attempted.
    pub fn is_noop(&self) -> bool {
        self.translated.is_empty() && self.failed.is_empty() && self.error.is_none()
    }
}

/// Propagates default-language layouts into translated copies.
pub struct TranslationFanout {
    storage: Arc<dyn Storage>,
    translator: Arc<dyn Translator>,
    metrics: Arc<Metrics>,
}

impl TranslationFanout {
    pub fn new(
        storage: Arc<dyn Storage>,
        translator: Arc<dyn Translator>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            storage,
            translator,
            metrics,
        }
    }

    /// Translate `layout` into every target language of the tenant and upsert each result.
    ///
    /// Never fails: problems are logged, counted and reported.
    pub async fn translate_layout_to_all_languages(
        &self,
        page_id: i64,
        layout: &Value,
        tenant_id: &str,
    ) -> FanoutReport {
        let mut report = FanoutReport::new(page_id);
        let storage = self.storage.as_ref();

        let targets = match languages::target_languages(storage, tenant_id).await {
            Ok(targets) => targets,
            Err(e) => {
                warn!(page_id, tenant_id = %tenant_id, error = %e, "cannot read content languages");
                report.error = Some(e.to_string());
                return report;
            }
        };
        if targets.is_empty() {
            debug!(page_id, tenant_id = %tenant_id, "no target languages configured");
            return report;
        }

        let texts = extract_translatable_text(layout);
        if texts.is_empty() {
            debug!(page_id, "layout has no translatable text");
            return report;
        }

        let source = match languages::default_language(storage, tenant_id).await {
            Ok(source) => source,
            Err(e) => {
                warn!(page_id, error = %e, "cannot read default language; assuming \"default\"");
                crate::models::DEFAULT_LANGUAGE.to_string()
            }
        };

        for target in &targets {
            let (translated, failures) = self.translate_texts(&texts, target, &source).await;
            report.leaf_failures += failures;

            match self.write_language(page_id, target, layout, &translated).await {
                Ok(outcome) => {
                    self.metrics.record_language(target, true);
                    info!(
                        page_id,
                        language = %target,
                        outcome = outcome.as_str(),
                        leaves = texts.len(),
                        leaf_failures = failures,
                        "translated layout saved"
                    );
                    report.translated.push(target.clone());
                }
                Err(e) => {
                    self.metrics.record_language(target, false);
                    warn!(page_id, language = %target, error = %e, "translation for language failed");
                    report.failed.push(format!("{target}: {e}"));
                }
            }
        }

        report
    }

    /// Translate every leaf, keeping the original text where the provider fails.
    async fn translate_texts(&self, texts: &TextMap, target: &str, source: &str) -> (TextMap, u64) {
        let mut translated = TextMap::new();
        let mut failures = 0;

        for (path, text) in texts {
            match self.translator.translate_text(text, target, source).await {
                Ok(result) => {
                    translated.insert(path.clone(), result);
                }
                Err(e) => {
                    failures += 1;
                    self.metrics.record_leaf_failure(target);
                    warn!(language = %target, path = %path, error = %e, "leaf translation failed; keeping original");
                    translated.insert(path.clone(), text.clone());
                }
            }
        }

        (translated, failures)
    }

    async fn write_language(
        &self,
        page_id: i64,
        language: &str,
        layout: &Value,
        translated: &TextMap,
    ) -> LayoutResult<UpsertOutcome> {
        let tree = inject_translated_text(layout, translated);
        let key = PageKey::Id(page_id);
        let outcome = LayoutUpsert::new(self.storage.as_ref(), &key, language, &tree)
            .run()
            .await?;
        self.metrics.record_upsert(outcome.as_str());
        Ok(outcome)
    }
}

impl std::fmt::Debug for TranslationFanout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslationFanout").finish_non_exhaustive()
    }
}
