//! Prometheus metrics collection.
//!
//! Counts layout saves and translation fan-out outcomes.

use prometheus_client::encoding::{EncodeLabelSet, text::encode};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

/// Layout upsert labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct UpsertLabels {
    /// updated, inserted or healed.
    pub outcome: String,
}

/// Per-language translation labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TranslationLabels {
    pub language: String,
    /// ok or failed.
    pub status: String,
}

/// Per-language labels without status.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct LanguageLabels {
    pub language: String,
}

/// Application metrics.
pub struct Metrics {
    registry: Registry,

    /// Successful layout upserts by outcome.
    pub layout_upserts: Family<UpsertLabels, Counter>,

    /// Translated languages by outcome.
    pub translation_languages: Family<TranslationLabels, Counter>,

    /// Leaves that fell back to the original text.
    pub translation_leaf_failures: Family<LanguageLabels, Counter>,

    /// Fan-out jobs dropped because the queue was full or closed.
    pub translation_jobs_dropped: Counter,
}

impl Metrics {
    /// Create a new metrics registry.
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("folio");

        let layout_upserts = Family::<UpsertLabels, Counter>::default();
        registry.register(
            "layout_upserts",
            "Layout rows written, by outcome",
            layout_upserts.clone(),
        );

        let translation_languages = Family::<TranslationLabels, Counter>::default();
        registry.register(
            "translation_languages",
            "Languages processed by translation fan-out, by status",
            translation_languages.clone(),
        );

        let translation_leaf_failures = Family::<LanguageLabels, Counter>::default();
        registry.register(
            "translation_leaf_failures",
            "Text leaves left untranslated after a provider error",
            translation_leaf_failures.clone(),
        );

        let translation_jobs_dropped = Counter::default();
        registry.register(
            "translation_jobs_dropped",
            "Translation jobs dropped before reaching the worker",
            translation_jobs_dropped.clone(),
        );

        Self {
            registry,
            layout_upserts,
            translation_languages,
            translation_leaf_failures,
            translation_jobs_dropped,
        }
    }

    pub fn record_upsert(&self, outcome: &str) {
        self.layout_upserts
            .get_or_create(&UpsertLabels {
                outcome: outcome.to_string(),
            })
            .inc();
    }

    pub fn record_language(&self, language: &str, ok: bool) {
        self.translation_languages
            .get_or_create(&TranslationLabels {
                language: language.to_string(),
                status: if ok { "ok" } else { "failed" }.to_string(),
            })
            .inc();
    }

    pub fn record_leaf_failure(&self, language: &str) {
        self.translation_leaf_failures
            .get_or_create(&LanguageLabels {
                language: language.to_string(),
            })
            .inc();
    }

    /// Encode metrics in Prometheus text format.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::warn!("failed to encode metrics");
        }
        buffer
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_exposition() {
        let metrics = Metrics::new();
        metrics.record_upsert("inserted");
        metrics.record_language("fr", true);
        metrics.record_language("es", false);
        metrics.record_leaf_failure("es");
        metrics.translation_jobs_dropped.inc();

        let output = metrics.encode();
        assert!(output.contains("folio_layout_upserts_total{outcome=\"inserted\"} 1"));
        assert!(output.contains("folio_translation_languages_total{language=\"es\",status=\"failed\"} 1"));
        assert!(output.contains("folio_translation_leaf_failures_total{language=\"es\"} 1"));
        assert!(output.contains("folio_translation_jobs_dropped_total 1"));
    }

    #[test]
    fn family_counts_per_label() {
        let metrics = Metrics::new();
        metrics.record_upsert("updated");
        metrics.record_upsert("updated");

        let count = metrics
            .layout_upserts
            .get_or_create(&UpsertLabels {
                outcome: "updated".into(),
            })
            .get();
        assert_eq!(count, 2);
    }
}
