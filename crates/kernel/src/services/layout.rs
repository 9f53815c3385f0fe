//! Layout engine.
//!
//! Entry point for saving and reading page layouts. A save validates the
//! document, checks page ownership, upserts the (page, language) row, reads
//! it back, and for the tenant's default language queues a translation
//! fan-out. The save returns as soon as its own row is written; translated
//! languages catch up in the background.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{LayoutError, LayoutResult};
use crate::metrics::Metrics;
use crate::models::{DEFAULT_LANGUAGE, LayoutSnapshot, PageKey, component_count, validate_layout};
use crate::schema::{SchemaReport, repair_schema};
use crate::services::languages;
use crate::services::queue::{TranslationJob, TranslationQueue};
use crate::services::upsert::{LayoutUpsert, UpsertOutcome};
use crate::storage::Storage;

/// Saves and serves page layouts.
#[derive(Clone)]
pub struct LayoutEngine {
    storage: Arc<dyn Storage>,
    metrics: Arc<Metrics>,
    queue: Option<TranslationQueue>,
}

impl LayoutEngine {
    /// Engine without translation fan-out.
    pub fn new(storage: Arc<dyn Storage>, metrics: Arc<Metrics>) -> Self {
        Self {
            storage,
            metrics,
            queue: None,
        }
    }

    /// Queue default-language saves for translation.
    pub fn with_translation_queue(mut self, queue: TranslationQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Run the idempotent schema repair. Call once at startup.
    pub async fn prepare_schema(&self) -> SchemaReport {
        repair_schema(self.storage.as_ref()).await
    }

    /// Create or update the (page, language) layout row without any page checks.
    pub async fn upsert_page_layout(
        &self,
        key: &PageKey,
        layout: &Value,
        language: &str,
    ) -> LayoutResult<UpsertOutcome> {
        let outcome = LayoutUpsert::new(self.storage.as_ref(), key, language, layout)
            .run()
            .await?;
        self.metrics.record_upsert(outcome.as_str());
        Ok(outcome)
    }

    /// Save a page layout on behalf of a tenant.
    ///
    /// Returns `Ok(false)` when the page does not exist or belongs to another
    /// tenant, and `Ok(true)` once the row is written and read back.
    pub async fn update_page_layout(
        &self,
        page_id: impl Into<PageKey>,
        layout: &Value,
        tenant_id: &str,
        language: &str,
        theme_id: Option<&str>,
    ) -> LayoutResult<bool> {
        let key = page_id.into();
        if tenant_id.trim().is_empty() {
            return Err(LayoutError::MissingTenant);
        }
        validate_layout(layout)?;

        let page = match self.storage.find_page(&key).await {
            Ok(Some(page)) => page,
            Ok(None) => {
                debug!(page_id = %key, tenant_id = %tenant_id, "page not found; nothing to save");
                return Ok(false);
            }
            Err(e) => {
                warn!(page_id = %key, error = %e, "page lookup failed; nothing saved");
                return Ok(false);
            }
        };

        if page.is_master() {
            return Err(LayoutError::MasterPageImmutable(page.id));
        }
        if !page.is_owned_by(tenant_id) {
            debug!(page_id = page.id, tenant_id = %tenant_id, "page belongs to another tenant");
            return Ok(false);
        }

        let outcome = self.upsert_page_layout(&key, layout, language).await?;

        let Some(saved) = self.storage.find_layout(&key, language).await? else {
            return Err(LayoutError::VerificationFailed {
                page_id: key.to_string(),
                language: language.to_string(),
            });
        };

        // Bound only once the layout row is confirmed.
        if let Some(theme_id) = theme_id {
            self.storage
                .set_page_theme(page.id, tenant_id, theme_id)
                .await?;
        }

        info!(
            page_id = page.id,
            tenant_id = %tenant_id,
            language = %language,
            version = saved.version,
            components = component_count(layout),
            outcome = outcome.as_str(),
            "layout saved"
        );

        if self.is_source_language(language, tenant_id).await {
            self.queue_translation(page.id, tenant_id, layout);
        }

        Ok(true)
    }

    /// Read a layout by page slug, falling back to the default language.
    pub async fn get_layout_by_slug(
        &self,
        slug: &str,
        language: &str,
        tenant_id: Option<&str>,
    ) -> LayoutResult<Option<LayoutSnapshot>> {
        let found = self
            .storage
            .find_layout_by_slug(slug, language, tenant_id)
            .await?;
        if found.is_some() || language == DEFAULT_LANGUAGE {
            return Ok(found);
        }

        debug!(slug = %slug, language = %language, "no layout for language; using default");
        Ok(self
            .storage
            .find_layout_by_slug(slug, DEFAULT_LANGUAGE, tenant_id)
            .await?)
    }

    async fn is_source_language(&self, language: &str, tenant_id: &str) -> bool {
        if language == DEFAULT_LANGUAGE {
            return true;
        }
        match languages::default_language(self.storage.as_ref(), tenant_id).await {
            Ok(tenant_default) => languages::is_default_language(language, &tenant_default),
            Err(e) => {
                warn!(tenant_id = %tenant_id, error = %e, "cannot read default language");
                false
            }
        }
    }

    fn queue_translation(&self, page_id: i64, tenant_id: &str, layout: &Value) {
        let Some(queue) = &self.queue else {
            return;
        };
        let job = TranslationJob::new(page_id, tenant_id, layout.clone());
        if let Ok(job_id) = queue.submit(job) {
            debug!(job_id = %job_id, page_id, "translation job queued");
        }
    }
}

impl std::fmt::Debug for LayoutEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutEngine")
            .field("translation", &self.queue.is_some())
            .finish_non_exhaustive()
    }
}
