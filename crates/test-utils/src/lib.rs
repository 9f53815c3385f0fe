//! Folio test utilities.
//!
//! Helpers for integration testing: an in-memory storage backend, fake
//! translation providers, page and layout fixtures, and assertion helpers
//! for layout documents.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{Value, json};

use folio_kernel::error::DbError;
use folio_kernel::models::{
    LayoutRowKey, LayoutSnapshot, NewPageVersion, Page, PageKey, PageLayout, PageVersion,
    UpdatePage,
};
use folio_kernel::services::Translator;
use folio_kernel::storage::{PageStorage, SchemaMaintenance, SettingsStorage, VersionStorage};

/// Create a tenant-owned test page.
pub fn test_page(id: i64, tenant_id: &str) -> TestPage {
    TestPage {
        id,
        tenant_id: Some(tenant_id.to_string()),
        slug: format!("page-{id}"),
        title: format!("Page {id}"),
        page_type: "page".to_string(),
        status: "draft".to_string(),
        theme_id: None,
    }
}

/// Create a master page (no owning tenant).
pub fn master_page(id: i64) -> TestPage {
    TestPage {
        tenant_id: None,
        ..test_page(id, "")
    }
}

/// A page builder for creating test fixtures.
#[derive(Debug, Clone)]
pub struct TestPage {
    pub id: i64,
    pub tenant_id: Option<String>,
    pub slug: String,
    pub title: String,
    pub page_type: String,
    pub status: String,
    pub theme_id: Option<String>,
}

impl TestPage {
    /// Set the slug.
    pub fn with_slug(mut self, slug: &str) -> Self {
        self.slug = slug.to_string();
        self
    }

    /// Set the title.
    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    /// Set as published.
    pub fn published(mut self) -> Self {
        self.status = "published".to_string();
        self
    }

    /// Bind a theme.
    pub fn with_theme(mut self, theme_id: &str) -> Self {
        self.theme_id = Some(theme_id.to_string());
        self
    }
}

impl From<TestPage> for Page {
    fn from(p: TestPage) -> Self {
        let now = Utc::now();
        Page {
            id: p.id,
            tenant_id: p.tenant_id,
            slug: p.slug,
            title: p.title,
            page_type: p.page_type,
            status: p.status,
            theme_id: p.theme_id,
            meta_title: None,
            meta_description: None,
            seo_keywords: None,
            seo_index: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Layout documents for testing.
pub mod layouts {
    use serde_json::{Value, json};

    /// A single hero component with the given headline.
    pub fn hero(headline: &str) -> Value {
        json!({
            "components": [
                {"id": "c1", "type": "hero", "props": {"headline": headline}}
            ]
        })
    }

    /// A landing page mixing prose with structural fields.
    pub fn landing() -> Value {
        json!({
            "components": [
                {
                    "id": "hero-1",
                    "type": "hero",
                    "props": {
                        "headline": "Build better pages",
                        "subheadline": "Drag, drop and publish in minutes",
                        "image": "https://cdn.example.com/hero.png",
                        "link": "/signup"
                    }
                },
                {
                    "id": "features-1",
                    "type": "features",
                    "props": {
                        "items": [
                            {"title": "Fast editing", "icon": "bolt", "sort_order": 1},
                            {"title": "Every language", "icon": "globe", "sort_order": 2}
                        ]
                    }
                },
                {
                    "id": "contact-1",
                    "type": "contact",
                    "props": {
                        "email": "Write to hello@example.com any time",
                        "phoneNumber": "+1 555 0100",
                        "cta": "Get in touch"
                    }
                }
            ]
        })
    }
}

#[derive(Debug, Default)]
struct State {
    pages: Vec<Page>,
    layouts: Vec<PageLayout>,
    versions: Vec<PageVersion>,
    settings: HashMap<(String, String), String>,
    next_layout_id: i64,
    next_version_id: i64,
    language_column: bool,
    legacy_page_unique: bool,
    layout_unique: bool,
    failing_languages: HashSet<String>,
    version_conflicts: u32,
}

/// In-memory storage backend.
///
/// Mirrors the Postgres backend's matching rules: raw keys match strictly on
/// update and leniently (trimmed) on lookup. Every operation yields to the
/// scheduler before touching state, so concurrent callers interleave.
#[derive(Debug)]
pub struct MemoryStorage {
    state: Mutex<State>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    /// Storage with the current schema in place.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                language_column: true,
                layout_unique: true,
                next_layout_id: 1,
                next_version_id: 1,
                ..Default::default()
            }),
        }
    }

    /// Storage with the pre-translation schema: no `language` column, a
    /// `UNIQUE(page_id)` constraint and no composite constraint.
    pub fn legacy() -> Self {
        let storage = Self::new();
        {
            let mut state = storage.state.lock();
            state.language_column = false;
            state.legacy_page_unique = true;
            state.layout_unique = false;
        }
        storage
    }

    /// Storage without the composite unique constraint.
    pub fn without_unique_constraint() -> Self {
        let storage = Self::new();
        storage.state.lock().layout_unique = false;
        storage
    }

    pub fn add_page(&self, page: impl Into<Page>) {
        self.state.lock().pages.push(page.into());
    }

    pub fn set_setting(&self, tenant_id: &str, key: &str, value: &str) {
        self.state
            .lock()
            .settings
            .insert((tenant_id.to_string(), key.to_string()), value.to_string());
    }

    /// Configure a tenant's content languages and default language.
    pub fn configure_languages(&self, tenant_id: &str, languages: &str, default: &str) {
        self.set_setting(tenant_id, "site_content_languages", languages);
        self.set_setting(tenant_id, "site_language", default);
    }

    /// Make every layout write for `language` fail.
    pub fn fail_layout_writes_for(&self, language: &str) {
        self.state.lock().failing_languages.insert(language.to_string());
    }

    /// Make the next `n` version appends fail with a unique violation.
    pub fn force_version_conflicts(&self, n: u32) {
        self.state.lock().version_conflicts = n;
    }

    /// Insert a layout row directly, bypassing every constraint.
    pub fn seed_layout(
        &self,
        page_id: i64,
        language: &str,
        layout: Value,
        version: i32,
        updated_at: DateTime<Utc>,
    ) -> i64 {
        let mut state = self.state.lock();
        let id = state.next_layout_id;
        state.next_layout_id += 1;
        state.layouts.push(PageLayout {
            id,
            page_id,
            language: language.to_string(),
            layout_json: layout,
            version,
            updated_at,
        });
        id
    }

    pub fn page(&self, id: i64) -> Option<Page> {
        self.state.lock().pages.iter().find(|p| p.id == id).cloned()
    }

    /// Every layout row for (page, language), in insertion order.
    pub fn layout_rows(&self, page_id: i64, language: &str) -> Vec<PageLayout> {
        self.state
            .lock()
            .layouts
            .iter()
            .filter(|l| l.page_id == page_id && l.language == language)
            .cloned()
            .collect()
    }

    /// The single layout row for (page, language); panics on duplicates.
    pub fn layout(&self, page_id: i64, language: &str) -> Option<PageLayout> {
        let rows = self.layout_rows(page_id, language);
        assert!(
            rows.len() <= 1,
            "expected at most one layout row for ({page_id}, {language}), found {}",
            rows.len()
        );
        rows.into_iter().next()
    }

    pub fn layout_count(&self) -> usize {
        self.state.lock().layouts.len()
    }

    pub fn versions(&self, page_id: i64) -> Vec<PageVersion> {
        self.state
            .lock()
            .versions
            .iter()
            .filter(|v| v.page_id == page_id)
            .cloned()
            .collect()
    }

    pub fn has_unique_constraint(&self) -> bool {
        self.state.lock().layout_unique
    }

    fn check_writable(state: &State, language: &str) -> Result<(), DbError> {
        if state.failing_languages.contains(language) {
            return Err(DbError::Query {
                code: None,
                message: format!("injected write failure for {language}"),
            });
        }
        Ok(())
    }
}

async fn pause() {
    tokio::task::yield_now().await;
}

fn raw_key_matches(id: i64, key: &PageKey, strict: bool) -> bool {
    match key {
        PageKey::Id(k) => *k == id,
        PageKey::Raw(raw) if strict => id.to_string() == *raw,
        PageKey::Raw(raw) => id.to_string() == raw.trim(),
    }
}

#[async_trait]
impl PageStorage for MemoryStorage {
    async fn find_page(&self, key: &PageKey) -> Result<Option<Page>, DbError> {
        pause().await;
        let state = self.state.lock();
        Ok(state
            .pages
            .iter()
            .find(|p| raw_key_matches(p.id, key, false))
            .cloned())
    }

    async fn update_page(
        &self,
        page_id: i64,
        tenant_id: &str,
        input: &UpdatePage,
    ) -> Result<u64, DbError> {
        pause().await;
        let mut state = self.state.lock();
        let Some(page) = state
            .pages
            .iter_mut()
            .find(|p| p.id == page_id && p.is_owned_by(tenant_id))
        else {
            return Ok(0);
        };

        if let Some(title) = &input.title {
            page.title.clone_from(title);
        }
        if let Some(slug) = &input.slug {
            page.slug.clone_from(slug);
        }
        if let Some(status) = &input.status {
            page.status.clone_from(status);
        }
        if let Some(theme_id) = &input.theme_id {
            page.theme_id = Some(theme_id.clone());
        }
        if let Some(meta_title) = &input.meta_title {
            page.meta_title = Some(meta_title.clone());
        }
        if let Some(meta_description) = &input.meta_description {
            page.meta_description = Some(meta_description.clone());
        }
        if let Some(seo_keywords) = &input.seo_keywords {
            page.seo_keywords = Some(seo_keywords.clone());
        }
        if let Some(seo_index) = input.seo_index {
            page.seo_index = seo_index;
        }
        page.updated_at = Utc::now();
        Ok(1)
    }

    async fn delete_page(&self, page_id: i64, tenant_id: &str) -> Result<u64, DbError> {
        pause().await;
        let mut state = self.state.lock();
        let before = state.pages.len();
        state
            .pages
            .retain(|p| !(p.id == page_id && p.is_owned_by(tenant_id)));
        let removed = (before - state.pages.len()) as u64;
        if removed > 0 {
            state.layouts.retain(|l| l.page_id != page_id);
        }
        Ok(removed)
    }

    async fn set_page_theme(
        &self,
        page_id: i64,
        tenant_id: &str,
        theme_id: &str,
    ) -> Result<u64, DbError> {
        pause().await;
        let mut state = self.state.lock();
        match state
            .pages
            .iter_mut()
            .find(|p| p.id == page_id && p.is_owned_by(tenant_id))
        {
            Some(page) => {
                page.theme_id = Some(theme_id.to_string());
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn update_layout(
        &self,
        key: &PageKey,
        language: &str,
        layout: &Value,
    ) -> Result<u64, DbError> {
        pause().await;
        let mut state = self.state.lock();
        Self::check_writable(&state, language)?;

        let now = Utc::now();
        let mut rows = 0;
        for row in state
            .layouts
            .iter_mut()
            .filter(|l| l.language == language && raw_key_matches(l.page_id, key, true))
        {
            row.layout_json = layout.clone();
            row.version += 1;
            row.updated_at = now;
            rows += 1;
        }
        Ok(rows)
    }

    async fn find_layout(
        &self,
        key: &PageKey,
        language: &str,
    ) -> Result<Option<PageLayout>, DbError> {
        pause().await;
        let state = self.state.lock();
        Ok(state
            .layouts
            .iter()
            .filter(|l| l.language == language && raw_key_matches(l.page_id, key, false))
            .max_by_key(|l| (l.updated_at, l.id))
            .cloned())
    }

    async fn insert_layout(
        &self,
        key: &PageKey,
        language: &str,
        layout: &Value,
    ) -> Result<PageLayout, DbError> {
        pause().await;
        let mut state = self.state.lock();
        Self::check_writable(&state, language)?;

        let page_id = match key {
            PageKey::Id(id) => *id,
            PageKey::Raw(raw) => raw.trim().parse().map_err(|_| {
                DbError::from_code("22P02", format!("invalid input syntax for type bigint: {raw:?}"))
            })?,
        };

        if !state.pages.iter().any(|p| p.id == page_id) {
            return Err(DbError::ForeignKeyViolation(
                "page_layouts_page_id_fkey".to_string(),
            ));
        }
        if state.legacy_page_unique && state.layouts.iter().any(|l| l.page_id == page_id) {
            return Err(DbError::UniqueViolation("page_layouts_page_id_key".to_string()));
        }
        if state.layout_unique
            && state
                .layouts
                .iter()
                .any(|l| l.page_id == page_id && l.language == language)
        {
            return Err(DbError::UniqueViolation(
                "page_layouts_page_id_language_key".to_string(),
            ));
        }

        let row = PageLayout {
            id: state.next_layout_id,
            page_id,
            language: language.to_string(),
            layout_json: layout.clone(),
            version: 1,
            updated_at: Utc::now(),
        };
        state.next_layout_id += 1;
        state.layouts.push(row.clone());
        Ok(row)
    }

    async fn find_layout_by_slug(
        &self,
        slug: &str,
        language: &str,
        tenant_id: Option<&str>,
    ) -> Result<Option<LayoutSnapshot>, DbError> {
        pause().await;
        let state = self.state.lock();

        let rank = |page: &Page| match (tenant_id, page.tenant_id.as_deref()) {
            (Some(t), Some(owner)) if t == owner => 0,
            (_, None) => 1,
            _ => 2,
        };

        let mut candidates: Vec<(&Page, &PageLayout)> = state
            .pages
            .iter()
            .filter(|p| p.slug == slug)
            .filter(|p| match tenant_id {
                Some(t) => p.tenant_id.is_none() || p.is_owned_by(t),
                None => true,
            })
            .flat_map(|p| {
                state
                    .layouts
                    .iter()
                    .filter(move |l| l.page_id == p.id && l.language == language)
                    .map(move |l| (p, l))
            })
            .collect();

        candidates.sort_by(|(pa, la), (pb, lb)| {
            rank(pa)
                .cmp(&rank(pb))
                .then(pa.id.cmp(&pb.id))
                .then(lb.updated_at.cmp(&la.updated_at))
        });

        Ok(candidates
            .first()
            .map(|(_, l)| LayoutSnapshot::from((*l).clone())))
    }
}

#[async_trait]
impl SchemaMaintenance for MemoryStorage {
    async fn ensure_tables(&self) -> Result<(), DbError> {
        pause().await;
        Ok(())
    }

    async fn ensure_language_column(&self) -> Result<bool, DbError> {
        pause().await;
        let mut state = self.state.lock();
        if state.language_column {
            return Ok(false);
        }
        state.language_column = true;
        Ok(true)
    }

    async fn drop_legacy_page_unique(&self) -> Result<bool, DbError> {
        pause().await;
        let mut state = self.state.lock();
        Ok(std::mem::replace(&mut state.legacy_page_unique, false))
    }

    async fn has_layout_unique_constraint(&self) -> Result<bool, DbError> {
        pause().await;
        Ok(self.state.lock().layout_unique)
    }

    async fn add_layout_unique_constraint(&self) -> Result<(), DbError> {
        pause().await;
        let mut state = self.state.lock();
        let mut seen = HashSet::new();
        let duplicated = state
            .layouts
            .iter()
            .any(|l| !seen.insert((l.page_id, l.language.clone())));
        if duplicated {
            return Err(DbError::UniqueViolation(
                "page_layouts_page_id_language_key".to_string(),
            ));
        }
        state.layout_unique = true;
        Ok(())
    }

    async fn duplicate_layout_rows(&self) -> Result<Vec<LayoutRowKey>, DbError> {
        pause().await;
        let state = self.state.lock();
        let mut counts: HashMap<(i64, &str), usize> = HashMap::new();
        for l in &state.layouts {
            *counts.entry((l.page_id, l.language.as_str())).or_default() += 1;
        }
        Ok(state
            .layouts
            .iter()
            .filter(|l| counts[&(l.page_id, l.language.as_str())] > 1)
            .map(|l| LayoutRowKey {
                id: l.id,
                page_id: l.page_id,
                language: l.language.clone(),
                updated_at: l.updated_at,
            })
            .collect())
    }

    async fn delete_layout_rows(&self, ids: &[i64]) -> Result<u64, DbError> {
        pause().await;
        let mut state = self.state.lock();
        let before = state.layouts.len();
        state.layouts.retain(|l| !ids.contains(&l.id));
        Ok((before - state.layouts.len()) as u64)
    }
}

#[async_trait]
impl SettingsStorage for MemoryStorage {
    async fn get_setting(&self, tenant_id: &str, key: &str) -> Result<Option<String>, DbError> {
        pause().await;
        Ok(self
            .state
            .lock()
            .settings
            .get(&(tenant_id.to_string(), key.to_string()))
            .cloned())
    }
}

#[async_trait]
impl VersionStorage for MemoryStorage {
    async fn append_version(&self, version: &NewPageVersion) -> Result<PageVersion, DbError> {
        pause().await;
        let mut state = self.state.lock();
        if state.version_conflicts > 0 {
            state.version_conflicts -= 1;
            return Err(DbError::UniqueViolation("page_versions_number_idx".to_string()));
        }

        let next = state
            .versions
            .iter()
            .filter(|v| v.page_id == version.page_id && v.tenant_id == version.tenant_id)
            .map(|v| v.version_number)
            .max()
            .unwrap_or(0)
            + 1;

        let row = PageVersion {
            id: state.next_version_id,
            page_id: version.page_id,
            tenant_id: version.tenant_id.clone(),
            version_number: next,
            title: version.title.clone(),
            slug: version.slug.clone(),
            page_type: version.page_type.clone(),
            status: version.status.clone(),
            theme_id: version.theme_id.clone(),
            meta_title: version.meta_title.clone(),
            meta_description: version.meta_description.clone(),
            seo_keywords: version.seo_keywords.clone(),
            seo_index: version.seo_index,
            layout_json: version.layout_json.clone(),
            created_by: version.created_by.clone(),
            comment: version.comment.clone(),
            created_at: Utc::now(),
        };
        state.next_version_id += 1;
        state.versions.push(row.clone());
        Ok(row)
    }

    async fn list_versions(
        &self,
        page_id: i64,
        tenant_id: &str,
    ) -> Result<Vec<PageVersion>, DbError> {
        pause().await;
        let state = self.state.lock();
        let mut rows: Vec<PageVersion> = state
            .versions
            .iter()
            .filter(|v| v.page_id == page_id && v.tenant_id == tenant_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.version_number.cmp(&a.version_number));
        Ok(rows)
    }

    async fn find_version(
        &self,
        page_id: i64,
        tenant_id: &str,
        version_number: i32,
    ) -> Result<Option<PageVersion>, DbError> {
        pause().await;
        let state = self.state.lock();
        Ok(state
            .versions
            .iter()
            .find(|v| {
                v.page_id == page_id && v.tenant_id == tenant_id && v.version_number == version_number
            })
            .cloned())
    }
}

/// A recorded translation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationCall {
    pub text: String,
    pub target: String,
    pub source: String,
}

/// Translation provider for tests.
///
/// Prefixes text with the target language (`"[fr] Hello there"`), records
/// every call, and fails for the languages it is told to.
#[derive(Debug, Default)]
pub struct FakeTranslator {
    failing: HashSet<String>,
    calls: Mutex<Vec<TranslationCall>>,
}

impl FakeTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every request into `language`.
    pub fn failing_for(mut self, language: &str) -> Self {
        self.failing.insert(language.to_string());
        self
    }

    pub fn calls(&self) -> Vec<TranslationCall> {
        self.calls.lock().clone()
    }

    /// The translation this fake produces for `text`.
    pub fn expected(text: &str, target: &str) -> String {
        format!("[{target}] {text}")
    }
}

#[async_trait]
impl Translator for FakeTranslator {
    async fn translate_text(
        &self,
        text: &str,
        target_language: &str,
        source_language: &str,
    ) -> anyhow::Result<String> {
        self.calls.lock().push(TranslationCall {
            text: text.to_string(),
            target: target_language.to_string(),
            source: source_language.to_string(),
        });
        tokio::task::yield_now().await;

        if self.failing.contains(target_language) {
            anyhow::bail!("provider rejected language {target_language}");
        }
        Ok(Self::expected(text, target_language))
    }
}

/// Assertion helpers for layout documents.
pub mod assert {
    use serde_json::Value;

    /// Assert that a JSON value has a specific key.
    pub fn has_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_some(),
            "Expected JSON to have key '{key}', got: {value}"
        );
    }

    /// Assert that a JSON value equals expected.
    pub fn json_eq(actual: &Value, expected: &Value) {
        assert_eq!(
            actual,
            expected,
            "JSON mismatch:\nactual: {}\nexpected: {}",
            serde_json::to_string_pretty(actual).unwrap_or_default(),
            serde_json::to_string_pretty(expected).unwrap_or_default()
        );
    }

    /// Assert that two layouts have the same component ids and types, in order.
    pub fn same_components(actual: &Value, expected: &Value) {
        let shape = |layout: &Value| -> Vec<(Value, Value)> {
            layout
                .get("components")
                .and_then(Value::as_array)
                .map(|components| {
                    components
                        .iter()
                        .map(|c| (c["id"].clone(), c["type"].clone()))
                        .collect()
                })
                .unwrap_or_default()
        };
        assert_eq!(
            shape(actual),
            shape(expected),
            "component ids/types differ:\nactual: {actual}\nexpected: {expected}"
        );
    }

    /// Assert that a string contains a substring.
    pub fn contains(haystack: &str, needle: &str) {
        assert!(
            haystack.contains(needle),
            "Expected string to contain '{needle}'\nActual: {haystack}"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn page_builder() {
        let page: Page = test_page(42, "t1").with_slug("home").published().into();
        assert_eq!(page.id, 42);
        assert_eq!(page.slug, "home");
        assert_eq!(page.status, "published");
        assert!(page.is_owned_by("t1"));

        let master: Page = master_page(1).into();
        assert!(master.is_master());
    }

    #[tokio::test]
    async fn raw_keys_match_strictly_on_update_only() {
        let storage = MemoryStorage::new();
        storage.add_page(test_page(42, "t1"));
        storage.seed_layout(42, "default", layouts::hero("Hello there"), 1, Utc::now());

        let key = PageKey::Raw(" 42".to_string());
        let rows = storage
            .update_layout(&key, "default", &layouts::hero("Changed text"))
            .await
            .unwrap();
        assert_eq!(rows, 0);
        assert!(storage.find_layout(&key, "default").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn fake_translator_records_and_fails() {
        let translator = FakeTranslator::new().failing_for("es");
        assert_eq!(
            translator.translate_text("Hello there", "fr", "default").await.unwrap(),
            "[fr] Hello there"
        );
        assert!(translator.translate_text("Hello there", "es", "default").await.is_err());
        assert_eq!(translator.calls().len(), 2);
    }

    #[test]
    fn test_assertions() {
        let layout = layouts::hero("Welcome to our site");
        assert::has_key(&layout, "components");
        assert::same_components(&layout, &layouts::hero("Something else"));
        assert::contains("hello world", "world");
    }
}
