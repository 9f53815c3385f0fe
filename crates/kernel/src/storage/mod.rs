//! Storage abstraction layer.
//!
//! All page, layout, setting and version reads and writes go through these
//! traits. [`PgStorage`] implements them on top of [`crate::db::Database`];
//! tests substitute an in-memory implementation.
//!
//! Raw page keys ([`PageKey::Raw`]) are matched strictly by updates and
//! leniently (trimmed, textual) by lookups. The layout engine relies on that
//! difference to detect and heal id representation mismatches.

mod postgres;

use async_trait::async_trait;
use serde_json::Value;

pub use postgres::PgStorage;

use crate::error::DbError;
use crate::models::{
    LayoutRowKey, LayoutSnapshot, NewPageVersion, Page, PageKey, PageLayout, PageVersion,
    UpdatePage,
};

/// Pages and their layouts.
#[async_trait]
pub trait PageStorage: Send + Sync {
    /// Load a page by key.
    async fn find_page(&self, key: &PageKey) -> Result<Option<Page>, DbError>;

    /// Update page metadata, scoped to the owning tenant. Returns rows affected.
    async fn update_page(
        &self,
        page_id: i64,
        tenant_id: &str,
        input: &UpdatePage,
    ) -> Result<u64, DbError>;

    /// Delete a page (and, by cascade, its layouts), scoped to the owning tenant.
    async fn delete_page(&self, page_id: i64, tenant_id: &str) -> Result<u64, DbError>;

    /// Bind a theme to a page, scoped to the owning tenant.
    async fn set_page_theme(
        &self,
        page_id: i64,
        tenant_id: &str,
        theme_id: &str,
    ) -> Result<u64, DbError>;

    /// Replace the layout for (page, language) and bump its version. Returns rows affected.
    async fn update_layout(
        &self,
        key: &PageKey,
        language: &str,
        layout: &Value,
    ) -> Result<u64, DbError>;

    /// Find the layout row for (page, language), most recently updated first.
    async fn find_layout(&self, key: &PageKey, language: &str)
    -> Result<Option<PageLayout>, DbError>;

    /// Insert a new layout row with version 1.
    async fn insert_layout(
        &self,
        key: &PageKey,
        language: &str,
        layout: &Value,
    ) -> Result<PageLayout, DbError>;

    /// Find a layout by page slug.
    ///
    /// With a tenant, that tenant's page wins over a master page of the same
    /// slug; without one, master pages win.
    async fn find_layout_by_slug(
        &self,
        slug: &str,
        language: &str,
        tenant_id: Option<&str>,
    ) -> Result<Option<LayoutSnapshot>, DbError>;
}

/// Schema repair primitives.
#[async_trait]
pub trait SchemaMaintenance: Send + Sync {
    /// Create missing tables.
    async fn ensure_tables(&self) -> Result<(), DbError>;

    /// Add the `language` column to `page_layouts` if missing. Returns true when added.
    async fn ensure_language_column(&self) -> Result<bool, DbError>;

    /// Drop the legacy single-column `UNIQUE(page_id)` constraint. Returns true when dropped.
    async fn drop_legacy_page_unique(&self) -> Result<bool, DbError>;

    /// Whether `UNIQUE(page_id, language)` exists.
    async fn has_layout_unique_constraint(&self) -> Result<bool, DbError>;

    /// Add `UNIQUE(page_id, language)`. Fails with a unique violation while duplicates exist.
    async fn add_layout_unique_constraint(&self) -> Result<(), DbError>;

    /// Every row that shares its (page_id, language) with another row.
    async fn duplicate_layout_rows(&self) -> Result<Vec<LayoutRowKey>, DbError>;

    /// Delete layout rows by primary key.
    async fn delete_layout_rows(&self, ids: &[i64]) -> Result<u64, DbError>;
}

/// Tenant key/value settings.
#[async_trait]
pub trait SettingsStorage: Send + Sync {
    async fn get_setting(&self, tenant_id: &str, key: &str) -> Result<Option<String>, DbError>;
}

/// Append-only page history.
#[async_trait]
pub trait VersionStorage: Send + Sync {
    /// Insert a snapshot numbered MAX(version_number) + 1 for its (page, tenant).
    async fn append_version(&self, version: &NewPageVersion) -> Result<PageVersion, DbError>;

    /// All snapshots of a page, newest first.
    async fn list_versions(&self, page_id: i64, tenant_id: &str)
    -> Result<Vec<PageVersion>, DbError>;

    async fn find_version(
        &self,
        page_id: i64,
        tenant_id: &str,
        version_number: i32,
    ) -> Result<Option<PageVersion>, DbError>;
}

/// Everything the kernel needs from a backing store.
pub trait Storage: PageStorage + SchemaMaintenance + SettingsStorage + VersionStorage {}

impl<T> Storage for T where T: PageStorage + SchemaMaintenance + SettingsStorage + VersionStorage {}
