//! PostgreSQL storage.

use async_trait::async_trait;
use serde_json::Value;

use super::{PageStorage, SchemaMaintenance, SettingsStorage, VersionStorage};
use crate::db::Database;
use crate::error::DbError;
use crate::models::{
    LayoutRowKey, LayoutSnapshot, NewPageVersion, Page, PageKey, PageLayout, PageVersion,
    UpdatePage,
};

/// Name of the composite uniqueness constraint on `page_layouts`.
pub const LAYOUT_UNIQUE_CONSTRAINT: &str = "page_layouts_page_id_language_key";

/// Name of the pre-multilingual constraint allowing one layout per page.
pub const LEGACY_LAYOUT_UNIQUE_CONSTRAINT: &str = "page_layouts_page_id_key";

const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS pages (
    id BIGSERIAL PRIMARY KEY,
    tenant_id TEXT,
    slug TEXT NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    page_type TEXT NOT NULL DEFAULT 'page',
    status TEXT NOT NULL DEFAULT 'draft',
    theme_id TEXT,
    meta_title TEXT,
    meta_description TEXT,
    seo_keywords TEXT,
    seo_index BOOLEAN NOT NULL DEFAULT TRUE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE UNIQUE INDEX IF NOT EXISTS pages_tenant_slug_idx
    ON pages (COALESCE(tenant_id, ''), slug);

CREATE TABLE IF NOT EXISTS page_layouts (
    id BIGSERIAL PRIMARY KEY,
    page_id BIGINT NOT NULL REFERENCES pages(id) ON DELETE CASCADE,
    language TEXT NOT NULL DEFAULT 'default',
    layout_json JSONB NOT NULL,
    version INTEGER NOT NULL DEFAULT 1,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT page_layouts_page_id_language_key UNIQUE (page_id, language)
);

CREATE TABLE IF NOT EXISTS page_versions (
    id BIGSERIAL PRIMARY KEY,
    page_id BIGINT NOT NULL REFERENCES pages(id) ON DELETE CASCADE,
    tenant_id TEXT NOT NULL,
    version_number INTEGER NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    slug TEXT NOT NULL DEFAULT '',
    page_type TEXT NOT NULL DEFAULT 'page',
    status TEXT NOT NULL DEFAULT 'draft',
    theme_id TEXT,
    meta_title TEXT,
    meta_description TEXT,
    seo_keywords TEXT,
    seo_index BOOLEAN NOT NULL DEFAULT TRUE,
    layout_json JSONB NOT NULL,
    created_by TEXT,
    comment TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE UNIQUE INDEX IF NOT EXISTS page_versions_number_idx
    ON page_versions (page_id, tenant_id, version_number);

CREATE TABLE IF NOT EXISTS tenant_settings (
    tenant_id TEXT NOT NULL,
    setting_key TEXT NOT NULL,
    setting_value TEXT,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (tenant_id, setting_key)
);
"#;

/// Storage backed by PostgreSQL through the retrying [`Database`] handle.
#[derive(Clone, Debug)]
pub struct PgStorage {
    db: Database,
}

impl PgStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn constraint_exists(&self, name: &str) -> Result<bool, DbError> {
        self.db
            .fetch("constraint_exists", |pool| async move {
                sqlx::query_scalar::<_, bool>(
                    r#"
                    SELECT EXISTS (
                        SELECT 1 FROM pg_constraint
                        WHERE conname = $1 AND conrelid = to_regclass('page_layouts')
                    )
                    "#,
                )
                .bind(name)
                .fetch_one(&pool)
                .await
            })
            .await
    }
}

#[async_trait]
impl PageStorage for PgStorage {
    async fn find_page(&self, key: &PageKey) -> Result<Option<Page>, DbError> {
        let text = key.as_text();
        let id = key.as_id();
        let text = text.as_str();

        self.db
            .fetch("find_page", |pool| async move {
                match id {
                    Some(id) => {
                        sqlx::query_as::<_, Page>(
                            r#"
                            SELECT id, tenant_id, slug, title, page_type, status, theme_id,
                                   meta_title, meta_description, seo_keywords, seo_index,
                                   created_at, updated_at
                            FROM pages WHERE id = $1
                            "#,
                        )
                        .bind(id)
                        .fetch_optional(&pool)
                        .await
                    }
                    None => {
                        sqlx::query_as::<_, Page>(
                            r#"
                            SELECT id, tenant_id, slug, title, page_type, status, theme_id,
                                   meta_title, meta_description, seo_keywords, seo_index,
                                   created_at, updated_at
                            FROM pages WHERE id::text = btrim($1)
                            "#,
                        )
                        .bind(text)
                        .fetch_optional(&pool)
                        .await
                    }
                }
            })
            .await
    }

    async fn update_page(
        &self,
        page_id: i64,
        tenant_id: &str,
        input: &UpdatePage,
    ) -> Result<u64, DbError> {
        self.db
            .execute("update_page", |pool| async move {
                sqlx::query(
                    r#"
                    UPDATE pages SET
                        title = COALESCE($3, title),
                        slug = COALESCE($4, slug),
                        status = COALESCE($5, status),
                        theme_id = COALESCE($6, theme_id),
                        meta_title = COALESCE($7, meta_title),
                        meta_description = COALESCE($8, meta_description),
                        seo_keywords = COALESCE($9, seo_keywords),
                        seo_index = COALESCE($10, seo_index),
                        updated_at = NOW()
                    WHERE id = $1 AND tenant_id = $2
                    "#,
                )
                .bind(page_id)
                .bind(tenant_id)
                .bind(input.title.as_deref())
                .bind(input.slug.as_deref())
                .bind(input.status.as_deref())
                .bind(input.theme_id.as_deref())
                .bind(input.meta_title.as_deref())
                .bind(input.meta_description.as_deref())
                .bind(input.seo_keywords.as_deref())
                .bind(input.seo_index)
                .execute(&pool)
                .await
                .map(|r| r.rows_affected())
            })
            .await
    }

    async fn delete_page(&self, page_id: i64, tenant_id: &str) -> Result<u64, DbError> {
        self.db
            .execute("delete_page", |pool| async move {
                sqlx::query("DELETE FROM pages WHERE id = $1 AND tenant_id = $2")
                    .bind(page_id)
                    .bind(tenant_id)
                    .execute(&pool)
                    .await
                    .map(|r| r.rows_affected())
            })
            .await
    }

    async fn set_page_theme(
        &self,
        page_id: i64,
        tenant_id: &str,
        theme_id: &str,
    ) -> Result<u64, DbError> {
        self.db
            .execute("set_page_theme", |pool| async move {
                sqlx::query(
                    "UPDATE pages SET theme_id = $3, updated_at = NOW() WHERE id = $1 AND tenant_id = $2",
                )
                .bind(page_id)
                .bind(tenant_id)
                .bind(theme_id)
                .execute(&pool)
                .await
                .map(|r| r.rows_affected())
            })
            .await
    }

    async fn update_layout(
        &self,
        key: &PageKey,
        language: &str,
        layout: &Value,
    ) -> Result<u64, DbError> {
        let text = key.as_text();
        let id = key.as_id();
        let text = text.as_str();

        self.db
            .execute("update_layout", |pool| async move {
                let query = match id {
                    Some(id) => sqlx::query(
                        r#"
                        UPDATE page_layouts
                        SET layout_json = $1, version = version + 1, updated_at = NOW()
                        WHERE page_id = $2 AND language = $3
                        "#,
                    )
                    .bind(layout)
                    .bind(id),
                    // Strict textual match: no trimming here.
                    None => sqlx::query(
                        r#"
                        UPDATE page_layouts
                        SET layout_json = $1, version = version + 1, updated_at = NOW()
                        WHERE page_id::text = $2 AND language = $3
                        "#,
                    )
                    .bind(layout)
                    .bind(text),
                };

                query
                    .bind(language)
                    .execute(&pool)
                    .await
                    .map(|r| r.rows_affected())
            })
            .await
    }

    async fn find_layout(
        &self,
        key: &PageKey,
        language: &str,
    ) -> Result<Option<PageLayout>, DbError> {
        let text = key.as_text();
        let id = key.as_id();
        let text = text.as_str();

        self.db
            .fetch("find_layout", |pool| async move {
                let query = match id {
                    Some(id) => sqlx::query_as::<_, PageLayout>(
                        r#"
                        SELECT id, page_id, language, layout_json, version, updated_at
                        FROM page_layouts
                        WHERE page_id = $1 AND language = $2
                        ORDER BY updated_at DESC, id DESC
                        LIMIT 1
                        "#,
                    )
                    .bind(id),
                    None => sqlx::query_as::<_, PageLayout>(
                        r#"
                        SELECT id, page_id, language, layout_json, version, updated_at
                        FROM page_layouts
                        WHERE page_id::text = btrim($1) AND language = $2
                        ORDER BY updated_at DESC, id DESC
                        LIMIT 1
                        "#,
                    )
                    .bind(text),
                };

                query.bind(language).fetch_optional(&pool).await
            })
            .await
    }

    async fn insert_layout(
        &self,
        key: &PageKey,
        language: &str,
        layout: &Value,
    ) -> Result<PageLayout, DbError> {
        let text = key.as_text();
        let text = text.as_str();

        self.db
            .execute("insert_layout", |pool| async move {
                sqlx::query_as::<_, PageLayout>(
                    r#"
                    INSERT INTO page_layouts (page_id, language, layout_json, version, updated_at)
                    VALUES (btrim($1)::bigint, $2, $3, 1, NOW())
                    RETURNING id, page_id, language, layout_json, version, updated_at
                    "#,
                )
                .bind(text)
                .bind(language)
                .bind(layout)
                .fetch_one(&pool)
                .await
            })
            .await
    }

    async fn find_layout_by_slug(
        &self,
        slug: &str,
        language: &str,
        tenant_id: Option<&str>,
    ) -> Result<Option<LayoutSnapshot>, DbError> {
        self.db
            .fetch("find_layout_by_slug", |pool| async move {
                sqlx::query_as::<_, LayoutSnapshot>(
                    r#"
                    SELECT l.layout_json, l.version, l.updated_at
                    FROM page_layouts l
                    JOIN pages p ON p.id = l.page_id
                    WHERE p.slug = $1
                      AND l.language = $2
                      AND ($3::text IS NULL OR p.tenant_id IS NULL OR p.tenant_id = $3)
                    ORDER BY
                        CASE WHEN p.tenant_id = $3 THEN 0 WHEN p.tenant_id IS NULL THEN 1 ELSE 2 END,
                        p.id,
                        l.updated_at DESC
                    LIMIT 1
                    "#,
                )
                .bind(slug)
                .bind(language)
                .bind(tenant_id)
                .fetch_optional(&pool)
                .await
            })
            .await
    }
}

#[async_trait]
impl SchemaMaintenance for PgStorage {
    async fn ensure_tables(&self) -> Result<(), DbError> {
        self.db.execute_script("ensure_tables", CREATE_TABLES).await
    }

    async fn ensure_language_column(&self) -> Result<bool, DbError> {
        let exists = self
            .db
            .fetch("language_column_exists", |pool| async move {
                sqlx::query_scalar::<_, bool>(
                    r#"
                    SELECT EXISTS (
                        SELECT 1 FROM information_schema.columns
                        WHERE table_schema = current_schema()
                          AND table_name = 'page_layouts'
                          AND column_name = 'language'
                    )
                    "#,
                )
                .fetch_one(&pool)
                .await
            })
            .await?;

        if exists {
            return Ok(false);
        }

        self.db
            .execute_script(
                "add_language_column",
                "ALTER TABLE page_layouts ADD COLUMN IF NOT EXISTS language TEXT NOT NULL DEFAULT 'default'",
            )
            .await?;
        Ok(true)
    }

    async fn drop_legacy_page_unique(&self) -> Result<bool, DbError> {
        if !self
            .constraint_exists(LEGACY_LAYOUT_UNIQUE_CONSTRAINT)
            .await?
        {
            return Ok(false);
        }

        self.db
            .execute_script(
                "drop_legacy_layout_unique",
                "ALTER TABLE page_layouts DROP CONSTRAINT IF EXISTS page_layouts_page_id_key",
            )
            .await?;
        Ok(true)
    }

    async fn has_layout_unique_constraint(&self) -> Result<bool, DbError> {
        self.constraint_exists(LAYOUT_UNIQUE_CONSTRAINT).await
    }

    async fn add_layout_unique_constraint(&self) -> Result<(), DbError> {
        self.db
            .execute_script(
                "add_layout_unique",
                "ALTER TABLE page_layouts ADD CONSTRAINT page_layouts_page_id_language_key UNIQUE (page_id, language)",
            )
            .await
    }

    async fn duplicate_layout_rows(&self) -> Result<Vec<LayoutRowKey>, DbError> {
        self.db
            .fetch("duplicate_layout_rows", |pool| async move {
                sqlx::query_as::<_, LayoutRowKey>(
                    r#"
                    SELECT id, page_id, language, updated_at
                    FROM page_layouts
                    WHERE (page_id, language) IN (
                        SELECT page_id, language FROM page_layouts
                        GROUP BY page_id, language
                        HAVING COUNT(*) > 1
                    )
                    ORDER BY page_id, language, updated_at DESC, id DESC
                    "#,
                )
                .fetch_all(&pool)
                .await
            })
            .await
    }

    async fn delete_layout_rows(&self, ids: &[i64]) -> Result<u64, DbError> {
        if ids.is_empty() {
            return Ok(0);
        }

        self.db
            .execute("delete_layout_rows", |pool| async move {
                sqlx::query("DELETE FROM page_layouts WHERE id = ANY($1)")
                    .bind(ids)
                    .execute(&pool)
                    .await
                    .map(|r| r.rows_affected())
            })
            .await
    }
}

#[async_trait]
impl SettingsStorage for PgStorage {
    async fn get_setting(&self, tenant_id: &str, key: &str) -> Result<Option<String>, DbError> {
        let value: Option<Option<String>> = self
            .db
            .fetch("get_setting", |pool| async move {
                sqlx::query_scalar::<_, Option<String>>(
                    "SELECT setting_value FROM tenant_settings WHERE tenant_id = $1 AND setting_key = $2",
                )
                .bind(tenant_id)
                .bind(key)
                .fetch_optional(&pool)
                .await
            })
            .await?;

        Ok(value.flatten())
    }
}

#[async_trait]
impl VersionStorage for PgStorage {
    async fn append_version(&self, version: &NewPageVersion) -> Result<PageVersion, DbError> {
        self.db
            .execute("append_version", |pool| async move {
                sqlx::query_as::<_, PageVersion>(
                    r#"
                    INSERT INTO page_versions (
                        page_id, tenant_id, version_number, title, slug, page_type, status,
                        theme_id, meta_title, meta_description, seo_keywords, seo_index,
                        layout_json, created_by, comment, created_at
                    )
                    SELECT $1, $2, COALESCE(MAX(version_number), 0) + 1, $3, $4, $5, $6,
                           $7, $8, $9, $10, $11, $12, $13, $14, NOW()
                    FROM page_versions
                    WHERE page_id = $1 AND tenant_id = $2
                    RETURNING id, page_id, tenant_id, version_number, title, slug, page_type,
                              status, theme_id, meta_title, meta_description, seo_keywords,
                              seo_index, layout_json, created_by, comment, created_at
                    "#,
                )
                .bind(version.page_id)
                .bind(&version.tenant_id)
                .bind(&version.title)
                .bind(&version.slug)
                .bind(&version.page_type)
                .bind(&version.status)
                .bind(version.theme_id.as_deref())
                .bind(version.meta_title.as_deref())
                .bind(version.meta_description.as_deref())
                .bind(version.seo_keywords.as_deref())
                .bind(version.seo_index)
                .bind(&version.layout_json)
                .bind(version.created_by.as_deref())
                .bind(version.comment.as_deref())
                .fetch_one(&pool)
                .await
            })
            .await
    }

    async fn list_versions(
        &self,
        page_id: i64,
        tenant_id: &str,
    ) -> Result<Vec<PageVersion>, DbError> {
        self.db
            .fetch("list_versions", |pool| async move {
                sqlx::query_as::<_, PageVersion>(
                    r#"
                    SELECT id, page_id, tenant_id, version_number, title, slug, page_type,
                           status, theme_id, meta_title, meta_description, seo_keywords,
                           seo_index, layout_json, created_by, comment, created_at
                    FROM page_versions
                    WHERE page_id = $1 AND tenant_id = $2
                    ORDER BY version_number DESC
                    "#,
                )
                .bind(page_id)
                .bind(tenant_id)
                .fetch_all(&pool)
                .await
            })
            .await
    }

    async fn find_version(
        &self,
        page_id: i64,
        tenant_id: &str,
        version_number: i32,
    ) -> Result<Option<PageVersion>, DbError> {
        self.db
            .fetch("find_version", |pool| async move {
                sqlx::query_as::<_, PageVersion>(
                    r#"
                    SELECT id, page_id, tenant_id, version_number, title, slug, page_type,
                           status, theme_id, meta_title, meta_description, seo_keywords,
                           seo_index, layout_json, created_by, comment, created_at
                    FROM page_versions
                    WHERE page_id = $1 AND tenant_id = $2 AND version_number = $3
                    "#,
                )
                .bind(page_id)
                .bind(tenant_id)
                .bind(version_number)
                .fetch_optional(&pool)
                .await
            })
            .await
    }
}
