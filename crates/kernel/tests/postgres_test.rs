#![allow(clippy::unwrap_used, clippy::expect_used)]
//! PostgreSQL storage tests.
//!
//! Run only when `DATABASE_URL` points at a database. Each test works in a
//! throwaway schema selected through `search_path`, so tests never see each
//! other's tables or constraints.

use std::str::FromStr;
use std::sync::Arc;

use serde_json::json;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use uuid::Uuid;

use folio_kernel::config::Config;
use folio_kernel::db::{Database, RetryPolicy};
use folio_kernel::error::DbError;
use folio_kernel::metrics::Metrics;
use folio_kernel::models::{NewPageVersion, PageKey, PageSnapshotData};
use folio_kernel::schema::repair_schema;
use folio_kernel::services::{LayoutEngine, UpsertOutcome, VersionService};
use folio_kernel::storage::{PageStorage, PgStorage, SchemaMaintenance, Storage, VersionStorage};
use folio_test_utils::{assert, layouts};

/// A schema of its own on the configured database.
struct PgScratch {
    admin: PgPool,
    pool: PgPool,
    schema: String,
    storage: Arc<PgStorage>,
}

impl PgScratch {
    async fn open() -> Option<Self> {
        dotenvy::dotenv().ok();
        let config = Config::from_env().unwrap();
        let Some(url) = config.database_url else {
            eprintln!("DATABASE_URL not set; skipping PostgreSQL test");
            return None;
        };

        let schema = format!("folio_test_{}", Uuid::now_v7().simple());
        let admin = PgPoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .unwrap();
        sqlx::query(&format!("CREATE SCHEMA {schema}"))
            .execute(&admin)
            .await
            .unwrap();

        let options = PgConnectOptions::from_str(&url)
            .unwrap()
            .options([("search_path", schema.as_str())]);
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .unwrap();

        let db = Database::from_pool(pool.clone(), RetryPolicy::immediate(1));
        Some(Self {
            admin,
            pool,
            schema,
            storage: Arc::new(PgStorage::new(db)),
        })
    }

    fn storage(&self) -> Arc<dyn Storage> {
        self.storage.clone()
    }

    async fn add_page(&self, id: i64, tenant_id: &str, slug: &str) {
        sqlx::query("INSERT INTO pages (id, tenant_id, slug, title) VALUES ($1, $2, $3, $4)")
            .bind(id)
            .bind(tenant_id)
            .bind(slug)
            .bind(format!("Page {id}"))
            .execute(&self.pool)
            .await
            .unwrap();
    }

    async fn layout_rows(&self, page_id: i64, language: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM page_layouts WHERE page_id = $1 AND language = $2")
            .bind(page_id)
            .bind(language)
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }

    async fn close(self) {
        self.pool.close().await;
        sqlx::query(&format!("DROP SCHEMA {} CASCADE", self.schema))
            .execute(&self.admin)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn save_inserts_then_updates_to_version_two() {
    let Some(pg) = PgScratch::open().await else {
        return;
    };
    let engine = LayoutEngine::new(pg.storage(), Arc::new(Metrics::new()));
    assert!(engine.prepare_schema().await.is_clean());
    pg.add_page(42, "t1", "home").await;

    let first = engine
        .upsert_page_layout(&PageKey::Id(42), &layouts::hero("First draft text"), "default")
        .await
        .unwrap();
    assert_eq!(first, UpsertOutcome::Inserted);

    assert!(engine
        .update_page_layout("42", &layouts::landing(), "t1", "default", Some("modern"))
        .await
        .unwrap());

    let row = pg
        .storage
        .find_layout(&PageKey::Id(42), "default")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.version, 2);
    assert::json_eq(&row.layout_json, &layouts::landing());
    assert_eq!(pg.layout_rows(42, "default").await, 1);

    let page = pg.storage.find_page(&PageKey::Id(42)).await.unwrap().unwrap();
    assert_eq!(page.theme_id.as_deref(), Some("modern"));

    let served = engine
        .get_layout_by_slug("home", "fr", Some("t1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(served.version, 2);

    pg.close().await;
}

#[tokio::test]
async fn raw_key_mismatch_heals_through_stored_id() {
    let Some(pg) = PgScratch::open().await else {
        return;
    };
    let engine = LayoutEngine::new(pg.storage(), Arc::new(Metrics::new()));
    engine.prepare_schema().await;
    pg.add_page(42, "t1", "home").await;

    // Leading whitespace: the trimmed cast inserts under id 42.
    let padded = PageKey::Raw(" 42".to_string());
    let inserted = engine
        .upsert_page_layout(&padded, &layouts::hero("First draft text"), "default")
        .await
        .unwrap();
    assert_eq!(inserted, UpsertOutcome::Inserted);

    // The strict update misses, the lenient lookup finds the row.
    assert_eq!(
        pg.storage
            .update_layout(&padded, "default", &layouts::landing())
            .await
            .unwrap(),
        0
    );
    let healed = engine
        .upsert_page_layout(&padded, &layouts::landing(), "default")
        .await
        .unwrap();
    assert_eq!(healed, UpsertOutcome::Healed);

    let row = pg
        .storage
        .find_layout(&PageKey::Id(42), "default")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.version, 2);
    assert_eq!(pg.layout_rows(42, "default").await, 1);

    pg.close().await;
}

#[tokio::test]
async fn non_numeric_raw_key_cannot_insert() {
    let Some(pg) = PgScratch::open().await else {
        return;
    };
    pg.storage.ensure_tables().await.unwrap();

    let err = pg
        .storage
        .insert_layout(&PageKey::Raw("home".to_string()), "default", &json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some("22P02"));
    assert!(!err.is_retryable());

    let err = pg
        .storage
        .insert_layout(&PageKey::Id(999), "default", &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::ForeignKeyViolation(_)));

    pg.close().await;
}

#[tokio::test]
async fn second_insert_hits_the_constraint() {
    let Some(pg) = PgScratch::open().await else {
        return;
    };
    pg.storage.ensure_tables().await.unwrap();
    pg.add_page(42, "t1", "home").await;
    let key = PageKey::Id(42);

    pg.storage
        .insert_layout(&key, "default", &layouts::hero("First editor draft"))
        .await
        .unwrap();
    let err = pg
        .storage
        .insert_layout(&key, "default", &layouts::hero("Second editor draft"))
        .await
        .unwrap_err();

    assert!(err.is_unique_violation());
    assert_eq!(pg.layout_rows(42, "default").await, 1);

    pg.close().await;
}

#[tokio::test]
async fn repair_dedups_before_adding_constraint() {
    let Some(pg) = PgScratch::open().await else {
        return;
    };
    pg.storage.ensure_tables().await.unwrap();
    sqlx::query("ALTER TABLE page_layouts DROP CONSTRAINT page_layouts_page_id_language_key")
        .execute(&pg.pool)
        .await
        .unwrap();
    assert!(!pg.storage.has_layout_unique_constraint().await.unwrap());
    pg.add_page(42, "t1", "home").await;

    let mut newest = 0;
    for (age_hours, headline) in [(2, "Oldest copy here"), (0, "Newest copy here"), (1, "Middle copy here")] {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO page_layouts (page_id, language, layout_json, updated_at)
            VALUES (42, 'default', $1, NOW() - make_interval(hours => $2))
            RETURNING id
            "#,
        )
        .bind(layouts::hero(headline))
        .bind(age_hours)
        .fetch_one(&pg.pool)
        .await
        .unwrap();
        if age_hours == 0 {
            newest = id;
        }
    }
    assert_eq!(pg.storage.duplicate_layout_rows().await.unwrap().len(), 3);

    let report = repair_schema(pg.storage.as_ref()).await;

    assert!(report.is_clean(), "{:?}", report.failures);
    assert!(report.unique_constraint_ready);
    assert_eq!(report.duplicates_removed, 2);
    assert!(pg.storage.has_layout_unique_constraint().await.unwrap());
    assert_eq!(pg.layout_rows(42, "default").await, 1);
    let survivor = pg
        .storage
        .find_layout(&PageKey::Id(42), "default")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(survivor.id, newest);

    let again = repair_schema(pg.storage.as_ref()).await;
    assert!(again.is_clean());
    assert_eq!(again.duplicates_removed, 0);

    pg.close().await;
}

#[tokio::test]
async fn repair_upgrades_legacy_layout_table() {
    let Some(pg) = PgScratch::open().await else {
        return;
    };
    sqlx::raw_sql(
        r#"
        CREATE TABLE pages (
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
        CREATE TABLE page_layouts (
            id BIGSERIAL PRIMARY KEY,
            page_id BIGINT NOT NULL REFERENCES pages(id) ON DELETE CASCADE,
            layout_json JSONB NOT NULL,
            version INTEGER NOT NULL DEFAULT 1,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            CONSTRAINT page_layouts_page_id_key UNIQUE (page_id)
        );
        "#,
    )
    .execute(&pg.pool)
    .await
    .unwrap();
    pg.add_page(42, "t1", "home").await;
    sqlx::query("INSERT INTO page_layouts (page_id, layout_json) VALUES (42, $1)")
        .bind(layouts::hero("Welcome to our site"))
        .execute(&pg.pool)
        .await
        .unwrap();

    let report = repair_schema(pg.storage.as_ref()).await;
    assert!(report.is_clean(), "{:?}", report.failures);
    assert!(report.language_column_added);
    assert!(report.legacy_constraint_dropped);
    assert!(report.unique_constraint_ready);

    // The existing row became the default-language row; a second language fits.
    assert!(pg
        .storage
        .find_layout(&PageKey::Id(42), "default")
        .await
        .unwrap()
        .is_some());
    pg.storage
        .insert_layout(&PageKey::Id(42), "fr", &layouts::hero("Bienvenue sur notre site"))
        .await
        .unwrap();
    assert_eq!(pg.layout_rows(42, "fr").await, 1);

    pg.close().await;
}

#[tokio::test]
async fn versions_number_per_page_and_tenant() {
    let Some(pg) = PgScratch::open().await else {
        return;
    };
    pg.storage.ensure_tables().await.unwrap();
    pg.add_page(42, "t1", "home").await;
    pg.add_page(43, "t1", "about").await;
    let versions = VersionService::new(pg.storage());

    for expected in 1..=3 {
        let v = versions
            .save_page_version(
                42,
                "t1",
                PageSnapshotData::default(),
                layouts::hero("Welcome to our site"),
                Some("editor-7".to_string()),
                None,
            )
            .await
            .unwrap();
        assert_eq!(v.version_number, expected);
        assert_eq!(v.status, "draft");
    }
    let other = versions
        .save_page_version(43, "t1", PageSnapshotData::default(), json!({}), None, None)
        .await
        .unwrap();
    assert_eq!(other.version_number, 1);

    let history = versions.list_page_versions(42, "t1").await.unwrap();
    let numbers: Vec<i32> = history.iter().map(|v| v.version_number).collect();
    assert_eq!(numbers, vec![3, 2, 1]);
    assert!(versions.get_page_version(42, "t2", 1).await.unwrap().is_none());

    // A hand-inserted duplicate number is rejected by the unique index.
    let dup = NewPageVersion::new(42, "t1", PageSnapshotData::default(), json!({}), None, None);
    sqlx::query(
        "INSERT INTO page_versions (page_id, tenant_id, version_number, layout_json) VALUES ($1, $2, 3, $3)",
    )
    .bind(dup.page_id)
    .bind(&dup.tenant_id)
    .bind(&dup.layout_json)
    .execute(&pg.pool)
    .await
    .unwrap_err();
    let next = pg.storage.append_version(&dup).await.unwrap();
    assert_eq!(next.version_number, 4);

    pg.close().await;
}
