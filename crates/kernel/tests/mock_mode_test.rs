#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Degraded operation without a database.
//!
//! Reads come back empty and writes fail with the mock-mode error instead of
//! pretending to succeed.

use std::sync::Arc;

use serde_json::json;

use folio_kernel::config::Config;
use folio_kernel::db::Database;
use folio_kernel::error::{DbError, LayoutError};
use folio_kernel::metrics::Metrics;
use folio_kernel::models::{PageKey, PageSnapshotData};
use folio_kernel::services::{LayoutEngine, VersionService};
use folio_kernel::storage::{PgStorage, Storage};
use folio_test_utils::assert;

async fn mock_storage() -> Arc<dyn Storage> {
    let db = Database::connect(&Config::default()).await.unwrap();
    assert!(db.is_mock());
    Arc::new(PgStorage::new(db))
}

#[tokio::test]
async fn saves_find_no_page() {
    let engine = LayoutEngine::new(mock_storage().await, Arc::new(Metrics::new()));

    let saved = engine
        .update_page_layout(42_i64, &json!({"components": []}), "t1", "default", None)
        .await
        .unwrap();

    assert!(!saved);
    assert!(engine
        .get_layout_by_slug("home", "fr", None)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn direct_writes_fail_loudly() {
    let storage = mock_storage().await;
    let engine = LayoutEngine::new(storage.clone(), Arc::new(Metrics::new()));

    let err = engine
        .upsert_page_layout(&PageKey::Id(42), &json!({"components": []}), "default")
        .await
        .unwrap_err();
    assert!(matches!(err, LayoutError::Database(DbError::MockModeWrite(_))));

    let err = VersionService::new(storage)
        .save_page_version(42, "t1", PageSnapshotData::default(), json!({}), None, None)
        .await
        .unwrap_err();
    match err {
        LayoutError::Database(db) => assert_eq!(db.code(), Some("MOCK_MODE_WRITE")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn schema_repair_reports_instead_of_failing() {
    let engine = LayoutEngine::new(mock_storage().await, Arc::new(Metrics::new()));

    let report = engine.prepare_schema().await;

    assert!(!report.is_clean());
    assert!(!report.unique_constraint_ready);

    let json = serde_json::to_value(&report).unwrap();
    assert::has_key(&json, "failures");
    assert_eq!(json["failures"].as_array().unwrap().len(), report.failures.len());
}
