//! Startup schema repair.
//!
//! Runs once before the engine serves writes. Every step is idempotent and
//! best-effort: a failure is logged and the remaining steps still run, so a
//! partially repaired schema never blocks saving.
//!
//! The `UNIQUE(page_id, language)` constraint is established even against
//! historically duplicated data: when adding it fails on a unique violation,
//! duplicate rows are removed (keeping the most recently updated row per
//! pair, highest id on ties) and the constraint is added again.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::DbError;
use crate::models::LayoutRowKey;
use crate::storage::SchemaMaintenance;

/// What a repair pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaReport {
    /// Tables exist (created or already present).
    pub tables_ready: bool,

    /// The `language` column had to be added.
    pub language_column_added: bool,

    /// The legacy `UNIQUE(page_id)` constraint was dropped.
    pub legacy_constraint_dropped: bool,

    /// `UNIQUE(page_id, language)` is in place after the pass.
    pub unique_constraint_ready: bool,

    /// Duplicate layout rows deleted to make room for the constraint.
    pub duplicates_removed: u64,

    /// Steps that failed, as `step: error`.
    pub failures: Vec<String>,
}

impl SchemaReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record_failure(&mut self, step: &str, err: &DbError) {
        warn!(step = %step, error = %err, "schema repair step failed");
        self.failures.push(format!("{step}: {err}"));
    }
}

/// Bring the layout schema up to date.
pub async fn repair_schema<S>(storage: &S) -> SchemaReport
where
    S: SchemaMaintenance + ?Sized,
{
    let mut report = SchemaReport::default();

    match storage.ensure_tables().await {
        Ok(()) => report.tables_ready = true,
        Err(e) => report.record_failure("ensure_tables", &e),
    }

    match storage.ensure_language_column().await {
        Ok(added) => report.language_column_added = added,
        Err(e) => report.record_failure("ensure_language_column", &e),
    }

    match storage.drop_legacy_page_unique().await {
        Ok(dropped) => report.legacy_constraint_dropped = dropped,
        Err(e) => report.record_failure("drop_legacy_page_unique", &e),
    }

    match ensure_layout_unique_constraint(storage).await {
        Ok(removed) => {
            report.unique_constraint_ready = true;
            report.duplicates_removed = removed;
        }
        Err(e) => report.record_failure("ensure_layout_unique_constraint", &e),
    }

    if report.is_clean() {
        info!(
            language_column_added = report.language_column_added,
            legacy_constraint_dropped = report.legacy_constraint_dropped,
            duplicates_removed = report.duplicates_removed,
            "layout schema ready"
        );
    }

    report
}

/// Make sure `UNIQUE(page_id, language)` exists, deduplicating if needed.
///
/// Returns the number of duplicate rows deleted.
pub async fn ensure_layout_unique_constraint<S>(storage: &S) -> Result<u64, DbError>
where
    S: SchemaMaintenance + ?Sized,
{
    if storage.has_layout_unique_constraint().await? {
        return Ok(0);
    }

    match storage.add_layout_unique_constraint().await {
        Ok(()) => Ok(0),
        Err(e) if e.is_unique_violation() => {
            warn!(error = %e, "duplicate layout rows block the unique constraint; deduplicating");
            let removed = remove_duplicate_layouts(storage).await?;
            storage.add_layout_unique_constraint().await?;
            info!(removed, "layout unique constraint added after deduplication");
            Ok(removed)
        }
        Err(e) => Err(e),
    }
}

/// Delete all but the surviving row of every duplicated (page_id, language) pair.
pub async fn remove_duplicate_layouts<S>(storage: &S) -> Result<u64, DbError>
where
    S: SchemaMaintenance + ?Sized,
{
    let rows = storage.duplicate_layout_rows().await?;
    let doomed = rows_to_discard(&rows);
    if doomed.is_empty() {
        return Ok(0);
    }
    storage.delete_layout_rows(&doomed).await
}

/// Pick the rows to delete so that one row remains per (page_id, language).
///
/// The survivor is the most recently updated row; ties go to the highest id.
pub fn rows_to_discard(rows: &[LayoutRowKey]) -> Vec<i64> {
    let mut ordered: Vec<&LayoutRowKey> = rows.iter().collect();
    ordered.sort_by(|a, b| {
        (a.page_id, &a.language)
            .cmp(&(b.page_id, &b.language))
            .then(b.updated_at.cmp(&a.updated_at))
            .then(b.id.cmp(&a.id))
    });

    let mut seen = HashSet::new();
    ordered
        .into_iter()
        .filter(|row| !seen.insert((row.page_id, row.language.clone())))
        .map(|row| row.id)
        .collect()
}
