//! Page version history.
//!
//! Snapshots are append-only. Each one is numbered MAX + 1 within its
//! (page, tenant); a unique index rejects a number taken by a concurrent
//! save, in which case the append is retried with a fresh number.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::error::{LayoutError, LayoutResult};
use crate::models::{DEFAULT_LANGUAGE, NewPageVersion, PageSnapshotData, PageVersion};
use crate::services::layout::LayoutEngine;
use crate::storage::Storage;

/// Attempts at allocating a version number before giving up.
const MAX_VERSION_ATTEMPTS: u32 = 3;

/// Snapshot operations.
#[derive(Clone)]
pub struct VersionService {
    storage: Arc<dyn Storage>,
}

impl VersionService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Append a snapshot of the page metadata and layout.
    pub async fn save_page_version(
        &self,
        page_id: i64,
        tenant_id: &str,
        data: PageSnapshotData,
        layout_json: Value,
        user_id: Option<String>,
        comment: Option<String>,
    ) -> LayoutResult<PageVersion> {
        if tenant_id.trim().is_empty() {
            return Err(LayoutError::MissingTenant);
        }

        let snapshot = NewPageVersion::new(page_id, tenant_id, data, layout_json, user_id, comment);

        for attempt in 1..=MAX_VERSION_ATTEMPTS {
            match self.storage.append_version(&snapshot).await {
                Ok(version) => {
                    info!(
                        page_id,
                        tenant_id = %tenant_id,
                        version = version.version_number,
                        "page version saved"
                    );
                    return Ok(version);
                }
                Err(e) if e.is_unique_violation() => {
                    warn!(page_id, attempt, "version number taken by a concurrent save; retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(LayoutError::VersionConflict {
            page_id,
            attempts: MAX_VERSION_ATTEMPTS,
        })
    }

    /// All snapshots of a page, newest first.
    pub async fn list_page_versions(
        &self,
        page_id: i64,
        tenant_id: &str,
    ) -> LayoutResult<Vec<PageVersion>> {
        Ok(self.storage.list_versions(page_id, tenant_id).await?)
    }

    pub async fn get_page_version(
        &self,
        page_id: i64,
        tenant_id: &str,
        version_number: i32,
    ) -> LayoutResult<Option<PageVersion>> {
        Ok(self
            .storage
            .find_version(page_id, tenant_id, version_number)
            .await?)
    }

    /// Re-apply a snapshot's layout as the page's default-language layout.
    ///
    /// Returns false when the snapshot or the page does not exist.
    pub async fn restore_page_version(
        &self,
        engine: &LayoutEngine,
        page_id: i64,
        tenant_id: &str,
        version_number: i32,
    ) -> LayoutResult<bool> {
        let Some(version) = self
            .get_page_version(page_id, tenant_id, version_number)
            .await?
        else {
            return Ok(false);
        };

        let restored = engine
            .update_page_layout(
                page_id,
                &version.layout_json,
                tenant_id,
                DEFAULT_LANGUAGE,
                version.theme_id.as_deref(),
            )
            .await?;

        if restored {
            info!(page_id, tenant_id = %tenant_id, version = version_number, "page version restored");
        }
        Ok(restored)
    }
}
