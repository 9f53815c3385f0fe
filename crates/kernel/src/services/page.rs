//! Tenant-scoped page mutation.
//!
//! Master pages (no owning tenant) are shared by every tenant and refuse all
//! writes. Pages of another tenant are reported as not found.

use std::sync::Arc;

use tracing::info;

use crate::error::{LayoutError, LayoutResult};
use crate::models::{Page, PageKey, UpdatePage};
use crate::storage::Storage;

/// Page metadata operations.
#[derive(Clone)]
pub struct PageService {
    storage: Arc<dyn Storage>,
}

impl PageService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Load a page the tenant may write to.
    async fn writable_page(&self, key: &PageKey, tenant_id: &str) -> LayoutResult<Page> {
        if tenant_id.trim().is_empty() {
            return Err(LayoutError::MissingTenant);
        }

        let page = self
            .storage
            .find_page(key)
            .await?
            .ok_or_else(|| LayoutError::PageNotFound(key.to_string()))?;

        if page.is_master() {
            return Err(LayoutError::MasterPageImmutable(page.id));
        }
        if !page.is_owned_by(tenant_id) {
            return Err(LayoutError::PageNotFound(key.to_string()));
        }
        Ok(page)
    }

    /// Update page metadata. Returns the page as stored afterwards.
    pub async fn update_page(
        &self,
        page_id: impl Into<PageKey>,
        tenant_id: &str,
        input: &UpdatePage,
    ) -> LayoutResult<Page> {
        let key = page_id.into();
        let page = self.writable_page(&key, tenant_id).await?;

        let rows = self.storage.update_page(page.id, tenant_id, input).await?;
        if rows == 0 {
            return Err(LayoutError::PageNotFound(key.to_string()));
        }

        let updated = self
            .storage
            .find_page(&PageKey::Id(page.id))
            .await?
            .ok_or_else(|| LayoutError::PageNotFound(key.to_string()))?;

        info!(page_id = page.id, tenant_id = %tenant_id, "page updated");
        Ok(updated)
    }

    /// Delete a page and its layouts.
    pub async fn delete_page(&self, page_id: impl Into<PageKey>, tenant_id: &str) -> LayoutResult<()> {
        let key = page_id.into();
        let page = self.writable_page(&key, tenant_id).await?;

        let rows = self.storage.delete_page(page.id, tenant_id).await?;
        if rows == 0 {
            return Err(LayoutError::PageNotFound(key.to_string()));
        }

        info!(page_id = page.id, tenant_id = %tenant_id, "page deleted");
        Ok(())
    }
}
