//! Page version snapshots.
//!
//! Append-only history: each row is a denormalized copy of a page's metadata
//! plus its layout at the time of the snapshot. `version_number` is a
//! per-page counter, unrelated to `PageLayout::version`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::page::Page;

/// Stored snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PageVersion {
    pub id: i64,
    pub page_id: i64,
    pub tenant_id: String,
    pub version_number: i32,
    pub title: String,
    pub slug: String,
    pub page_type: String,
    pub status: String,
    pub theme_id: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub seo_keywords: Option<String>,
    pub seo_index: bool,
    pub layout_json: Value,
    pub created_by: Option<String>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Page metadata supplied by the caller for a snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageSnapshotData {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub page_type: Option<String>,
    pub status: Option<String>,
    pub theme_id: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub seo_keywords: Option<String>,
    pub seo_index: Option<bool>,
}

impl From<&Page> for PageSnapshotData {
    fn from(page: &Page) -> Self {
        Self {
            title: Some(page.title.clone()),
            slug: Some(page.slug.clone()),
            page_type: Some(page.page_type.clone()),
            status: Some(page.status.clone()),
            theme_id: page.theme_id.clone(),
            meta_title: page.meta_title.clone(),
            meta_description: page.meta_description.clone(),
            seo_keywords: page.seo_keywords.clone(),
            seo_index: Some(page.seo_index),
        }
    }
}

/// A snapshot ready to be appended; the version number is assigned on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPageVersion {
    pub page_id: i64,
    pub tenant_id: String,
    pub title: String,
    pub slug: String,
    pub page_type: String,
    pub status: String,
    pub theme_id: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub seo_keywords: Option<String>,
    pub seo_index: bool,
    pub layout_json: Value,
    pub created_by: Option<String>,
    pub comment: Option<String>,
}

impl NewPageVersion {
    /// Fill in defaults for anything the caller left out.
    pub fn new(
        page_id: i64,
        tenant_id: &str,
        data: PageSnapshotData,
        layout_json: Value,
        created_by: Option<String>,
        comment: Option<String>,
    ) -> Self {
        Self {
            page_id,
            tenant_id: tenant_id.to_string(),
            title: data.title.unwrap_or_default(),
            slug: data.slug.unwrap_or_default(),
            page_type: data.page_type.unwrap_or_else(|| "page".to_string()),
            status: data.status.unwrap_or_else(|| "draft".to_string()),
            theme_id: data.theme_id,
            meta_title: data.meta_title,
            meta_description: data.meta_description,
            seo_keywords: data.seo_keywords,
            seo_index: data.seo_index.unwrap_or(true),
            layout_json,
            created_by,
            comment,
        }
    }
}
