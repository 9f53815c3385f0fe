//! Page model.
//!
//! Pages are tenant-scoped content units. A page whose `tenant_id` is NULL is
//! a master page: shared read-only across every tenant and never mutated
//! through tenant-scoped operations.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Page record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Page {
    /// Surrogate key.
    pub id: i64,

    /// Owning tenant; None for master pages.
    pub tenant_id: Option<String>,

    /// URL path, unique per tenant.
    pub slug: String,

    pub title: String,

    /// page, header, footer, legal, ...
    pub page_type: String,

    /// Publication status (draft, published, ...).
    pub status: String,

    /// Theme binding.
    pub theme_id: Option<String>,

    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub seo_keywords: Option<String>,

    /// Whether search engines may index the page.
    pub seo_index: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Page {
    /// Check if this is a master page.
    pub fn is_master(&self) -> bool {
        self.tenant_id.is_none()
    }

    /// Check if the page belongs to the given tenant.
    pub fn is_owned_by(&self, tenant_id: &str) -> bool {
        self.tenant_id.as_deref() == Some(tenant_id)
    }
}

/// Input for updating page metadata. Unset fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePage {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub status: Option<String>,
    pub theme_id: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub seo_keywords: Option<String>,
    pub seo_index: Option<bool>,
}

/// A caller-supplied page identifier.
///
/// Route parameters arrive as strings. A numeric string normalizes to `Id`;
/// anything else passes through as `Raw` and is matched textually.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PageKey {
    Id(i64),
    Raw(String),
}

impl PageKey {
    /// Normalize a raw page id, falling back to the original value.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().parse::<i64>() {
            Ok(id) => Self::Id(id),
            Err(_) => Self::Raw(raw.to_string()),
        }
    }

    /// The integer id, when known.
    pub fn as_id(&self) -> Option<i64> {
        match self {
            Self::Id(id) => Some(*id),
            Self::Raw(_) => None,
        }
    }

    /// Textual form used for lenient matching.
    pub fn as_text(&self) -> String {
        match self {
            Self::Id(id) => id.to_string(),
            Self::Raw(raw) => raw.clone(),
        }
    }
}

impl From<i64> for PageKey {
    fn from(id: i64) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for PageKey {
    fn from(raw: &str) -> Self {
        Self::normalize(raw)
    }
}

impl From<String> for PageKey {
    fn from(raw: String) -> Self {
        Self::normalize(&raw)
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Raw(raw) => write!(f, "{raw:?}"),
        }
    }
}
