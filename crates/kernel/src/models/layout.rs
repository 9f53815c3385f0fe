//! Page layout model.
//!
//! A layout is the component tree of one page in one language. Exactly one
//! row exists per (page_id, language); `version` increments on every save.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LayoutError;

/// Language key for the untranslated layout.
pub const DEFAULT_LANGUAGE: &str = "default";

/// Layout row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PageLayout {
    pub id: i64,
    pub page_id: i64,
    pub language: String,

    /// `{"components": [{"id", "type", "props"}, ...]}`; props are opaque.
    pub layout_json: Value,

    /// Starts at 1, incremented on every successful update.
    pub version: i32,

    pub updated_at: DateTime<Utc>,
}

/// Layout as served to readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LayoutSnapshot {
    pub layout_json: Value,
    pub version: i32,
    pub updated_at: DateTime<Utc>,
}

impl From<PageLayout> for LayoutSnapshot {
    fn from(layout: PageLayout) -> Self {
        Self {
            layout_json: layout.layout_json,
            version: layout.version,
            updated_at: layout.updated_at,
        }
    }
}

/// Identity of a layout row, used when repairing duplicates.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct LayoutRowKey {
    pub id: i64,
    pub page_id: i64,
    pub language: String,
    pub updated_at: DateTime<Utc>,
}

/// Check the top-level shape of a layout document.
///
/// The document must be an object; `components`, when present, must be an array.
pub fn validate_layout(layout: &Value) -> Result<(), LayoutError> {
    let Some(obj) = layout.as_object() else {
        return Err(LayoutError::InvalidLayout(
            "layout must be a JSON object".to_string(),
        ));
    };

    match obj.get("components") {
        None | Some(Value::Array(_)) => Ok(()),
        Some(_) => Err(LayoutError::InvalidLayout(
            "\"components\" must be an array".to_string(),
        )),
    }
}

/// Number of top-level components in a layout.
pub fn component_count(layout: &Value) -> usize {
    layout
        .get("components")
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}
