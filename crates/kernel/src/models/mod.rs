//! Database models.

pub mod layout;
pub mod page;
pub mod page_version;

pub use layout::{
    DEFAULT_LANGUAGE, LayoutRowKey, LayoutSnapshot, PageLayout, component_count, validate_layout,
};
pub use page::{Page, PageKey, UpdatePage};
pub use page_version::{NewPageVersion, PageSnapshotData, PageVersion};
