//! Kernel services.
//!
//! The layout engine and the collaborators it drives: the upsert state
//! machine, text extraction, language settings, the translation provider,
//! fan-out and its background queue, plus page and version operations.

pub mod fanout;
pub mod languages;
pub mod layout;
pub mod layout_text;
pub mod page;
pub mod page_version;
pub mod queue;
pub mod translator;
pub mod upsert;

pub use fanout::{FanoutReport, TranslationFanout};
pub use layout::LayoutEngine;
pub use page::PageService;
pub use page_version::VersionService;
pub use queue::{EnqueueError, TranslationJob, TranslationQueue, TranslationWorker, spawn_translation_worker};
pub use translator::{HttpTranslator, PassthroughTranslator, Translator};
pub use upsert::{LayoutUpsert, UpsertOutcome, UpsertState};
