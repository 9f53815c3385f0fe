#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! Wires the real kernel services to the in-memory storage and fake
//! translator from `folio-test-utils`.

#![allow(dead_code)]

use std::sync::Arc;

use folio_kernel::metrics::{LanguageLabels, Metrics, TranslationLabels, UpsertLabels};
use folio_kernel::services::{
    LayoutEngine, PageService, TranslationFanout, TranslationWorker, VersionService,
    spawn_translation_worker,
};
use folio_kernel::storage::Storage;
use folio_test_utils::{FakeTranslator, MemoryStorage};

/// Kernel services over shared in-memory state.
pub struct Harness {
    pub storage: Arc<MemoryStorage>,
    pub translator: Arc<FakeTranslator>,
    pub metrics: Arc<Metrics>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(MemoryStorage::new(), FakeTranslator::new())
    }

    pub fn with(storage: MemoryStorage, translator: FakeTranslator) -> Self {
        Self {
            storage: Arc::new(storage),
            translator: Arc::new(translator),
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn storage(&self) -> Arc<dyn Storage> {
        self.storage.clone()
    }

    /// Engine without translation fan-out.
    pub fn engine(&self) -> LayoutEngine {
        LayoutEngine::new(self.storage(), self.metrics.clone())
    }

    pub fn fanout(&self) -> TranslationFanout {
        TranslationFanout::new(self.storage(), self.translator.clone(), self.metrics.clone())
    }

    /// Engine feeding a running translation worker.
    ///
    /// Drop the engine, then join the worker, to wait for queued fan-outs.
    pub fn engine_with_worker(&self, capacity: usize) -> (LayoutEngine, TranslationWorker) {
        let (queue, worker) =
            spawn_translation_worker(Arc::new(self.fanout()), self.metrics.clone(), capacity);
        (self.engine().with_translation_queue(queue), worker)
    }

    pub fn pages(&self) -> PageService {
        PageService::new(self.storage())
    }

    pub fn versions(&self) -> VersionService {
        VersionService::new(self.storage())
    }

    pub fn upserts(&self, outcome: &str) -> u64 {
        self.metrics
            .layout_upserts
            .get_or_create(&UpsertLabels {
                outcome: outcome.to_string(),
            })
            .get()
    }

    pub fn languages(&self, language: &str, status: &str) -> u64 {
        self.metrics
            .translation_languages
            .get_or_create(&TranslationLabels {
                language: language.to_string(),
                status: status.to_string(),
            })
            .get()
    }

    pub fn leaf_failures(&self, language: &str) -> u64 {
        self.metrics
            .translation_leaf_failures
            .get_or_create(&LanguageLabels {
                language: language.to_string(),
            })
            .get()
    }
}
