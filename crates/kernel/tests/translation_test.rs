#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Translation fan-out tests.
//!
//! Default-language saves propagate to every configured language through the
//! background worker; provider and storage failures stay contained.

mod common;

use chrono::Utc;

use common::Harness;
use folio_test_utils::{FakeTranslator, MemoryStorage, assert, layouts, test_page};

fn harness_with(translator: FakeTranslator) -> Harness {
    let h = Harness::with(MemoryStorage::new(), translator);
    h.storage.add_page(test_page(42, "t1"));
    h.storage.configure_languages("t1", "default,fr,es", "default");
    h
}

#[tokio::test]
async fn default_save_fans_out_to_every_language() {
    let h = harness_with(FakeTranslator::new());
    let (engine, worker) = h.engine_with_worker(8);
    let layout = layouts::hero("Welcome to our site");

    assert!(engine
        .update_page_layout(42_i64, &layout, "t1", "default", None)
        .await
        .unwrap());
    drop(engine);
    assert_eq!(worker.join().await, 1);

    for language in ["fr", "es"] {
        let row = h.storage.layout(42, language).unwrap();
        assert_eq!(row.version, 1);
        assert::same_components(&row.layout_json, &layout);
        assert_eq!(
            row.layout_json["components"][0]["props"]["headline"],
            FakeTranslator::expected("Welcome to our site", language)
        );
        assert_eq!(h.languages(language, "ok"), 1);
    }

    // The source row is untouched by the fan-out.
    assert::json_eq(&h.storage.layout(42, "default").unwrap().layout_json, &layout);
}

#[tokio::test]
async fn provider_failure_for_one_language_keeps_original_text() {
    let h = harness_with(FakeTranslator::new().failing_for("es"));
    let (engine, worker) = h.engine_with_worker(8);
    let layout = layouts::hero("Welcome to our site");

    let saved = engine
        .update_page_layout(42_i64, &layout, "t1", "default", None)
        .await;
    assert!(saved.unwrap());
    drop(engine);
    worker.join().await;

    let fr = h.storage.layout(42, "fr").unwrap();
    assert_eq!(
        fr.layout_json["components"][0]["props"]["headline"],
        "[fr] Welcome to our site"
    );

    let es = h.storage.layout(42, "es").unwrap();
    assert::json_eq(&es.layout_json, &layout);
    assert_eq!(h.leaf_failures("es"), 1);
    assert_eq!(h.leaf_failures("fr"), 0);
}

#[tokio::test]
async fn storage_failure_for_one_language_skips_only_that_language() {
    let h = harness_with(FakeTranslator::new());
    h.storage.fail_layout_writes_for("es");

    let report = h
        .fanout()
        .translate_layout_to_all_languages(42, &layouts::hero("Welcome to our site"), "t1")
        .await;

    assert_eq!(report.translated, vec!["fr".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].starts_with("es:"));
    assert!(h.storage.layout(42, "fr").is_some());
    assert!(h.storage.layout(42, "es").is_none());
    assert_eq!(h.languages("es", "failed"), 1);
}

#[tokio::test]
async fn repeated_fanout_updates_translated_rows() {
    let h = harness_with(FakeTranslator::new());
    let fanout = h.fanout();

    fanout
        .translate_layout_to_all_languages(42, &layouts::hero("Welcome to our site"), "t1")
        .await;
    fanout
        .translate_layout_to_all_languages(42, &layouts::hero("Welcome back, friend"), "t1")
        .await;

    let fr = h.storage.layout(42, "fr").unwrap();
    assert_eq!(fr.version, 2);
    assert_eq!(
        fr.layout_json["components"][0]["props"]["headline"],
        "[fr] Welcome back, friend"
    );
}

#[tokio::test]
async fn one_provider_call_per_leaf_and_language() {
    let h = harness_with(FakeTranslator::new());
    h.storage.configure_languages("t1", "en,fr,es", "en");

    let report = h
        .fanout()
        .translate_layout_to_all_languages(42, &layouts::landing(), "t1")
        .await;
    assert_eq!(report.translated, vec!["fr".to_string(), "es".to_string()]);

    let calls = h.translator.calls();
    let per_language = calls.iter().filter(|c| c.target == "fr").count();
    assert_eq!(calls.len(), per_language * 2);
    assert!(calls.iter().all(|c| c.source == "en"));
    assert!(calls.iter().any(|c| c.text == "Build better pages"));
    // Skip-listed keys never reach the provider, whatever their content.
    assert!(!calls.iter().any(|c| c.text.contains("hello@example.com")));
    assert!(!calls.iter().any(|c| c.text.starts_with("https://")));
}

#[tokio::test]
async fn structural_fields_survive_translation() {
    let h = harness_with(FakeTranslator::new());
    let layout = layouts::landing();

    h.fanout()
        .translate_layout_to_all_languages(42, &layout, "t1")
        .await;

    let fr = h.storage.layout(42, "fr").unwrap().layout_json;
    assert::same_components(&fr, &layout);
    let hero = &fr["components"][0]["props"];
    assert_eq!(hero["image"], "https://cdn.example.com/hero.png");
    assert_eq!(hero["link"], "/signup");
    assert_eq!(hero["headline"], "[fr] Build better pages");
    assert_eq!(fr["components"][1]["props"]["items"][0]["sort_order"], 1);
    assert_eq!(fr["components"][1]["props"]["items"][0]["icon"], "bolt");
    assert_eq!(
        fr["components"][2]["props"]["email"],
        "Write to hello@example.com any time"
    );
}

#[tokio::test]
async fn single_word_text_is_left_alone() {
    let h = harness_with(FakeTranslator::new());

    let report = h
        .fanout()
        .translate_layout_to_all_languages(42, &layouts::hero("Welcome"), "t1")
        .await;

    assert!(report.is_noop());
    assert!(h.translator.calls().is_empty());
    assert!(h.storage.layout(42, "fr").is_none());
}

#[tokio::test]
async fn no_configured_languages_is_a_noop() {
    let h = Harness::new();
    h.storage.add_page(test_page(42, "t1"));

    let report = h
        .fanout()
        .translate_layout_to_all_languages(42, &layouts::hero("Welcome to our site"), "t1")
        .await;

    assert!(report.is_noop());
    assert_eq!(h.storage.layout_count(), 0);
}

#[tokio::test]
async fn non_default_saves_do_not_fan_out() {
    let h = harness_with(FakeTranslator::new());
    let (engine, worker) = h.engine_with_worker(8);

    engine
        .update_page_layout(42_i64, &layouts::hero("Bonjour tout le monde"), "t1", "fr", None)
        .await
        .unwrap();
    drop(engine);

    assert_eq!(worker.join().await, 0);
    assert!(h.storage.layout(42, "es").is_none());
    assert!(h.translator.calls().is_empty());
}

#[tokio::test]
async fn tenant_default_language_triggers_fan_out() {
    let h = harness_with(FakeTranslator::new());
    h.storage.configure_languages("t1", "en,fr", "en");
    let (engine, worker) = h.engine_with_worker(8);

    engine
        .update_page_layout(42_i64, &layouts::hero("Hello and welcome"), "t1", "en", None)
        .await
        .unwrap();
    drop(engine);
    worker.join().await;

    assert!(h.storage.layout(42, "fr").is_some());
    assert!(h.storage.layout(42, "en").is_some());
    assert!(h.storage.layout(42, "default").is_none());
}

#[tokio::test]
async fn existing_translation_rows_are_updated_in_place() {
    let h = harness_with(FakeTranslator::new());
    let seeded = h
        .storage
        .seed_layout(42, "fr", layouts::hero("Ancien titre ici"), 6, Utc::now());

    h.fanout()
        .translate_layout_to_all_languages(42, &layouts::hero("Welcome to our site"), "t1")
        .await;

    let fr = h.storage.layout(42, "fr").unwrap();
    assert_eq!(fr.id, seeded);
    assert_eq!(fr.version, 7);
}
