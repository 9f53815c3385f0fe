//! Translatable text extraction and injection for layout trees.
//!
//! Extraction walks an arbitrary JSON tree and collects prose strings into a
//! flat map keyed by path (`components[2].props.headline`). Injection is the
//! structural mirror: it rebuilds the tree, swapping in translated strings
//! at the same paths and leaving everything else untouched.
//!
//! The translatable-string test is a heuristic. A single bare word such as
//! "Welcome" looks like an identifier and is skipped; that is intentional.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

/// Flat path → text mapping.
pub type TextMap = BTreeMap<String, String>;

/// Object keys whose values are structural and never translated.
const SKIP_KEYS: &[&str] = &[
    "id",
    "src",
    "link",
    "url",
    "image",
    "images",
    "avatar",
    "logo",
    "phonenumber",
    "email",
    "date",
    "rating",
    "version",
    "sort_order",
    "sortorder",
    "level",
    "required",
    "value",
    "type",
    "key",
];

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[a-zA-Z0-9_-]+$").expect("identifier pattern is valid")
});

/// Whether values under this key are skipped (case-insensitive).
pub fn is_skipped_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SKIP_KEYS.contains(&lower.as_str())
}

/// Whether a string leaf is prose worth translating.
///
/// Rejects blank strings, URLs, absolute paths, and identifier-like tokens
/// (slugs, ids, enum values).
pub fn is_translatable(text: &str) -> bool {
    let trimmed = text.trim();
    !trimmed.is_empty()
        && !trimmed.starts_with("http")
        && !trimmed.starts_with('/')
        && !IDENTIFIER.is_match(trimmed)
}

fn child_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

fn index_path(parent: &str, index: usize) -> String {
    format!("{parent}[{index}]")
}

/// Collect every translatable string in `tree`, keyed by path.
pub fn extract_translatable_text(tree: &Value) -> TextMap {
    let mut texts = TextMap::new();
    extract_into(tree, "", &mut texts);
    texts
}

fn extract_into(value: &Value, path: &str, texts: &mut TextMap) {
    match value {
        Value::String(s) if is_translatable(s) => {
            texts.insert(path.to_string(), s.clone());
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                extract_into(item, &index_path(path, index), texts);
            }
        }
        Value::Object(map) => {
            for (key, child) in map {
                if is_skipped_key(key) {
                    continue;
                }
                extract_into(child, &child_path(path, key), texts);
            }
        }
        _ => {}
    }
}

/// Build a copy of `tree` with the strings at the given paths replaced.
///
/// The input tree is never modified, so it can serve as the source for every
/// target language.
pub fn inject_translated_text(tree: &Value, translations: &TextMap) -> Value {
    inject_at(tree, "", translations)
}

fn inject_at(value: &Value, path: &str, translations: &TextMap) -> Value {
    match value {
        Value::String(_) => match translations.get(path) {
            Some(translated) => Value::String(translated.clone()),
            None => value.clone(),
        },
        Value::Array(items) => Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(index, item)| inject_at(item, &index_path(path, index), translations))
                .collect(),
        ),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, child) in map {
                let child = if is_skipped_key(key) {
                    child.clone()
                } else {
                    inject_at(child, &child_path(path, key), translations)
                };
                out.insert(key.clone(), child);
            }
            Value::Object(out)
        }
        _ => value.clone(),
    }
}
