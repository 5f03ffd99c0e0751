//! Selector map loading and entry merging.
//!
//! The map is produced by external tooling and treated as best-effort:
//! tries with unknown strategy kinds are skipped with a warning, and key
//! shape violations are warnings only.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::types::{SelectorEntry, SelectorMetadata, SelectorTry};

static KEY_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_.:-]*$").expect("key pattern is valid"));

/// Non-fatal problem encountered while loading a map.
#[derive(Debug, Clone, PartialEq)]
pub struct MapWarning {
    pub key: String,
    pub message: String,
}

/// Mapping from logical key to selector entry.
#[derive(Debug, Clone, Default)]
pub struct SelectorMap {
    entries: HashMap<String, SelectorEntry>,
}

impl SelectorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, entry: SelectorEntry) {
        self.entries.insert(key.into(), entry);
    }

    pub fn get(&self, key: &str) -> Option<&SelectorEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Serialize the map back to its JSON exchange form.
    pub fn to_json(&self) -> Value {
        let mut out = serde_json::Map::with_capacity(self.entries.len());
        for (key, entry) in &self.entries {
            if let Ok(value) = serde_json::to_value(entry) {
                out.insert(key.clone(), value);
            }
        }
        Value::Object(out)
    }

    /// Load a map from its JSON representation. Tries whose strategy kind
    /// is unknown are dropped; every dropped try and malformed entry is
    /// reported as a warning rather than failing the load.
    pub fn from_json(value: &Value) -> (Self, Vec<MapWarning>) {
        let mut map = SelectorMap::new();
        let mut warnings = Vec::new();

        let Some(object) = value.as_object() else {
            warnings.push(MapWarning {
                key: String::new(),
                message: "selector map root must be an object".to_string(),
            });
            return (map, warnings);
        };

        for (key, raw_entry) in object {
            if !KEY_SHAPE.is_match(key) {
                warnings.push(MapWarning {
                    key: key.clone(),
                    message: format!("key '{key}' does not match the recommended shape"),
                });
            }

            let Some(entry_obj) = raw_entry.as_object() else {
                warnings.push(MapWarning {
                    key: key.clone(),
                    message: "entry must be an object".to_string(),
                });
                continue;
            };

            let scope_key = entry_obj
                .get("scopeKey")
                .and_then(Value::as_str)
                .map(str::to_string);

            let metadata: SelectorMetadata =
                serde_json::from_value(raw_entry.clone()).unwrap_or_default();

            let mut tries = Vec::new();
            if let Some(raw_tries) = entry_obj.get("tries").and_then(Value::as_array) {
                for (index, raw_try) in raw_tries.iter().enumerate() {
                    match serde_json::from_value::<SelectorTry>(raw_try.clone()) {
                        Ok(parsed) => tries.push(parsed),
                        Err(err) => {
                            let kind = raw_try
                                .get("kind")
                                .and_then(Value::as_str)
                                .unwrap_or("<missing>");
                            warn!(key = %key, kind = %kind, "skipping unknown selector try");
                            warnings.push(MapWarning {
                                key: key.clone(),
                                message: format!(
                                    "try #{} with kind '{kind}' skipped: {err}",
                                    index + 1
                                ),
                            });
                        }
                    }
                }
            }

            map.insert(
                key.clone(),
                SelectorEntry {
                    tries,
                    scope_key,
                    metadata,
                },
            );
        }

        (map, warnings)
    }
}

/// Merge two entries for the same key: tries are combined, stably sorted
/// by strategy priority, and deduplicated by structural identity (first
/// occurrence wins). Scope and scalar metadata prefer `primary`; tags are
/// unioned.
pub fn merge_entries(primary: &SelectorEntry, secondary: &SelectorEntry) -> SelectorEntry {
    let mut tries: Vec<SelectorTry> = primary
        .tries
        .iter()
        .chain(secondary.tries.iter())
        .cloned()
        .collect();
    tries.sort_by_key(|t| t.strategy.priority());

    let mut seen = Vec::new();
    tries.retain(|t| {
        let identity = t.strategy.canonical_identity();
        if seen.contains(&identity) {
            false
        } else {
            seen.push(identity);
            true
        }
    });

    let mut tags = primary.metadata.tags.clone();
    for tag in &secondary.metadata.tags {
        if !tags.contains(tag) {
            tags.push(tag.clone());
        }
    }

    SelectorEntry {
        tries,
        scope_key: primary
            .scope_key
            .clone()
            .or_else(|| secondary.scope_key.clone()),
        metadata: SelectorMetadata {
            stability_score: primary
                .metadata
                .stability_score
                .or(secondary.metadata.stability_score),
            tags,
            notes: primary
                .metadata
                .notes
                .clone()
                .or_else(|| secondary.metadata.notes.clone()),
            description: primary
                .metadata
                .description
                .clone()
                .or_else(|| secondary.metadata.description.clone()),
            last_updated_at: primary
                .metadata
                .last_updated_at
                .clone()
                .or_else(|| secondary.metadata.last_updated_at.clone()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Strategy;
    use serde_json::json;

    #[test]
    fn loads_entries_and_skips_unknown_kinds() {
        let raw = json!({
            "search.input": {
                "tries": [
                    { "kind": "css", "selector": "#q" },
                    { "kind": "hologram", "beam": "blue" },
                    { "kind": "testId", "testId": "search" }
                ],
                "tags": ["search"]
            }
        });
        let (map, warnings) = SelectorMap::from_json(&raw);
        let entry = map.get("search.input").unwrap();
        assert_eq!(entry.tries.len(), 2);
        assert_eq!(entry.metadata.tags, vec!["search".to_string()]);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("hologram"));
    }

    #[test]
    fn maps_round_trip_through_json() {
        let raw = json!({
            "cart.open": {
                "scopeKey": "cart",
                "tries": [
                    { "kind": "testId", "testId": "open-cart" },
                    { "kind": "css", "selector": ".cart-open" }
                ],
                "tags": ["cart"],
                "stabilityScore": 0.8
            },
            "cart": { "tries": [ { "kind": "css", "selector": "#cart" } ] }
        });
        let (map, warnings) = SelectorMap::from_json(&raw);
        assert!(warnings.is_empty());
        let (reloaded, warnings) = SelectorMap::from_json(&map.to_json());
        assert!(warnings.is_empty());
        let entry = reloaded.get("cart.open").unwrap();
        assert_eq!(entry.scope_key.as_deref(), Some("cart"));
        assert_eq!(entry.tries.len(), 2);
        assert_eq!(entry.metadata.stability_score, Some(0.8));
    }

    #[test]
    fn warns_on_bad_key_shape() {
        let raw = json!({ "9bad key": { "tries": [] } });
        let (map, warnings) = SelectorMap::from_json(&raw);
        assert!(map.contains("9bad key"));
        assert!(warnings
            .iter()
            .any(|w| w.message.contains("recommended shape")));
    }

    #[test]
    fn merge_orders_by_priority_and_dedupes() {
        let a = SelectorEntry::new(vec![
            SelectorTry::new(Strategy::Css {
                selector: ".go".into(),
            }),
            SelectorTry::new(Strategy::Role {
                role: "button".into(),
                name: None,
                label: None,
                text: None,
            }),
        ]);
        let b = SelectorEntry::new(vec![
            SelectorTry::new(Strategy::Css {
                selector: ".go".into(),
            })
            .with_tags(vec!["dup".into()]),
            SelectorTry::new(Strategy::TestId {
                test_id: "go".into(),
                attribute: None,
            }),
        ]);
        let merged = merge_entries(&a, &b);
        let kinds: Vec<&str> = merged.tries.iter().map(|t| t.strategy.kind()).collect();
        assert_eq!(kinds, vec!["role", "testId", "css"]);
        // The duplicate css try kept the first occurrence (no tags).
        let css = merged
            .tries
            .iter()
            .find(|t| t.strategy.kind() == "css")
            .unwrap();
        assert!(css.metadata.tags.is_empty());
    }

    #[test]
    fn merge_unions_tags_and_prefers_primary_scope() {
        let a = SelectorEntry::new(vec![])
            .with_scope("panel")
            .with_tags(vec!["a".into()]);
        let b = SelectorEntry::new(vec![])
            .with_scope("other")
            .with_tags(vec!["a".into(), "b".into()]);
        let merged = merge_entries(&a, &b);
        assert_eq!(merged.scope_key.as_deref(), Some("panel"));
        assert_eq!(merged.metadata.tags, vec!["a".to_string(), "b".to_string()]);
    }
}
