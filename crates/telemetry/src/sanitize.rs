//! Masking of sensitive values at the telemetry boundary.
//!
//! Storage keeps raw values so later steps can use them; only exported
//! payloads are masked. Two rules apply uniformly: values under a
//! sensitive-looking key become `********`, and raw selector strings
//! become `[***masked***]`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use dgx_dom::NodeSummary;

/// Replacement for values stored under sensitive keys.
pub const MASKED_VALUE: &str = "********";

/// Replacement for selector strings in log payloads.
pub const MASKED_SELECTOR: &str = "[***masked***]";

/// Maximum classes retained in an element summary.
pub const MAX_SUMMARY_CLASSES: usize = 5;

static SENSITIVE_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)password|secret|token|auth|cookie|session|credential|key")
        .expect("sensitive-key pattern is valid")
});

/// Envelope fields that name logical selector keys, not secrets. The
/// sensitive pattern's `key` arm would otherwise swallow them.
const ENVELOPE_KEYS: [&str; 6] = [
    "key",
    "logicalKey",
    "scopeKey",
    "scrollerKey",
    "containerKey",
    "parentKey",
];

/// Whether a context path or field name must be masked in telemetry.
pub fn is_sensitive_key(key: &str) -> bool {
    if ENVELOPE_KEYS.contains(&key) {
        return false;
    }
    SENSITIVE_KEY.is_match(key)
}

/// Mask a single value for export under the given key.
pub fn mask_for_key(key: &str, value: &Value) -> Value {
    if is_sensitive_key(key) {
        Value::String(MASKED_VALUE.to_string())
    } else {
        value.clone()
    }
}

/// Recursively mask every object entry whose key looks sensitive.
pub fn sanitize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, entry) in map {
                if is_sensitive_key(key) {
                    out.insert(key.clone(), Value::String(MASKED_VALUE.to_string()));
                } else {
                    out.insert(key.clone(), sanitize_json(entry));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sanitize_json).collect()),
        other => other.clone(),
    }
}

/// Trim an element summary for export (classes capped at 5).
pub fn sanitize_summary(summary: &NodeSummary) -> NodeSummary {
    NodeSummary {
        tag: summary.tag.clone(),
        id: summary.id.clone(),
        classes: summary
            .classes
            .iter()
            .take(MAX_SUMMARY_CLASSES)
            .cloned()
            .collect(),
    }
}

/// Collapse runs of whitespace and trim, the normalization text
/// predicates and accessible names share.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sensitive_keys_match_case_insensitively() {
        assert!(is_sensitive_key("password"));
        assert!(is_sensitive_key("API_TOKEN"));
        assert!(is_sensitive_key("sessionId"));
        assert!(is_sensitive_key("apiKey"));
        assert!(!is_sensitive_key("username"));
    }

    #[test]
    fn logical_key_envelope_fields_are_exempt() {
        assert!(!is_sensitive_key("key"));
        assert!(!is_sensitive_key("logicalKey"));
        assert!(!is_sensitive_key("scopeKey"));
        // Anything else containing the `key` arm still masks.
        assert!(is_sensitive_key("apiKeyValue"));
    }

    #[test]
    fn sanitize_json_masks_nested_entries() {
        let input = json!({
            "user": "alice",
            "password": "hunter2",
            "nested": { "authHeader": "Bearer x", "count": 3 },
            "list": [{ "cookie": "c" }]
        });
        let out = sanitize_json(&input);
        assert_eq!(out["user"], "alice");
        assert_eq!(out["password"], MASKED_VALUE);
        assert_eq!(out["nested"]["authHeader"], MASKED_VALUE);
        assert_eq!(out["nested"]["count"], 3);
        assert_eq!(out["list"][0]["cookie"], MASKED_VALUE);
    }

    #[test]
    fn summary_classes_are_capped() {
        let summary = NodeSummary {
            tag: "div".to_string(),
            id: None,
            classes: (0..8).map(|i| format!("c{i}")).collect(),
        };
        assert_eq!(sanitize_summary(&summary).classes.len(), 5);
    }

    #[test]
    fn collapse_whitespace_normalizes() {
        assert_eq!(collapse_whitespace("  a \n b\t c  "), "a b c");
    }
}
