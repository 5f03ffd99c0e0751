//! The workflow context store.
//!
//! Paths are opaque keys: `ctx.target` is one key, not a traversal into
//! a nested object. Entries may carry a TTL (expired entries read as
//! absent and are removed lazily) and a mask flag that redacts the value
//! in telemetry while storage keeps the raw value for later steps.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time::Instant;

use dgx_telemetry::MASKED_VALUE;

/// Options for one `set`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
    pub ttl_ms: Option<u64>,
    pub mask: bool,
}

#[derive(Debug, Clone)]
struct ContextEntry {
    value: Value,
    masked: bool,
    expires_at: Option<Instant>,
}

impl ContextEntry {
    fn expired(&self) -> bool {
        self.expires_at
            .map(|at| Instant::now() >= at)
            .unwrap_or(false)
    }
}

/// Saved state for one child scope: the prior entry (or absence) of each
/// scoped binding, restored on exit.
#[derive(Debug, Default)]
struct ScopeFrame {
    saved: HashMap<String, Option<ContextEntry>>,
}

/// Ordered mutable key/value store with TTL, masking and child scopes.
#[derive(Debug, Default)]
pub struct WorkflowContext {
    entries: HashMap<String, ContextEntry>,
    scopes: Vec<ScopeFrame>,
}

impl WorkflowContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a path; expired entries are removed and read as absent.
    pub fn get(&mut self, path: &str) -> Option<Value> {
        if self.entries.get(path).map(|e| e.expired()).unwrap_or(false) {
            self.entries.remove(path);
            return None;
        }
        self.entries.get(path).map(|e| e.value.clone())
    }

    /// Read without removing expired entries (read-only callers).
    pub fn peek(&self, path: &str) -> Option<Value> {
        self.entries
            .get(path)
            .filter(|e| !e.expired())
            .map(|e| e.value.clone())
    }

    pub fn set(&mut self, path: impl Into<String>, value: Value, options: SetOptions) {
        let path = path.into();
        self.entries.insert(
            path,
            ContextEntry {
                value,
                masked: options.mask,
                expires_at: options
                    .ttl_ms
                    .map(|ttl| Instant::now() + Duration::from_millis(ttl)),
            },
        );
    }

    pub fn delete(&mut self, path: &str) {
        self.entries.remove(path);
    }

    /// Merge a JSON object, last write wins per path.
    pub fn merge(&mut self, object: &Value) {
        if let Some(map) = object.as_object() {
            for (key, value) in map {
                self.set(key.clone(), value.clone(), SetOptions::default());
            }
        }
    }

    /// Whether a path was stored with the mask flag.
    pub fn is_masked(&self, path: &str) -> bool {
        self.entries.get(path).map(|e| e.masked).unwrap_or(false)
    }

    /// Deep copy of the live entries with raw values.
    pub fn snapshot(&self) -> Value {
        let mut out = Map::new();
        for (key, entry) in &self.entries {
            if !entry.expired() {
                out.insert(key.clone(), entry.value.clone());
            }
        }
        Value::Object(out)
    }

    /// Snapshot for export: masked entries are redacted.
    pub fn snapshot_sanitized(&self) -> Value {
        let mut out = Map::new();
        for (key, entry) in &self.entries {
            if !entry.expired() {
                let value = if entry.masked {
                    Value::String(MASKED_VALUE.to_string())
                } else {
                    entry.value.clone()
                };
                out.insert(key.clone(), value);
            }
        }
        Value::Object(out)
    }

    /// Open a child scope shadowing the given bindings (the `foreach`
    /// loop variable and optional index variable).
    pub fn push_scope(&mut self, bindings: &[&str]) {
        let mut frame = ScopeFrame::default();
        for binding in bindings {
            frame
                .saved
                .insert((*binding).to_string(), self.entries.get(*binding).cloned());
        }
        self.scopes.push(frame);
    }

    /// Close the innermost scope, restoring shadowed bindings and
    /// discarding bindings the scope introduced.
    pub fn pop_scope(&mut self) {
        if let Some(frame) = self.scopes.pop() {
            for (key, saved) in frame.saved {
                match saved {
                    Some(entry) => {
                        self.entries.insert(key, entry);
                    }
                    None => {
                        self.entries.remove(&key);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_get_delete_roundtrip() {
        let mut ctx = WorkflowContext::new();
        ctx.set("user", json!("alice"), SetOptions::default());
        assert_eq!(ctx.get("user"), Some(json!("alice")));
        ctx.delete("user");
        assert_eq!(ctx.get("user"), None);
    }

    #[test]
    fn paths_are_opaque_keys() {
        let mut ctx = WorkflowContext::new();
        ctx.set("order.id", json!(42), SetOptions::default());
        assert_eq!(ctx.get("order.id"), Some(json!(42)));
        assert_eq!(ctx.get("order"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_expires_lazily() {
        let mut ctx = WorkflowContext::new();
        ctx.set(
            "flash",
            json!("hello"),
            SetOptions {
                ttl_ms: Some(100),
                mask: false,
            },
        );
        assert_eq!(ctx.get("flash"), Some(json!("hello")));
        tokio::time::advance(Duration::from_millis(150)).await;
        assert_eq!(ctx.get("flash"), None);
        assert!(ctx.snapshot().as_object().unwrap().is_empty());
    }

    #[test]
    fn masked_values_redact_in_sanitized_snapshot_only() {
        let mut ctx = WorkflowContext::new();
        ctx.set(
            "password",
            json!("hunter2"),
            SetOptions {
                ttl_ms: None,
                mask: true,
            },
        );
        assert_eq!(ctx.snapshot()["password"], json!("hunter2"));
        assert_eq!(ctx.snapshot_sanitized()["password"], json!(MASKED_VALUE));
        assert!(ctx.is_masked("password"));
    }

    #[test]
    fn merge_is_last_write_wins() {
        let mut ctx = WorkflowContext::new();
        ctx.set("a", json!(1), SetOptions::default());
        ctx.merge(&json!({ "a": 2, "b": 3 }));
        assert_eq!(ctx.get("a"), Some(json!(2)));
        assert_eq!(ctx.get("b"), Some(json!(3)));
    }

    #[test]
    fn child_scope_shadows_and_restores() {
        let mut ctx = WorkflowContext::new();
        ctx.set("item", json!("outer"), SetOptions::default());
        let before = ctx.snapshot();

        ctx.push_scope(&["item", "index"]);
        ctx.set("item", json!("inner"), SetOptions::default());
        ctx.set("index", json!(0), SetOptions::default());
        ctx.set("collected", json!("stays"), SetOptions::default());
        assert_eq!(ctx.get("item"), Some(json!("inner")));
        ctx.pop_scope();

        assert_eq!(ctx.get("item"), Some(json!("outer")));
        assert_eq!(ctx.get("index"), None);
        // Writes outside the scoped bindings persist.
        assert_eq!(ctx.get("collected"), Some(json!("stays")));
        let after = ctx.snapshot();
        assert_eq!(before["item"], after["item"]);
    }
}
