//! Structured resolver telemetry.
//!
//! Three event kinds (`attempt`, `success`, `miss`) fan out to the
//! structured logger, optional user callbacks, and, on miss, the HUD.
//! Every sink call is guarded; a failing sink never disturbs resolution.

use std::sync::Arc;

use serde_json::json;

use dgx_telemetry::{
    guard_sink, sanitize_json, HudLevel, HudNotification, HudSink, NullLogger, TelemetryLogger,
    MASKED_SELECTOR,
};

/// Cap on the merged tag list carried by resolver events.
pub const MAX_EVENT_TAGS: usize = 10;

/// Compact record of one attempt, carried in miss events.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptSummary {
    pub kind: String,
    pub success: bool,
    pub element_count: usize,
}

/// Per-attempt resolver event.
#[derive(Debug, Clone)]
pub struct ResolverAttemptEvent {
    pub key: String,
    pub scope_key: Option<String>,
    /// 1-based attempt index.
    pub attempt_index: usize,
    pub attempt_count: usize,
    pub strategy_kind: String,
    pub success: bool,
    pub element_count: usize,
    pub stability_score: Option<f64>,
    pub scope_unique: Option<bool>,
    pub tags: Vec<String>,
}

/// Overall success event.
#[derive(Debug, Clone)]
pub struct ResolverSuccessEvent {
    pub key: String,
    pub scope_key: Option<String>,
    pub strategy_kind: String,
    pub attempt_index: usize,
    pub attempt_count: usize,
    pub element_count: usize,
    pub stability_score: Option<f64>,
    pub scope_unique: Option<bool>,
    pub tags: Vec<String>,
}

/// Overall miss event with the ordered attempt summaries.
#[derive(Debug, Clone)]
pub struct ResolverMissEvent {
    pub key: String,
    pub scope_key: Option<String>,
    pub attempt_count: usize,
    pub attempts: Vec<AttemptSummary>,
    pub tags: Vec<String>,
}

/// Non-fatal resolver warning (recursion, missing key, scope miss).
#[derive(Debug, Clone)]
pub struct ResolverWarning {
    pub key: String,
    pub code: &'static str,
    pub message: String,
}

type AttemptCallback = Box<dyn Fn(&ResolverAttemptEvent) + Send + Sync>;
type SuccessCallback = Box<dyn Fn(&ResolverSuccessEvent) + Send + Sync>;
type MissCallback = Box<dyn Fn(&ResolverMissEvent) + Send + Sync>;

/// Merge try-level and entry-level tags: winning try first, entry second,
/// deduplicated, blanks dropped, capped at [`MAX_EVENT_TAGS`].
pub fn merge_tags(try_tags: &[String], entry_tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in try_tags.iter().chain(entry_tags.iter()) {
        let trimmed = tag.trim();
        if trimmed.is_empty() {
            continue;
        }
        if out.iter().any(|t| t == trimmed) {
            continue;
        }
        if out.len() == MAX_EVENT_TAGS {
            break;
        }
        out.push(trimmed.to_string());
    }
    out
}

/// Resolver telemetry hub.
pub struct ResolverTelemetry {
    logger: Arc<dyn TelemetryLogger>,
    hud: Option<Arc<dyn HudSink>>,
    hud_on_miss: bool,
    on_attempt: Option<AttemptCallback>,
    on_success: Option<SuccessCallback>,
    on_miss: Option<MissCallback>,
}

impl Default for ResolverTelemetry {
    fn default() -> Self {
        Self::new(Arc::new(NullLogger))
    }
}

impl ResolverTelemetry {
    pub fn new(logger: Arc<dyn TelemetryLogger>) -> Self {
        Self {
            logger,
            hud: None,
            hud_on_miss: true,
            on_attempt: None,
            on_success: None,
            on_miss: None,
        }
    }

    pub fn with_hud(mut self, hud: Arc<dyn HudSink>) -> Self {
        self.hud = Some(hud);
        self
    }

    /// Disable the HUD notification enqueued on miss.
    pub fn without_miss_notifications(mut self) -> Self {
        self.hud_on_miss = false;
        self
    }

    pub fn on_attempt(mut self, callback: impl Fn(&ResolverAttemptEvent) + Send + Sync + 'static) -> Self {
        self.on_attempt = Some(Box::new(callback));
        self
    }

    pub fn on_success(mut self, callback: impl Fn(&ResolverSuccessEvent) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Box::new(callback));
        self
    }

    pub fn on_miss(mut self, callback: impl Fn(&ResolverMissEvent) + Send + Sync + 'static) -> Self {
        self.on_miss = Some(Box::new(callback));
        self
    }

    pub fn attempt(&self, event: &ResolverAttemptEvent) {
        let data = sanitize_json(&json!({
            "key": event.key,
            "scopeKey": event.scope_key,
            "attempt": event.attempt_index,
            "of": event.attempt_count,
            "strategy": event.strategy_kind,
            "selector": MASKED_SELECTOR,
            "success": event.success,
            "elementCount": event.element_count,
            "stabilityScore": event.stability_score,
            "scopeUnique": event.scope_unique,
            "tags": event.tags,
        }));
        self.logger.debug("resolver attempt", Some(&data));
        if let Some(callback) = &self.on_attempt {
            guard_sink("resolver.on_attempt", || callback(event));
        }
    }

    pub fn success(&self, event: &ResolverSuccessEvent) {
        let data = sanitize_json(&json!({
            "key": event.key,
            "scopeKey": event.scope_key,
            "strategy": event.strategy_kind,
            "selector": MASKED_SELECTOR,
            "attempt": event.attempt_index,
            "of": event.attempt_count,
            "elementCount": event.element_count,
            "stabilityScore": event.stability_score,
            "scopeUnique": event.scope_unique,
            "tags": event.tags,
        }));
        self.logger.info("resolver success", Some(&data));
        if let Some(callback) = &self.on_success {
            guard_sink("resolver.on_success", || callback(event));
        }
    }

    pub fn miss(&self, event: &ResolverMissEvent) {
        let summaries: Vec<_> = event
            .attempts
            .iter()
            .map(|a| json!({ "kind": a.kind, "success": a.success, "elementCount": a.element_count }))
            .collect();
        let data = sanitize_json(&json!({
            "key": event.key,
            "scopeKey": event.scope_key,
            "attemptCount": event.attempt_count,
            "attempts": summaries,
            "tags": event.tags,
        }));
        self.logger.warn("resolver miss", Some(&data));
        if let Some(callback) = &self.on_miss {
            guard_sink("resolver.on_miss", || callback(event));
        }
        if self.hud_on_miss {
            if let Some(hud) = &self.hud {
                let strategies: Vec<&str> =
                    event.attempts.iter().map(|a| a.kind.as_str()).collect();
                let description = format!(
                    "'{}' missed after {} strategies: {}",
                    event.key,
                    event.attempt_count,
                    strategies.join(", ")
                );
                let notification =
                    HudNotification::new("Selector miss", description, HudLevel::Warn);
                guard_sink("resolver.hud", || hud.push(notification));
            }
        }
    }

    pub fn warning(&self, warning: &ResolverWarning) {
        let data = json!({ "key": warning.key, "code": warning.code });
        self.logger.warn(&warning.message, Some(&data));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dgx_telemetry::HudQueue;

    #[test]
    fn merge_tags_dedupes_and_caps() {
        let try_tags: Vec<String> = (0..8).map(|i| format!("t{i}")).collect();
        let entry_tags: Vec<String> =
            vec!["t0".into(), "  ".into(), "e1".into(), "e2".into(), "e3".into(), "e4".into()];
        let merged = merge_tags(&try_tags, &entry_tags);
        assert_eq!(merged.len(), MAX_EVENT_TAGS);
        assert_eq!(merged[0], "t0");
        assert!(!merged.contains(&"  ".to_string()));
        // Winning-try tags come first; entry tags fill the remainder.
        assert_eq!(merged[8], "e1");
    }

    #[test]
    fn miss_enqueues_hud_notification() {
        let hud = HudQueue::new(8);
        let telemetry = ResolverTelemetry::default().with_hud(hud.clone());
        telemetry.miss(&ResolverMissEvent {
            key: "primary".into(),
            scope_key: None,
            attempt_count: 2,
            attempts: vec![
                AttemptSummary {
                    kind: "role".into(),
                    success: false,
                    element_count: 0,
                },
                AttemptSummary {
                    kind: "css".into(),
                    success: false,
                    element_count: 0,
                },
            ],
            tags: vec![],
        });
        let entries = hud.drain();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "[DGX] Selector miss");
        assert!(entries[0].description.contains("role, css"));
    }

    #[test]
    fn miss_notifications_can_be_disabled() {
        let hud = HudQueue::new(8);
        let telemetry = ResolverTelemetry::default()
            .with_hud(hud.clone())
            .without_miss_notifications();
        telemetry.miss(&ResolverMissEvent {
            key: "primary".into(),
            scope_key: None,
            attempt_count: 0,
            attempts: vec![],
            tags: vec![],
        });
        assert!(hud.is_empty());
    }

    #[test]
    fn panicking_callback_is_isolated() {
        let telemetry = ResolverTelemetry::default().on_attempt(|_| panic!("bad sink"));
        telemetry.attempt(&ResolverAttemptEvent {
            key: "k".into(),
            scope_key: None,
            attempt_index: 1,
            attempt_count: 1,
            strategy_kind: "css".into(),
            success: false,
            element_count: 0,
            stability_score: None,
            scope_unique: None,
            tags: vec![],
        });
    }
}
