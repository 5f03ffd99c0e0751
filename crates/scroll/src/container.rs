//! Scroll container detection.
//!
//! A cascade of strategies, stopping at the first accepted candidate:
//! ancestor overflow walk, hint attributes, caller-supplied context
//! elements, caller-supplied context keys, document fallback. Every probe
//! is recorded in the returned history.

use std::sync::Arc;

use serde_json::json;

use dgx_dom::{DomBackend, NodeHandle};

use crate::telemetry::ScrollTelemetry;

/// Ordered default hint attributes probed on ancestors.
pub const DEFAULT_HINT_ATTRIBUTES: [&str; 3] = [
    "data-dgx-scroller",
    "data-dgx-scroll-root",
    "data-dgx-scroll-container",
];

/// Resolves a logical key to an element, supplied by the embedding layer.
pub type KeyResolverFn = Arc<dyn Fn(&str) -> Option<NodeHandle> + Send + Sync>;

/// Detection strategy identifiers, in cascade order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectStrategy {
    AncestorOverflow,
    HintAttribute,
    ContextElement,
    ContextKey,
    Document,
}

impl DetectStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectStrategy::AncestorOverflow => "ancestor-overflow",
            DetectStrategy::HintAttribute => "hint-attribute",
            DetectStrategy::ContextElement => "context-element",
            DetectStrategy::ContextKey => "context-key",
            DetectStrategy::Document => "document",
        }
    }
}

/// One probe made by the cascade.
#[derive(Debug, Clone)]
pub struct CandidateRecord {
    pub kind: DetectStrategy,
    pub accepted: bool,
    pub reason: String,
    pub source: Option<String>,
    pub element: Option<NodeHandle>,
}

/// Detector options.
#[derive(Clone, Default)]
pub struct DetectOptions {
    /// Upper bound of the ancestor walk (inclusive).
    pub root: Option<NodeHandle>,
    /// Hint attributes probed in order; `None` uses the defaults.
    pub hints: Option<Vec<String>>,
    /// Fallback containers supplied by the caller, in order.
    pub context_elements: Vec<NodeHandle>,
    /// Fallback logical keys, resolved through `key_resolver`.
    pub context_keys: Vec<String>,
    pub key_resolver: Option<KeyResolverFn>,
    /// Start the overflow walk at the target itself instead of its parent.
    pub include_self: bool,
}

/// Detection outcome.
#[derive(Debug, Clone)]
pub struct Detection {
    pub element: NodeHandle,
    pub strategy: DetectStrategy,
    pub history: Vec<CandidateRecord>,
    pub hints_tried: Vec<String>,
    pub fallback_applied: bool,
    pub summaries: Vec<String>,
}

/// Whether a node is a scroll container: overflow `auto`/`scroll`/
/// `overlay` with real overflow on that axis (beyond a 1px slack), or
/// overflow `scroll` regardless of content size.
pub fn scrollable_reason(backend: &dyn DomBackend, node: &NodeHandle) -> Result<String, String> {
    let Some(style) = backend.computed_style(node) else {
        return Err("no computed style".to_string());
    };
    let state = backend.scroll_state(node);
    let scroll_y = matches!(style.overflow_y.as_str(), "auto" | "scroll" | "overlay");
    let scroll_x = matches!(style.overflow_x.as_str(), "auto" | "scroll" | "overlay");

    if let Some(state) = &state {
        if scroll_y && state.scroll_height > state.client_height + 1.0 {
            return Ok(format!(
                "overflow-y {} with {}px of overflow",
                style.overflow_y,
                state.scroll_height - state.client_height
            ));
        }
        if scroll_x && state.scroll_width > state.client_width + 1.0 {
            return Ok(format!(
                "overflow-x {} with {}px of overflow",
                style.overflow_x,
                state.scroll_width - state.client_width
            ));
        }
    }
    if style.overflow_y == "scroll" || style.overflow_x == "scroll" {
        return Ok("overflow scroll".to_string());
    }
    Err(format!(
        "overflow {}/{} without overflowing content",
        style.overflow_x, style.overflow_y
    ))
}

fn describe(backend: &dyn DomBackend, node: &NodeHandle) -> String {
    match backend.describe(node) {
        Some(summary) => match &summary.id {
            Some(id) => format!("<{}#{}>", summary.tag, id),
            None => format!("<{}>", summary.tag),
        },
        None => node.to_string(),
    }
}

/// Walk the flattened-tree ancestors of `target` up to and including
/// `root` (or the whole document).
fn ancestor_chain(
    backend: &dyn DomBackend,
    target: &NodeHandle,
    root: Option<&NodeHandle>,
    include_self: bool,
) -> Vec<NodeHandle> {
    let mut chain = Vec::new();
    let mut cursor = if include_self {
        Some(*target)
    } else {
        backend.parent(target)
    };
    while let Some(node) = cursor {
        chain.push(node);
        if root.map(|r| *r == node).unwrap_or(false) {
            break;
        }
        cursor = backend.parent(&node);
    }
    chain
}

/// Resolve a hint attribute value: caller's key resolver first, then CSS
/// when the value looks like a selector, then `getElementById` for bare
/// identifiers.
fn resolve_hint_value(
    backend: &dyn DomBackend,
    value: &str,
    key_resolver: Option<&KeyResolverFn>,
) -> Option<NodeHandle> {
    if let Some(resolver) = key_resolver {
        if let Some(node) = resolver(value) {
            return Some(node);
        }
    }
    let looks_like_selector = value.starts_with('#')
        || value.starts_with('.')
        || value.contains(' ')
        || value.contains('[')
        || value.contains('>');
    if looks_like_selector {
        if let Ok(matches) = backend.query_css(None, value) {
            if let Some(first) = matches.first() {
                return Some(*first);
            }
        }
        return None;
    }
    backend.element_by_id(value)
}

/// Run the detection cascade for `target`.
pub fn detect_scroll_container(
    backend: &dyn DomBackend,
    target: &NodeHandle,
    options: &DetectOptions,
    telemetry: &ScrollTelemetry,
) -> Option<Detection> {
    let mut history: Vec<CandidateRecord> = Vec::new();
    let mut hints_tried: Vec<String> = Vec::new();
    let mut summaries: Vec<String> = Vec::new();

    let record = |history: &mut Vec<CandidateRecord>,
                      summaries: &mut Vec<String>,
                      candidate: CandidateRecord| {
        telemetry.detail(
            "scroll container candidate",
            json!({
                "strategy": candidate.kind.as_str(),
                "accepted": candidate.accepted,
                "reason": candidate.reason,
                "source": candidate.source,
            }),
        );
        summaries.push(format!(
            "{}: {} ({})",
            candidate.kind.as_str(),
            if candidate.accepted { "accepted" } else { "rejected" },
            candidate.reason
        ));
        history.push(candidate);
    };

    let accept = |element: NodeHandle,
                  strategy: DetectStrategy,
                  history: Vec<CandidateRecord>,
                  hints_tried: Vec<String>,
                  fallback_applied: bool,
                  summaries: Vec<String>| {
        telemetry.detail(
            if fallback_applied {
                "scroll container fallback"
            } else {
                "scroll container resolved"
            },
            json!({ "strategy": strategy.as_str(), "container": describe(backend, &element) }),
        );
        Some(Detection {
            element,
            strategy,
            history,
            hints_tried,
            fallback_applied,
            summaries,
        })
    };

    let ancestors = ancestor_chain(backend, target, options.root.as_ref(), options.include_self);

    // 1. ancestor-overflow
    for ancestor in &ancestors {
        match scrollable_reason(backend, ancestor) {
            Ok(reason) => {
                record(
                    &mut history,
                    &mut summaries,
                    CandidateRecord {
                        kind: DetectStrategy::AncestorOverflow,
                        accepted: true,
                        reason,
                        source: Some(describe(backend, ancestor)),
                        element: Some(*ancestor),
                    },
                );
                return accept(
                    *ancestor,
                    DetectStrategy::AncestorOverflow,
                    history,
                    hints_tried,
                    false,
                    summaries,
                );
            }
            Err(reason) => record(
                &mut history,
                &mut summaries,
                CandidateRecord {
                    kind: DetectStrategy::AncestorOverflow,
                    accepted: false,
                    reason,
                    source: Some(describe(backend, ancestor)),
                    element: Some(*ancestor),
                },
            ),
        }
    }

    // 2. hint-attribute
    let default_hints: Vec<String> = DEFAULT_HINT_ATTRIBUTES
        .iter()
        .map(|h| h.to_string())
        .collect();
    let hints = options.hints.clone().unwrap_or(default_hints);
    for ancestor in &ancestors {
        for hint in &hints {
            let Some(value) = backend.attribute(ancestor, hint) else {
                continue;
            };
            hints_tried.push(hint.clone());
            let resolved = resolve_hint_value(backend, &value, options.key_resolver.as_ref());
            match resolved {
                Some(candidate) => match scrollable_reason(backend, &candidate) {
                    Ok(reason) => {
                        record(
                            &mut history,
                            &mut summaries,
                            CandidateRecord {
                                kind: DetectStrategy::HintAttribute,
                                accepted: true,
                                reason,
                                source: Some(format!("{hint}={value}")),
                                element: Some(candidate),
                            },
                        );
                        return accept(
                            candidate,
                            DetectStrategy::HintAttribute,
                            history,
                            hints_tried,
                            false,
                            summaries,
                        );
                    }
                    Err(reason) => record(
                        &mut history,
                        &mut summaries,
                        CandidateRecord {
                            kind: DetectStrategy::HintAttribute,
                            accepted: false,
                            reason,
                            source: Some(format!("{hint}={value}")),
                            element: Some(candidate),
                        },
                    ),
                },
                None => record(
                    &mut history,
                    &mut summaries,
                    CandidateRecord {
                        kind: DetectStrategy::HintAttribute,
                        accepted: false,
                        reason: "hint value did not resolve".to_string(),
                        source: Some(format!("{hint}={value}")),
                        element: None,
                    },
                ),
            }
        }
    }

    // 3. context-element
    for element in &options.context_elements {
        match scrollable_reason(backend, element) {
            Ok(reason) => {
                record(
                    &mut history,
                    &mut summaries,
                    CandidateRecord {
                        kind: DetectStrategy::ContextElement,
                        accepted: true,
                        reason,
                        source: Some(describe(backend, element)),
                        element: Some(*element),
                    },
                );
                return accept(
                    *element,
                    DetectStrategy::ContextElement,
                    history,
                    hints_tried,
                    false,
                    summaries,
                );
            }
            Err(reason) => record(
                &mut history,
                &mut summaries,
                CandidateRecord {
                    kind: DetectStrategy::ContextElement,
                    accepted: false,
                    reason,
                    source: Some(describe(backend, element)),
                    element: Some(*element),
                },
            ),
        }
    }

    // 4. context-key
    for key in &options.context_keys {
        let resolved = options
            .key_resolver
            .as_ref()
            .and_then(|resolver| resolver(key));
        match resolved {
            Some(element) => match scrollable_reason(backend, &element) {
                Ok(reason) => {
                    record(
                        &mut history,
                        &mut summaries,
                        CandidateRecord {
                            kind: DetectStrategy::ContextKey,
                            accepted: true,
                            reason,
                            source: Some(key.clone()),
                            element: Some(element),
                        },
                    );
                    return accept(
                        element,
                        DetectStrategy::ContextKey,
                        history,
                        hints_tried,
                        false,
                        summaries,
                    );
                }
                Err(reason) => record(
                    &mut history,
                    &mut summaries,
                    CandidateRecord {
                        kind: DetectStrategy::ContextKey,
                        accepted: false,
                        reason,
                        source: Some(key.clone()),
                        element: Some(element),
                    },
                ),
            },
            None => record(
                &mut history,
                &mut summaries,
                CandidateRecord {
                    kind: DetectStrategy::ContextKey,
                    accepted: false,
                    reason: "key did not resolve".to_string(),
                    source: Some(key.clone()),
                    element: None,
                },
            ),
        }
    }

    // 5. document fallback
    if let Some(element) = backend.scrolling_element().or_else(|| backend.document_root()) {
        record(
            &mut history,
            &mut summaries,
            CandidateRecord {
                kind: DetectStrategy::Document,
                accepted: true,
                reason: "document scrolling element".to_string(),
                source: None,
                element: Some(element),
            },
        );
        return accept(
            element,
            DetectStrategy::Document,
            history,
            hints_tried,
            true,
            summaries,
        );
    }

    telemetry.warn_detail(
        "no scroll container found",
        json!({ "target": describe(backend, target) }),
    );
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use dgx_dom::{ElementSpec, SimDom};

    fn telemetry() -> ScrollTelemetry {
        ScrollTelemetry::default()
    }

    #[test]
    fn finds_overflowing_ancestor() {
        let dom = SimDom::new();
        let root = dom.root();
        let list = dom.append(
            &root,
            ElementSpec::new("div")
                .id("list")
                .rect(0.0, 0.0, 300.0, 200.0)
                .scrollable(300.0, 900.0),
        );
        let item = dom.append(&list, ElementSpec::new("li").rect(400.0, 0.0, 300.0, 40.0));

        let detection =
            detect_scroll_container(&dom, &item, &DetectOptions::default(), &telemetry()).unwrap();
        assert_eq!(detection.element, list);
        assert_eq!(detection.strategy, DetectStrategy::AncestorOverflow);
        assert!(!detection.fallback_applied);
        assert!(detection.history.iter().any(|c| c.accepted));
    }

    #[test]
    fn hint_attribute_resolves_by_id() {
        let dom = SimDom::new();
        let root = dom.root();
        let scroller = dom.append(
            &root,
            ElementSpec::new("div")
                .id("feed")
                .rect(0.0, 0.0, 300.0, 200.0)
                .scrollable(300.0, 900.0),
        );
        let section = dom.append(
            &root,
            ElementSpec::new("section").attr("data-dgx-scroller", "feed"),
        );
        let item = dom.append(&section, ElementSpec::new("p"));

        let detection =
            detect_scroll_container(&dom, &item, &DetectOptions::default(), &telemetry()).unwrap();
        assert_eq!(detection.element, scroller);
        assert_eq!(detection.strategy, DetectStrategy::HintAttribute);
        assert_eq!(detection.hints_tried, vec!["data-dgx-scroller".to_string()]);
    }

    #[test]
    fn context_key_resolution_uses_caller_resolver() {
        let dom = SimDom::new();
        let root = dom.root();
        let scroller = dom.append(
            &root,
            ElementSpec::new("div")
                .rect(0.0, 0.0, 300.0, 200.0)
                .scrollable(300.0, 900.0),
        );
        let orphan = dom.append(&root, ElementSpec::new("p"));

        let resolver: KeyResolverFn = {
            let scroller = scroller;
            Arc::new(move |key: &str| (key == "feed.scroller").then_some(scroller))
        };
        let options = DetectOptions {
            context_keys: vec!["feed.scroller".to_string()],
            key_resolver: Some(resolver),
            ..Default::default()
        };
        let detection = detect_scroll_container(&dom, &orphan, &options, &telemetry()).unwrap();
        assert_eq!(detection.element, scroller);
        assert_eq!(detection.strategy, DetectStrategy::ContextKey);
    }

    #[test]
    fn falls_back_to_document() {
        let dom = SimDom::new();
        let root = dom.root();
        let orphan = dom.append(&root, ElementSpec::new("p"));
        let detection =
            detect_scroll_container(&dom, &orphan, &DetectOptions::default(), &telemetry()).unwrap();
        assert_eq!(detection.strategy, DetectStrategy::Document);
        assert!(detection.fallback_applied);
        assert_eq!(detection.element, dom.root());
    }

    #[test]
    fn walks_out_of_shadow_trees() {
        let dom = SimDom::new();
        let root = dom.root();
        let list = dom.append(
            &root,
            ElementSpec::new("div")
                .rect(0.0, 0.0, 300.0, 200.0)
                .scrollable(300.0, 900.0),
        );
        let host = dom.append(&list, ElementSpec::new("x-row"));
        let shadow = dom.attach_shadow(&host);
        let target = dom.append(&shadow, ElementSpec::new("button"));

        let detection =
            detect_scroll_container(&dom, &target, &DetectOptions::default(), &telemetry())
                .unwrap();
        assert_eq!(detection.element, list);
        assert_eq!(detection.strategy, DetectStrategy::AncestorOverflow);
    }

    #[test]
    fn overflow_scroll_accepts_without_content_overflow() {
        let dom = SimDom::new();
        let root = dom.root();
        let region = dom.append(
            &root,
            ElementSpec::new("div")
                .rect(0.0, 0.0, 100.0, 100.0)
                .overflow_y("scroll"),
        );
        assert!(scrollable_reason(&dom, &region).is_ok());
    }
}
