//! Predicate-driven stepped scrolling.
//!
//! The runner clamps its own configuration, resolves a container through
//! the detection cascade, then steps the container until a stop condition
//! holds, the deadline passes, the attempt budget runs out, or two
//! consecutive attempts move less than `min_delta_px` on both axes.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use dgx_core_types::ScrollRunId;
use dgx_dom::{DomBackend, NodeHandle};

use crate::container::{detect_scroll_container, DetectOptions, KeyResolverFn};
use crate::telemetry::{ScrollEventKind, ScrollTelemetry};

/// Consecutive low-delta attempts after which the run stops.
pub const NO_CHANGE_LIMIT: u32 = 2;

/// Stop conditions for a scroll-until run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum UntilCondition {
    /// The container is scrolled to (near) its end.
    End {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        threshold_px: Option<f64>,
    },
    /// A referent element exists (optionally visible, optionally inside
    /// the container).
    Element {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        css: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        xpath: Option<String>,
        #[serde(default)]
        require_visible: bool,
    },
    /// The count of matching descendants grew by at least `min_delta`.
    ListGrowth {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        item_css: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_delta: Option<u64>,
    },
    /// Caller-evaluated predicate.
    Predicate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expression: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ctx_path: Option<String>,
    },
}

/// Verdict from a predicate evaluation.
#[derive(Debug, Clone, Default)]
pub struct PredicateVerdict {
    pub satisfied: bool,
    pub reason: Option<String>,
    pub snapshot: Option<Value>,
}

/// Caller-supplied evaluator for `UntilCondition::Predicate`.
pub trait PredicateEvaluator: Send + Sync {
    fn evaluate(&self, condition: &UntilCondition) -> Result<PredicateVerdict, String>;
}

/// Final status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollUntilStatus {
    Success,
    Timeout,
    NoChange,
    Cancelled,
    ContainerUnavailable,
    PredicateError,
}

impl ScrollUntilStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrollUntilStatus::Success => "success",
            ScrollUntilStatus::Timeout => "timeout",
            ScrollUntilStatus::NoChange => "no_change",
            ScrollUntilStatus::Cancelled => "cancelled",
            ScrollUntilStatus::ContainerUnavailable => "container_unavailable",
            ScrollUntilStatus::PredicateError => "predicate_error",
        }
    }
}

/// Caller options; every numeric field is clamped by the runner.
#[derive(Clone)]
pub struct ScrollUntilOptions {
    pub until: UntilCondition,
    pub container: Option<NodeHandle>,
    pub container_key: Option<String>,
    /// Anchor for the detection cascade when no container is given.
    pub anchor: Option<NodeHandle>,
    pub step_px: Option<f64>,
    pub max_attempts: Option<u32>,
    pub delay_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub min_delta_px: Option<f64>,
    pub metadata: Option<Value>,
    pub detection: DetectOptions,
    pub cancel: Option<CancellationToken>,
}

impl ScrollUntilOptions {
    pub fn new(until: UntilCondition) -> Self {
        Self {
            until,
            container: None,
            container_key: None,
            anchor: None,
            step_px: None,
            max_attempts: None,
            delay_ms: None,
            timeout_ms: None,
            min_delta_px: None,
            metadata: None,
            detection: DetectOptions::default(),
            cancel: None,
        }
    }
}

/// Clamped configuration echoed in the result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollUntilConfig {
    pub step_px: f64,
    pub max_attempts: u32,
    pub delay_ms: u64,
    pub timeout_ms: u64,
    pub min_delta_px: f64,
}

impl ScrollUntilConfig {
    fn from_options(options: &ScrollUntilOptions) -> Self {
        Self {
            step_px: options.step_px.unwrap_or(320.0).clamp(1.0, 500.0),
            max_attempts: options.max_attempts.unwrap_or(40).max(1),
            delay_ms: options.delay_ms.unwrap_or(200).min(1000),
            timeout_ms: options.timeout_ms.unwrap_or(8000).max(1),
            min_delta_px: options.min_delta_px.unwrap_or(2.0).max(0.0),
        }
    }
}

/// Result record for one run.
#[derive(Debug, Clone)]
pub struct ScrollUntilResult {
    pub status: ScrollUntilStatus,
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub last_delta: (f64, f64),
    pub cumulative_delta: (f64, f64),
    pub config: ScrollUntilConfig,
    pub reason: Option<String>,
    pub container: Option<NodeHandle>,
    pub run_id: ScrollRunId,
    pub predicate_snapshot: Option<Value>,
    pub dom_stable: Option<bool>,
    pub consecutive_no_change: u32,
    pub metadata: Option<Value>,
}

impl ScrollUntilResult {
    /// Short operator hint for the failure surface.
    pub fn guidance(&self) -> Option<&'static str> {
        match self.status {
            ScrollUntilStatus::Timeout => {
                Some("raise timeoutMs/maxAttempts or loosen the stop condition")
            }
            ScrollUntilStatus::NoChange => {
                Some("container stopped moving; verify it is the real scroller")
            }
            ScrollUntilStatus::ContainerUnavailable => {
                Some("no scrollable container found; pass container or containerKey")
            }
            ScrollUntilStatus::PredicateError => Some("predicate evaluator raised an error"),
            _ => None,
        }
    }
}

/// The scroll-until runner.
pub struct ScrollUntilRunner {
    backend: Arc<dyn DomBackend>,
    telemetry: Arc<ScrollTelemetry>,
    key_resolver: Option<KeyResolverFn>,
    predicate_evaluator: Option<Arc<dyn PredicateEvaluator>>,
}

struct RunState {
    initial_count: Option<usize>,
}

impl ScrollUntilRunner {
    pub fn new(backend: Arc<dyn DomBackend>, telemetry: Arc<ScrollTelemetry>) -> Self {
        Self {
            backend,
            telemetry,
            key_resolver: None,
            predicate_evaluator: None,
        }
    }

    pub fn with_key_resolver(mut self, resolver: KeyResolverFn) -> Self {
        self.key_resolver = Some(resolver);
        self
    }

    pub fn with_predicate_evaluator(mut self, evaluator: Arc<dyn PredicateEvaluator>) -> Self {
        self.predicate_evaluator = Some(evaluator);
        self
    }

    pub async fn run(&self, options: ScrollUntilOptions) -> ScrollUntilResult {
        let run_id = ScrollRunId::new();
        let config = ScrollUntilConfig::from_options(&options);
        let started_at = Utc::now();
        // tokio's monotonic clock, so paused-time tests drive deadlines.
        let started = Instant::now();
        let deadline = started + Duration::from_millis(config.timeout_ms);

        let backend = self.backend.as_ref();
        let container = self.resolve_container(&options);

        let finish = |status: ScrollUntilStatus,
                      attempts: u32,
                      reason: Option<String>,
                      last_delta: (f64, f64),
                      cumulative_delta: (f64, f64),
                      consecutive_no_change: u32,
                      predicate_snapshot: Option<Value>,
                      dom_stable: Option<bool>,
                      container: Option<NodeHandle>| {
            let result = ScrollUntilResult {
                status,
                attempts,
                started_at,
                finished_at: Utc::now(),
                elapsed_ms: started.elapsed().as_millis() as u64,
                last_delta,
                cumulative_delta,
                config,
                reason,
                container,
                run_id: run_id.clone(),
                predicate_snapshot,
                dom_stable,
                consecutive_no_change,
                metadata: options.metadata.clone(),
            };
            let kind = match status {
                ScrollUntilStatus::Success => ScrollEventKind::Success,
                ScrollUntilStatus::NoChange => ScrollEventKind::NoChange,
                _ => ScrollEventKind::Failure,
            };
            self.telemetry.emit(
                kind,
                json!({
                    "runId": result.run_id.0,
                    "status": status.as_str(),
                    "attempts": result.attempts,
                    "elapsedMs": result.elapsed_ms,
                    "reason": result.reason,
                    "cumulativeDelta": { "x": cumulative_delta.0, "y": cumulative_delta.1 },
                }),
            );
            result
        };

        self.telemetry.emit(
            ScrollEventKind::Start,
            json!({
                "runId": run_id.0,
                "config": config,
                "hasContainer": container.is_some(),
            }),
        );

        let Some(container) = container else {
            return finish(
                ScrollUntilStatus::ContainerUnavailable,
                0,
                Some("no scrollable container".to_string()),
                (0.0, 0.0),
                (0.0, 0.0),
                0,
                None,
                None,
                None,
            );
        };

        let start_mutations = backend.mutation_count(Some(&container));
        let mut state = RunState {
            initial_count: None,
        };

        // Entry evaluation: already-satisfied predicates succeed with
        // zero attempts.
        match self.evaluate(&options.until, &container, &mut state) {
            Err(message) => {
                return finish(
                    ScrollUntilStatus::PredicateError,
                    0,
                    Some(message),
                    (0.0, 0.0),
                    (0.0, 0.0),
                    0,
                    None,
                    None,
                    Some(container),
                );
            }
            Ok(verdict) if verdict.satisfied => {
                return finish(
                    ScrollUntilStatus::Success,
                    0,
                    Some(
                        verdict
                            .reason
                            .unwrap_or_else(|| "predicate-satisfied".to_string()),
                    ),
                    (0.0, 0.0),
                    (0.0, 0.0),
                    0,
                    verdict.snapshot,
                    None,
                    Some(container),
                );
            }
            Ok(_) => {}
        }

        let mut attempts: u32 = 0;
        let mut last_delta = (0.0, 0.0);
        let mut cumulative_delta = (0.0, 0.0);
        let mut consecutive_no_change: u32 = 0;
        let mut last_snapshot: Option<Value> = None;

        while attempts < config.max_attempts {
            if options
                .cancel
                .as_ref()
                .map(|c| c.is_cancelled())
                .unwrap_or(false)
            {
                return finish(
                    ScrollUntilStatus::Cancelled,
                    attempts,
                    Some("cancelled".to_string()),
                    last_delta,
                    cumulative_delta,
                    consecutive_no_change,
                    last_snapshot,
                    None,
                    Some(container),
                );
            }
            if attempts > 0 && Instant::now() >= deadline {
                let dom_stable =
                    backend.mutation_count(Some(&container)) == start_mutations;
                return finish(
                    ScrollUntilStatus::Timeout,
                    attempts,
                    Some("timeout-exceeded".to_string()),
                    last_delta,
                    cumulative_delta,
                    consecutive_no_change,
                    last_snapshot,
                    Some(dom_stable),
                    Some(container),
                );
            }

            let Some(before) = backend.scroll_state(&container) else {
                return finish(
                    ScrollUntilStatus::ContainerUnavailable,
                    attempts,
                    Some("container lost its scroll state".to_string()),
                    last_delta,
                    cumulative_delta,
                    consecutive_no_change,
                    last_snapshot,
                    None,
                    Some(container),
                );
            };

            let next_top = (before.scroll_top + config.step_px).min(before.max_scroll_top());
            let _ = backend.set_scroll_position(&container, before.scroll_left, next_top);
            attempts += 1;

            let after = backend.scroll_state(&container).unwrap_or(before);
            last_delta = (
                after.scroll_left - before.scroll_left,
                after.scroll_top - before.scroll_top,
            );
            cumulative_delta = (
                cumulative_delta.0 + last_delta.0,
                cumulative_delta.1 + last_delta.1,
            );

            self.telemetry.emit(
                ScrollEventKind::Attempt,
                json!({
                    "runId": run_id.0,
                    "attempt": attempts,
                    "status": "continue",
                    "delta": { "x": last_delta.0, "y": last_delta.1 },
                    "scrollTop": after.scroll_top,
                }),
            );

            if config.delay_ms > 0 {
                let sleep = tokio::time::sleep(Duration::from_millis(config.delay_ms));
                match &options.cancel {
                    Some(cancel) => {
                        tokio::select! {
                            _ = sleep => {}
                            _ = cancel.cancelled() => {}
                        }
                    }
                    None => sleep.await,
                }
            }

            match self.evaluate(&options.until, &container, &mut state) {
                Err(message) => {
                    return finish(
                        ScrollUntilStatus::PredicateError,
                        attempts,
                        Some(message),
                        last_delta,
                        cumulative_delta,
                        consecutive_no_change,
                        last_snapshot,
                        None,
                        Some(container),
                    );
                }
                Ok(verdict) => {
                    last_snapshot = verdict.snapshot.clone().or(last_snapshot);
                    if verdict.satisfied {
                        return finish(
                            ScrollUntilStatus::Success,
                            attempts,
                            Some(
                                verdict
                                    .reason
                                    .unwrap_or_else(|| "predicate-satisfied".to_string()),
                            ),
                            last_delta,
                            cumulative_delta,
                            consecutive_no_change,
                            verdict.snapshot,
                            None,
                            Some(container),
                        );
                    }
                }
            }

            if last_delta.0.abs() < config.min_delta_px && last_delta.1.abs() < config.min_delta_px
            {
                consecutive_no_change += 1;
                if consecutive_no_change >= NO_CHANGE_LIMIT {
                    let dom_stable =
                        backend.mutation_count(Some(&container)) == start_mutations;
                    return finish(
                        ScrollUntilStatus::NoChange,
                        attempts,
                        Some("no-change".to_string()),
                        last_delta,
                        cumulative_delta,
                        consecutive_no_change,
                        last_snapshot,
                        Some(dom_stable),
                        Some(container),
                    );
                }
            } else {
                consecutive_no_change = 0;
            }
        }

        let dom_stable = backend.mutation_count(Some(&container)) == start_mutations;
        finish(
            ScrollUntilStatus::Timeout,
            attempts,
            Some("max-attempts-exhausted".to_string()),
            last_delta,
            cumulative_delta,
            consecutive_no_change,
            last_snapshot,
            Some(dom_stable),
            Some(container),
        )
    }

    fn resolve_container(&self, options: &ScrollUntilOptions) -> Option<NodeHandle> {
        if let Some(container) = options.container {
            return Some(container);
        }
        if let Some(key) = &options.container_key {
            if let Some(resolver) = &self.key_resolver {
                if let Some(container) = resolver(key) {
                    return Some(container);
                }
            }
        }
        let anchor = options.anchor.or_else(|| self.backend.document_root())?;
        detect_scroll_container(
            self.backend.as_ref(),
            &anchor,
            &options.detection,
            &self.telemetry,
        )
        .map(|d| d.element)
    }

    fn evaluate(
        &self,
        condition: &UntilCondition,
        container: &NodeHandle,
        state: &mut RunState,
    ) -> Result<PredicateVerdict, String> {
        let backend = self.backend.as_ref();
        match condition {
            UntilCondition::End { threshold_px } => {
                let threshold = threshold_px.unwrap_or(2.0);
                let scroll = backend
                    .scroll_state(container)
                    .ok_or_else(|| "container has no scroll state".to_string())?;
                let remaining = scroll.max_scroll_top() - scroll.scroll_top;
                Ok(PredicateVerdict {
                    satisfied: remaining <= threshold,
                    reason: Some("end-of-scroll".to_string()),
                    snapshot: Some(json!({ "remainingPx": remaining })),
                })
            }

            UntilCondition::Element {
                key,
                css,
                xpath,
                require_visible,
            } => {
                let referent = self.find_referent(key, css, xpath);
                let Some(node) = referent else {
                    return Ok(PredicateVerdict {
                        satisfied: false,
                        reason: None,
                        snapshot: Some(json!({ "found": false })),
                    });
                };
                if *require_visible && !element_visible(backend, &node) {
                    return Ok(PredicateVerdict {
                        satisfied: false,
                        reason: None,
                        snapshot: Some(json!({ "found": true, "visible": false })),
                    });
                }
                if !backend.contains(container, &node) {
                    return Ok(PredicateVerdict {
                        satisfied: false,
                        reason: None,
                        snapshot: Some(json!({ "found": true, "inContainer": false })),
                    });
                }
                Ok(PredicateVerdict {
                    satisfied: true,
                    reason: Some("element-found".to_string()),
                    snapshot: Some(json!({ "found": true })),
                })
            }

            UntilCondition::ListGrowth {
                parent_key,
                item_css,
                min_delta,
            } => {
                let parent = match parent_key {
                    Some(key) => self
                        .key_resolver
                        .as_ref()
                        .and_then(|resolver| resolver(key))
                        .ok_or_else(|| format!("list parent key '{key}' did not resolve"))?,
                    None => *container,
                };
                let count = match item_css {
                    Some(css) => backend
                        .query_css(Some(&parent), css)
                        .map_err(|err| err.to_string())?
                        .len(),
                    None => backend.children(&parent).len(),
                };
                let initial = *state.initial_count.get_or_insert(count);
                let delta = count.saturating_sub(initial) as u64;
                let needed = min_delta.unwrap_or(1).max(1);
                Ok(PredicateVerdict {
                    satisfied: delta >= needed,
                    reason: Some("list-growth".to_string()),
                    snapshot: Some(json!({
                        "initialCount": initial,
                        "count": count,
                        "delta": delta,
                    })),
                })
            }

            UntilCondition::Predicate { expression, .. } => {
                if let Some(evaluator) = &self.predicate_evaluator {
                    return evaluator.evaluate(condition);
                }
                let truthy = expression
                    .as_deref()
                    .map(|e| {
                        matches!(
                            e.trim().to_ascii_lowercase().as_str(),
                            "true" | "1" | "yes" | "on"
                        )
                    })
                    .unwrap_or(false);
                Ok(PredicateVerdict {
                    satisfied: truthy,
                    reason: truthy.then(|| "expression-truthy".to_string()),
                    snapshot: None,
                })
            }
        }
    }

    fn find_referent(
        &self,
        key: &Option<String>,
        css: &Option<String>,
        xpath: &Option<String>,
    ) -> Option<NodeHandle> {
        if let Some(key) = key {
            if let Some(resolver) = &self.key_resolver {
                if let Some(node) = resolver(key) {
                    return Some(node);
                }
            }
        }
        if let Some(css) = css {
            if let Ok(matches) = self.backend.query_css(None, css) {
                if let Some(first) = matches.first() {
                    return Some(*first);
                }
            }
        }
        if let Some(xpath) = xpath {
            if let Ok(matches) = self.backend.query_xpath(None, xpath) {
                if let Some(first) = matches.first() {
                    return Some(*first);
                }
            }
        }
        None
    }
}

/// Basic visibility gate for the element stop condition.
fn element_visible(backend: &dyn DomBackend, node: &NodeHandle) -> bool {
    let Some(style) = backend.computed_style(node) else {
        return false;
    };
    style.display != "none" && style.visibility != "hidden" && style.opacity > 0.0
}
