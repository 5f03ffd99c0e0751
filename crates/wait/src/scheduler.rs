//! The polling wait scheduler.
//!
//! Each poll re-acquires the node through the resolver (handles are weak
//! observational references), evaluates the configured predicate, and
//! sleeps `interval_ms` between rounds. Stale nodes are recovered by
//! re-resolution; a configured scroller key lets the loop nudge a lazy
//! container when resolution keeps missing.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use dgx_dom::NodeHandle;
use dgx_scroll::{IntoViewOptions, IntoViewScroller};
use dgx_selector::{ResolveOptions, SelectorMap, SelectorResolver};

use crate::errors::WaitError;
use crate::predicates::{
    IdleConfig, IdleTracker, TextPredicate, VisibilityPredicate, VisibilitySnapshot,
};
use crate::telemetry::{WaitEventKind, WaitTelemetry};

/// Predicate a wait is gated on.
#[derive(Debug, Clone)]
pub enum WaitPredicate {
    /// Plain presence: resolution succeeding is enough.
    Present,
    Text(TextPredicate),
    Visibility(VisibilityPredicate),
    Idle(IdleConfig),
}

/// One wait request.
#[derive(Clone)]
pub struct WaitRequest {
    /// Logical key to resolve; `None` waits on the ambient scope only
    /// (idle gates without an element).
    pub key: Option<String>,
    pub predicate: WaitPredicate,
    pub timeout_ms: u64,
    pub interval_ms: u64,
    /// Consecutive satisfied polls required before success.
    pub presence_threshold: u32,
    /// Scroller nudged when resolution keeps missing.
    pub scroller_key: Option<String>,
    /// Cap on scroller-assisted recovery rounds.
    pub stale_retry_cap: u32,
    pub scope_root: Option<NodeHandle>,
    pub metadata: Option<Value>,
    pub cancel: Option<CancellationToken>,
}

impl WaitRequest {
    pub fn new(key: impl Into<String>, predicate: WaitPredicate) -> Self {
        Self {
            key: Some(key.into()),
            predicate,
            timeout_ms: 8000,
            interval_ms: 150,
            presence_threshold: 1,
            scroller_key: None,
            stale_retry_cap: 2,
            scope_root: None,
            metadata: None,
            cancel: None,
        }
    }

    pub fn ambient(predicate: WaitPredicate) -> Self {
        Self {
            key: None,
            ..Self::new(String::new(), predicate)
        }
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_interval(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    pub fn with_presence_threshold(mut self, threshold: u32) -> Self {
        self.presence_threshold = threshold.max(1);
        self
    }

    pub fn with_scroller(mut self, scroller_key: impl Into<String>) -> Self {
        self.scroller_key = Some(scroller_key.into());
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn key_label(&self) -> String {
        self.key.clone().unwrap_or_else(|| "<ambient>".to_string())
    }
}

/// Successful wait outcome.
#[derive(Debug, Clone)]
pub struct WaitOutcome {
    pub key: Option<String>,
    pub element: Option<NodeHandle>,
    pub polls: u32,
    pub elapsed_ms: u64,
    pub stale_recoveries: u32,
    /// Strategy kind responsible for each successful resolve (or `None`
    /// on a miss), in poll order.
    pub strategy_history: Vec<Option<String>>,
    pub snapshot: Option<Value>,
}

/// The wait scheduler.
pub struct Waiter {
    resolver: Arc<SelectorResolver>,
    map: Arc<SelectorMap>,
    scroller: Option<Arc<IntoViewScroller>>,
    telemetry: Arc<WaitTelemetry>,
}

impl Waiter {
    pub fn new(
        resolver: Arc<SelectorResolver>,
        map: Arc<SelectorMap>,
        telemetry: Arc<WaitTelemetry>,
    ) -> Self {
        Self {
            resolver,
            map,
            scroller: None,
            telemetry,
        }
    }

    pub fn with_scroller(mut self, scroller: Arc<IntoViewScroller>) -> Self {
        self.scroller = Some(scroller);
        self
    }

    /// Wait for bare presence of a key.
    pub async fn wait_present(&self, key: &str) -> Result<WaitOutcome, WaitError> {
        self.wait_for(&WaitRequest::new(key, WaitPredicate::Present))
            .await
    }

    /// Wait until the key's text matches.
    pub async fn wait_text(
        &self,
        key: &str,
        predicate: TextPredicate,
    ) -> Result<WaitOutcome, WaitError> {
        self.wait_for(&WaitRequest::new(key, WaitPredicate::Text(predicate)))
            .await
    }

    /// Wait until the key is visible.
    pub async fn wait_visible(&self, key: &str) -> Result<WaitOutcome, WaitError> {
        self.wait_for(&WaitRequest::new(
            key,
            WaitPredicate::Visibility(VisibilityPredicate::visible()),
        ))
        .await
    }

    /// Wait until the key is hidden (or gone).
    pub async fn wait_hidden(&self, key: &str) -> Result<WaitOutcome, WaitError> {
        self.wait_for(&WaitRequest::new(
            key,
            WaitPredicate::Visibility(VisibilityPredicate::hidden()),
        ))
        .await
    }

    /// Wait for a mutation-quiet window inside the key's subtree (or the
    /// whole document when no key is given).
    pub async fn wait_for_idle(
        &self,
        key: Option<&str>,
        config: IdleConfig,
    ) -> Result<WaitOutcome, WaitError> {
        let request = match key {
            Some(key) => WaitRequest::new(key, WaitPredicate::Idle(config)),
            None => WaitRequest::ambient(WaitPredicate::Idle(config)),
        };
        self.wait_for(&request).await
    }

    /// Drive the poll loop until the predicate holds or the deadline
    /// passes.
    pub async fn wait_for(&self, request: &WaitRequest) -> Result<WaitOutcome, WaitError> {
        let started = Instant::now();
        let deadline = started + Duration::from_millis(request.timeout_ms.max(1));
        let key_label = request.key_label();

        self.telemetry.emit(
            WaitEventKind::Start,
            json!({
                "key": key_label,
                "timeoutMs": request.timeout_ms,
                "intervalMs": request.interval_ms,
                "presenceThreshold": request.presence_threshold,
                "metadata": request.metadata,
            }),
        );

        let backend = self.resolver.backend().clone();
        let mut polls: u32 = 0;
        let mut stale_recoveries: u32 = 0;
        let mut scroll_assists: u32 = 0;
        let mut strategy_history: Vec<Option<String>> = Vec::new();
        let mut last_element: Option<NodeHandle> = None;
        let mut ever_resolved = false;
        let mut consecutive_hits: u32 = 0;
        let mut last_snapshot: Option<Value> = None;
        let mut idle_tracker: Option<IdleTracker> = None;
        let mut last_heartbeat = started;

        loop {
            if request
                .cancel
                .as_ref()
                .map(|c| c.is_cancelled())
                .unwrap_or(false)
            {
                let err = WaitError::Cancelled {
                    key: key_label.clone(),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    attempts: polls,
                };
                self.fail_event(&key_label, &err);
                return Err(err);
            }

            polls += 1;

            // Stale-node detection before re-resolution.
            if let Some(previous) = last_element {
                if !backend.is_connected(&previous) {
                    stale_recoveries += 1;
                    last_element = None;
                }
            }

            let resolved = match &request.key {
                Some(key) => {
                    let result = self.resolver.resolve(
                        &self.map,
                        key,
                        &ResolveOptions {
                            scope_root: request.scope_root,
                            cancel: request.cancel.clone(),
                        },
                    );
                    strategy_history.push(
                        result
                            .resolved_by
                            .as_ref()
                            .map(|t| t.strategy.kind().to_string()),
                    );
                    result.element
                }
                None => {
                    strategy_history.push(None);
                    None
                }
            };

            self.telemetry.emit(
                WaitEventKind::Attempt,
                json!({
                    "key": key_label,
                    "poll": polls,
                    "resolved": resolved.is_some(),
                    "staleRecoveries": stale_recoveries,
                }),
            );

            if resolved.is_some() {
                ever_resolved = true;
                last_element = resolved;
            } else if request.key.is_some() {
                // Miss: nudge the configured scroller, capped.
                if let (Some(scroller_key), Some(scroller)) =
                    (&request.scroller_key, &self.scroller)
                {
                    if scroll_assists < request.stale_retry_cap {
                        scroll_assists += 1;
                        let scroller_target = self
                            .resolver
                            .resolve(
                                &self.map,
                                scroller_key,
                                &ResolveOptions {
                                    scope_root: request.scope_root,
                                    cancel: request.cancel.clone(),
                                },
                            )
                            .element;
                        if let Some(target) = scroller_target {
                            let _ = scroller
                                .scroll_into_view(&target, &IntoViewOptions::default())
                                .await;
                        }
                    }
                }
            }

            // Predicate evaluation.
            let satisfied = match &request.predicate {
                WaitPredicate::Present => resolved.is_some(),
                WaitPredicate::Text(predicate) => match &resolved {
                    Some(node) => {
                        let verdict = predicate.evaluate(backend.as_ref(), node);
                        last_snapshot = Some(json!({
                            "matches": verdict.matches,
                            "actual": verdict.actual,
                            "expected": verdict.expected,
                        }));
                        verdict.matches
                    }
                    None => false,
                },
                WaitPredicate::Visibility(predicate) => match &resolved {
                    Some(node) => {
                        let (ok, snapshot) = predicate.evaluate(backend.as_ref(), node);
                        last_snapshot = Some(snapshot.to_json());
                        ok
                    }
                    None => {
                        // A key that no longer resolves counts as hidden.
                        let counts_hidden = matches!(
                            predicate,
                            VisibilityPredicate {
                                target: crate::predicates::VisibilityTarget::Hidden,
                                ..
                            }
                        );
                        if counts_hidden {
                            last_snapshot = Some(
                                VisibilitySnapshot {
                                    display: "none".to_string(),
                                    visibility: "hidden".to_string(),
                                    opacity: 0.0,
                                    bounding_box_area: 0.0,
                                    intersection_ratio: 0.0,
                                }
                                .to_json(),
                            );
                        }
                        counts_hidden
                    }
                },
                WaitPredicate::Idle(config) => {
                    let scope = resolved.or(request.scope_root);
                    let count = backend.mutation_count(scope.as_ref());
                    let tracker =
                        idle_tracker.get_or_insert_with(|| IdleTracker::new(count));
                    let quiet = tracker.observe(count);

                    if let Some(heartbeat_ms) = config.heartbeat_ms {
                        if last_heartbeat.elapsed() >= Duration::from_millis(heartbeat_ms) {
                            last_heartbeat = Instant::now();
                            self.telemetry.emit(
                                WaitEventKind::Heartbeat,
                                json!({
                                    "key": key_label,
                                    "quietMs": quiet.as_millis() as u64,
                                    "totalMutations": tracker.statistics.total_mutations,
                                    "polls": tracker.statistics.observed_polls,
                                }),
                            );
                        }
                    }

                    if config.capture_statistics {
                        last_snapshot = Some(json!({
                            "totalMutations": tracker.statistics.total_mutations,
                            "longestQuietMs": tracker.statistics.longest_quiet_ms,
                        }));
                    }

                    if let Some(max_window) = config.max_window_ms {
                        if started.elapsed() >= Duration::from_millis(max_window)
                            && quiet < Duration::from_millis(config.idle_ms)
                        {
                            let err = WaitError::IdleWindowExceeded {
                                key: key_label.clone(),
                                elapsed_ms: started.elapsed().as_millis() as u64,
                                attempts: polls,
                                hint: "scope kept mutating; raise maxWindowMs or narrow the scope"
                                    .to_string(),
                            };
                            self.fail_event(&key_label, &err);
                            return Err(err);
                        }
                    }

                    quiet >= Duration::from_millis(config.idle_ms)
                }
            };

            if satisfied {
                consecutive_hits += 1;
                if consecutive_hits >= request.presence_threshold.max(1) {
                    let outcome = WaitOutcome {
                        key: request.key.clone(),
                        element: last_element,
                        polls,
                        elapsed_ms: started.elapsed().as_millis() as u64,
                        stale_recoveries,
                        strategy_history,
                        snapshot: last_snapshot,
                    };
                    self.telemetry.emit(
                        WaitEventKind::Success,
                        json!({
                            "key": key_label,
                            "polls": outcome.polls,
                            "elapsedMs": outcome.elapsed_ms,
                            "staleRecoveries": outcome.stale_recoveries,
                        }),
                    );
                    return Ok(outcome);
                }
            } else {
                consecutive_hits = 0;
            }

            if Instant::now() >= deadline {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                let err = match (&request.predicate, ever_resolved) {
                    (_, false) if request.key.is_some() => WaitError::ResolverMiss {
                        key: key_label.clone(),
                        elapsed_ms,
                        attempts: polls,
                        hint: "no strategy matched; check the selector map entry".to_string(),
                    },
                    (WaitPredicate::Visibility(_), true) => WaitError::VisibilityMismatch {
                        key: key_label.clone(),
                        elapsed_ms,
                        attempts: polls,
                        hint: "element stayed in the opposite visibility state".to_string(),
                    },
                    (WaitPredicate::Idle(_), _) => WaitError::IdleWindowExceeded {
                        key: key_label.clone(),
                        elapsed_ms,
                        attempts: polls,
                        hint: "mutations never went quiet for idleMs".to_string(),
                    },
                    _ => WaitError::Timeout {
                        key: key_label.clone(),
                        elapsed_ms,
                        attempts: polls,
                        hint: "predicate never held before the deadline".to_string(),
                    },
                };
                self.fail_event(&key_label, &err);
                return Err(err);
            }

            let sleep = tokio::time::sleep(Duration::from_millis(request.interval_ms.max(1)));
            match &request.cancel {
                Some(cancel) => {
                    tokio::select! {
                        _ = sleep => {}
                        _ = cancel.cancelled() => {}
                    }
                }
                None => sleep.await,
            }
        }
    }

    fn fail_event(&self, key: &str, err: &WaitError) {
        self.telemetry.emit(
            WaitEventKind::Failure,
            json!({
                "key": key,
                "code": err.code(),
                "elapsedMs": err.elapsed_ms(),
                "attempts": err.attempts(),
                "message": err.to_string(),
            }),
        );
    }
}
