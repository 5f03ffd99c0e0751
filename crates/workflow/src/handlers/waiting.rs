//! Wait-family handlers and the delay step.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use dgx_wait::{
    IdleConfig, TextPredicate, VisibilityPredicate, WaitPredicate, WaitRequest,
};

use crate::dsl::StepKind;
use crate::errors::{StepError, StepErrorReason};
use crate::handlers::{StepExecution, StepHandler, StepResult, StepToolkit};

/// Bridges every wait-family step kind onto the wait scheduler.
pub struct WaitHandler;

fn build_request(exec: &StepExecution<'_>) -> Result<WaitRequest, StepError> {
    let request = match &exec.step.kind {
        StepKind::WaitFor {
            key,
            presence_threshold,
            scroller_key,
            stale_retry_cap,
        } => {
            let mut request = WaitRequest::new(key.clone(), WaitPredicate::Present);
            if let Some(threshold) = presence_threshold {
                request = request.with_presence_threshold(*threshold);
            }
            if let Some(scroller) = scroller_key {
                request = request.with_scroller(scroller.clone());
            }
            if let Some(cap) = stale_retry_cap {
                request.stale_retry_cap = *cap;
            }
            request
        }
        StepKind::WaitText {
            key,
            text,
            text_pattern,
            exact,
            case_sensitive,
            normalize_whitespace,
            presence_threshold,
        } => {
            let mut request = WaitRequest::new(
                key.clone(),
                WaitPredicate::Text(TextPredicate {
                    text: text.clone(),
                    text_pattern: text_pattern.clone(),
                    exact: *exact,
                    case_sensitive: *case_sensitive,
                    normalize_whitespace: *normalize_whitespace,
                }),
            );
            if let Some(threshold) = presence_threshold {
                request = request.with_presence_threshold(*threshold);
            }
            request
        }
        StepKind::WaitVisible {
            key,
            require_displayed,
            require_in_viewport,
            min_opacity,
            min_intersection_ratio,
            min_bounding_box_area,
            presence_threshold,
        } => {
            let mut predicate = VisibilityPredicate::visible();
            predicate.require_displayed = *require_displayed;
            predicate.require_in_viewport = *require_in_viewport;
            predicate.min_opacity = *min_opacity;
            predicate.min_intersection_ratio = *min_intersection_ratio;
            predicate.min_bounding_box_area = *min_bounding_box_area;
            let mut request =
                WaitRequest::new(key.clone(), WaitPredicate::Visibility(predicate));
            if let Some(threshold) = presence_threshold {
                request = request.with_presence_threshold(*threshold);
            }
            request
        }
        StepKind::WaitHidden {
            key,
            presence_threshold,
        } => {
            let mut request = WaitRequest::new(
                key.clone(),
                WaitPredicate::Visibility(VisibilityPredicate::hidden()),
            );
            if let Some(threshold) = presence_threshold {
                request = request.with_presence_threshold(*threshold);
            }
            request
        }
        StepKind::WaitForIdle {
            key,
            idle_ms,
            max_window_ms,
            heartbeat_ms,
            capture_statistics,
        } => {
            let predicate = WaitPredicate::Idle(IdleConfig {
                idle_ms: *idle_ms,
                max_window_ms: *max_window_ms,
                heartbeat_ms: *heartbeat_ms,
                capture_statistics: *capture_statistics,
            });
            match key {
                Some(key) => WaitRequest::new(key.clone(), predicate),
                None => WaitRequest::ambient(predicate),
            }
        }
        _ => return Err(StepError::unknown("wait handler invoked for wrong kind")),
    };
    Ok(request)
}

#[async_trait]
impl StepHandler for WaitHandler {
    async fn execute(
        &self,
        toolkit: &StepToolkit,
        exec: &mut StepExecution<'_>,
    ) -> Result<StepResult, StepError> {
        let mut request = build_request(exec)?;
        request.timeout_ms = exec.timing.timeout_ms;
        request.interval_ms = exec.timing.interval_ms;
        request.cancel = Some(exec.cancel.clone());

        let outcome = toolkit.waiter.wait_for(&request).await.map_err(StepError::from)?;
        Ok(StepResult::success().with_data(json!({
            "polls": outcome.polls,
            "elapsedMs": outcome.elapsed_ms,
            "staleRecoveries": outcome.stale_recoveries,
            "snapshot": outcome.snapshot,
        })))
    }
}

/// Sleeps for `ms`, honoring cancellation.
pub struct DelayHandler;

#[async_trait]
impl StepHandler for DelayHandler {
    async fn execute(
        &self,
        _toolkit: &StepToolkit,
        exec: &mut StepExecution<'_>,
    ) -> Result<StepResult, StepError> {
        let StepKind::Delay { ms } = &exec.step.kind else {
            return Err(StepError::unknown("delay handler invoked for wrong kind"));
        };
        let sleep = tokio::time::sleep(Duration::from_millis(*ms));
        tokio::select! {
            _ = sleep => Ok(StepResult::success()),
            _ = exec.cancel.cancelled() => Err(StepError::new(
                StepErrorReason::Cancelled,
                "delay cancelled",
            )),
        }
    }
}
