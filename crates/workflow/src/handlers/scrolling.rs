//! Thin adapters over the scroll engines.

use async_trait::async_trait;
use serde_json::json;

use dgx_scroll::{
    IntoViewFailure, IntoViewOptions, ScrollUntilOptions, ScrollUntilStatus, UntilCondition,
};

use crate::dsl::StepKind;
use crate::errors::{StepError, StepErrorReason};
use crate::handlers::{StepExecution, StepHandler, StepResult, StepToolkit};

pub struct ScrollIntoViewHandler;

#[async_trait]
impl StepHandler for ScrollIntoViewHandler {
    async fn execute(
        &self,
        toolkit: &StepToolkit,
        exec: &mut StepExecution<'_>,
    ) -> Result<StepResult, StepError> {
        let node = exec.require_element()?;
        let StepKind::ScrollIntoView {
            alignment,
            margin,
            max_retries,
            container_key,
            ..
        } = &exec.step.kind
        else {
            return Err(StepError::unknown("scrollIntoView handler invoked for wrong kind"));
        };

        let container = container_key
            .as_ref()
            .and_then(|key| toolkit.resolve_key(key, &exec.cancel).element);

        let options = IntoViewOptions {
            container,
            alignment: (*alignment).unwrap_or_default(),
            margin: (*margin).unwrap_or_default(),
            max_retries: *max_retries,
            detection: Default::default(),
        };
        let outcome = toolkit.into_view.scroll_into_view(&node, &options).await;
        if outcome.success {
            return Ok(StepResult::success()
                .with_data(json!({ "attempts": outcome.attempts })));
        }
        let reason = outcome.reason.unwrap_or(IntoViewFailure::MaxRetries);
        let step_reason = match reason {
            IntoViewFailure::InvalidTarget => StepErrorReason::ResolverMiss,
            IntoViewFailure::ContainerUnavailable => StepErrorReason::ContainerUnavailable,
            IntoViewFailure::MaxRetries | IntoViewFailure::NoAdjustment => {
                StepErrorReason::Unknown
            }
        };
        Err(StepError::new(
            step_reason,
            format!("scrollIntoView failed: {}", reason.as_str()),
        )
        .with_attempts(outcome.attempts)
        .with_data(json!({ "reason": reason.as_str() })))
    }
}

pub struct ScrollUntilHandler;

#[async_trait]
impl StepHandler for ScrollUntilHandler {
    async fn execute(
        &self,
        toolkit: &StepToolkit,
        exec: &mut StepExecution<'_>,
    ) -> Result<StepResult, StepError> {
        let StepKind::ScrollUntil {
            until,
            container_key,
            anchor_key,
            step_px,
            max_attempts,
            delay_ms,
            min_delta_px,
        } = &exec.step.kind
        else {
            return Err(StepError::unknown("scrollUntil handler invoked for wrong kind"));
        };

        let mut options = ScrollUntilOptions::new(until.clone());
        options.container = container_key
            .as_ref()
            .and_then(|key| toolkit.resolve_key(key, &exec.cancel).element);
        options.anchor = anchor_key
            .as_ref()
            .and_then(|key| toolkit.resolve_key(key, &exec.cancel).element);
        options.step_px = *step_px;
        options.max_attempts = *max_attempts;
        options.delay_ms = *delay_ms;
        options.min_delta_px = *min_delta_px;
        options.timeout_ms = Some(exec.timing.timeout_ms);
        options.cancel = Some(exec.cancel.clone());

        let result = toolkit.scroll_until.run(options).await;
        let data = json!({
            "status": result.status.as_str(),
            "attempts": result.attempts,
            "elapsedMs": result.elapsed_ms,
            "cumulativeDelta": { "x": result.cumulative_delta.0, "y": result.cumulative_delta.1 },
            "reason": result.reason,
            "runId": result.run_id.0,
        });

        match result.status {
            ScrollUntilStatus::Success => Ok(StepResult::success().with_data(data)),
            ScrollUntilStatus::Timeout => Err(StepError::new(
                StepErrorReason::Timeout,
                format!(
                    "scrollUntil timed out ({})",
                    result.reason.as_deref().unwrap_or("deadline")
                ),
            )
            .with_attempts(result.attempts)
            .with_elapsed(result.elapsed_ms)
            .with_data(data)),
            ScrollUntilStatus::NoChange => {
                // A stable DOM that never produced the awaited element is
                // its own failure mode.
                let element_condition = matches!(
                    until,
                    UntilCondition::Element { .. } | UntilCondition::ListGrowth { .. }
                );
                let reason = if element_condition && result.dom_stable == Some(true) {
                    StepErrorReason::DomStableNoMatch
                } else {
                    StepErrorReason::NoChange
                };
                Err(StepError::new(reason, "scroll produced no further movement")
                    .with_attempts(result.attempts)
                    .with_elapsed(result.elapsed_ms)
                    .with_data(data))
            }
            ScrollUntilStatus::Cancelled => Err(StepError::new(
                StepErrorReason::Cancelled,
                "scrollUntil cancelled",
            )
            .with_attempts(result.attempts)
            .with_data(data)),
            ScrollUntilStatus::ContainerUnavailable => Err(StepError::new(
                StepErrorReason::ContainerUnavailable,
                "no scrollable container found",
            )
            .with_data(data)),
            ScrollUntilStatus::PredicateError => Err(StepError::new(
                StepErrorReason::PredicateError,
                format!(
                    "scroll predicate failed: {}",
                    result.reason.as_deref().unwrap_or("unknown")
                ),
            )
            .with_data(data)),
        }
    }
}
