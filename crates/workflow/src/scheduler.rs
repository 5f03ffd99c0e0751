//! The workflow scheduler.
//!
//! Walks a definition in order: per-step timing resolution, pre-step
//! selector resolution, retry with exponential backoff, a per-attempt
//! timeout race that aborts the handler's token, and nested control flow
//! executed inline. Every step emits exactly one `pending`, at least one
//! `attempt`, and exactly one terminal event.

use std::sync::Arc;
use std::time::Duration;

use async_recursion::async_recursion;
use chrono::Utc;
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use dgx_core_types::{RunId, WorkflowId};
use dgx_telemetry::collapse_whitespace;

use crate::context::{SetOptions, WorkflowContext};
use crate::dsl::{Condition, RetryPolicy, StepKind, WorkflowDefinition, WorkflowStep};
use crate::errors::{FlowError, StepError, StepErrorReason};
use crate::handlers::{HandlerRegistry, StepExecution, StepResultStatus, StepToolkit};
use crate::telemetry::{RunEvent, RunPhase, StepStatus, StepTelemetryEvent, TelemetryHub};
use crate::timing::{backoff_delay, effective_timing, EffectiveTiming};
use crate::validate::{has_errors, validate_definition};

/// Caller-evaluated `expression` conditions.
pub trait ConditionEvaluator: Send + Sync {
    fn evaluate(&self, expression: &str, context_snapshot: &Value) -> Result<bool, String>;
}

/// Final run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

/// Outcome of one run.
#[derive(Debug)]
pub struct WorkflowRunOutcome {
    pub status: RunStatus,
    pub started_at: chrono::DateTime<Utc>,
    pub finished_at: chrono::DateTime<Utc>,
    pub completed_steps: usize,
    pub error: Option<StepError>,
    pub context_snapshot: Value,
}

/// Run configuration.
pub struct RunOptions {
    pub handlers: Arc<HandlerRegistry>,
    pub toolkit: Arc<StepToolkit>,
    pub telemetry: Arc<TelemetryHub>,
    pub context: Option<WorkflowContext>,
    /// JSON object merged into the context before the first step.
    pub initial_context: Option<Value>,
    pub run_id: Option<RunId>,
    pub timing_overrides: crate::dsl::WorkflowDefaults,
    pub cancel: CancellationToken,
    /// Start even when validation reports errors.
    pub allow_invalid: bool,
    pub condition_evaluator: Option<Arc<dyn ConditionEvaluator>>,
}

impl RunOptions {
    pub fn new(
        handlers: Arc<HandlerRegistry>,
        toolkit: Arc<StepToolkit>,
        telemetry: Arc<TelemetryHub>,
    ) -> Self {
        Self {
            handlers,
            toolkit,
            telemetry,
            context: None,
            initial_context: None,
            run_id: None,
            timing_overrides: Default::default(),
            cancel: CancellationToken::new(),
            allow_invalid: false,
            condition_evaluator: None,
        }
    }
}

struct RunState {
    run_id: RunId,
    workflow_id: WorkflowId,
    handlers: Arc<HandlerRegistry>,
    toolkit: Arc<StepToolkit>,
    telemetry: Arc<TelemetryHub>,
    context: WorkflowContext,
    timing_overrides: crate::dsl::WorkflowDefaults,
    defaults: crate::dsl::WorkflowDefaults,
    cancel: CancellationToken,
    condition_evaluator: Option<Arc<dyn ConditionEvaluator>>,
    step_counter: usize,
    completed_steps: usize,
}

impl RunState {
    fn next_index(&mut self) -> usize {
        let index = self.step_counter;
        self.step_counter += 1;
        index
    }

    fn emit(
        &self,
        step: &WorkflowStep,
        index: usize,
        status: StepStatus,
        attempt: u32,
        duration_ms: Option<u64>,
        error: Option<&StepError>,
        notes: Option<String>,
    ) {
        self.telemetry.emit_step(StepTelemetryEvent {
            run_id: self.run_id.0.clone(),
            workflow_id: self.workflow_id.0.clone(),
            step_index: index,
            step_id: step.common.id.clone(),
            step_kind: step.kind.name().to_string(),
            logical_key: step.kind.primary_key().map(str::to_string),
            status,
            attempt,
            timestamp: Utc::now(),
            duration_ms,
            error: error.map(|e| e.payload()),
            notes,
        });
    }
}

/// Run a workflow definition to completion.
pub async fn run_workflow(
    definition: &WorkflowDefinition,
    options: RunOptions,
) -> Result<WorkflowRunOutcome, FlowError> {
    let issues = validate_definition(definition);
    if has_errors(&issues) && !options.allow_invalid {
        return Err(FlowError::ValidationFailed(issues));
    }

    let run_id = options.run_id.unwrap_or_default();
    let workflow_id = WorkflowId::new(definition.id.clone());
    let started_at = Utc::now();
    let started = Instant::now();

    let mut context = options.context.unwrap_or_default();
    if let Some(initial) = &options.initial_context {
        context.merge(initial);
    }

    let mut state = RunState {
        run_id: run_id.clone(),
        workflow_id: workflow_id.clone(),
        handlers: options.handlers,
        toolkit: options.toolkit,
        telemetry: options.telemetry.clone(),
        context,
        timing_overrides: options.timing_overrides,
        defaults: definition.defaults.clone(),
        cancel: options.cancel,
        condition_evaluator: options.condition_evaluator,
        step_counter: 0,
        completed_steps: 0,
    };

    state.telemetry.emit_run(
        &RunEvent {
            run_id: run_id.0.clone(),
            workflow_id: workflow_id.0.clone(),
            started_at,
            finished_at: None,
            duration_ms: None,
            completed_steps: 0,
            status: "running".to_string(),
            error: None,
        },
        RunPhase::Started,
    );

    let walk = execute_block(&definition.steps, &mut state).await;

    let (status, error) = match walk {
        Ok(()) => (RunStatus::Success, None),
        Err(err) if err.reason == StepErrorReason::Cancelled => (RunStatus::Cancelled, Some(err)),
        Err(err) => (RunStatus::Failed, Some(err)),
    };

    let finished_at = Utc::now();
    let phase = match status {
        RunStatus::Cancelled => RunPhase::Cancelled,
        _ => RunPhase::Completed,
    };
    state.telemetry.emit_run(
        &RunEvent {
            run_id: run_id.0.clone(),
            workflow_id: workflow_id.0.clone(),
            started_at,
            finished_at: Some(finished_at),
            duration_ms: Some(started.elapsed().as_millis() as u64),
            completed_steps: state.completed_steps,
            status: status.as_str().to_string(),
            error: error.as_ref().map(|e| e.payload()),
        },
        phase,
    );
    state.telemetry.flush();

    Ok(WorkflowRunOutcome {
        status,
        started_at,
        finished_at,
        completed_steps: state.completed_steps,
        error,
        context_snapshot: state.context.snapshot(),
    })
}

#[async_recursion]
async fn execute_block(steps: &[WorkflowStep], state: &mut RunState) -> Result<(), StepError> {
    for step in steps {
        if state.cancel.is_cancelled() {
            return Err(StepError::new(
                StepErrorReason::Cancelled,
                "run cancelled before step start",
            ));
        }
        execute_step(step, state).await?;
    }
    Ok(())
}

async fn execute_step(step: &WorkflowStep, state: &mut RunState) -> Result<(), StepError> {
    let index = state.next_index();
    let timing = effective_timing(&step.common, &state.defaults, &state.timing_overrides);
    state.emit(step, index, StepStatus::Pending, 0, None, None, None);

    let result = if step.kind.is_control() {
        execute_control_step(step, index, state, &timing).await
    } else {
        execute_leaf_step(step, index, state, &timing).await
    };

    match result {
        Ok(()) => {
            state.completed_steps += 1;
            Ok(())
        }
        Err(err) => {
            let err = err.reason_annotated(step);
            state.emit(
                step,
                index,
                StepStatus::Failure,
                err.attempts.unwrap_or(1),
                err.elapsed_ms,
                Some(&err),
                None,
            );
            if err.reason == StepErrorReason::Cancelled {
                return Err(err);
            }
            if step.common.continue_on_error {
                warn!(
                    step = step.kind.name(),
                    error = %err,
                    "step failed; continuing per continueOnError"
                );
                state.completed_steps += 1;
                return Ok(());
            }
            Err(err)
        }
    }
}

impl StepError {
    fn reason_annotated(mut self, step: &WorkflowStep) -> StepError {
        if self.step_kind.is_empty() {
            self.step_kind = step.kind.name().to_string();
            self.step_id = step.common.id.clone();
        }
        if self.logical_key.is_none() {
            self.logical_key = step.kind.primary_key().map(str::to_string);
        }
        self
    }
}

async fn execute_leaf_step(
    step: &WorkflowStep,
    index: usize,
    state: &mut RunState,
    timing: &EffectiveTiming,
) -> Result<(), StepError> {
    let handler = state
        .handlers
        .get(step.kind.name())
        .ok_or_else(|| StepError::unknown(format!("no handler for '{}'", step.kind.name())))?;

    let max_attempts = timing.retries + 1;
    let mut last_error: Option<StepError> = None;

    for attempt in 1..=max_attempts {
        if state.cancel.is_cancelled() {
            return Err(StepError::new(
                StepErrorReason::Cancelled,
                "run cancelled between attempts",
            ));
        }
        state.emit(step, index, StepStatus::Attempt, attempt, None, None, None);
        let attempt_started = Instant::now();

        let resolve_result = step
            .kind
            .primary_key()
            .map(|key| state.toolkit.resolve_key(key, &state.cancel));

        let attempt_cancel = state.cancel.child_token();
        let mut exec = StepExecution {
            step,
            step_index: index,
            attempt,
            retries_remaining: max_attempts - attempt,
            timing: *timing,
            context: &state.context,
            resolve_result,
            run_id: state.run_id.clone(),
            workflow_id: state.workflow_id.clone(),
            cancel: attempt_cancel.clone(),
        };

        let handler_future = handler.execute(&state.toolkit, &mut exec);
        let timeout = tokio::time::sleep(Duration::from_millis(timing.timeout_ms.max(1)));
        let outcome = tokio::select! {
            result = handler_future => result,
            _ = timeout => {
                attempt_cancel.cancel();
                Err(StepError::new(
                    StepErrorReason::Timeout,
                    format!("step timed out after {}ms", timing.timeout_ms),
                ))
            }
        };
        drop(exec);
        let duration_ms = attempt_started.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                for update in &result.context_updates {
                    state
                        .context
                        .set(update.path.clone(), update.value.clone(), update.options);
                }
                for line in &result.logs {
                    debug!(step = step.kind.name(), "{line}");
                }
                let status = match result.status() {
                    StepResultStatus::Success => StepStatus::Success,
                    StepResultStatus::Skipped => StepStatus::Skipped,
                };
                state.emit(
                    step,
                    index,
                    status,
                    attempt,
                    Some(duration_ms),
                    None,
                    result.notes.clone(),
                );
                return Ok(());
            }
            Err(err) => {
                if err.reason == StepErrorReason::Cancelled || state.cancel.is_cancelled() {
                    return Err(StepError::new(
                        StepErrorReason::Cancelled,
                        err.message.clone(),
                    )
                    .with_attempts(attempt));
                }
                if attempt < max_attempts {
                    // Non-final attempts report their failure too; the
                    // step's terminal event is whichever comes last.
                    let annotated = err.clone().with_attempts(attempt);
                    state.emit(
                        step,
                        index,
                        StepStatus::Failure,
                        attempt,
                        Some(duration_ms),
                        Some(&annotated),
                        None,
                    );
                    let delay = backoff_delay(timing, attempt + 1);
                    debug!(
                        step = step.kind.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "attempt failed; backing off"
                    );
                    let sleep = tokio::time::sleep(delay);
                    tokio::select! {
                        _ = sleep => {}
                        _ = state.cancel.cancelled() => {
                            return Err(StepError::new(
                                StepErrorReason::Cancelled,
                                "run cancelled during backoff",
                            ));
                        }
                    }
                    last_error = Some(err);
                } else {
                    return Err(err.with_attempts(attempt).with_elapsed(duration_ms));
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| StepError::unknown("retry budget exhausted")))
}

async fn execute_control_step(
    step: &WorkflowStep,
    index: usize,
    state: &mut RunState,
    timing: &EffectiveTiming,
) -> Result<(), StepError> {
    state.emit(step, index, StepStatus::Attempt, 1, None, None, None);
    let started = Instant::now();

    let outcome = match &step.kind {
        StepKind::If {
            condition,
            then,
            otherwise,
        } => {
            let met = evaluate_condition(condition, state)?;
            debug!(step_index = index, met, "if condition evaluated");
            if met {
                execute_block(then, state).await
            } else {
                execute_block(otherwise, state).await
            }
        }

        StepKind::Foreach {
            list,
            binding,
            index_var,
            concurrency,
            steps,
        } => {
            if concurrency.map(|c| c > 1).unwrap_or(false) {
                warn!("foreach concurrency above 1 is reserved; running sequentially");
            }
            let items = match state.context.get(list) {
                Some(Value::Array(items)) => items,
                Some(_) => {
                    return Err(StepError::new(
                        StepErrorReason::ContextMiss,
                        format!("context path '{list}' is not a list"),
                    ))
                }
                None => {
                    return Err(StepError::new(
                        StepErrorReason::ContextMiss,
                        format!("context path '{list}' is not set"),
                    ))
                }
            };

            let mut bindings: Vec<&str> = vec![binding.as_str()];
            if let Some(index_var) = index_var {
                bindings.push(index_var.as_str());
            }
            state.context.push_scope(&bindings);
            let mut walk = Ok(());
            for (position, item) in items.into_iter().enumerate() {
                state
                    .context
                    .set(binding.clone(), item, SetOptions::default());
                if let Some(index_var) = index_var {
                    state.context.set(
                        index_var.clone(),
                        Value::from(position),
                        SetOptions::default(),
                    );
                }
                walk = execute_block(steps, state).await;
                if walk.is_err() {
                    break;
                }
            }
            state.context.pop_scope();
            walk
        }

        StepKind::Retry { policy, steps } => {
            execute_retry_block(policy, steps, state, timing).await
        }

        _ => Err(StepError::unknown("control executor invoked for leaf kind")),
    };

    let duration_ms = started.elapsed().as_millis() as u64;
    match outcome {
        Ok(()) => {
            state.emit(
                step,
                index,
                StepStatus::Success,
                1,
                Some(duration_ms),
                None,
                None,
            );
            Ok(())
        }
        Err(err) => Err(err),
    }
}

async fn execute_retry_block(
    policy: &RetryPolicy,
    steps: &[WorkflowStep],
    state: &mut RunState,
    timing: &EffectiveTiming,
) -> Result<(), StepError> {
    let attempts = policy.retries + 1;
    let retry_timing = EffectiveTiming {
        backoff_ms: policy.backoff_ms.unwrap_or(timing.backoff_ms),
        max_backoff_ms: policy.max_backoff_ms.unwrap_or(timing.max_backoff_ms),
        jitter_ms: policy.jitter_ms.unwrap_or(timing.jitter_ms),
        ..*timing
    };
    let mut last_error = None;
    for attempt in 1..=attempts {
        match execute_block(steps, state).await {
            Ok(()) => return Ok(()),
            Err(err) if err.reason == StepErrorReason::Cancelled => return Err(err),
            Err(err) => {
                if attempt < attempts {
                    let delay = backoff_delay(&retry_timing, attempt + 1);
                    let sleep = tokio::time::sleep(delay);
                    tokio::select! {
                        _ = sleep => {}
                        _ = state.cancel.cancelled() => {
                            return Err(StepError::new(
                                StepErrorReason::Cancelled,
                                "run cancelled during retry backoff",
                            ));
                        }
                    }
                }
                last_error = Some(err);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| StepError::unknown("retry block exhausted")))
}

fn evaluate_condition(condition: &Condition, state: &mut RunState) -> Result<bool, StepError> {
    match condition {
        Condition::ContextEquals { path, value } => {
            Ok(state.context.get(path).as_ref() == Some(value))
        }
        Condition::ContextTruthy { path } => Ok(state
            .context
            .get(path)
            .map(|v| truthy(&v))
            .unwrap_or(false)),
        Condition::ElementExists { key } => {
            Ok(state.toolkit.resolve_key(key, &state.cancel).is_hit())
        }
        Condition::ElementText { key, text, exact } => {
            let result = state.toolkit.resolve_key(key, &state.cancel);
            let Some(element) = result.element else {
                return Ok(false);
            };
            let actual = state
                .toolkit
                .backend
                .text_content(&element)
                .map(|t| collapse_whitespace(&t))
                .unwrap_or_default();
            let expected = collapse_whitespace(text);
            Ok(if *exact {
                actual == expected
            } else {
                actual.contains(&expected)
            })
        }
        Condition::UrlContains { fragment } => Ok(state
            .toolkit
            .backend
            .document_url()
            .map(|url| url.contains(fragment.as_str()))
            .unwrap_or(false)),
        Condition::Expression { expression } => match &state.condition_evaluator {
            Some(evaluator) => evaluator
                .evaluate(expression, &state.context.snapshot())
                .map_err(|message| {
                    StepError::new(StepErrorReason::PredicateError, message)
                }),
            None => Ok(matches!(
                expression.trim().to_ascii_lowercase().as_str(),
                "true" | "1" | "yes" | "on"
            )),
        },
        Condition::AllOf { conditions } => {
            for condition in conditions {
                if !evaluate_condition(condition, state)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Condition::AnyOf { conditions } => {
            for condition in conditions {
                if evaluate_condition(condition, state)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Condition::Not { condition } => Ok(!evaluate_condition(condition, state)?),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && s != "false" && s != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness_follows_loose_semantics() {
        assert!(truthy(&json!(true)));
        assert!(truthy(&json!(1)));
        assert!(truthy(&json!("yes")));
        assert!(truthy(&json!(["x"])));
        assert!(!truthy(&json!(false)));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(!truthy(&json!("false")));
        assert!(!truthy(&json!(null)));
        assert!(!truthy(&json!([])));
    }

    #[test]
    fn run_status_strings_are_stable() {
        assert_eq!(RunStatus::Success.as_str(), "success");
        assert_eq!(RunStatus::Failed.as_str(), "failed");
        assert_eq!(RunStatus::Cancelled.as_str(), "cancelled");
    }
}
