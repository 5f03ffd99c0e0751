//! Structured step and run errors.

use serde_json::{json, Value};
use thiserror::Error;

use dgx_wait::WaitError;

use crate::validate::ValidationIssue;

/// Closed set of step failure reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepErrorReason {
    ResolverMiss,
    Timeout,
    AssertionFailed,
    ContextMiss,
    Cancelled,
    Unknown,
    NoChange,
    PredicateError,
    ContainerUnavailable,
    DomStableNoMatch,
}

impl StepErrorReason {
    /// Wire spelling (mixed kebab/snake, stable).
    pub fn as_str(&self) -> &'static str {
        match self {
            StepErrorReason::ResolverMiss => "resolver-miss",
            StepErrorReason::Timeout => "timeout",
            StepErrorReason::AssertionFailed => "assertion-failed",
            StepErrorReason::ContextMiss => "context-miss",
            StepErrorReason::Cancelled => "cancelled",
            StepErrorReason::Unknown => "unknown",
            StepErrorReason::NoChange => "no_change",
            StepErrorReason::PredicateError => "predicate_error",
            StepErrorReason::ContainerUnavailable => "container_unavailable",
            StepErrorReason::DomStableNoMatch => "dom_stable_no_match",
        }
    }
}

/// A step failure as a first-class value.
#[derive(Debug, Error, Clone)]
#[error("{message}")]
pub struct StepError {
    pub reason: StepErrorReason,
    pub message: String,
    pub step_kind: String,
    pub step_id: Option<String>,
    pub logical_key: Option<String>,
    pub attempts: Option<u32>,
    pub elapsed_ms: Option<u64>,
    pub data: Option<Value>,
}

impl StepError {
    pub fn new(reason: StepErrorReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
            step_kind: String::new(),
            step_id: None,
            logical_key: None,
            attempts: None,
            elapsed_ms: None,
            data: None,
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(StepErrorReason::Unknown, message)
    }

    pub fn with_step(mut self, kind: impl Into<String>, id: Option<String>) -> Self {
        self.step_kind = kind.into();
        self.step_id = id;
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.logical_key = Some(key.into());
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn with_elapsed(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = Some(elapsed_ms);
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Serialized payload carried by telemetry and the run outcome.
    pub fn payload(&self) -> Value {
        json!({
            "reason": self.reason.as_str(),
            "message": self.message,
            "stepKind": self.step_kind,
            "stepId": self.step_id,
            "logicalKey": self.logical_key,
            "attempts": self.attempts,
            "elapsedMs": self.elapsed_ms,
            "data": self.data,
        })
    }
}

impl From<WaitError> for StepError {
    fn from(err: WaitError) -> Self {
        let reason = match err.code() {
            "resolver-miss" => StepErrorReason::ResolverMiss,
            "cancelled" => StepErrorReason::Cancelled,
            _ => StepErrorReason::Timeout,
        };
        StepError::new(reason, err.to_string())
            .with_attempts(err.attempts())
            .with_elapsed(err.elapsed_ms())
            .with_data(json!({ "waitCode": err.code() }))
    }
}

/// Run-level failure to even start.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("workflow definition failed validation with {} error(s)", .0.len())]
    ValidationFailed(Vec<ValidationIssue>),
}
