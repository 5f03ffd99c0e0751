//! Step handlers.
//!
//! One handler per leaf step kind, all obeying the same contract: read
//! the DOM through the toolkit, never write the context directly, and
//! report every observable change through the returned [`StepResult`].
//! Control-flow kinds (`if`, `foreach`, `retry`) are interpreted by the
//! scheduler and have no handler here.

mod data;
mod input;
mod pointer;
mod scrolling;
mod waiting;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use dgx_core_types::{RunId, WorkflowId};
use dgx_dom::{DomBackend, NodeHandle};
use dgx_scroll::{IntoViewScroller, ScrollUntilRunner};
use dgx_selector::{ResolveOptions, ResolveResult, SelectorMap, SelectorResolver};
use dgx_telemetry::TelemetryLogger;
use dgx_wait::Waiter;

use crate::context::{SetOptions, WorkflowContext};
use crate::dsl::{StepKind, ValueSource, WorkflowStep};
use crate::env::Environment;
use crate::errors::{StepError, StepErrorReason};
use crate::template::{render_template, value_to_text};
use crate::timing::EffectiveTiming;

/// Shared engine services handed to every handler.
pub struct StepToolkit {
    pub backend: Arc<dyn DomBackend>,
    pub resolver: Arc<SelectorResolver>,
    pub map: Arc<SelectorMap>,
    pub waiter: Arc<Waiter>,
    pub into_view: Arc<IntoViewScroller>,
    pub scroll_until: Arc<ScrollUntilRunner>,
    pub environment: Arc<Environment>,
    pub logger: Arc<dyn TelemetryLogger>,
}

impl StepToolkit {
    /// Resolve a logical key against the ambient document.
    pub fn resolve_key(&self, key: &str, cancel: &CancellationToken) -> ResolveResult {
        self.resolver.resolve(
            &self.map,
            key,
            &ResolveOptions {
                scope_root: None,
                cancel: Some(cancel.clone()),
            },
        )
    }
}

/// Per-invocation handler inputs.
pub struct StepExecution<'a> {
    pub step: &'a WorkflowStep,
    pub step_index: usize,
    pub attempt: u32,
    pub retries_remaining: u32,
    pub timing: EffectiveTiming,
    pub context: &'a WorkflowContext,
    pub resolve_result: Option<ResolveResult>,
    pub run_id: RunId,
    pub workflow_id: WorkflowId,
    pub cancel: CancellationToken,
}

impl StepExecution<'_> {
    /// The element this step's key resolved to, or a `resolver-miss`.
    pub fn require_element(&self) -> Result<NodeHandle, StepError> {
        let key = self.step.kind.primary_key().unwrap_or_default();
        self.resolve_result
            .as_ref()
            .and_then(|r| r.element)
            .ok_or_else(|| {
                StepError::new(
                    StepErrorReason::ResolverMiss,
                    format!("key '{key}' did not resolve to an element"),
                )
                .with_key(key)
            })
    }
}

/// Handler output status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResultStatus {
    Success,
    Skipped,
}

/// One pending context write carried back from a handler.
#[derive(Debug, Clone)]
pub struct ContextUpdate {
    pub path: String,
    pub value: Value,
    pub options: SetOptions,
}

/// Handler output.
#[derive(Debug, Clone, Default)]
pub struct StepResult {
    pub status: Option<StepResultStatus>,
    pub notes: Option<String>,
    pub context_updates: Vec<ContextUpdate>,
    pub logs: Vec<String>,
    pub data: Option<Value>,
}

impl StepResult {
    pub fn success() -> Self {
        Self {
            status: Some(StepResultStatus::Success),
            ..Default::default()
        }
    }

    pub fn skipped(notes: impl Into<String>) -> Self {
        Self {
            status: Some(StepResultStatus::Skipped),
            notes: Some(notes.into()),
            ..Default::default()
        }
    }

    pub fn status(&self) -> StepResultStatus {
        self.status.unwrap_or(StepResultStatus::Success)
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes = Some(note.into());
        self
    }

    pub fn with_update(mut self, path: impl Into<String>, value: Value, options: SetOptions) -> Self {
        self.context_updates.push(ContextUpdate {
            path: path.into(),
            value,
            options,
        });
        self
    }

    pub fn with_log(mut self, line: impl Into<String>) -> Self {
        self.logs.push(line.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// The uniform handler contract.
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn execute(
        &self,
        toolkit: &StepToolkit,
        exec: &mut StepExecution<'_>,
    ) -> Result<StepResult, StepError>;
}

/// Resolve a [`ValueSource`] to a JSON value.
pub fn resolve_value(
    toolkit: &StepToolkit,
    exec: &StepExecution<'_>,
    source: &ValueSource,
) -> Result<Value, StepError> {
    match source {
        ValueSource::Literal { value } => Ok(value.clone()),
        ValueSource::Context { path } => exec.context.peek(path).ok_or_else(|| {
            StepError::new(
                StepErrorReason::ContextMiss,
                format!("context path '{path}' is not set"),
            )
        }),
        ValueSource::Env { name } => toolkit
            .environment
            .lookup(name)
            .map(Value::String)
            .ok_or_else(|| {
                StepError::new(
                    StepErrorReason::ContextMiss,
                    format!("environment variable '{name}' is not set"),
                )
            }),
        ValueSource::Template { template } => Ok(Value::String(render_template(
            template,
            exec.context,
            &toolkit.environment,
        ))),
        ValueSource::Key { key } => {
            let result = toolkit.resolve_key(key, &exec.cancel);
            let element = result.element.ok_or_else(|| {
                StepError::new(
                    StepErrorReason::ResolverMiss,
                    format!("key '{key}' did not resolve to an element"),
                )
                .with_key(key.clone())
            })?;
            Ok(Value::String(
                toolkit
                    .backend
                    .text_content(&element)
                    .map(|t| t.trim().to_string())
                    .unwrap_or_default(),
            ))
        }
    }
}

/// Render a value for logging, respecting a mask flag.
pub fn display_value(value: &Value, masked: bool) -> String {
    if masked {
        dgx_telemetry::MASKED_VALUE.to_string()
    } else {
        value_to_text(value)
    }
}

/// Registry mapping step kind names to handlers.
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn StepHandler>>,
}

impl HandlerRegistry {
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// All built-in leaf handlers.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register("click", Arc::new(pointer::ClickHandler));
        registry.register("hover", Arc::new(pointer::HoverHandler));
        registry.register("focus", Arc::new(pointer::FocusHandler));
        registry.register("blur", Arc::new(pointer::BlurHandler));
        registry.register("type", Arc::new(input::TypeHandler));
        registry.register("select", Arc::new(input::SelectHandler));
        registry.register("waitFor", Arc::new(waiting::WaitHandler));
        registry.register("waitText", Arc::new(waiting::WaitHandler));
        registry.register("waitVisible", Arc::new(waiting::WaitHandler));
        registry.register("waitHidden", Arc::new(waiting::WaitHandler));
        registry.register("waitForIdle", Arc::new(waiting::WaitHandler));
        registry.register("delay", Arc::new(waiting::DelayHandler));
        registry.register("log", Arc::new(data::LogHandler));
        registry.register("setContext", Arc::new(data::SetContextHandler));
        registry.register("capture", Arc::new(data::CaptureHandler));
        registry.register("assert", Arc::new(data::AssertHandler));
        registry.register("collectList", Arc::new(data::CollectListHandler));
        registry.register("scrollIntoView", Arc::new(scrolling::ScrollIntoViewHandler));
        registry.register("scrollUntil", Arc::new(scrolling::ScrollUntilHandler));
        registry.register("run", Arc::new(RunHandler));
        registry
    }

    pub fn register(&mut self, kind: &'static str, handler: Arc<dyn StepHandler>) {
        self.handlers.insert(kind, handler);
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn StepHandler>> {
        self.handlers.get(kind).cloned()
    }
}

/// Reserved capability: nested workflow invocation.
struct RunHandler;

#[async_trait]
impl StepHandler for RunHandler {
    async fn execute(
        &self,
        _toolkit: &StepToolkit,
        exec: &mut StepExecution<'_>,
    ) -> Result<StepResult, StepError> {
        let workflow_id = match &exec.step.kind {
            StepKind::Run { workflow_id } => workflow_id.clone(),
            _ => String::new(),
        };
        Err(StepError::unknown(format!(
            "nested workflow runs are not implemented (requested '{workflow_id}')"
        )))
    }
}
