//! Data handlers: log, setContext, capture, assert, collectList.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Map, Value};

use dgx_dom::NodeHandle;
use dgx_selector::ResolveOptions;
use dgx_telemetry::{collapse_whitespace, sanitize_summary};

use crate::context::SetOptions;
use crate::dsl::{Assertion, CaptureSource, CollectShape, DedupeBy, StepKind};
use crate::errors::{StepError, StepErrorReason};
use crate::handlers::{
    display_value, resolve_value, StepExecution, StepHandler, StepResult, StepToolkit,
};

/// Writes a line through the logger sink.
pub struct LogHandler;

#[async_trait]
impl StepHandler for LogHandler {
    async fn execute(
        &self,
        toolkit: &StepToolkit,
        exec: &mut StepExecution<'_>,
    ) -> Result<StepResult, StepError> {
        let StepKind::Log {
            message,
            level,
            data,
        } = &exec.step.kind
        else {
            return Err(StepError::unknown("log handler invoked for wrong kind"));
        };
        let rendered =
            crate::template::render_template(message, exec.context, &toolkit.environment);
        match level.as_deref() {
            Some("debug") => toolkit.logger.debug(&rendered, data.as_ref()),
            Some("warn") => toolkit.logger.warn(&rendered, data.as_ref()),
            Some("error") => toolkit.logger.error(&rendered, data.as_ref()),
            _ => toolkit.logger.info(&rendered, data.as_ref()),
        }
        Ok(StepResult::success().with_log(rendered))
    }
}

/// Resolves a value source and stages a context write.
pub struct SetContextHandler;

#[async_trait]
impl StepHandler for SetContextHandler {
    async fn execute(
        &self,
        toolkit: &StepToolkit,
        exec: &mut StepExecution<'_>,
    ) -> Result<StepResult, StepError> {
        let StepKind::SetContext {
            path,
            value,
            ttl_ms,
            mask,
        } = &exec.step.kind
        else {
            return Err(StepError::unknown("setContext handler invoked for wrong kind"));
        };
        let resolved = resolve_value(toolkit, exec, value)?;
        Ok(StepResult::success()
            .with_note(format!("set '{path}' = {}", display_value(&resolved, *mask)))
            .with_update(
                path.clone(),
                resolved,
                SetOptions {
                    ttl_ms: *ttl_ms,
                    mask: *mask,
                },
            ))
    }
}

/// Extracts a value from the resolved element into the context.
pub struct CaptureHandler;

#[async_trait]
impl StepHandler for CaptureHandler {
    async fn execute(
        &self,
        toolkit: &StepToolkit,
        exec: &mut StepExecution<'_>,
    ) -> Result<StepResult, StepError> {
        let node = exec.require_element()?;
        let StepKind::Capture { from, to, mask, .. } = &exec.step.kind else {
            return Err(StepError::unknown("capture handler invoked for wrong kind"));
        };
        let backend = toolkit.backend.as_ref();
        let extracted: Value = match from {
            CaptureSource::Text => Value::String(
                backend
                    .text_content(&node)
                    .map(|t| collapse_whitespace(&t))
                    .unwrap_or_default(),
            ),
            CaptureSource::Attr { name } => backend
                .attribute(&node, name)
                .map(Value::String)
                .unwrap_or(Value::Null),
            CaptureSource::Html => Value::String(backend.inner_html(&node).unwrap_or_default()),
            CaptureSource::Value => backend
                .value(&node)
                .map(Value::String)
                .unwrap_or(Value::Null),
            CaptureSource::Regex { pattern, group } => {
                let text = backend.text_content(&node).unwrap_or_default();
                let regex = Regex::new(pattern).map_err(|err| {
                    StepError::new(
                        StepErrorReason::PredicateError,
                        format!("invalid capture pattern: {err}"),
                    )
                })?;
                match regex.captures(&text) {
                    Some(captures) => captures
                        .get(group.unwrap_or(0))
                        .map(|m| Value::String(m.as_str().to_string()))
                        .unwrap_or(Value::Null),
                    None => Value::Null,
                }
            }
        };
        Ok(StepResult::success()
            .with_note(format!("captured '{to}'"))
            .with_update(
                to.clone(),
                extracted,
                SetOptions {
                    ttl_ms: None,
                    mask: *mask,
                },
            ))
    }
}

/// Evaluates an assertion; a mismatch is an `assertion-failed` error.
pub struct AssertHandler;

#[async_trait]
impl StepHandler for AssertHandler {
    async fn execute(
        &self,
        toolkit: &StepToolkit,
        exec: &mut StepExecution<'_>,
    ) -> Result<StepResult, StepError> {
        let StepKind::Assert { assertion } = &exec.step.kind else {
            return Err(StepError::unknown("assert handler invoked for wrong kind"));
        };
        match assertion {
            Assertion::ContextEquals { path, value } => {
                let actual = exec.context.peek(path).ok_or_else(|| {
                    StepError::new(
                        StepErrorReason::ContextMiss,
                        format!("context path '{path}' is not set"),
                    )
                })?;
                if &actual != value {
                    return Err(StepError::new(
                        StepErrorReason::AssertionFailed,
                        format!("context '{path}' mismatch"),
                    )
                    .with_data(json!({ "expected": value, "actual": actual })));
                }
            }
            Assertion::ContextExists { path } => {
                if exec.context.peek(path).is_none() {
                    return Err(StepError::new(
                        StepErrorReason::AssertionFailed,
                        format!("context '{path}' is not set"),
                    ));
                }
            }
            Assertion::ElementExists { key } => {
                let result = toolkit.resolve_key(key, &exec.cancel);
                if !result.is_hit() {
                    return Err(StepError::new(
                        StepErrorReason::AssertionFailed,
                        format!("element '{key}' does not exist"),
                    )
                    .with_key(key.clone()));
                }
            }
            Assertion::ElementText { key, text, exact } => {
                let result = toolkit.resolve_key(key, &exec.cancel);
                let element = result.element.ok_or_else(|| {
                    StepError::new(
                        StepErrorReason::ResolverMiss,
                        format!("key '{key}' did not resolve to an element"),
                    )
                    .with_key(key.clone())
                })?;
                let actual = toolkit
                    .backend
                    .text_content(&element)
                    .map(|t| collapse_whitespace(&t))
                    .unwrap_or_default();
                let expected = collapse_whitespace(text);
                let holds = if *exact {
                    actual == expected
                } else {
                    actual.contains(&expected)
                };
                if !holds {
                    return Err(StepError::new(
                        StepErrorReason::AssertionFailed,
                        format!("text of '{key}' mismatch"),
                    )
                    .with_key(key.clone())
                    .with_data(json!({ "expected": expected, "actual": actual })));
                }
            }
            Assertion::UrlContains { fragment } => {
                let url = toolkit.backend.document_url().unwrap_or_default();
                if !url.contains(fragment.as_str()) {
                    return Err(StepError::new(
                        StepErrorReason::AssertionFailed,
                        format!("url does not contain '{fragment}'"),
                    )
                    .with_data(json!({ "url": url })));
                }
            }
        }
        Ok(StepResult::success())
    }
}

/// Collects list items under a parent into the context.
pub struct CollectListHandler;

impl CollectListHandler {
    fn item_nodes(
        toolkit: &StepToolkit,
        exec: &StepExecution<'_>,
        parent: &NodeHandle,
    ) -> Result<Vec<NodeHandle>, StepError> {
        let StepKind::CollectList {
            item_key, item_css, ..
        } = &exec.step.kind
        else {
            return Ok(Vec::new());
        };
        if let Some(item_key) = item_key {
            let result = toolkit.resolver.resolve(
                &toolkit.map,
                item_key,
                &ResolveOptions {
                    scope_root: Some(*parent),
                    cancel: Some(exec.cancel.clone()),
                },
            );
            let elements = result
                .attempts
                .iter()
                .find(|a| a.success)
                .map(|a| a.elements.clone())
                .unwrap_or_default();
            return Ok(elements);
        }
        if let Some(css) = item_css {
            return Ok(toolkit
                .backend
                .query_css(Some(parent), css)
                .unwrap_or_default());
        }
        Ok(toolkit.backend.children(parent))
    }
}

#[async_trait]
impl StepHandler for CollectListHandler {
    async fn execute(
        &self,
        toolkit: &StepToolkit,
        exec: &mut StepExecution<'_>,
    ) -> Result<StepResult, StepError> {
        let parent = exec.require_element()?;
        let StepKind::CollectList {
            limit,
            dedupe,
            dedupe_attr,
            to,
            shape,
            attrs,
            ..
        } = &exec.step.kind
        else {
            return Err(StepError::unknown("collectList handler invoked for wrong kind"));
        };

        let backend = toolkit.backend.as_ref();
        let mut nodes = Self::item_nodes(toolkit, exec, &parent)?;

        if let Some(dedupe) = dedupe {
            let mut seen: Vec<String> = Vec::new();
            nodes.retain(|node| {
                let key = match dedupe {
                    DedupeBy::Text => backend
                        .text_content(node)
                        .map(|t| collapse_whitespace(&t))
                        .unwrap_or_default(),
                    DedupeBy::Attr => dedupe_attr
                        .as_ref()
                        .and_then(|attr| backend.attribute(node, attr))
                        .unwrap_or_default(),
                    DedupeBy::Identity => node.to_string(),
                };
                if seen.contains(&key) {
                    false
                } else {
                    seen.push(key);
                    true
                }
            });
        }
        if let Some(limit) = limit {
            nodes.truncate(*limit);
        }

        let items: Vec<Value> = nodes
            .iter()
            .map(|node| match shape {
                CollectShape::Text => Value::String(
                    backend
                        .text_content(node)
                        .map(|t| collapse_whitespace(&t))
                        .unwrap_or_default(),
                ),
                CollectShape::Html => {
                    Value::String(backend.inner_html(node).unwrap_or_default())
                }
                CollectShape::Attrs => {
                    let mut map = Map::new();
                    for attr in attrs {
                        map.insert(
                            attr.clone(),
                            backend
                                .attribute(node, attr)
                                .map(Value::String)
                                .unwrap_or(Value::Null),
                        );
                    }
                    Value::Object(map)
                }
                CollectShape::Object => {
                    let summary = backend.describe(node).map(|s| sanitize_summary(&s));
                    json!({
                        "tag": summary.as_ref().map(|s| s.tag.clone()),
                        "id": summary.as_ref().and_then(|s| s.id.clone()),
                        "classes": summary.map(|s| s.classes).unwrap_or_default(),
                        "text": backend
                            .text_content(node)
                            .map(|t| collapse_whitespace(&t))
                            .unwrap_or_default(),
                    })
                }
            })
            .collect();

        let count = items.len();
        Ok(StepResult::success()
            .with_note(format!("collected {count} item(s) into '{to}'"))
            .with_update(to.clone(), Value::Array(items), SetOptions::default())
            .with_data(json!({ "count": count })))
    }
}
