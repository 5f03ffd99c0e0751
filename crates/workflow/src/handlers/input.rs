//! Input handlers: type and select.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use dgx_dom::{DomEvent, DomEventKind};

use crate::dsl::{SelectBy, StepKind};
use crate::errors::{StepError, StepErrorReason};
use crate::handlers::{
    display_value, resolve_value, StepExecution, StepHandler, StepResult, StepToolkit,
};
use crate::template::value_to_text;

/// Resolves the value source, optionally clears, then assigns and
/// dispatches `input` and `change`.
pub struct TypeHandler;

#[async_trait]
impl StepHandler for TypeHandler {
    async fn execute(
        &self,
        toolkit: &StepToolkit,
        exec: &mut StepExecution<'_>,
    ) -> Result<StepResult, StepError> {
        let node = exec.require_element()?;
        let StepKind::Type {
            value,
            clear_first,
            delay_ms,
            mask,
            ..
        } = &exec.step.kind
        else {
            return Err(StepError::unknown("type handler invoked for wrong kind"));
        };

        let resolved = resolve_value(toolkit, exec, value)?;
        let text = value_to_text(&resolved);
        let backend = toolkit.backend.as_ref();
        let pause = delay_ms.map(Duration::from_millis);

        if *clear_first {
            backend
                .set_value(&node, "")
                .map_err(|err| StepError::unknown(format!("clear failed: {err}")))?;
            backend
                .dispatch(&node, DomEvent::bubbling(DomEventKind::Input))
                .map_err(|err| StepError::unknown(format!("input dispatch failed: {err}")))?;
            if let Some(pause) = pause {
                tokio::time::sleep(pause).await;
            }
        }

        backend
            .focus(&node)
            .map_err(|err| StepError::unknown(format!("focus failed: {err}")))?;
        backend
            .set_value(&node, &text)
            .map_err(|err| StepError::unknown(format!("value assignment failed: {err}")))?;
        backend
            .dispatch(&node, DomEvent::bubbling(DomEventKind::Input))
            .map_err(|err| StepError::unknown(format!("input dispatch failed: {err}")))?;
        if let Some(pause) = pause {
            tokio::time::sleep(pause).await;
        }
        backend
            .dispatch(&node, DomEvent::bubbling(DomEventKind::Change))
            .map_err(|err| StepError::unknown(format!("change dispatch failed: {err}")))?;

        Ok(StepResult::success()
            .with_data(json!({ "typed": display_value(&resolved, *mask) })))
    }
}

/// Value/label/index option selection, single or multiple.
pub struct SelectHandler;

#[async_trait]
impl StepHandler for SelectHandler {
    async fn execute(
        &self,
        toolkit: &StepToolkit,
        exec: &mut StepExecution<'_>,
    ) -> Result<StepResult, StepError> {
        let node = exec.require_element()?;
        let StepKind::Select {
            by,
            values,
            multiple,
            ..
        } = &exec.step.kind
        else {
            return Err(StepError::unknown("select handler invoked for wrong kind"));
        };

        let options = toolkit.backend.select_options(&node);
        let mut indices: Vec<usize> = Vec::new();
        for wanted in values {
            let found = match by {
                SelectBy::Value => options.iter().find(|o| &o.value == wanted),
                SelectBy::Label => options.iter().find(|o| &o.label == wanted),
                SelectBy::Index => wanted
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| options.iter().find(|o| o.index == i)),
            };
            match found {
                Some(option) => indices.push(option.index),
                None => {
                    return Err(StepError::new(
                        StepErrorReason::Unknown,
                        format!("no option matching '{wanted}'"),
                    )
                    .with_data(json!({ "optionCount": options.len() })));
                }
            }
        }
        if !*multiple {
            indices.truncate(1);
        }

        toolkit
            .backend
            .set_selected(&node, &indices)
            .map_err(|err| StepError::unknown(format!("selection failed: {err}")))?;
        toolkit
            .backend
            .dispatch(&node, DomEvent::bubbling(DomEventKind::Input))
            .map_err(|err| StepError::unknown(format!("input dispatch failed: {err}")))?;
        toolkit
            .backend
            .dispatch(&node, DomEvent::bubbling(DomEventKind::Change))
            .map_err(|err| StepError::unknown(format!("change dispatch failed: {err}")))?;

        Ok(StepResult::success().with_data(json!({ "selectedIndices": indices })))
    }
}
