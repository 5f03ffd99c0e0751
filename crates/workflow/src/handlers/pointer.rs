//! Pointer-family handlers: click, hover, focus, blur.

use async_trait::async_trait;

use dgx_dom::{DomEvent, DomEventKind};

use crate::dsl::StepKind;
use crate::errors::{StepError, StepErrorReason};
use crate::handlers::{StepExecution, StepHandler, StepResult, StepToolkit};

fn dispatch_sequence(
    toolkit: &StepToolkit,
    node: &dgx_dom::NodeHandle,
    kinds: &[DomEventKind],
) -> Result<(), StepError> {
    for kind in kinds {
        toolkit
            .backend
            .dispatch(node, DomEvent::bubbling(*kind))
            .map_err(|err| {
                StepError::new(
                    StepErrorReason::Unknown,
                    format!("dispatch of {} failed: {err}", kind.name()),
                )
            })?;
    }
    Ok(())
}

/// Dispatches the trusted-looking pointer/mouse sequence and focuses the
/// target.
pub struct ClickHandler;

#[async_trait]
impl StepHandler for ClickHandler {
    async fn execute(
        &self,
        toolkit: &StepToolkit,
        exec: &mut StepExecution<'_>,
    ) -> Result<StepResult, StepError> {
        let node = exec.require_element()?;
        let double = matches!(exec.step.kind, StepKind::Click { double: true, .. });

        dispatch_sequence(
            toolkit,
            &node,
            &[DomEventKind::PointerDown, DomEventKind::MouseDown],
        )?;
        toolkit
            .backend
            .focus(&node)
            .map_err(|err| StepError::unknown(format!("focus failed: {err}")))?;
        dispatch_sequence(
            toolkit,
            &node,
            &[DomEventKind::MouseUp, DomEventKind::Click],
        )?;
        if double {
            dispatch_sequence(toolkit, &node, &[DomEventKind::DblClick])?;
        }
        Ok(StepResult::success())
    }
}

/// Dispatches the hover pointer sequence.
pub struct HoverHandler;

#[async_trait]
impl StepHandler for HoverHandler {
    async fn execute(
        &self,
        toolkit: &StepToolkit,
        exec: &mut StepExecution<'_>,
    ) -> Result<StepResult, StepError> {
        let node = exec.require_element()?;
        dispatch_sequence(
            toolkit,
            &node,
            &[DomEventKind::PointerOver, DomEventKind::MouseOver],
        )?;
        Ok(StepResult::success())
    }
}

pub struct FocusHandler;

#[async_trait]
impl StepHandler for FocusHandler {
    async fn execute(
        &self,
        toolkit: &StepToolkit,
        exec: &mut StepExecution<'_>,
    ) -> Result<StepResult, StepError> {
        let node = exec.require_element()?;
        toolkit
            .backend
            .focus(&node)
            .map_err(|err| StepError::unknown(format!("focus failed: {err}")))?;
        Ok(StepResult::success())
    }
}

pub struct BlurHandler;

#[async_trait]
impl StepHandler for BlurHandler {
    async fn execute(
        &self,
        toolkit: &StepToolkit,
        exec: &mut StepExecution<'_>,
    ) -> Result<StepResult, StepError> {
        let node = exec.require_element()?;
        toolkit
            .backend
            .blur(&node)
            .map_err(|err| StepError::unknown(format!("blur failed: {err}")))?;
        Ok(StepResult::success())
    }
}
