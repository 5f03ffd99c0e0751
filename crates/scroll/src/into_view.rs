//! Into-view alignment.
//!
//! A retry loop, one iteration per animation frame, that scrolls a
//! container until the target sits inside it subject to alignment and
//! margins. Tolerance is half a pixel on every edge.

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;

use dgx_dom::{DomBackend, NodeHandle};

use crate::container::{detect_scroll_container, DetectOptions};
use crate::frame::FrameScheduler;
use crate::telemetry::ScrollTelemetry;

/// Edge tolerance in CSS pixels.
pub const ALIGNMENT_TOLERANCE: f64 = 0.5;

/// Default retry cap.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Per-axis alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    Start,
    Center,
    End,
    Nearest,
}

/// Block and inline alignment, mirroring `scrollIntoView` options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alignment {
    #[serde(default = "default_block")]
    pub block: Align,
    #[serde(default = "default_inline")]
    pub inline: Align,
}

fn default_block() -> Align {
    Align::Start
}

fn default_inline() -> Align {
    Align::Nearest
}

impl Default for Alignment {
    fn default() -> Self {
        Self {
            block: Align::Start,
            inline: Align::Nearest,
        }
    }
}

/// Per-edge margins, clamped to zero. Accepts a bare number (uniform) or
/// a per-edge object in serialized form.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Margin {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Margin {
    pub fn uniform(value: f64) -> Self {
        let value = value.max(0.0);
        Self {
            top: value,
            right: value,
            bottom: value,
            left: value,
        }
    }

    pub fn clamped(self) -> Self {
        Self {
            top: self.top.max(0.0),
            right: self.right.max(0.0),
            bottom: self.bottom.max(0.0),
            left: self.left.max(0.0),
        }
    }
}

impl<'de> Deserialize<'de> for Margin {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Spec {
            Uniform(f64),
            PerEdge {
                #[serde(default)]
                top: f64,
                #[serde(default)]
                right: f64,
                #[serde(default)]
                bottom: f64,
                #[serde(default)]
                left: f64,
            },
        }
        let spec = Spec::deserialize(deserializer)?;
        Ok(match spec {
            Spec::Uniform(value) => Margin::uniform(value),
            Spec::PerEdge {
                top,
                right,
                bottom,
                left,
            } => Margin {
                top,
                right,
                bottom,
                left,
            }
            .clamped(),
        })
    }
}

/// Why an into-view attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntoViewFailure {
    InvalidTarget,
    ContainerUnavailable,
    MaxRetries,
    NoAdjustment,
}

impl IntoViewFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntoViewFailure::InvalidTarget => "invalid-target",
            IntoViewFailure::ContainerUnavailable => "container-unavailable",
            IntoViewFailure::MaxRetries => "max-retries",
            IntoViewFailure::NoAdjustment => "no-adjustment",
        }
    }
}

/// Into-view call options.
#[derive(Clone, Default)]
pub struct IntoViewOptions {
    pub container: Option<NodeHandle>,
    pub alignment: Alignment,
    pub margin: Margin,
    pub max_retries: Option<u32>,
    /// Detector options used when no container is given.
    pub detection: DetectOptions,
}

/// Outcome of an into-view call.
#[derive(Debug, Clone)]
pub struct IntoViewOutcome {
    pub success: bool,
    pub attempts: u32,
    pub container: Option<NodeHandle>,
    pub target: NodeHandle,
    pub reason: Option<IntoViewFailure>,
}

/// The into-view scroller.
pub struct IntoViewScroller {
    backend: Arc<dyn DomBackend>,
    frames: Arc<dyn FrameScheduler>,
    telemetry: Arc<ScrollTelemetry>,
}

impl IntoViewScroller {
    pub fn new(
        backend: Arc<dyn DomBackend>,
        frames: Arc<dyn FrameScheduler>,
        telemetry: Arc<ScrollTelemetry>,
    ) -> Self {
        Self {
            backend,
            frames,
            telemetry,
        }
    }

    pub async fn scroll_into_view(
        &self,
        target: &NodeHandle,
        options: &IntoViewOptions,
    ) -> IntoViewOutcome {
        let backend = self.backend.as_ref();
        if !backend.is_connected(target) {
            return IntoViewOutcome {
                success: false,
                attempts: 0,
                container: None,
                target: *target,
                reason: Some(IntoViewFailure::InvalidTarget),
            };
        }

        let container = match options.container {
            Some(container) => Some(container),
            None => detect_scroll_container(backend, target, &options.detection, &self.telemetry)
                .map(|d| d.element),
        };
        let Some(container) = container else {
            return IntoViewOutcome {
                success: false,
                attempts: 0,
                container: None,
                target: *target,
                reason: Some(IntoViewFailure::ContainerUnavailable),
            };
        };

        let margin = options.margin.clamped();
        let max_retries = options.max_retries.unwrap_or(DEFAULT_MAX_RETRIES);
        let mut attempts: u32 = 0;

        loop {
            self.frames.next_frame().await;

            let (Some(container_rect), Some(target_rect), Some(scroll)) = (
                backend.bounding_rect(&container),
                backend.bounding_rect(target),
                backend.scroll_state(&container),
            ) else {
                return IntoViewOutcome {
                    success: false,
                    attempts,
                    container: Some(container),
                    target: *target,
                    reason: Some(IntoViewFailure::InvalidTarget),
                };
            };

            let relative_top = target_rect.top - container_rect.top;
            let relative_left = target_rect.left - container_rect.left;
            let viewport_block = scroll.client_height;
            let viewport_inline = scroll.client_width;

            let inside_block = relative_top >= margin.top - ALIGNMENT_TOLERANCE
                && relative_top + target_rect.height
                    <= viewport_block - margin.bottom + ALIGNMENT_TOLERANCE;
            let inside_inline = relative_left >= margin.left - ALIGNMENT_TOLERANCE
                && relative_left + target_rect.width
                    <= viewport_inline - margin.right + ALIGNMENT_TOLERANCE;
            if inside_block && inside_inline {
                return IntoViewOutcome {
                    success: true,
                    attempts,
                    container: Some(container),
                    target: *target,
                    reason: None,
                };
            }

            if attempts >= max_retries {
                return IntoViewOutcome {
                    success: false,
                    attempts,
                    container: Some(container),
                    target: *target,
                    reason: Some(IntoViewFailure::MaxRetries),
                };
            }

            let desired_top = desired_scroll(
                options.alignment.block,
                relative_top + scroll.scroll_top,
                target_rect.height,
                viewport_block,
                margin.top,
                margin.bottom,
                scroll.scroll_top,
            )
            .clamp(0.0, scroll.max_scroll_top());
            let desired_left = desired_scroll(
                options.alignment.inline,
                relative_left + scroll.scroll_left,
                target_rect.width,
                viewport_inline,
                margin.left,
                margin.right,
                scroll.scroll_left,
            )
            .clamp(0.0, scroll.max_scroll_left());

            let delta_top = desired_top - scroll.scroll_top;
            let delta_left = desired_left - scroll.scroll_left;
            if delta_top.abs() <= ALIGNMENT_TOLERANCE && delta_left.abs() <= ALIGNMENT_TOLERANCE {
                return IntoViewOutcome {
                    success: false,
                    attempts,
                    container: Some(container),
                    target: *target,
                    reason: Some(IntoViewFailure::NoAdjustment),
                };
            }

            if backend
                .set_scroll_position(&container, desired_left, desired_top)
                .is_err()
            {
                return IntoViewOutcome {
                    success: false,
                    attempts,
                    container: Some(container),
                    target: *target,
                    reason: Some(IntoViewFailure::ContainerUnavailable),
                };
            }
            attempts += 1;
            self.telemetry.detail(
                "scroll adjustment",
                json!({
                    "attempt": attempts,
                    "deltaTop": delta_top,
                    "deltaLeft": delta_left,
                    "scrollTop": desired_top,
                    "scrollLeft": desired_left,
                }),
            );
        }
    }
}

/// Desired scroll offset for one axis.
///
/// `subject_offset` is the target's position in the container's content
/// coordinates; `current` the present scroll offset.
fn desired_scroll(
    align: Align,
    subject_offset: f64,
    subject_size: f64,
    viewport: f64,
    margin_start: f64,
    margin_end: f64,
    current: f64,
) -> f64 {
    match align {
        Align::Start => subject_offset - margin_start,
        Align::End => subject_offset + subject_size - (viewport - margin_end),
        Align::Center => {
            let safe = viewport - margin_start - margin_end;
            subject_offset + subject_size / 2.0 - (margin_start + safe / 2.0)
        }
        Align::Nearest => {
            let relative = subject_offset - current;
            let fits_after_start = relative >= margin_start;
            let fits_before_end = relative + subject_size <= viewport - margin_end;
            if fits_after_start && fits_before_end {
                current
            } else if relative < margin_start {
                subject_offset - margin_start
            } else {
                subject_offset + subject_size - (viewport - margin_end)
            }
        }
    }
}
