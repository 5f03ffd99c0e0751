//! Scroll telemetry.
//!
//! The scroll-until lifecycle is wire-level stable: events are named
//! `"[DGX] scroll:" + kind` with kind one of `start`, `attempt`,
//! `success`, `failure`, `no_change`. Detector candidates and into-view
//! adjustments are logger-only detail.

use std::sync::Arc;

use serde_json::Value;

use dgx_telemetry::{guard_sink, sanitize_json, NullLogger, TelemetryLogger};

/// Wire-stable scroll-until lifecycle kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollEventKind {
    Start,
    Attempt,
    Success,
    Failure,
    NoChange,
}

impl ScrollEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrollEventKind::Start => "start",
            ScrollEventKind::Attempt => "attempt",
            ScrollEventKind::Success => "success",
            ScrollEventKind::Failure => "failure",
            ScrollEventKind::NoChange => "no_change",
        }
    }

    /// Full wire event name.
    pub fn event_name(&self) -> String {
        format!("[DGX] scroll:{}", self.as_str())
    }
}

/// One emitted scroll lifecycle event.
#[derive(Debug, Clone)]
pub struct ScrollEvent {
    pub kind: ScrollEventKind,
    pub name: String,
    pub data: Value,
}

type ScrollEventCallback = Box<dyn Fn(&ScrollEvent) + Send + Sync>;

/// Telemetry hub shared by the three scroll engines.
pub struct ScrollTelemetry {
    logger: Arc<dyn TelemetryLogger>,
    on_event: Option<ScrollEventCallback>,
    /// Attempt events are emitted only for continuing iterations.
    emit_attempts: bool,
}

impl Default for ScrollTelemetry {
    fn default() -> Self {
        Self::new(Arc::new(NullLogger))
    }
}

impl ScrollTelemetry {
    pub fn new(logger: Arc<dyn TelemetryLogger>) -> Self {
        Self {
            logger,
            on_event: None,
            emit_attempts: true,
        }
    }

    pub fn on_event(mut self, callback: impl Fn(&ScrollEvent) + Send + Sync + 'static) -> Self {
        self.on_event = Some(Box::new(callback));
        self
    }

    pub fn without_attempt_events(mut self) -> Self {
        self.emit_attempts = false;
        self
    }

    pub fn emit(&self, kind: ScrollEventKind, data: Value) {
        if kind == ScrollEventKind::Attempt && !self.emit_attempts {
            return;
        }
        let event = ScrollEvent {
            kind,
            name: kind.event_name(),
            data: sanitize_json(&data),
        };
        match kind {
            ScrollEventKind::Start | ScrollEventKind::Attempt => {
                self.logger.debug(&event.name, Some(&event.data))
            }
            ScrollEventKind::Success => self.logger.info(&event.name, Some(&event.data)),
            ScrollEventKind::Failure | ScrollEventKind::NoChange => {
                self.logger.warn(&event.name, Some(&event.data))
            }
        }
        if let Some(callback) = &self.on_event {
            guard_sink("scroll.on_event", || callback(&event));
        }
    }

    /// Detector candidate probes and into-view adjustments: logger-only.
    pub fn detail(&self, message: &str, data: Value) {
        self.logger.debug(message, Some(&sanitize_json(&data)));
    }

    pub fn warn_detail(&self, message: &str, data: Value) {
        self.logger.warn(message, Some(&sanitize_json(&data)));
    }
}
