//! Wait telemetry.
//!
//! Wire-level stable names: `"[DGX] wait:" + kind` with kind one of
//! `start`, `attempt`, `heartbeat`, `success`, `failure`. Attempt events
//! are debug-only. All payloads are masked at this boundary.

use std::sync::Arc;

use serde_json::Value;

use dgx_telemetry::{guard_sink, sanitize_json, NullLogger, TelemetryLogger};

/// Wait lifecycle kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitEventKind {
    Start,
    Attempt,
    Heartbeat,
    Success,
    Failure,
}

impl WaitEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitEventKind::Start => "start",
            WaitEventKind::Attempt => "attempt",
            WaitEventKind::Heartbeat => "heartbeat",
            WaitEventKind::Success => "success",
            WaitEventKind::Failure => "failure",
        }
    }

    pub fn event_name(&self) -> String {
        format!("[DGX] wait:{}", self.as_str())
    }
}

/// One emitted wait event.
#[derive(Debug, Clone)]
pub struct WaitEvent {
    pub kind: WaitEventKind,
    pub name: String,
    pub data: Value,
}

type WaitEventCallback = Box<dyn Fn(&WaitEvent) + Send + Sync>;

/// Wait telemetry hub.
pub struct WaitTelemetry {
    logger: Arc<dyn TelemetryLogger>,
    on_event: Option<WaitEventCallback>,
    /// Attempt events are only forwarded when debug is requested.
    debug_attempts: bool,
}

impl Default for WaitTelemetry {
    fn default() -> Self {
        Self::new(Arc::new(NullLogger))
    }
}

impl WaitTelemetry {
    pub fn new(logger: Arc<dyn TelemetryLogger>) -> Self {
        Self {
            logger,
            on_event: None,
            debug_attempts: false,
        }
    }

    pub fn with_debug_attempts(mut self) -> Self {
        self.debug_attempts = true;
        self
    }

    pub fn on_event(mut self, callback: impl Fn(&WaitEvent) + Send + Sync + 'static) -> Self {
        self.on_event = Some(Box::new(callback));
        self
    }

    pub fn emit(&self, kind: WaitEventKind, data: Value) {
        if kind == WaitEventKind::Attempt && !self.debug_attempts {
            return;
        }
        let event = WaitEvent {
            kind,
            name: kind.event_name(),
            data: sanitize_json(&data),
        };
        match kind {
            WaitEventKind::Start | WaitEventKind::Attempt | WaitEventKind::Heartbeat => {
                self.logger.debug(&event.name, Some(&event.data))
            }
            WaitEventKind::Success => self.logger.info(&event.name, Some(&event.data)),
            WaitEventKind::Failure => self.logger.warn(&event.name, Some(&event.data)),
        }
        if let Some(callback) = &self.on_event {
            guard_sink("wait.on_event", || callback(&event));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[test]
    fn wire_names_are_stable() {
        assert_eq!(WaitEventKind::Start.event_name(), "[DGX] wait:start");
        assert_eq!(WaitEventKind::Heartbeat.event_name(), "[DGX] wait:heartbeat");
    }

    #[test]
    fn attempts_only_emitted_in_debug() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let quiet = WaitTelemetry::default().on_event(move |ev| sink.lock().push(ev.name.clone()));
        quiet.emit(WaitEventKind::Attempt, json!({}));
        assert!(seen.lock().is_empty());

        let sink = seen.clone();
        let verbose = WaitTelemetry::default()
            .with_debug_attempts()
            .on_event(move |ev| sink.lock().push(ev.name.clone()));
        verbose.emit(WaitEventKind::Attempt, json!({}));
        assert_eq!(seen.lock().clone(), vec!["[DGX] wait:attempt"]);
    }

    #[test]
    fn payloads_are_masked() {
        let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let telemetry =
            WaitTelemetry::default().on_event(move |ev| sink.lock().push(ev.data.clone()));
        telemetry.emit(
            WaitEventKind::Failure,
            json!({ "key": "login.submit", "sessionToken": "abc" }),
        );
        let captured = seen.lock();
        assert_eq!(captured[0]["sessionToken"], "********");
        assert_eq!(captured[0]["key"], "login.submit");
    }
}
