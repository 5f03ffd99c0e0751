//! Workflow telemetry: batched step events with observer fan-out.
//!
//! Step events buffer and flush on a ~16 ms tick (the scheduler also
//! flushes at suspension points and before returning). Run lifecycle
//! events are synchronous. A sanitizer pass runs on every exported
//! payload; observer failures are swallowed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use dgx_telemetry::{guard_sink, sanitize_json, HudLevel, HudNotification, HudSink};

/// Step lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Attempt,
    Success,
    Failure,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Attempt => "attempt",
            StepStatus::Success => "success",
            StepStatus::Failure => "failure",
            StepStatus::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Success | StepStatus::Failure | StepStatus::Skipped
        )
    }
}

/// One step telemetry event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepTelemetryEvent {
    pub run_id: String,
    pub workflow_id: String,
    pub step_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    pub step_kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logical_key: Option<String>,
    pub status: StepStatus,
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Run lifecycle phases observers see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Started,
    Completed,
    Cancelled,
}

/// Run lifecycle event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEvent {
    pub run_id: String,
    pub workflow_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub completed_steps: usize,
    /// `success` / `failed` / `cancelled` / `running`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

/// Observer contract. Implementations must not throw; the hub guards
/// every call anyway.
pub trait TelemetryObserver: Send + Sync {
    fn on_run(&self, _event: &RunEvent, _phase: RunPhase) {}
    fn on_steps(&self, _events: &[StepTelemetryEvent]) {}
    fn on_flush(&self, _run_id: &str) {}
}

/// The workflow telemetry hub.
#[derive(Default)]
pub struct TelemetryHub {
    observers: Mutex<Vec<Arc<dyn TelemetryObserver>>>,
    buffer: Mutex<Vec<StepTelemetryEvent>>,
}

impl TelemetryHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_observer(&self, observer: Arc<dyn TelemetryObserver>) {
        self.observers.lock().push(observer);
    }

    /// Buffer a step event for the next flush.
    pub fn emit_step(&self, mut event: StepTelemetryEvent) {
        if let Some(error) = event.error.take() {
            event.error = Some(sanitize_json(&error));
        }
        self.buffer.lock().push(event);
    }

    /// Emit a run lifecycle event synchronously.
    pub fn emit_run(&self, event: &RunEvent, phase: RunPhase) {
        let mut event = event.clone();
        if let Some(error) = event.error.take() {
            event.error = Some(sanitize_json(&error));
        }
        for observer in self.observers.lock().iter() {
            let observer = observer.clone();
            guard_sink("telemetry.on_run", || observer.on_run(&event, phase));
        }
    }

    /// Drain the buffer and fan batches out in timestamp order.
    pub fn flush(&self) {
        let mut batch: Vec<StepTelemetryEvent> = {
            let mut buffer = self.buffer.lock();
            buffer.drain(..).collect()
        };
        if batch.is_empty() {
            return;
        }
        batch.sort_by_key(|e| e.timestamp);
        let run_ids: Vec<String> = {
            let mut seen = Vec::new();
            for event in &batch {
                if !seen.contains(&event.run_id) {
                    seen.push(event.run_id.clone());
                }
            }
            seen
        };
        for observer in self.observers.lock().iter() {
            let observer = observer.clone();
            guard_sink("telemetry.on_steps", || observer.on_steps(&batch));
            for run_id in &run_ids {
                let observer = observer.clone();
                guard_sink("telemetry.on_flush", || observer.on_flush(run_id));
            }
        }
    }

    /// Background flusher ticking at the frame cadence.
    pub fn spawn_flusher(self: &Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let hub = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(16));
            loop {
                tokio::select! {
                    _ = interval.tick() => hub.flush(),
                    _ = cancel.cancelled() => {
                        hub.flush();
                        break;
                    }
                }
            }
        })
    }

    pub fn pending_events(&self) -> usize {
        self.buffer.lock().len()
    }
}

/// Records step batches into an in-memory timeline keyed by run id.
#[derive(Default)]
pub struct RecorderObserver {
    timelines: Mutex<HashMap<String, Vec<StepTelemetryEvent>>>,
}

impl RecorderObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn timeline(&self, run_id: &str) -> Vec<StepTelemetryEvent> {
        self.timelines
            .lock()
            .get(run_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn run_ids(&self) -> Vec<String> {
        self.timelines.lock().keys().cloned().collect()
    }
}

impl TelemetryObserver for RecorderObserver {
    fn on_steps(&self, events: &[StepTelemetryEvent]) {
        let mut timelines = self.timelines.lock();
        for event in events {
            timelines
                .entry(event.run_id.clone())
                .or_default()
                .push(event.clone());
        }
    }
}

/// Forwards run phases and terminal step events to the HUD.
pub struct HudObserver {
    hud: Arc<dyn HudSink>,
}

impl HudObserver {
    pub fn new(hud: Arc<dyn HudSink>) -> Arc<Self> {
        Arc::new(Self { hud })
    }
}

impl TelemetryObserver for HudObserver {
    fn on_run(&self, event: &RunEvent, phase: RunPhase) {
        let (title, level) = match phase {
            RunPhase::Started => ("Run started", HudLevel::Info),
            RunPhase::Completed if event.status == "failed" => ("Run failed", HudLevel::Error),
            RunPhase::Completed => ("Run completed", HudLevel::Info),
            RunPhase::Cancelled => ("Run cancelled", HudLevel::Warn),
        };
        self.hud.push(
            HudNotification::new(
                title,
                format!("workflow '{}' ({})", event.workflow_id, event.run_id),
                level,
            )
            .with_metadata(json!({ "completedSteps": event.completed_steps })),
        );
    }

    fn on_steps(&self, events: &[StepTelemetryEvent]) {
        for event in events.iter().filter(|e| e.status.is_terminal()) {
            let level = match event.status {
                StepStatus::Failure => HudLevel::Error,
                StepStatus::Skipped => HudLevel::Warn,
                _ => HudLevel::Info,
            };
            self.hud.push(HudNotification::new(
                format!("Step {}", event.status.as_str()),
                format!("#{} {}", event.step_index, event.step_kind),
                level,
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dgx_telemetry::HudQueue;

    fn event(run: &str, index: usize, status: StepStatus) -> StepTelemetryEvent {
        StepTelemetryEvent {
            run_id: run.to_string(),
            workflow_id: "wf".to_string(),
            step_index: index,
            step_id: None,
            step_kind: "log".to_string(),
            logical_key: None,
            status,
            attempt: 1,
            timestamp: Utc::now(),
            duration_ms: None,
            error: None,
            notes: None,
        }
    }

    #[test]
    fn flush_fans_out_in_timestamp_order() {
        let hub = TelemetryHub::new();
        let recorder = RecorderObserver::new();
        hub.add_observer(recorder.clone());

        let mut first = event("r1", 0, StepStatus::Pending);
        let mut second = event("r1", 0, StepStatus::Success);
        second.timestamp = first.timestamp + chrono::Duration::milliseconds(5);
        // Buffer out of order.
        std::mem::swap(&mut first, &mut second);
        hub.emit_step(first);
        hub.emit_step(second);
        hub.flush();

        let timeline = recorder.timeline("r1");
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[0].status, StepStatus::Pending);
        assert_eq!(timeline[1].status, StepStatus::Success);
        assert_eq!(hub.pending_events(), 0);
    }

    #[test]
    fn step_errors_are_sanitized() {
        let hub = TelemetryHub::new();
        let recorder = RecorderObserver::new();
        hub.add_observer(recorder.clone());
        let mut failing = event("r2", 1, StepStatus::Failure);
        failing.error = Some(json!({ "message": "boom", "data": { "password": "hunter2" } }));
        hub.emit_step(failing);
        hub.flush();
        let timeline = recorder.timeline("r2");
        assert_eq!(timeline[0].error.as_ref().unwrap()["data"]["password"], "********");
    }

    #[test]
    fn panicking_observer_is_swallowed() {
        struct Bomb;
        impl TelemetryObserver for Bomb {
            fn on_steps(&self, _events: &[StepTelemetryEvent]) {
                panic!("observer exploded");
            }
        }
        let hub = TelemetryHub::new();
        hub.add_observer(Arc::new(Bomb));
        let recorder = RecorderObserver::new();
        hub.add_observer(recorder.clone());
        hub.emit_step(event("r3", 0, StepStatus::Pending));
        hub.flush();
        assert_eq!(recorder.timeline("r3").len(), 1);
    }

    #[test]
    fn hud_observer_notifies_per_phase_and_terminal_step() {
        let hud = HudQueue::new(16);
        let observer = HudObserver::new(hud.clone());
        let run = RunEvent {
            run_id: "r4".to_string(),
            workflow_id: "wf".to_string(),
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
            completed_steps: 0,
            status: "running".to_string(),
            error: None,
        };
        observer.on_run(&run, RunPhase::Started);
        observer.on_steps(&[
            event("r4", 0, StepStatus::Pending),
            event("r4", 0, StepStatus::Attempt),
            event("r4", 0, StepStatus::Success),
        ]);
        let notifications = hud.drain();
        assert_eq!(notifications.len(), 2);
        assert_eq!(notifications[0].title, "[DGX] Run started");
        assert_eq!(notifications[1].title, "[DGX] Step success");
    }
}
