//! Telemetry accounting across nested control flow and cancellation.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use dgx_engine::{ElementSpec, Engine, SimDom};
use dgx_workflow::{
    RunEvent, RunPhase, RunStatus, StepStatus, StepTelemetryEvent, TelemetryObserver,
    WorkflowDefinition,
};

#[derive(Default)]
struct PhaseProbe {
    phases: Mutex<Vec<(RunPhase, String)>>,
    batches: Mutex<Vec<Vec<StepTelemetryEvent>>>,
}

impl TelemetryObserver for PhaseProbe {
    fn on_run(&self, event: &RunEvent, phase: RunPhase) {
        self.phases.lock().push((phase, event.status.clone()));
    }

    fn on_steps(&self, events: &[StepTelemetryEvent]) {
        self.batches.lock().push(events.to_vec());
    }
}

fn nested_definition() -> WorkflowDefinition {
    serde_json::from_value(json!({
        "id": "nested",
        "steps": [
            { "kind": "setContext", "path": "rows",
              "value": { "source": "literal", "value": ["a", "b"] } },
            { "kind": "if",
              "condition": { "kind": "contextTruthy", "path": "rows" },
              "then": [
                  { "kind": "foreach", "list": "rows", "as": "row",
                    "steps": [
                        { "kind": "log", "message": "row ${ctx:row}" }
                    ] }
              ] },
            { "kind": "retry",
              "policy": { "retries": 1 },
              "steps": [ { "kind": "delay", "ms": 5 } ] }
        ]
    }))
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn nested_control_flow_keeps_event_accounting() {
    let dom = SimDom::new();
    let probe = Arc::new(PhaseProbe::default());
    let engine = Engine::builder(Arc::new(dom))
        .observer(probe.clone())
        .build();

    let outcome = engine.run(&nested_definition()).await.unwrap();
    assert_eq!(outcome.status, RunStatus::Success);

    let phases = probe.phases.lock().clone();
    assert_eq!(phases.first().unwrap().0, RunPhase::Started);
    assert_eq!(phases.last().unwrap(), &(RunPhase::Completed, "success".to_string()));

    let events: Vec<StepTelemetryEvent> =
        probe.batches.lock().iter().flatten().cloned().collect();
    // Batches arrive in timestamp order.
    for pair in events.windows(2) {
        assert!(pair[0].timestamp <= pair[1].timestamp);
    }
    // Every step index that appeared has one pending, >=1 attempt and
    // exactly one terminal event.
    let max_index = events.iter().map(|e| e.step_index).max().unwrap();
    // setContext, if, foreach, 2x log, retry, delay.
    assert_eq!(max_index, 6);
    for index in 0..=max_index {
        let per_step: Vec<_> = events.iter().filter(|e| e.step_index == index).collect();
        assert_eq!(
            per_step
                .iter()
                .filter(|e| e.status == StepStatus::Pending)
                .count(),
            1,
            "step {index} pending count"
        );
        assert!(per_step.iter().any(|e| e.status == StepStatus::Attempt));
        assert_eq!(
            per_step.iter().filter(|e| e.status.is_terminal()).count(),
            1,
            "step {index} terminal count"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn cancellation_mid_run_reports_cancelled_phase() {
    let dom = SimDom::new();
    let root = dom.root();
    dom.append(&root, ElementSpec::new("div").id("app"));
    let probe = Arc::new(PhaseProbe::default());
    let engine = Engine::builder(Arc::new(dom))
        .observer(probe.clone())
        .build();

    let definition: WorkflowDefinition = serde_json::from_value(json!({
        "id": "slow",
        "steps": [
            { "kind": "log", "message": "starting" },
            { "kind": "delay", "ms": 60000 },
            { "kind": "log", "message": "unreachable" }
        ]
    }))
    .unwrap();

    let cancel = CancellationToken::new();
    let mut options = engine.run_options();
    options.cancel = cancel.clone();

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        cancel.cancel();
    });

    let outcome = engine.run_with(&definition, options).await.unwrap();
    canceller.await.unwrap();

    assert_eq!(outcome.status, RunStatus::Cancelled);
    assert_eq!(outcome.completed_steps, 1);
    let phases = probe.phases.lock().clone();
    assert_eq!(phases.last().unwrap().0, RunPhase::Cancelled);

    let events: Vec<StepTelemetryEvent> =
        probe.batches.lock().iter().flatten().cloned().collect();
    // The unreachable step never emitted anything.
    assert!(!events
        .iter()
        .any(|e| e.step_index == 2 && e.status == StepStatus::Pending));
}
