//! DGX engine facade.
//!
//! Wires the selector, wait, scroll and workflow cores into one
//! ready-to-run engine over a DOM backend. Library embedders usually
//! want [`EngineBuilder`]; everything deeper is re-exported from the
//! member crates.

pub mod engine;
pub mod observability;

pub use engine::{Engine, EngineBuilder};
pub use observability::init_tracing;

pub use dgx_core_types::{DgxError, RunId, WorkflowId};
pub use dgx_dom::{DomBackend, NodeHandle};
#[cfg(feature = "sim")]
pub use dgx_dom::{ElementSpec, SimDom};
pub use dgx_selector::{
    ResolveOptions, ResolveResult, SelectorEntry, SelectorMap, SelectorResolver, SelectorTry,
    Strategy,
};
pub use dgx_telemetry::{HudNotification, HudQueue, HudSink, TelemetryLogger};
pub use dgx_wait::{WaitError, WaitPredicate, WaitRequest};
pub use dgx_workflow::{
    run_workflow, RunOptions, RunStatus, StepKind, ValidationIssue, WorkflowDefinition,
    WorkflowRunOutcome, WorkflowStep,
};

/// Feature passthrough: whether the simulated DOM backend is compiled in.
pub const fn has_sim_backend() -> bool {
    dgx_dom::has_sim_backend()
}
