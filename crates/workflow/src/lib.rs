//! Workflow execution core for the DGX engine.
//!
//! Interprets a declarative workflow definition: per-step selector
//! resolution, retry with exponential backoff, per-attempt timeouts,
//! cooperative cancellation, nested control flow (`if`, `foreach`,
//! `retry`) and batched step telemetry with observer fan-out.

pub mod context;
pub mod dsl;
pub mod env;
pub mod errors;
pub mod handlers;
pub mod scheduler;
pub mod telemetry;
pub mod template;
pub mod timing;
pub mod validate;

pub use context::*;
pub use dsl::*;
pub use env::*;
pub use errors::*;
pub use handlers::{HandlerRegistry, StepExecution, StepHandler, StepResult, StepResultStatus, StepToolkit};
pub use scheduler::*;
pub use telemetry::*;
pub use template::render_template;
pub use timing::*;
pub use validate::*;
