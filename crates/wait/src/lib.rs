//! Wait subsystem: polling predicates with stale-node recovery.
//!
//! The scheduler drives a poll loop combining the selector resolver, a
//! configured predicate (presence, text, visibility, idle) and optional
//! scroller assistance, surfacing structured errors on deadline breach.

pub mod errors;
pub mod predicates;
pub mod scheduler;
pub mod telemetry;

pub use errors::*;
pub use predicates::*;
pub use scheduler::*;
pub use telemetry::*;
