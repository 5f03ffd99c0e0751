//! Cross-cutting observability plumbing for the DGX engine.
//!
//! Everything that leaves the core (log lines, HUD notifications,
//! telemetry event payloads) passes through the sanitizer here. Sinks
//! are isolated: a panicking observer or HUD implementation never
//! influences engine control flow.

pub mod guard;
pub mod hud;
pub mod logger;
pub mod sanitize;

pub use guard::guard_sink;
pub use hud::*;
pub use logger::*;
pub use sanitize::*;
