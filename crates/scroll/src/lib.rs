//! Scroll engines for the DGX workflow core.
//!
//! Three cooperating pieces:
//! - container detection: a strategy cascade locating the scrollable
//!   ancestor (or hinted container) of a target
//! - into-view alignment: a frame-scheduled retry loop that places a
//!   target inside its container subject to alignment and margins
//! - scroll-until: a predicate-driven stepped scroll with deadlines,
//!   delta accounting and no-change detection

pub mod container;
pub mod frame;
pub mod into_view;
pub mod telemetry;
pub mod until;

pub use container::*;
pub use frame::*;
pub use into_view::*;
pub use telemetry::*;
pub use until::*;
