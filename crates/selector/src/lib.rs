//! Logical selector resolution for the DGX engine.
//!
//! Maps a logical key to a live DOM element by walking the key's ordered
//! strategy list against a scope-constrained query root:
//! - Eight location strategies with a fixed priority order
//! - Scope chaining (a key may be resolved inside another key's element)
//! - Cycle detection over scope chains
//! - Structured per-attempt telemetry with HUD forwarding on miss

pub mod map;
pub mod resolver;
pub mod strategies;
pub mod telemetry;
pub mod types;

pub use map::*;
pub use resolver::*;
pub use strategies::execute_strategy;
pub use telemetry::*;
pub use types::*;
