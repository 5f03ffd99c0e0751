//! Structured wait errors.

use thiserror::Error;

/// Typed failure surfaced when a wait deadline is breached or the wait
/// is cancelled. Each carries elapsed time, poll count and a hint.
#[derive(Debug, Error, Clone)]
pub enum WaitError {
    /// The key never resolved before the deadline.
    #[error("wait for '{key}' timed out after {elapsed_ms}ms without resolving")]
    ResolverMiss {
        key: String,
        elapsed_ms: u64,
        attempts: u32,
        hint: String,
    },

    /// The key resolved but the visibility predicate never held.
    #[error("'{key}' resolved but the visibility predicate never held ({elapsed_ms}ms)")]
    VisibilityMismatch {
        key: String,
        elapsed_ms: u64,
        attempts: u32,
        hint: String,
    },

    /// The idle gate never settled inside its window.
    #[error("idle window not reached for '{key}' within {elapsed_ms}ms")]
    IdleWindowExceeded {
        key: String,
        elapsed_ms: u64,
        attempts: u32,
        hint: String,
    },

    /// Generic deadline breach.
    #[error("wait for '{key}' timed out after {elapsed_ms}ms")]
    Timeout {
        key: String,
        elapsed_ms: u64,
        attempts: u32,
        hint: String,
    },

    /// The wait observed its cancellation signal.
    #[error("wait for '{key}' cancelled after {elapsed_ms}ms")]
    Cancelled {
        key: String,
        elapsed_ms: u64,
        attempts: u32,
    },
}

impl WaitError {
    /// Stable error code used at the step boundary.
    pub fn code(&self) -> &'static str {
        match self {
            WaitError::ResolverMiss { .. } => "resolver-miss",
            WaitError::VisibilityMismatch { .. } => "visibility-mismatch",
            WaitError::IdleWindowExceeded { .. } => "idle-window-exceeded",
            WaitError::Timeout { .. } => "timeout",
            WaitError::Cancelled { .. } => "cancelled",
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        match self {
            WaitError::ResolverMiss { elapsed_ms, .. }
            | WaitError::VisibilityMismatch { elapsed_ms, .. }
            | WaitError::IdleWindowExceeded { elapsed_ms, .. }
            | WaitError::Timeout { elapsed_ms, .. }
            | WaitError::Cancelled { elapsed_ms, .. } => *elapsed_ms,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            WaitError::ResolverMiss { attempts, .. }
            | WaitError::VisibilityMismatch { attempts, .. }
            | WaitError::IdleWindowExceeded { attempts, .. }
            | WaitError::Timeout { attempts, .. }
            | WaitError::Cancelled { attempts, .. } => *attempts,
        }
    }
}
