//! Effective timing resolution and backoff.
//!
//! Precedence: step-declared > definition defaults > runtime overrides >
//! global defaults. Jitter is capped at a fifth of the base backoff.

use std::time::Duration;

use rand::Rng;

use crate::dsl::{StepCommon, WorkflowDefaults};

/// Global timing defaults.
pub const DEFAULT_TIMEOUT_MS: u64 = 8000;
pub const DEFAULT_INTERVAL_MS: u64 = 150;
pub const DEFAULT_RETRIES: u32 = 0;
pub const DEFAULT_BACKOFF_MS: u64 = 250;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 2000;

/// Fully resolved timing for one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveTiming {
    pub timeout_ms: u64,
    pub interval_ms: u64,
    pub retries: u32,
    pub backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub jitter_ms: u64,
}

impl Default for EffectiveTiming {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            interval_ms: DEFAULT_INTERVAL_MS,
            retries: DEFAULT_RETRIES,
            backoff_ms: DEFAULT_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            jitter_ms: 0,
        }
    }
}

/// Resolve the timing for one step.
pub fn effective_timing(
    step: &StepCommon,
    defaults: &WorkflowDefaults,
    overrides: &WorkflowDefaults,
) -> EffectiveTiming {
    let pick_u64 = |step_value: Option<u64>, default: Option<u64>, over: Option<u64>, global: u64| {
        step_value.or(default).or(over).unwrap_or(global)
    };
    let backoff_ms = pick_u64(
        step.backoff_ms,
        defaults.backoff_ms,
        overrides.backoff_ms,
        DEFAULT_BACKOFF_MS,
    );
    let jitter_cap = backoff_ms / 5;
    EffectiveTiming {
        timeout_ms: pick_u64(
            step.timeout_ms,
            defaults.timeout_ms,
            overrides.timeout_ms,
            DEFAULT_TIMEOUT_MS,
        ),
        interval_ms: pick_u64(
            step.interval_ms,
            defaults.interval_ms,
            overrides.interval_ms,
            DEFAULT_INTERVAL_MS,
        ),
        retries: step
            .retries
            .or(defaults.retries)
            .or(overrides.retries)
            .unwrap_or(DEFAULT_RETRIES),
        backoff_ms,
        max_backoff_ms: pick_u64(
            step.max_backoff_ms,
            defaults.max_backoff_ms,
            overrides.max_backoff_ms,
            DEFAULT_MAX_BACKOFF_MS,
        ),
        jitter_ms: pick_u64(step.jitter_ms, defaults.jitter_ms, overrides.jitter_ms, 0)
            .min(jitter_cap),
    }
}

/// Backoff before the given attempt (2-based):
/// `min(maxBackoff, backoff * 2^(attempt-1)) ± jitter`, floored at zero.
pub fn backoff_delay(timing: &EffectiveTiming, next_attempt: u32) -> Duration {
    let exponent = next_attempt.saturating_sub(1).min(32);
    let base = timing
        .backoff_ms
        .saturating_mul(1u64 << exponent)
        .min(timing.max_backoff_ms);
    if timing.jitter_ms == 0 {
        return Duration::from_millis(base);
    }
    let jitter = rand::thread_rng().gen_range(-(timing.jitter_ms as i64)..=timing.jitter_ms as i64);
    Duration::from_millis(base.saturating_add_signed(jitter))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_is_step_then_defaults_then_overrides() {
        let step = StepCommon {
            timeout_ms: Some(1000),
            ..Default::default()
        };
        let defaults = WorkflowDefaults {
            timeout_ms: Some(2000),
            retries: Some(3),
            ..Default::default()
        };
        let overrides = WorkflowDefaults {
            timeout_ms: Some(4000),
            interval_ms: Some(50),
            ..Default::default()
        };
        let timing = effective_timing(&step, &defaults, &overrides);
        assert_eq!(timing.timeout_ms, 1000);
        assert_eq!(timing.retries, 3);
        assert_eq!(timing.interval_ms, 50);
        assert_eq!(timing.backoff_ms, DEFAULT_BACKOFF_MS);
    }

    #[test]
    fn jitter_is_capped_at_a_fifth_of_backoff() {
        let step = StepCommon {
            backoff_ms: Some(500),
            jitter_ms: Some(10_000),
            ..Default::default()
        };
        let timing = effective_timing(&step, &WorkflowDefaults::default(), &WorkflowDefaults::default());
        assert_eq!(timing.jitter_ms, 100);
    }

    #[test]
    fn backoff_sequence_doubles_and_caps() {
        let timing = EffectiveTiming {
            backoff_ms: 250,
            max_backoff_ms: 2000,
            jitter_ms: 0,
            ..Default::default()
        };
        assert_eq!(backoff_delay(&timing, 2).as_millis(), 500);
        assert_eq!(backoff_delay(&timing, 3).as_millis(), 1000);
        assert_eq!(backoff_delay(&timing, 4).as_millis(), 2000);
        assert_eq!(backoff_delay(&timing, 8).as_millis(), 2000);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let timing = EffectiveTiming {
            backoff_ms: 1000,
            max_backoff_ms: 2000,
            jitter_ms: 200,
            ..Default::default()
        };
        for _ in 0..50 {
            let delay = backoff_delay(&timing, 2).as_millis() as i64;
            assert!((1800..=2200).contains(&delay));
        }
    }
}
