//! Three-tier environment lookup.
//!
//! Names resolve through an explicit caller map, then the process
//! environment, then the global `DGX_ENV` table, in that order. The
//! global tier is injectable so tests never depend on ambient state.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

static GLOBAL_ENV: Lazy<RwLock<HashMap<String, String>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Install or replace a global `DGX_ENV` binding.
pub fn set_global_env(name: impl Into<String>, value: impl Into<String>) {
    GLOBAL_ENV.write().insert(name.into(), value.into());
}

/// Remove a global binding.
pub fn clear_global_env(name: &str) {
    GLOBAL_ENV.write().remove(name);
}

/// Environment resolver handed to handlers and templates.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    explicit: Option<HashMap<String, String>>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_explicit(map: HashMap<String, String>) -> Self {
        Self {
            explicit: Some(map),
        }
    }

    /// Look a name up through the three tiers.
    pub fn lookup(&self, name: &str) -> Option<String> {
        if let Some(map) = &self.explicit {
            if let Some(value) = map.get(name) {
                return Some(value.clone());
            }
        }
        if let Ok(value) = std::env::var(name) {
            return Some(value);
        }
        GLOBAL_ENV.read().get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_map_wins() {
        let mut map = HashMap::new();
        map.insert("DGX_TEST_TIER".to_string(), "explicit".to_string());
        set_global_env("DGX_TEST_TIER", "global");
        let env = Environment::with_explicit(map);
        assert_eq!(env.lookup("DGX_TEST_TIER").as_deref(), Some("explicit"));
        clear_global_env("DGX_TEST_TIER");
    }

    #[test]
    fn global_tier_is_last() {
        set_global_env("DGX_TEST_GLOBAL_ONLY", "fallback");
        let env = Environment::new();
        assert_eq!(
            env.lookup("DGX_TEST_GLOBAL_ONLY").as_deref(),
            Some("fallback")
        );
        clear_global_env("DGX_TEST_GLOBAL_ONLY");
        assert_eq!(env.lookup("DGX_TEST_GLOBAL_ONLY"), None);
    }
}
