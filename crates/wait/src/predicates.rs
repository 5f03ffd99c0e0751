//! Wait predicates: text, visibility and idle.
//!
//! Predicates are pure reads over the DOM port; they never mutate and
//! never panic upward. A malformed text pattern simply fails to match.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use dgx_dom::{DomBackend, NodeHandle};
use dgx_telemetry::collapse_whitespace;

/// Text predicate configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextPredicate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Regex alternative to `text`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_pattern: Option<String>,
    #[serde(default)]
    pub exact: bool,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default = "default_true")]
    pub normalize_whitespace: bool,
}

fn default_true() -> bool {
    true
}

/// Text predicate verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct TextVerdict {
    pub matches: bool,
    pub actual: Option<String>,
    pub expected: Option<String>,
}

impl TextPredicate {
    pub fn evaluate(&self, backend: &dyn DomBackend, node: &NodeHandle) -> TextVerdict {
        let Some(raw) = backend.text_content(node) else {
            return TextVerdict {
                matches: false,
                actual: None,
                expected: self.text.clone().or_else(|| self.text_pattern.clone()),
            };
        };
        let actual = if self.normalize_whitespace {
            collapse_whitespace(&raw)
        } else {
            raw.trim().to_string()
        };

        if let Some(pattern) = &self.text_pattern {
            let matches = Regex::new(pattern)
                .map(|re| re.is_match(&actual))
                .unwrap_or(false);
            return TextVerdict {
                matches,
                actual: Some(actual),
                expected: Some(pattern.clone()),
            };
        }

        let Some(expected) = &self.text else {
            // No configured text means bare presence of any text.
            return TextVerdict {
                matches: !actual.is_empty(),
                actual: Some(actual),
                expected: None,
            };
        };
        let expected_prepared = if self.normalize_whitespace {
            collapse_whitespace(expected)
        } else {
            expected.trim().to_string()
        };
        let (lhs, rhs) = if self.case_sensitive {
            (actual.clone(), expected_prepared.clone())
        } else {
            (actual.to_lowercase(), expected_prepared.to_lowercase())
        };
        let matches = if self.exact {
            lhs == rhs
        } else {
            lhs.contains(&rhs)
        };
        TextVerdict {
            matches,
            actual: Some(actual),
            expected: Some(expected_prepared),
        }
    }
}

/// Whether the wait targets visibility or hiddenness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisibilityTarget {
    Visible,
    Hidden,
}

/// Visibility predicate configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityPredicate {
    pub target: VisibilityTarget,
    #[serde(default)]
    pub require_displayed: bool,
    #[serde(default)]
    pub require_in_viewport: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_opacity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_intersection_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_bounding_box_area: Option<f64>,
}

impl VisibilityPredicate {
    pub fn visible() -> Self {
        Self {
            target: VisibilityTarget::Visible,
            require_displayed: false,
            require_in_viewport: false,
            min_opacity: None,
            min_intersection_ratio: None,
            min_bounding_box_area: None,
        }
    }

    pub fn hidden() -> Self {
        Self {
            target: VisibilityTarget::Hidden,
            ..Self::visible()
        }
    }
}

/// Observed visibility state at one poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilitySnapshot {
    pub display: String,
    pub visibility: String,
    pub opacity: f64,
    pub bounding_box_area: f64,
    pub intersection_ratio: f64,
}

impl VisibilitySnapshot {
    pub fn to_json(&self) -> Value {
        json!({
            "computed": { "display": self.display, "visibility": self.visibility },
            "opacity": self.opacity,
            "boundingBoxArea": self.bounding_box_area,
            "intersectionRatio": self.intersection_ratio,
        })
    }
}

impl VisibilityPredicate {
    pub fn evaluate(
        &self,
        backend: &dyn DomBackend,
        node: &NodeHandle,
    ) -> (bool, VisibilitySnapshot) {
        let style = backend.computed_style(node).unwrap_or_default();
        let rect = backend.bounding_rect(node).unwrap_or_default();
        let viewport = backend.viewport();
        let snapshot = VisibilitySnapshot {
            display: style.display.clone(),
            visibility: style.visibility.clone(),
            opacity: style.opacity,
            bounding_box_area: rect.area(),
            intersection_ratio: rect.intersection_ratio(&viewport),
        };

        let mut visible = snapshot.display != "none" && snapshot.visibility != "hidden";
        if self.require_displayed {
            visible = visible && snapshot.bounding_box_area > 0.0;
        }
        if self.require_in_viewport {
            visible = visible && snapshot.intersection_ratio > 0.0;
        }
        if let Some(min) = self.min_opacity {
            visible = visible && snapshot.opacity >= min;
        } else {
            visible = visible && snapshot.opacity > 0.0;
        }
        if let Some(min) = self.min_intersection_ratio {
            visible = visible && snapshot.intersection_ratio >= min;
        }
        if let Some(min) = self.min_bounding_box_area {
            visible = visible && snapshot.bounding_box_area >= min;
        }

        let satisfied = match self.target {
            VisibilityTarget::Visible => visible,
            VisibilityTarget::Hidden => !visible,
        };
        (satisfied, snapshot)
    }
}

/// Idle (mutation-silence) gate configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdleConfig {
    /// Contiguous quiet interval required.
    pub idle_ms: u64,
    /// Hard cap on how long to wait for the scope to settle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_window_ms: Option<u64>,
    /// Heartbeat cadence for progress telemetry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_ms: Option<u64>,
    #[serde(default)]
    pub capture_statistics: bool,
}

/// Running mutation statistics for the idle gate.
#[derive(Debug, Clone, Default)]
pub struct IdleStatistics {
    pub total_mutations: u64,
    pub observed_polls: u32,
    pub longest_quiet_ms: u64,
}

/// Tracks mutation counts across polls and reports quiet time.
#[derive(Debug)]
pub struct IdleTracker {
    last_count: u64,
    quiet_since: tokio::time::Instant,
    pub statistics: IdleStatistics,
}

impl IdleTracker {
    pub fn new(initial_count: u64) -> Self {
        Self {
            last_count: initial_count,
            quiet_since: tokio::time::Instant::now(),
            statistics: IdleStatistics::default(),
        }
    }

    /// Feed the current mutation counter; returns how long the scope has
    /// been quiet.
    pub fn observe(&mut self, count: u64) -> std::time::Duration {
        let now = tokio::time::Instant::now();
        self.statistics.observed_polls += 1;
        if count != self.last_count {
            self.statistics.total_mutations += count.saturating_sub(self.last_count);
            self.last_count = count;
            self.quiet_since = now;
        }
        let quiet = now - self.quiet_since;
        self.statistics.longest_quiet_ms =
            self.statistics.longest_quiet_ms.max(quiet.as_millis() as u64);
        quiet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dgx_dom::{ElementSpec, SimDom};

    #[test]
    fn text_predicate_normalizes_and_matches_substring() {
        let dom = SimDom::new();
        let root = dom.root();
        let node = dom.append(&root, ElementSpec::new("p").text("  Order   complete! "));
        let verdict = TextPredicate {
            text: Some("order complete".into()),
            ..Default::default()
        }
        .evaluate(&dom, &node);
        assert!(verdict.matches);
        assert_eq!(verdict.actual.as_deref(), Some("Order complete!"));
    }

    #[test]
    fn text_predicate_regex() {
        let dom = SimDom::new();
        let root = dom.root();
        let node = dom.append(&root, ElementSpec::new("p").text("Order #12345 shipped"));
        let verdict = TextPredicate {
            text_pattern: Some(r"#\d{5}".into()),
            ..Default::default()
        }
        .evaluate(&dom, &node);
        assert!(verdict.matches);
        // A malformed pattern never matches.
        let broken = TextPredicate {
            text_pattern: Some("(".into()),
            ..Default::default()
        }
        .evaluate(&dom, &node);
        assert!(!broken.matches);
    }

    #[test]
    fn visibility_gates_compose() {
        let dom = SimDom::new();
        let root = dom.root();
        let node = dom.append(
            &root,
            ElementSpec::new("div").rect(10.0, 10.0, 100.0, 50.0).opacity(0.4),
        );
        let (visible, snapshot) = VisibilityPredicate::visible().evaluate(&dom, &node);
        assert!(visible);
        assert_eq!(snapshot.bounding_box_area, 5000.0);

        let strict = VisibilityPredicate {
            min_opacity: Some(0.5),
            ..VisibilityPredicate::visible()
        };
        assert!(!strict.evaluate(&dom, &node).0);

        let (hidden_check, _) = VisibilityPredicate::hidden().evaluate(&dom, &node);
        assert!(!hidden_check);
    }

    #[test]
    fn hidden_matches_display_none() {
        let dom = SimDom::new();
        let root = dom.root();
        let node = dom.append(&root, ElementSpec::new("div").display("none"));
        assert!(VisibilityPredicate::hidden().evaluate(&dom, &node).0);
        assert!(!VisibilityPredicate::visible().evaluate(&dom, &node).0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_tracker_resets_on_mutation() {
        let mut tracker = IdleTracker::new(0);
        tokio::time::advance(std::time::Duration::from_millis(100)).await;
        assert!(tracker.observe(0).as_millis() >= 100);
        // A mutation resets the quiet window.
        assert_eq!(tracker.observe(5).as_millis(), 0);
        assert_eq!(tracker.statistics.total_mutations, 5);
        tokio::time::advance(std::time::Duration::from_millis(50)).await;
        assert!(tracker.observe(5).as_millis() >= 50);
    }
}
