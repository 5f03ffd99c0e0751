//! Core types for the selector system

use serde::{Deserialize, Serialize};

use dgx_dom::NodeHandle;

/// One location strategy with its per-variant payload.
///
/// Priority order is fixed: `role < name < label < text < dataAttr <
/// testId < css < xpath`. Merging entries sorts by this order and
/// deduplicates by the canonical JSON of the non-metadata fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Strategy {
    Role {
        role: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    Name {
        name: String,
    },
    Label {
        label: String,
        #[serde(default)]
        case_sensitive: bool,
    },
    Text {
        text: String,
        #[serde(default)]
        exact: bool,
        #[serde(default)]
        case_sensitive: bool,
        #[serde(default = "default_true")]
        normalize_whitespace: bool,
    },
    DataAttr {
        attribute: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    TestId {
        test_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attribute: Option<String>,
    },
    Css {
        selector: String,
    },
    Xpath {
        expression: String,
    },
}

fn default_true() -> bool {
    true
}

impl Strategy {
    /// Strategy kind as it appears on the wire and in telemetry.
    pub fn kind(&self) -> &'static str {
        match self {
            Strategy::Role { .. } => "role",
            Strategy::Name { .. } => "name",
            Strategy::Label { .. } => "label",
            Strategy::Text { .. } => "text",
            Strategy::DataAttr { .. } => "dataAttr",
            Strategy::TestId { .. } => "testId",
            Strategy::Css { .. } => "css",
            Strategy::Xpath { .. } => "xpath",
        }
    }

    /// Position in the fixed priority order.
    pub fn priority(&self) -> u8 {
        match self {
            Strategy::Role { .. } => 0,
            Strategy::Name { .. } => 1,
            Strategy::Label { .. } => 2,
            Strategy::Text { .. } => 3,
            Strategy::DataAttr { .. } => 4,
            Strategy::TestId { .. } => 5,
            Strategy::Css { .. } => 6,
            Strategy::Xpath { .. } => 7,
        }
    }

    /// Structural identity of the non-metadata fields, used for
    /// merge-time deduplication.
    pub fn canonical_identity(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Metadata carried by tries and entries alike.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stability_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_at: Option<String>,
}

/// One strategy plus its metadata, as stored in a selector entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorTry {
    #[serde(flatten)]
    pub strategy: Strategy,
    #[serde(flatten)]
    pub metadata: SelectorMetadata,
}

impl SelectorTry {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            metadata: SelectorMetadata::default(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.metadata.tags = tags;
        self
    }

    pub fn with_stability(mut self, score: f64) -> Self {
        self.metadata.stability_score = Some(score);
        self
    }
}

/// Ordered strategies for one logical key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorEntry {
    #[serde(default)]
    pub tries: Vec<SelectorTry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_key: Option<String>,
    #[serde(flatten)]
    pub metadata: SelectorMetadata,
}

impl SelectorEntry {
    pub fn new(tries: Vec<SelectorTry>) -> Self {
        Self {
            tries,
            scope_key: None,
            metadata: SelectorMetadata::default(),
        }
    }

    pub fn with_scope(mut self, scope_key: impl Into<String>) -> Self {
        self.scope_key = Some(scope_key.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.metadata.tags = tags;
        self
    }
}

/// One recorded resolution attempt.
#[derive(Debug, Clone)]
pub struct ResolveAttempt {
    /// 1-based position in the entry's try order.
    pub index: usize,
    pub strategy: SelectorTry,
    pub success: bool,
    pub elements: Vec<NodeHandle>,
}

impl ResolveAttempt {
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }
}

/// The scope an entry was resolved under.
#[derive(Debug, Clone)]
pub struct ResolvedScope {
    /// The scope's logical key, absent for caller-supplied roots.
    pub key: Option<String>,
    pub root: NodeHandle,
}

/// Outcome of resolving one logical key.
///
/// `element` is non-null iff at least one attempt succeeded, and
/// `resolved_by` is the strategy of the first successful attempt.
#[derive(Debug, Clone, Default)]
pub struct ResolveResult {
    pub key: String,
    pub element: Option<NodeHandle>,
    pub attempts: Vec<ResolveAttempt>,
    pub resolved_by: Option<SelectorTry>,
    pub scope: Option<ResolvedScope>,
    pub entry: Option<SelectorEntry>,
}

impl ResolveResult {
    pub fn miss(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn is_hit(&self) -> bool {
        self.element.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strategy_priority_order_is_fixed() {
        let ordered = [
            Strategy::Role {
                role: "button".into(),
                name: None,
                label: None,
                text: None,
            },
            Strategy::Name { name: "q".into() },
            Strategy::Label {
                label: "Query".into(),
                case_sensitive: false,
            },
            Strategy::Text {
                text: "Go".into(),
                exact: false,
                case_sensitive: false,
                normalize_whitespace: true,
            },
            Strategy::DataAttr {
                attribute: "data-x".into(),
                value: None,
            },
            Strategy::TestId {
                test_id: "go".into(),
                attribute: None,
            },
            Strategy::Css {
                selector: ".go".into(),
            },
            Strategy::Xpath {
                expression: "//button".into(),
            },
        ];
        for (i, strategy) in ordered.iter().enumerate() {
            assert_eq!(strategy.priority() as usize, i);
        }
    }

    #[test]
    fn tries_round_trip_through_json() {
        let input = json!({
            "kind": "testId",
            "testId": "submit",
            "tags": ["checkout"],
            "stabilityScore": 0.9
        });
        let parsed: SelectorTry = serde_json::from_value(input).unwrap();
        assert_eq!(parsed.strategy.kind(), "testId");
        assert_eq!(parsed.metadata.tags, vec!["checkout".to_string()]);
        let back = serde_json::to_value(&parsed).unwrap();
        assert_eq!(back["kind"], "testId");
        assert_eq!(back["testId"], "submit");
    }

    #[test]
    fn canonical_identity_ignores_metadata() {
        let a = SelectorTry::new(Strategy::Css {
            selector: ".primary".into(),
        })
        .with_tags(vec!["x".into()]);
        let b = SelectorTry::new(Strategy::Css {
            selector: ".primary".into(),
        });
        assert_eq!(
            a.strategy.canonical_identity(),
            b.strategy.canonical_identity()
        );
    }

    #[test]
    fn text_defaults_normalize_whitespace() {
        let parsed: SelectorTry =
            serde_json::from_value(json!({ "kind": "text", "text": "Hi" })).unwrap();
        match parsed.strategy {
            Strategy::Text {
                normalize_whitespace,
                exact,
                ..
            } => {
                assert!(normalize_whitespace);
                assert!(!exact);
            }
            _ => panic!("wrong variant"),
        }
    }
}
