//! The workflow definition DSL.
//!
//! JSON-serializable, tag-discriminated. Step kinds carry their payload
//! beside shared metadata (ids, tags, timing knobs, `continueOnError`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use dgx_scroll::{Alignment, Margin, UntilCondition};

/// Run-wide timing defaults; any field may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_backoff_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter_ms: Option<u64>,
}

/// A workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub defaults: WorkflowDefaults,
    pub steps: Vec<WorkflowStep>,
}

/// Shared step metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepCommon {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_backoff_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter_ms: Option<u64>,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub continue_on_error: bool,
}

/// Where a value comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ValueSource {
    Literal { value: Value },
    Context { path: String },
    Env { name: String },
    /// `${ctx:path}` / `${env:NAME}` interpolation.
    Template { template: String },
    /// Text content of a resolved logical key.
    Key { key: String },
}

/// What a capture step extracts from its element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CaptureSource {
    Text,
    Attr { name: String },
    Html,
    Value,
    /// First match (or group) of a pattern applied to the text content.
    Regex {
        pattern: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        group: Option<usize>,
    },
}

/// How a select step picks options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectBy {
    Value,
    Label,
    Index,
}

/// Dedupe key for `collectList`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupeBy {
    Text,
    Attr,
    Identity,
}

/// Serialization shape for `collectList` items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectShape {
    Text,
    Html,
    Attrs,
    Object,
}

/// Assertions a step can make.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Assertion {
    ContextEquals { path: String, value: Value },
    ContextExists { path: String },
    ElementExists { key: String },
    ElementText {
        key: String,
        text: String,
        #[serde(default)]
        exact: bool,
    },
    UrlContains { fragment: String },
}

/// Branch conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Condition {
    ContextEquals { path: String, value: Value },
    ContextTruthy { path: String },
    ElementExists { key: String },
    ElementText {
        key: String,
        text: String,
        #[serde(default)]
        exact: bool,
    },
    UrlContains { fragment: String },
    /// Arbitrary expression, routed to the embedding's evaluator.
    Expression { expression: String },
    AllOf { conditions: Vec<Condition> },
    AnyOf { conditions: Vec<Condition> },
    Not { condition: Box<Condition> },
}

/// Retry-block policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    #[serde(default)]
    pub retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_backoff_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter_ms: Option<u64>,
}

/// Per-kind step payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum StepKind {
    Click {
        key: String,
        #[serde(default)]
        double: bool,
    },
    Hover {
        key: String,
    },
    Focus {
        key: String,
    },
    Blur {
        key: String,
    },
    Type {
        key: String,
        value: ValueSource,
        #[serde(default)]
        clear_first: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delay_ms: Option<u64>,
        #[serde(default)]
        mask: bool,
    },
    Select {
        key: String,
        by: SelectBy,
        values: Vec<String>,
        #[serde(default)]
        multiple: bool,
    },
    WaitFor {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        presence_threshold: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scroller_key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stale_retry_cap: Option<u32>,
    },
    WaitText {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text_pattern: Option<String>,
        #[serde(default)]
        exact: bool,
        #[serde(default)]
        case_sensitive: bool,
        #[serde(default = "default_true")]
        normalize_whitespace: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        presence_threshold: Option<u32>,
    },
    WaitVisible {
        key: String,
        #[serde(default)]
        require_displayed: bool,
        #[serde(default)]
        require_in_viewport: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_opacity: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_intersection_ratio: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_bounding_box_area: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        presence_threshold: Option<u32>,
    },
    WaitHidden {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        presence_threshold: Option<u32>,
    },
    WaitForIdle {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        idle_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_window_ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        heartbeat_ms: Option<u64>,
        #[serde(default)]
        capture_statistics: bool,
    },
    Delay {
        ms: u64,
    },
    Log {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        level: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    SetContext {
        path: String,
        value: ValueSource,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ttl_ms: Option<u64>,
        #[serde(default)]
        mask: bool,
    },
    Capture {
        key: String,
        from: CaptureSource,
        to: String,
        #[serde(default)]
        mask: bool,
    },
    Assert {
        assertion: Assertion,
    },
    CollectList {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        item_key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        item_css: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dedupe: Option<DedupeBy>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dedupe_attr: Option<String>,
        to: String,
        #[serde(default = "default_collect_shape")]
        shape: CollectShape,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        attrs: Vec<String>,
    },
    ScrollIntoView {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alignment: Option<Alignment>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        margin: Option<Margin>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_retries: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        container_key: Option<String>,
    },
    ScrollUntil {
        until: UntilCondition,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        container_key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        anchor_key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step_px: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_attempts: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delay_ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_delta_px: Option<f64>,
    },
    If {
        condition: Condition,
        then: Vec<WorkflowStep>,
        #[serde(default, rename = "else", skip_serializing_if = "Vec::is_empty")]
        otherwise: Vec<WorkflowStep>,
    },
    Foreach {
        list: String,
        #[serde(rename = "as")]
        binding: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index_var: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        concurrency: Option<u32>,
        steps: Vec<WorkflowStep>,
    },
    Retry {
        policy: RetryPolicy,
        steps: Vec<WorkflowStep>,
    },
    /// Reserved: nested workflow invocation.
    Run {
        workflow_id: String,
    },
}

fn default_collect_shape() -> CollectShape {
    CollectShape::Text
}

fn default_true() -> bool {
    true
}

impl StepKind {
    /// Wire name of the step kind.
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::Click { .. } => "click",
            StepKind::Hover { .. } => "hover",
            StepKind::Focus { .. } => "focus",
            StepKind::Blur { .. } => "blur",
            StepKind::Type { .. } => "type",
            StepKind::Select { .. } => "select",
            StepKind::WaitFor { .. } => "waitFor",
            StepKind::WaitText { .. } => "waitText",
            StepKind::WaitVisible { .. } => "waitVisible",
            StepKind::WaitHidden { .. } => "waitHidden",
            StepKind::WaitForIdle { .. } => "waitForIdle",
            StepKind::Delay { .. } => "delay",
            StepKind::Log { .. } => "log",
            StepKind::SetContext { .. } => "setContext",
            StepKind::Capture { .. } => "capture",
            StepKind::Assert { .. } => "assert",
            StepKind::CollectList { .. } => "collectList",
            StepKind::ScrollIntoView { .. } => "scrollIntoView",
            StepKind::ScrollUntil { .. } => "scrollUntil",
            StepKind::If { .. } => "if",
            StepKind::Foreach { .. } => "foreach",
            StepKind::Retry { .. } => "retry",
            StepKind::Run { .. } => "run",
        }
    }

    /// The logical key the scheduler pre-resolves for this step, if any.
    pub fn primary_key(&self) -> Option<&str> {
        match self {
            StepKind::Click { key, .. }
            | StepKind::Hover { key }
            | StepKind::Focus { key }
            | StepKind::Blur { key }
            | StepKind::Type { key, .. }
            | StepKind::Select { key, .. }
            | StepKind::WaitFor { key, .. }
            | StepKind::WaitText { key, .. }
            | StepKind::WaitVisible { key, .. }
            | StepKind::WaitHidden { key, .. }
            | StepKind::Capture { key, .. }
            | StepKind::CollectList { key, .. }
            | StepKind::ScrollIntoView { key, .. } => Some(key),
            StepKind::WaitForIdle { key, .. } => key.as_deref(),
            _ => None,
        }
    }

    /// Whether the scheduler executes this kind itself (control flow).
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            StepKind::If { .. } | StepKind::Foreach { .. } | StepKind::Retry { .. }
        )
    }
}

/// One workflow step: shared metadata plus the kind payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    #[serde(flatten)]
    pub common: StepCommon,
    #[serde(flatten)]
    pub kind: StepKind,
}

impl WorkflowStep {
    pub fn new(kind: StepKind) -> Self {
        Self {
            common: StepCommon::default(),
            kind,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.common.id = Some(id.into());
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.common.retries = Some(retries);
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.common.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn continue_on_error(mut self) -> Self {
        self.common.continue_on_error = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn definition_round_trips_through_json() {
        let raw = json!({
            "id": "checkout",
            "defaults": { "timeoutMs": 5000, "retries": 1 },
            "steps": [
                { "kind": "click", "key": "cart.open", "id": "open-cart" },
                { "kind": "type", "key": "search.input",
                  "value": { "source": "template", "template": "${ctx:query}" },
                  "clearFirst": true },
                { "kind": "if",
                  "condition": { "kind": "elementExists", "key": "cookie.banner" },
                  "then": [ { "kind": "click", "key": "cookie.accept" } ] },
                { "kind": "foreach", "list": "items", "as": "item",
                  "steps": [ { "kind": "log", "message": "item" } ] }
            ]
        });
        let definition: WorkflowDefinition = serde_json::from_value(raw).unwrap();
        assert_eq!(definition.id, "checkout");
        assert_eq!(definition.defaults.timeout_ms, Some(5000));
        assert_eq!(definition.steps.len(), 4);
        assert_eq!(definition.steps[0].kind.name(), "click");
        assert_eq!(definition.steps[0].common.id.as_deref(), Some("open-cart"));
        assert_eq!(definition.steps[0].kind.primary_key(), Some("cart.open"));
        assert!(definition.steps[2].kind.is_control());

        let back = serde_json::to_value(&definition).unwrap();
        assert_eq!(back["steps"][0]["kind"], "click");
        assert_eq!(back["steps"][1]["clearFirst"], true);
        assert_eq!(back["steps"][3]["as"], "item");
    }

    #[test]
    fn wait_text_defaults_normalize_whitespace() {
        let raw = json!({
            "kind": "waitText",
            "key": "status",
            "text": "Done",
            "exact": true
        });
        let step: WorkflowStep = serde_json::from_value(raw).unwrap();
        match &step.kind {
            StepKind::WaitText {
                text,
                exact,
                normalize_whitespace,
                ..
            } => {
                assert_eq!(text.as_deref(), Some("Done"));
                assert!(exact);
                assert!(normalize_whitespace);
            }
            _ => panic!("wrong kind"),
        }
    }

    #[test]
    fn else_branch_uses_the_else_field_name() {
        let raw = json!({
            "kind": "if",
            "condition": { "kind": "contextTruthy", "path": "flag" },
            "then": [],
            "else": [ { "kind": "log", "message": "fallback" } ]
        });
        let step: WorkflowStep = serde_json::from_value(raw).unwrap();
        match &step.kind {
            StepKind::If { otherwise, .. } => assert_eq!(otherwise.len(), 1),
            _ => panic!("wrong kind"),
        }
    }
}
