//! The DOM backend trait every engine layer programs against

use serde::{Deserialize, Serialize};

use crate::errors::DomError;
use crate::events::DomEvent;
use crate::geometry::{ComputedStyle, Rect, ScrollState};

/// Opaque handle to a live DOM element.
///
/// Handles are weak observational references: the node they point at may
/// detach at any time, so callers re-verify [`DomBackend::is_connected`]
/// before acting on a handle they have held across a suspension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeHandle(pub u64);

impl std::fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One `<option>` of a select element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOptionInfo {
    pub index: usize,
    pub value: String,
    pub label: String,
    pub selected: bool,
}

/// Compact element description for telemetry payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub classes: Vec<String>,
}

/// Synchronous port onto the host page's DOM.
///
/// Query and read methods are pure with respect to the DOM. Mutating
/// methods are only called by step handlers and the scroll engines; the
/// resolver and the wait predicates never touch them.
pub trait DomBackend: Send + Sync {
    // ---- roots -----------------------------------------------------------

    /// The ambient document root, if a document is attached.
    fn document_root(&self) -> Option<NodeHandle>;

    /// `document.scrollingElement`, falling back to body, then the
    /// document element.
    fn scrolling_element(&self) -> Option<NodeHandle>;

    /// Current viewport rect (top/left always 0).
    fn viewport(&self) -> Rect;

    /// The document's current URL.
    fn document_url(&self) -> Option<String>;

    // ---- queries ---------------------------------------------------------

    /// CSS query under `root` (ambient document when `None`), in document
    /// order. Syntax errors surface as [`DomError::SelectorSyntax`].
    fn query_css(&self, root: Option<&NodeHandle>, selector: &str)
        -> Result<Vec<NodeHandle>, DomError>;

    /// XPath query with ordered-snapshot semantics, filtered to elements.
    fn query_xpath(
        &self,
        root: Option<&NodeHandle>,
        expression: &str,
    ) -> Result<Vec<NodeHandle>, DomError>;

    /// All elements under `root` bearing the attribute, in document order.
    fn elements_with_attribute(&self, root: Option<&NodeHandle>, attribute: &str)
        -> Vec<NodeHandle>;

    /// `getElementById` against the ambient document.
    fn element_by_id(&self, id: &str) -> Option<NodeHandle>;

    // ---- structure -------------------------------------------------------

    /// Parent in the flattened tree: `parentElement`, then the assigned
    /// slot, then the shadow host.
    fn parent(&self, node: &NodeHandle) -> Option<NodeHandle>;

    fn children(&self, node: &NodeHandle) -> Vec<NodeHandle>;

    fn contains(&self, ancestor: &NodeHandle, node: &NodeHandle) -> bool;

    fn is_connected(&self, node: &NodeHandle) -> bool;

    // ---- reads -----------------------------------------------------------

    /// Lower-cased tag name.
    fn tag_name(&self, node: &NodeHandle) -> Option<String>;

    fn attribute(&self, node: &NodeHandle, name: &str) -> Option<String>;

    /// Concatenated text content of the subtree.
    fn text_content(&self, node: &NodeHandle) -> Option<String>;

    fn inner_html(&self, node: &NodeHandle) -> Option<String>;

    /// Form control value.
    fn value(&self, node: &NodeHandle) -> Option<String>;

    /// Form labels associated with the node (`labels` on inputs).
    fn labels(&self, node: &NodeHandle) -> Vec<NodeHandle>;

    fn computed_style(&self, node: &NodeHandle) -> Option<ComputedStyle>;

    /// Bounding rect in viewport coordinates, accounting for ancestor
    /// scroll offsets.
    fn bounding_rect(&self, node: &NodeHandle) -> Option<Rect>;

    fn scroll_state(&self, node: &NodeHandle) -> Option<ScrollState>;

    fn select_options(&self, node: &NodeHandle) -> Vec<SelectOptionInfo>;

    /// Compact description for telemetry; never exposes text content.
    fn describe(&self, node: &NodeHandle) -> Option<NodeSummary>;

    // ---- mutations (handlers and scroll engines only) --------------------

    fn set_scroll_position(&self, node: &NodeHandle, left: f64, top: f64)
        -> Result<(), DomError>;

    fn dispatch(&self, node: &NodeHandle, event: DomEvent) -> Result<(), DomError>;

    fn focus(&self, node: &NodeHandle) -> Result<(), DomError>;

    fn blur(&self, node: &NodeHandle) -> Result<(), DomError>;

    fn set_value(&self, node: &NodeHandle, value: &str) -> Result<(), DomError>;

    fn set_selected(&self, node: &NodeHandle, indices: &[usize]) -> Result<(), DomError>;

    // ---- observation -----------------------------------------------------

    /// Monotonic count of mutations observed within `scope` (ambient
    /// document when `None`). The idle predicate polls this counter; a
    /// window with no increments is an idle window.
    fn mutation_count(&self, scope: Option<&NodeHandle>) -> u64;
}
