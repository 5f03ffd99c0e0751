//! In-memory simulated DOM backend.
//!
//! `SimDom` models the parts of a page the engine observes: tree
//! structure, attributes, text, computed style, layout rects, scroll
//! containers, form values and a dispatched-event log. Layout rects are
//! stored in document coordinates; `bounding_rect` subtracts accumulated
//! ancestor scroll offsets, so scrolling a container moves the viewport
//! rects of everything inside it the way a real page does.

mod css;
mod xpath;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::backend::{DomBackend, NodeHandle, NodeSummary, SelectOptionInfo};
use crate::errors::DomError;
use crate::events::{DomEvent, DomEventKind};
use crate::geometry::{ComputedStyle, Rect, ScrollState};

#[derive(Debug, Clone)]
struct ScrollData {
    top: f64,
    left: f64,
    content_width: f64,
    content_height: f64,
}

#[derive(Debug, Clone)]
struct NodeData {
    tag: String,
    parent: Option<u64>,
    children: Vec<u64>,
    attributes: BTreeMap<String, String>,
    own_text: Option<String>,
    value: Option<String>,
    style: ComputedStyle,
    rect: Rect,
    scroll: Option<ScrollData>,
    connected: bool,
    mutations: u64,
    /// Shadow root attached to this host, if any.
    shadow_root: Option<u64>,
    /// Host element, set on shadow-root nodes only.
    shadow_host: Option<u64>,
}

impl NodeData {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            parent: None,
            children: Vec::new(),
            attributes: BTreeMap::new(),
            own_text: None,
            value: None,
            style: ComputedStyle::default(),
            rect: Rect::default(),
            scroll: None,
            connected: true,
            mutations: 0,
            shadow_root: None,
            shadow_host: None,
        }
    }

    fn classes(&self) -> Vec<String> {
        self.attributes
            .get("class")
            .map(|c| c.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

struct SimState {
    nodes: HashMap<u64, NodeData>,
    root: u64,
    next_id: u64,
    viewport: Rect,
    url: String,
    focused: Option<u64>,
    event_log: Vec<(u64, DomEvent)>,
}

impl SimState {
    fn node(&self, id: u64) -> Option<&NodeData> {
        self.nodes.get(&id)
    }

    /// Depth-first document order starting at `root`.
    fn document_order(&self, root: u64) -> Vec<u64> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get(&id) {
                out.push(id);
                for child in node.children.iter().rev() {
                    stack.push(*child);
                }
            }
        }
        out
    }

    fn descendants(&self, root: u64) -> Vec<u64> {
        let order = self.document_order(root);
        order.into_iter().skip(1).collect()
    }

    /// Flattened-tree parent: the DOM parent, else the shadow host for
    /// shadow-root nodes.
    fn flat_parent(&self, id: u64) -> Option<u64> {
        let node = self.nodes.get(&id)?;
        node.parent.or(node.shadow_host)
    }

    fn ancestors(&self, id: u64) -> Vec<u64> {
        let mut out = Vec::new();
        let mut cursor = self.flat_parent(id);
        while let Some(parent) = cursor {
            out.push(parent);
            cursor = self.flat_parent(parent);
        }
        out
    }

    fn text_of(&self, id: u64) -> String {
        let mut out = String::new();
        for node_id in self.document_order(id) {
            if let Some(text) = self.nodes.get(&node_id).and_then(|n| n.own_text.as_deref()) {
                out.push_str(text);
            }
        }
        out
    }

    fn bump(&mut self, id: u64) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.mutations += 1;
        }
        for ancestor in self.ancestors(id) {
            if let Some(node) = self.nodes.get_mut(&ancestor) {
                node.mutations += 1;
            }
        }
    }

    /// Viewport rect: layout rect minus every scrolled ancestor's offset.
    fn viewport_rect(&self, id: u64) -> Option<Rect> {
        let node = self.node(id)?;
        let mut rect = node.rect;
        for ancestor in self.ancestors(id) {
            if let Some(scroll) = self.nodes.get(&ancestor).and_then(|n| n.scroll.as_ref()) {
                rect.top -= scroll.top;
                rect.left -= scroll.left;
            }
        }
        Some(rect)
    }
}

/// Simulated DOM backend with a test-facing construction API.
#[derive(Clone)]
pub struct SimDom {
    state: Arc<RwLock<SimState>>,
}

impl Default for SimDom {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDom {
    /// A document with a 1280x720 viewport and an `html` root.
    pub fn new() -> Self {
        Self::with_viewport(1280.0, 720.0)
    }

    pub fn with_viewport(width: f64, height: f64) -> Self {
        let viewport = Rect::new(0.0, 0.0, width, height);
        let mut root = NodeData::new("html");
        root.rect = viewport;
        root.scroll = Some(ScrollData {
            top: 0.0,
            left: 0.0,
            content_width: width,
            content_height: height,
        });
        let mut nodes = HashMap::new();
        nodes.insert(1, root);
        Self {
            state: Arc::new(RwLock::new(SimState {
                nodes,
                root: 1,
                next_id: 2,
                viewport,
                url: "about:blank".to_string(),
                focused: None,
                event_log: Vec::new(),
            })),
        }
    }

    pub fn root(&self) -> NodeHandle {
        NodeHandle(self.state.read().root)
    }

    pub fn set_url(&self, url: impl Into<String>) {
        self.state.write().url = url.into();
    }

    /// Grow the document's scrollable content beyond the viewport.
    pub fn set_document_scroll(&self, content_width: f64, content_height: f64) {
        let mut state = self.state.write();
        let root = state.root;
        if let Some(node) = state.nodes.get_mut(&root) {
            if let Some(scroll) = node.scroll.as_mut() {
                scroll.content_width = content_width;
                scroll.content_height = content_height;
            }
        }
    }

    /// Attach a shadow root to `host`. Shadow content is invisible to
    /// document-rooted queries but queryable with the returned handle as
    /// root; the flattened parent chain runs through the host.
    pub fn attach_shadow(&self, host: &NodeHandle) -> NodeHandle {
        let mut state = self.state.write();
        let id = state.next_id;
        state.next_id += 1;
        let mut shadow = NodeData::new("#shadow-root");
        shadow.shadow_host = Some(host.0);
        shadow.connected = state
            .nodes
            .get(&host.0)
            .map(|h| h.connected)
            .unwrap_or(false);
        shadow.rect = state
            .nodes
            .get(&host.0)
            .map(|h| h.rect)
            .unwrap_or_default();
        state.nodes.insert(id, shadow);
        if let Some(host_node) = state.nodes.get_mut(&host.0) {
            host_node.shadow_root = Some(id);
        }
        state.bump(host.0);
        NodeHandle(id)
    }

    /// Attach a new element under `parent`.
    pub fn append(&self, parent: &NodeHandle, spec: ElementSpec) -> NodeHandle {
        let mut state = self.state.write();
        let id = state.next_id;
        state.next_id += 1;

        let mut node = NodeData::new(&spec.tag);
        node.parent = Some(parent.0);
        node.attributes = spec.attrs;
        node.own_text = spec.text;
        node.value = spec.value;
        node.style = spec.style;
        node.rect = spec.rect;
        node.scroll = spec
            .scroll
            .map(|(content_width, content_height)| ScrollData {
                top: 0.0,
                left: 0.0,
                content_width,
                content_height,
            });
        node.connected = state
            .nodes
            .get(&parent.0)
            .map(|p| p.connected)
            .unwrap_or(false);

        state.nodes.insert(id, node);
        if let Some(parent_node) = state.nodes.get_mut(&parent.0) {
            parent_node.children.push(id);
        }
        state.bump(parent.0);
        NodeHandle(id)
    }

    pub fn set_text(&self, node: &NodeHandle, text: impl Into<String>) {
        let mut state = self.state.write();
        if let Some(data) = state.nodes.get_mut(&node.0) {
            data.own_text = Some(text.into());
        }
        state.bump(node.0);
    }

    pub fn set_attribute(&self, node: &NodeHandle, name: &str, value: impl Into<String>) {
        let mut state = self.state.write();
        if let Some(data) = state.nodes.get_mut(&node.0) {
            data.attributes.insert(name.to_string(), value.into());
        }
        state.bump(node.0);
    }

    pub fn remove_attribute(&self, node: &NodeHandle, name: &str) {
        let mut state = self.state.write();
        if let Some(data) = state.nodes.get_mut(&node.0) {
            data.attributes.remove(name);
        }
        state.bump(node.0);
    }

    pub fn set_style(&self, node: &NodeHandle, style: ComputedStyle) {
        let mut state = self.state.write();
        if let Some(data) = state.nodes.get_mut(&node.0) {
            data.style = style;
        }
        state.bump(node.0);
    }

    pub fn set_rect(&self, node: &NodeHandle, rect: Rect) {
        let mut state = self.state.write();
        if let Some(data) = state.nodes.get_mut(&node.0) {
            data.rect = rect;
        }
    }

    /// Detach a subtree: removed from its parent, every node marked
    /// disconnected. Handles stay valid for stale-node observations.
    pub fn detach(&self, node: &NodeHandle) {
        let mut state = self.state.write();
        let parent = state.nodes.get(&node.0).and_then(|n| n.parent);
        if let Some(parent) = parent {
            if let Some(parent_node) = state.nodes.get_mut(&parent) {
                parent_node.children.retain(|c| *c != node.0);
            }
            state.bump(parent);
        }
        let mut pending = vec![node.0];
        while let Some(id) = pending.pop() {
            for member in state.document_order(id) {
                if let Some(shadow) = state.nodes.get(&member).and_then(|n| n.shadow_root) {
                    pending.push(shadow);
                }
                if let Some(data) = state.nodes.get_mut(&member) {
                    data.connected = false;
                }
            }
        }
        if let Some(data) = state.nodes.get_mut(&node.0) {
            data.parent = None;
        }
    }

    /// Events dispatched on `node`, in order.
    pub fn events(&self, node: &NodeHandle) -> Vec<DomEventKind> {
        self.state
            .read()
            .event_log
            .iter()
            .filter(|(id, _)| *id == node.0)
            .map(|(_, ev)| ev.kind)
            .collect()
    }

    /// Full dispatched-event log.
    pub fn dispatched(&self) -> Vec<(NodeHandle, DomEventKind)> {
        self.state
            .read()
            .event_log
            .iter()
            .map(|(id, ev)| (NodeHandle(*id), ev.kind))
            .collect()
    }

    pub fn focused(&self) -> Option<NodeHandle> {
        self.state.read().focused.map(NodeHandle)
    }

    pub fn scroll_top(&self, node: &NodeHandle) -> f64 {
        self.state
            .read()
            .node(node.0)
            .and_then(|n| n.scroll.as_ref().map(|s| s.top))
            .unwrap_or(0.0)
    }

    pub fn scroll_left(&self, node: &NodeHandle) -> f64 {
        self.state
            .read()
            .node(node.0)
            .and_then(|n| n.scroll.as_ref().map(|s| s.left))
            .unwrap_or(0.0)
    }
}

impl DomBackend for SimDom {
    fn document_root(&self) -> Option<NodeHandle> {
        Some(NodeHandle(self.state.read().root))
    }

    fn scrolling_element(&self) -> Option<NodeHandle> {
        Some(NodeHandle(self.state.read().root))
    }

    fn viewport(&self) -> Rect {
        self.state.read().viewport
    }

    fn document_url(&self) -> Option<String> {
        Some(self.state.read().url.clone())
    }

    fn query_css(
        &self,
        root: Option<&NodeHandle>,
        selector: &str,
    ) -> Result<Vec<NodeHandle>, DomError> {
        let parsed = css::parse(selector).map_err(DomError::SelectorSyntax)?;
        let state = self.state.read();
        let scope = root.map(|r| r.0).unwrap_or(state.root);
        let mut out = Vec::new();
        for id in state.descendants(scope) {
            if css::matches(&state, id, scope, &parsed) {
                out.push(NodeHandle(id));
            }
        }
        Ok(out)
    }

    fn query_xpath(
        &self,
        root: Option<&NodeHandle>,
        expression: &str,
    ) -> Result<Vec<NodeHandle>, DomError> {
        let parsed = xpath::parse(expression).map_err(DomError::XPathSyntax)?;
        let state = self.state.read();
        let scope = root.map(|r| r.0).unwrap_or(state.root);
        let mut out = Vec::new();
        for id in state.descendants(scope) {
            if xpath::matches(&state, id, &parsed) {
                out.push(NodeHandle(id));
            }
        }
        Ok(out)
    }

    fn elements_with_attribute(
        &self,
        root: Option<&NodeHandle>,
        attribute: &str,
    ) -> Vec<NodeHandle> {
        let state = self.state.read();
        let scope = root.map(|r| r.0).unwrap_or(state.root);
        state
            .descendants(scope)
            .into_iter()
            .filter(|id| {
                state
                    .node(*id)
                    .map(|n| n.attributes.contains_key(attribute))
                    .unwrap_or(false)
            })
            .map(NodeHandle)
            .collect()
    }

    fn element_by_id(&self, id: &str) -> Option<NodeHandle> {
        let state = self.state.read();
        let root = state.root;
        state
            .document_order(root)
            .into_iter()
            .find(|node_id| {
                state
                    .node(*node_id)
                    .map(|n| n.connected && n.attributes.get("id").map(String::as_str) == Some(id))
                    .unwrap_or(false)
            })
            .map(NodeHandle)
    }

    fn parent(&self, node: &NodeHandle) -> Option<NodeHandle> {
        self.state.read().flat_parent(node.0).map(NodeHandle)
    }

    fn children(&self, node: &NodeHandle) -> Vec<NodeHandle> {
        self.state
            .read()
            .node(node.0)
            .map(|n| n.children.iter().copied().map(NodeHandle).collect())
            .unwrap_or_default()
    }

    fn contains(&self, ancestor: &NodeHandle, node: &NodeHandle) -> bool {
        if ancestor == node {
            return true;
        }
        self.state.read().ancestors(node.0).contains(&ancestor.0)
    }

    fn is_connected(&self, node: &NodeHandle) -> bool {
        self.state
            .read()
            .node(node.0)
            .map(|n| n.connected)
            .unwrap_or(false)
    }

    fn tag_name(&self, node: &NodeHandle) -> Option<String> {
        self.state.read().node(node.0).map(|n| n.tag.clone())
    }

    fn attribute(&self, node: &NodeHandle, name: &str) -> Option<String> {
        self.state
            .read()
            .node(node.0)
            .and_then(|n| n.attributes.get(name).cloned())
    }

    fn text_content(&self, node: &NodeHandle) -> Option<String> {
        let state = self.state.read();
        state.node(node.0)?;
        Some(state.text_of(node.0))
    }

    fn inner_html(&self, node: &NodeHandle) -> Option<String> {
        let state = self.state.read();
        let data = state.node(node.0)?;
        let mut out = String::new();
        if let Some(text) = &data.own_text {
            out.push_str(text);
        }
        for child in &data.children {
            if let Some(child_data) = state.node(*child) {
                out.push_str(&format!("<{}>", child_data.tag));
                out.push_str(&state.text_of(*child));
                out.push_str(&format!("</{}>", child_data.tag));
            }
        }
        Some(out)
    }

    fn value(&self, node: &NodeHandle) -> Option<String> {
        self.state.read().node(node.0).and_then(|n| n.value.clone())
    }

    fn labels(&self, node: &NodeHandle) -> Vec<NodeHandle> {
        let state = self.state.read();
        let Some(data) = state.node(node.0) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        // Wrapping <label> ancestors first.
        for ancestor in state.ancestors(node.0) {
            if state.node(ancestor).map(|n| n.tag == "label").unwrap_or(false) {
                out.push(NodeHandle(ancestor));
            }
        }
        // Then <label for="..."> references.
        if let Some(id) = data.attributes.get("id") {
            let root = state.root;
            for candidate in state.document_order(root) {
                let Some(label) = state.node(candidate) else {
                    continue;
                };
                if label.tag == "label"
                    && label.connected
                    && label.attributes.get("for") == Some(id)
                    && !out.contains(&NodeHandle(candidate))
                {
                    out.push(NodeHandle(candidate));
                }
            }
        }
        out
    }

    fn computed_style(&self, node: &NodeHandle) -> Option<ComputedStyle> {
        self.state.read().node(node.0).map(|n| n.style.clone())
    }

    fn bounding_rect(&self, node: &NodeHandle) -> Option<Rect> {
        self.state.read().viewport_rect(node.0)
    }

    fn scroll_state(&self, node: &NodeHandle) -> Option<ScrollState> {
        let state = self.state.read();
        let data = state.node(node.0)?;
        let scroll = data.scroll.as_ref()?;
        let (client_width, client_height) = if node.0 == state.root {
            (state.viewport.width, state.viewport.height)
        } else {
            (data.rect.width, data.rect.height)
        };
        Some(ScrollState {
            scroll_top: scroll.top,
            scroll_left: scroll.left,
            scroll_width: scroll.content_width,
            scroll_height: scroll.content_height,
            client_width,
            client_height,
        })
    }

    fn select_options(&self, node: &NodeHandle) -> Vec<SelectOptionInfo> {
        let state = self.state.read();
        let Some(data) = state.node(node.0) else {
            return Vec::new();
        };
        data.children
            .iter()
            .filter_map(|child| state.node(*child).map(|n| (*child, n)))
            .filter(|(_, n)| n.tag == "option")
            .enumerate()
            .map(|(index, (id, n))| SelectOptionInfo {
                index,
                value: n
                    .attributes
                    .get("value")
                    .cloned()
                    .unwrap_or_else(|| state.text_of(id).trim().to_string()),
                label: state.text_of(id).trim().to_string(),
                selected: n.attributes.contains_key("selected"),
            })
            .collect()
    }

    fn describe(&self, node: &NodeHandle) -> Option<NodeSummary> {
        let state = self.state.read();
        let data = state.node(node.0)?;
        Some(NodeSummary {
            tag: data.tag.clone(),
            id: data.attributes.get("id").cloned(),
            classes: data.classes(),
        })
    }

    fn set_scroll_position(
        &self,
        node: &NodeHandle,
        left: f64,
        top: f64,
    ) -> Result<(), DomError> {
        let mut state = self.state.write();
        let root = state.root;
        let viewport = state.viewport;
        let data = state
            .nodes
            .get_mut(&node.0)
            .ok_or_else(|| DomError::UnknownNode(node.to_string()))?;
        let (client_width, client_height) = if node.0 == root {
            (viewport.width, viewport.height)
        } else {
            (data.rect.width, data.rect.height)
        };
        let scroll = data
            .scroll
            .as_mut()
            .ok_or_else(|| DomError::Unsupported(format!("{} is not scrollable", node)))?;
        scroll.left = left.clamp(0.0, (scroll.content_width - client_width).max(0.0));
        scroll.top = top.clamp(0.0, (scroll.content_height - client_height).max(0.0));
        Ok(())
    }

    fn dispatch(&self, node: &NodeHandle, event: DomEvent) -> Result<(), DomError> {
        let mut state = self.state.write();
        if !state.nodes.contains_key(&node.0) {
            return Err(DomError::UnknownNode(node.to_string()));
        }
        if state.nodes.get(&node.0).map(|n| !n.connected).unwrap_or(true) {
            return Err(DomError::Detached(node.to_string()));
        }
        state.event_log.push((node.0, event));
        Ok(())
    }

    fn focus(&self, node: &NodeHandle) -> Result<(), DomError> {
        let mut state = self.state.write();
        if !state.nodes.contains_key(&node.0) {
            return Err(DomError::UnknownNode(node.to_string()));
        }
        state.focused = Some(node.0);
        state
            .event_log
            .push((node.0, DomEvent::simple(DomEventKind::Focus)));
        Ok(())
    }

    fn blur(&self, node: &NodeHandle) -> Result<(), DomError> {
        let mut state = self.state.write();
        if state.focused == Some(node.0) {
            state.focused = None;
        }
        state
            .event_log
            .push((node.0, DomEvent::simple(DomEventKind::Blur)));
        Ok(())
    }

    fn set_value(&self, node: &NodeHandle, value: &str) -> Result<(), DomError> {
        let mut state = self.state.write();
        {
            let data = state
                .nodes
                .get_mut(&node.0)
                .ok_or_else(|| DomError::UnknownNode(node.to_string()))?;
            data.value = Some(value.to_string());
        }
        state.bump(node.0);
        Ok(())
    }

    fn set_selected(&self, node: &NodeHandle, indices: &[usize]) -> Result<(), DomError> {
        let option_ids: Vec<u64> = {
            let state = self.state.read();
            let data = state
                .node(node.0)
                .ok_or_else(|| DomError::UnknownNode(node.to_string()))?;
            data.children
                .iter()
                .copied()
                .filter(|child| {
                    state.node(*child).map(|n| n.tag == "option").unwrap_or(false)
                })
                .collect()
        };
        let mut state = self.state.write();
        let mut first_value = None;
        for (index, option_id) in option_ids.iter().enumerate() {
            let selected = indices.contains(&index);
            if let Some(option) = state.nodes.get_mut(option_id) {
                if selected {
                    option.attributes.insert("selected".to_string(), String::new());
                    if first_value.is_none() {
                        first_value = option.attributes.get("value").cloned();
                    }
                } else {
                    option.attributes.remove("selected");
                }
            }
        }
        if let Some(data) = state.nodes.get_mut(&node.0) {
            data.value = first_value;
        }
        state.bump(node.0);
        Ok(())
    }

    fn mutation_count(&self, scope: Option<&NodeHandle>) -> u64 {
        let state = self.state.read();
        let id = scope.map(|s| s.0).unwrap_or(state.root);
        state.node(id).map(|n| n.mutations).unwrap_or(0)
    }
}

/// Declarative element construction for tests and demos.
#[derive(Debug, Clone)]
pub struct ElementSpec {
    tag: String,
    attrs: BTreeMap<String, String>,
    text: Option<String>,
    value: Option<String>,
    rect: Rect,
    style: ComputedStyle,
    scroll: Option<(f64, f64)>,
}

impl ElementSpec {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: BTreeMap::new(),
            text: None,
            value: None,
            rect: Rect::default(),
            style: ComputedStyle::default(),
            scroll: None,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.attrs.insert("id".to_string(), id.into());
        self
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        let class = class.into();
        let merged = match self.attrs.get("class") {
            Some(existing) => format!("{existing} {class}"),
            None => class,
        };
        self.attrs.insert("class".to_string(), merged);
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn rect(mut self, top: f64, left: f64, width: f64, height: f64) -> Self {
        self.rect = Rect::new(top, left, width, height);
        self
    }

    pub fn style(mut self, style: ComputedStyle) -> Self {
        self.style = style;
        self
    }

    pub fn display(mut self, display: impl Into<String>) -> Self {
        self.style.display = display.into();
        self
    }

    pub fn visibility(mut self, visibility: impl Into<String>) -> Self {
        self.style.visibility = visibility.into();
        self
    }

    pub fn opacity(mut self, opacity: f64) -> Self {
        self.style.opacity = opacity;
        self
    }

    pub fn overflow_y(mut self, overflow: impl Into<String>) -> Self {
        self.style.overflow_y = overflow.into();
        self
    }

    /// Mark the element as a scroll container with the given content size.
    pub fn scrollable(mut self, content_width: f64, content_height: f64) -> Self {
        self.scroll = Some((content_width, content_height));
        if self.style.overflow_y == "visible" {
            self.style.overflow_y = "auto".to_string();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (SimDom, NodeHandle, NodeHandle) {
        let dom = SimDom::new();
        let root = dom.root();
        let container = dom.append(
            &root,
            ElementSpec::new("div")
                .id("list")
                .rect(0.0, 0.0, 220.0, 200.0)
                .scrollable(220.0, 1000.0),
        );
        let item = dom.append(
            &container,
            ElementSpec::new("li")
                .class("row")
                .text("hello")
                .rect(520.0, 0.0, 220.0, 40.0),
        );
        (dom, container, item)
    }

    #[test]
    fn css_queries_in_document_order() {
        let (dom, container, item) = fixture();
        let hits = dom.query_css(None, ".row").unwrap();
        assert_eq!(hits, vec![item]);
        let scoped = dom.query_css(Some(&container), "li.row").unwrap();
        assert_eq!(scoped, vec![item]);
    }

    #[test]
    fn css_syntax_error_is_reported() {
        let (dom, _, _) = fixture();
        let err = dom.query_css(None, "li::bogus(").unwrap_err();
        assert!(err.is_query_error());
    }

    #[test]
    fn bounding_rect_tracks_ancestor_scroll() {
        let (dom, container, item) = fixture();
        assert_eq!(dom.bounding_rect(&item).unwrap().top, 520.0);
        dom.set_scroll_position(&container, 0.0, 508.0).unwrap();
        assert_eq!(dom.bounding_rect(&item).unwrap().top, 12.0);
        // The container itself does not move.
        assert_eq!(dom.bounding_rect(&container).unwrap().top, 0.0);
    }

    #[test]
    fn scroll_position_is_clamped() {
        let (dom, container, _) = fixture();
        dom.set_scroll_position(&container, -10.0, 5000.0).unwrap();
        let state = dom.scroll_state(&container).unwrap();
        assert_eq!(state.scroll_left, 0.0);
        assert_eq!(state.scroll_top, 800.0);
    }

    #[test]
    fn detach_disconnects_subtree() {
        let (dom, container, item) = fixture();
        assert!(dom.is_connected(&item));
        dom.detach(&container);
        assert!(!dom.is_connected(&item));
        assert!(dom.query_css(None, ".row").unwrap().is_empty());
        assert!(dom.dispatch(&item, DomEvent::bubbling(DomEventKind::Click)).is_err());
    }

    #[test]
    fn mutation_counter_increments_through_ancestors() {
        let (dom, _, item) = fixture();
        let before = dom.mutation_count(None);
        dom.set_text(&item, "changed");
        assert!(dom.mutation_count(None) > before);
        assert!(dom.mutation_count(Some(&item)) >= 1);
    }

    #[test]
    fn labels_cover_wrapping_and_for_references() {
        let dom = SimDom::new();
        let root = dom.root();
        let wrapping = dom.append(&root, ElementSpec::new("label").text("Email"));
        let input = dom.append(&wrapping, ElementSpec::new("input").id("email"));
        let external = dom.append(
            &root,
            ElementSpec::new("label").attr("for", "email").text("E-mail"),
        );
        let labels = dom.labels(&input);
        assert!(labels.contains(&wrapping));
        assert!(labels.contains(&external));
    }

    #[test]
    fn select_options_and_selection() {
        let dom = SimDom::new();
        let root = dom.root();
        let select = dom.append(&root, ElementSpec::new("select"));
        dom.append(&select, ElementSpec::new("option").attr("value", "a").text("Alpha"));
        dom.append(&select, ElementSpec::new("option").attr("value", "b").text("Beta"));
        dom.set_selected(&select, &[1]).unwrap();
        let options = dom.select_options(&select);
        assert!(!options[0].selected);
        assert!(options[1].selected);
        assert_eq!(dom.value(&select).as_deref(), Some("b"));
    }

    #[test]
    fn shadow_content_is_scoped_to_its_root() {
        let dom = SimDom::new();
        let root = dom.root();
        let host = dom.append(&root, ElementSpec::new("x-widget").id("host"));
        let shadow = dom.attach_shadow(&host);
        let inner = dom.append(&shadow, ElementSpec::new("button").class("go"));

        // Document queries do not pierce the shadow boundary.
        assert!(dom.query_css(None, ".go").unwrap().is_empty());
        // Shadow roots work as query roots.
        assert_eq!(dom.query_css(Some(&shadow), ".go").unwrap(), vec![inner]);
        // The flattened parent chain runs through the host.
        assert_eq!(dom.parent(&shadow), Some(host));
        assert_eq!(dom.parent(&inner), Some(shadow));
        assert!(dom.contains(&host, &inner));
        assert!(dom.is_connected(&inner));
    }

    #[test]
    fn detaching_a_host_disconnects_shadow_content() {
        let dom = SimDom::new();
        let root = dom.root();
        let host = dom.append(&root, ElementSpec::new("x-widget"));
        let shadow = dom.attach_shadow(&host);
        let inner = dom.append(&shadow, ElementSpec::new("span").text("inside"));
        dom.detach(&host);
        assert!(!dom.is_connected(&inner));
    }

    #[test]
    fn xpath_attribute_predicate() {
        let dom = SimDom::new();
        let root = dom.root();
        let button = dom.append(
            &root,
            ElementSpec::new("button").attr("data-kind", "primary"),
        );
        dom.append(&root, ElementSpec::new("button"));
        let hits = dom
            .query_xpath(None, "//button[@data-kind='primary']")
            .unwrap();
        assert_eq!(hits, vec![button]);
        assert!(dom.query_xpath(None, "junk[").is_err());
    }
}
