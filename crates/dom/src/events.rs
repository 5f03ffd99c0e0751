//! Synthetic DOM events dispatched by step handlers

use serde::{Deserialize, Serialize};

/// Event kinds the engine dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DomEventKind {
    PointerDown,
    PointerOver,
    MouseDown,
    MouseUp,
    MouseOver,
    Click,
    DblClick,
    Focus,
    Blur,
    Input,
    Change,
}

impl DomEventKind {
    /// Wire name matching the browser event type.
    pub fn name(&self) -> &'static str {
        match self {
            DomEventKind::PointerDown => "pointerdown",
            DomEventKind::PointerOver => "pointerover",
            DomEventKind::MouseDown => "mousedown",
            DomEventKind::MouseUp => "mouseup",
            DomEventKind::MouseOver => "mouseover",
            DomEventKind::Click => "click",
            DomEventKind::DblClick => "dblclick",
            DomEventKind::Focus => "focus",
            DomEventKind::Blur => "blur",
            DomEventKind::Input => "input",
            DomEventKind::Change => "change",
        }
    }
}

/// One synthetic event with its dispatch flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomEvent {
    pub kind: DomEventKind,
    pub bubbles: bool,
    pub cancelable: bool,
    pub composed: bool,
}

impl DomEvent {
    /// Bubbling, cancelable, composed: the shape pointer and mouse
    /// events are dispatched with.
    pub fn bubbling(kind: DomEventKind) -> Self {
        Self {
            kind,
            bubbles: true,
            cancelable: true,
            composed: true,
        }
    }

    /// Non-bubbling event (focus/blur).
    pub fn simple(kind: DomEventKind) -> Self {
        Self {
            kind,
            bubbles: false,
            cancelable: false,
            composed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_match_browser_types() {
        assert_eq!(DomEventKind::PointerDown.name(), "pointerdown");
        assert_eq!(DomEventKind::DblClick.name(), "dblclick");
    }

    #[test]
    fn bubbling_events_are_composed() {
        let ev = DomEvent::bubbling(DomEventKind::Click);
        assert!(ev.bubbles && ev.cancelable && ev.composed);
        let focus = DomEvent::simple(DomEventKind::Focus);
        assert!(!focus.bubbles);
    }
}
