//! HUD notification sink.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Notification severity shown in the HUD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HudLevel {
    Info,
    Warn,
    Error,
}

/// One HUD notification. Titles carry the `[DGX]` prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HudNotification {
    pub id: String,
    pub title: String,
    pub description: String,
    pub level: HudLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl HudNotification {
    pub fn new(title: impl AsRef<str>, description: impl Into<String>, level: HudLevel) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: hud_title(title.as_ref()),
            description: description.into(),
            level,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Prefix a HUD title with the product tag, once.
pub fn hud_title(title: &str) -> String {
    if title.starts_with("[DGX]") {
        title.to_string()
    } else {
        format!("[DGX] {title}")
    }
}

/// Sink receiving HUD notifications. Implementations must not block and
/// must not throw; callers guard every push.
pub trait HudSink: Send + Sync {
    fn push(&self, notification: HudNotification);
}

/// Bounded in-memory HUD queue; oldest entries are dropped on overflow.
#[derive(Debug)]
pub struct HudQueue {
    capacity: usize,
    entries: Mutex<VecDeque<HudNotification>>,
}

impl HudQueue {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        })
    }

    pub fn drain(&self) -> Vec<HudNotification> {
        self.entries.lock().drain(..).collect()
    }

    pub fn snapshot(&self) -> Vec<HudNotification> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl HudSink for HudQueue {
    fn push(&self, notification: HudNotification) {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titles_are_prefixed_once() {
        assert_eq!(hud_title("selector miss"), "[DGX] selector miss");
        assert_eq!(hud_title("[DGX] already"), "[DGX] already");
    }

    #[test]
    fn queue_drops_oldest_on_overflow() {
        let queue = HudQueue::new(2);
        for i in 0..3 {
            queue.push(HudNotification::new(
                format!("n{i}"),
                "",
                HudLevel::Info,
            ));
        }
        let entries = queue.drain();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title, "[DGX] n1");
        assert_eq!(entries[1].title, "[DGX] n2");
    }
}
