//! Geometry primitives shared by the scroll and wait engines

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in viewport coordinates (CSS pixels).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(top: f64, left: f64, width: f64, height: f64) -> Self {
        Self {
            top,
            left,
            width,
            height,
        }
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn area(&self) -> f64 {
        (self.width.max(0.0)) * (self.height.max(0.0))
    }

    /// Overlapping region of two rects, or `None` when disjoint.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let top = self.top.max(other.top);
        let left = self.left.max(other.left);
        let bottom = self.bottom().min(other.bottom());
        let right = self.right().min(other.right());
        if bottom <= top || right <= left {
            return None;
        }
        Some(Rect::new(top, left, right - left, bottom - top))
    }

    /// Fraction of `self`'s area that overlaps `other` (0.0..=1.0).
    pub fn intersection_ratio(&self, other: &Rect) -> f64 {
        let area = self.area();
        if area <= 0.0 {
            return 0.0;
        }
        self.intersection(other)
            .map(|r| (r.area() / area).clamp(0.0, 1.0))
            .unwrap_or(0.0)
    }
}

/// Scroll metrics of a container as read at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScrollState {
    pub scroll_top: f64,
    pub scroll_left: f64,
    pub scroll_width: f64,
    pub scroll_height: f64,
    pub client_width: f64,
    pub client_height: f64,
}

impl ScrollState {
    pub fn max_scroll_top(&self) -> f64 {
        (self.scroll_height - self.client_height).max(0.0)
    }

    pub fn max_scroll_left(&self) -> f64 {
        (self.scroll_width - self.client_width).max(0.0)
    }
}

/// The subset of computed style the engine reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedStyle {
    pub display: String,
    pub visibility: String,
    pub opacity: f64,
    pub overflow_x: String,
    pub overflow_y: String,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: "block".to_string(),
            visibility: "visible".to_string(),
            opacity: 1.0,
            overflow_x: "visible".to_string(),
            overflow_y: "visible".to_string(),
        }
    }
}

impl ComputedStyle {
    /// Whether overflow on either axis permits scrolling.
    pub fn overflow_scrollable(&self) -> bool {
        matches!(self.overflow_y.as_str(), "auto" | "scroll" | "overlay")
            || matches!(self.overflow_x.as_str(), "auto" | "scroll" | "overlay")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersection_of_overlapping_rects() {
        let a = Rect::new(0.0, 0.0, 100.0, 100.0);
        let b = Rect::new(50.0, 50.0, 100.0, 100.0);
        let i = a.intersection(&b).unwrap();
        assert_eq!(i, Rect::new(50.0, 50.0, 50.0, 50.0));
        assert!((a.intersection_ratio(&b) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn intersection_of_disjoint_rects_is_none() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(20.0, 20.0, 10.0, 10.0);
        assert!(a.intersection(&b).is_none());
        assert_eq!(a.intersection_ratio(&b), 0.0);
    }

    #[test]
    fn scroll_state_max_offsets_clamp_to_zero() {
        let state = ScrollState {
            scroll_height: 100.0,
            client_height: 200.0,
            ..Default::default()
        };
        assert_eq!(state.max_scroll_top(), 0.0);
    }
}
