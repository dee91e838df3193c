//! loopcast platform core contracts.
//!
//! Cross-platform window/display data structures used by the capture
//! engine and the native controller without coupling to a concrete OS
//! backend.

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in virtual-desktop pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct ScreenRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl ScreenRect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Round width and height down to even values (H.264 needs 4:2:0
    /// chroma-aligned dimensions).
    pub fn even(&self) -> Self {
        Self {
            width: self.width & !1,
            height: self.height & !1,
            ..*self
        }
    }

    /// Intersection with `other`, or an empty rect at `self`'s origin.
    pub fn intersect(&self, other: &ScreenRect) -> ScreenRect {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = (self.x + self.width as i32).min(other.x + other.width as i32);
        let bottom = (self.y + self.height as i32).min(other.y + other.height as i32);
        if right <= left || bottom <= top {
            return ScreenRect::new(self.x, self.y, 0, 0);
        }
        ScreenRect::new(left, top, (right - left) as u32, (bottom - top) as u32)
    }

    /// Clamp a point into this rect and make it relative to its origin.
    pub fn to_local(&self, px: f64, py: f64) -> (f64, f64) {
        let x = (px - self.x as f64).clamp(0.0, self.width.saturating_sub(1) as f64);
        let y = (py - self.y as f64).clamp(0.0, self.height.saturating_sub(1) as f64);
        (x, y)
    }
}

/// A top-level window known to the window manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowInfo {
    /// Window-system handle (X11 window id).
    pub id: u64,
    /// Application identity (WM_CLASS class part, lowercased).
    pub app_id: String,
    /// Window title.
    pub title: String,
    /// Frame geometry.
    pub bounds: ScreenRect,
}

impl WindowInfo {
    pub fn area(&self) -> u64 {
        self.bounds.area()
    }
}

/// Display server / platform family used for capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DisplayServer {
    Wayland,
    X11,
    #[default]
    Unknown,
}

impl DisplayServer {
    /// Whether window enumeration and `ximagesrc`/`x11grab` capture work.
    pub fn supports_window_capture(self) -> bool {
        matches!(self, DisplayServer::X11)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_rounds_down() {
        let r = ScreenRect::new(3, 4, 1281, 721).even();
        assert_eq!((r.x, r.y, r.width, r.height), (3, 4, 1280, 720));
    }

    #[test]
    fn intersect_clips_to_overlap() {
        let window = ScreenRect::new(-100, 50, 800, 600);
        let screen = ScreenRect::new(0, 0, 1920, 1080);
        assert_eq!(window.intersect(&screen), ScreenRect::new(0, 50, 700, 600));

        let far = ScreenRect::new(5000, 5000, 10, 10);
        assert!(far.intersect(&screen).is_empty());
    }

    #[test]
    fn to_local_clamps_inside() {
        let r = ScreenRect::new(100, 100, 200, 100);
        assert_eq!(r.to_local(150.0, 120.0), (50.0, 20.0));
        assert_eq!(r.to_local(0.0, 500.0), (0.0, 99.0));
    }
}
