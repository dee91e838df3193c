//! Capture target selection among top-level windows.

use loopcast_common::config::TargetRules;
use loopcast_common::error::{LoopcastError, LoopcastResult};
use loopcast_model::ipc::ViewportInfo;
use loopcast_platform_core::{ScreenRect, WindowInfo};

/// Reported when no window qualifies.
pub const NO_BROWSER_WINDOW: &str = "No browser window found. Make sure your browser is open.";

/// Picks the window a `start` command records.
pub trait WindowRanker: Send + Sync {
    fn pick<'a>(&self, windows: &'a [WindowInfo]) -> LoopcastResult<&'a WindowInfo>;
}

/// The largest allow-listed window with both edges above `min_edge`.
#[derive(Debug, Clone)]
pub struct LargestAllowListed {
    allow_list: Vec<String>,
    min_edge: u32,
}

impl LargestAllowListed {
    pub fn new(allow_list: impl IntoIterator<Item = impl Into<String>>, min_edge: u32) -> Self {
        Self {
            allow_list: allow_list
                .into_iter()
                .map(|app| app.into().to_ascii_lowercase())
                .collect(),
            min_edge,
        }
    }

    pub fn from_rules(rules: &TargetRules) -> Self {
        Self::new(rules.browser_allow_list.iter().cloned(), rules.min_window_edge)
    }

    fn admits(&self, window: &WindowInfo) -> bool {
        let app = window.app_id.to_ascii_lowercase();
        window.bounds.width > self.min_edge
            && window.bounds.height > self.min_edge
            && self.allow_list.iter().any(|allowed| *allowed == app)
    }
}

impl WindowRanker for LargestAllowListed {
    fn pick<'a>(&self, windows: &'a [WindowInfo]) -> LoopcastResult<&'a WindowInfo> {
        windows
            .iter()
            .filter(|w| self.admits(w))
            .max_by_key(|w| w.area())
            .ok_or_else(|| LoopcastError::target_unavailable(NO_BROWSER_WINDOW))
    }
}

/// Region to record for `window`, narrowed to the page content area when
/// the browser reported its viewport.
///
/// Viewport values are CSS pixels; they are scaled by the device pixel
/// ratio. Side borders are assumed symmetric and the bottom border equal to
/// a side border, so the toolbar height is whatever remains. The result is
/// clipped to the window and rounded down to even dimensions.
pub fn capture_region(window: &WindowInfo, viewport: Option<&ViewportInfo>) -> ScreenRect {
    let Some(vp) = viewport else {
        return window.bounds.even();
    };
    let ratio = if vp.device_pixel_ratio > 0.0 {
        vp.device_pixel_ratio
    } else {
        1.0
    };
    let border = ((vp.outer_width - vp.inner_width) / 2.0).max(0.0);
    let toolbar = (vp.outer_height - vp.inner_height - border).max(0.0);

    let content = ScreenRect::new(
        ((vp.screen_x + border) * ratio).round() as i32,
        ((vp.screen_y + toolbar) * ratio).round() as i32,
        (vp.inner_width * ratio).max(0.0).round() as u32,
        (vp.inner_height * ratio).max(0.0).round() as u32,
    );
    let clipped = content.intersect(&window.bounds);
    if clipped.is_empty() {
        tracing::warn!(?content, window = ?window.bounds, "Viewport lies outside the window; recording the whole window");
        return window.bounds.even();
    }
    clipped.even()
}
