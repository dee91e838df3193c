//! Pointer updates forwarded out of the capture target.
//!
//! The relay emits a [`PointerUpdate`] for every move and button edge. The
//! compositor keeps only the freshest one as a [`CursorSample`]; there is
//! no queue and no acknowledgment.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Wire form of a pointer event, as sent by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PointerUpdate {
    /// Pointer moved.
    CursorMove { x: f64, y: f64 },
    /// Primary button pressed.
    CursorDown { x: f64, y: f64 },
    /// Primary button released.
    CursorUp { x: f64, y: f64 },
}

impl PointerUpdate {
    pub fn position(&self) -> (f64, f64) {
        match *self {
            PointerUpdate::CursorMove { x, y }
            | PointerUpdate::CursorDown { x, y }
            | PointerUpdate::CursorUp { x, y } => (x, y),
        }
    }
}

/// Latest known pointer state, in capture-target coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorSample {
    pub x: f64,
    pub y: f64,
    pub button_down: bool,
    pub received_at: Instant,
}

impl CursorSample {
    pub fn new(x: f64, y: f64, button_down: bool) -> Self {
        Self {
            x,
            y,
            button_down,
            received_at: Instant::now(),
        }
    }

    /// Fold an update into the previous sample.
    ///
    /// Moves keep the previous button state; edges set it explicitly.
    pub fn apply(previous: Option<&CursorSample>, update: PointerUpdate) -> CursorSample {
        let (x, y) = update.position();
        let button_down = match update {
            PointerUpdate::CursorMove { .. } => previous.is_some_and(|p| p.button_down),
            PointerUpdate::CursorDown { .. } => true,
            PointerUpdate::CursorUp { .. } => false,
        };
        CursorSample::new(x, y, button_down)
    }
}
