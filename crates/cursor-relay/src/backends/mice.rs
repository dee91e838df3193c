//! `/dev/input/mice` backend.
//!
//! The aggregated mice device yields 3-byte PS/2 packets of relative
//! motion. Positions are integrated in desktop pixels starting at the
//! centre of the capture region and reported relative to its origin.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::Read;
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};

use loopcast_common::error::{LoopcastError, LoopcastResult};
use loopcast_model::cursor::PointerUpdate;
use loopcast_platform_core::ScreenRect;

use crate::PointerBackend;

const MICE_DEVICE: &str = "/dev/input/mice";
const PACKET_LEN: usize = 3;

/// Integrates relative PS/2 motion into a position clamped to `region`.
#[derive(Debug)]
struct MotionTracker {
    region: ScreenRect,
    x: f64,
    y: f64,
    left_down: bool,
}

impl MotionTracker {
    fn centred_in(region: ScreenRect) -> Self {
        Self {
            region,
            x: region.x as f64 + region.width as f64 / 2.0,
            y: region.y as f64 + region.height as f64 / 2.0,
            left_down: false,
        }
    }

    /// Apply one packet, appending the updates it implies to `out`.
    fn apply(&mut self, [buttons, dx, dy]: [u8; PACKET_LEN], out: &mut VecDeque<PointerUpdate>) {
        let dx = dx as i8 as f64;
        // PS/2 y grows upwards.
        let dy = -(dy as i8 as f64);
        let left = buttons & 0x01 != 0;

        let r = self.region;
        let right = (r.x as f64 + r.width as f64 - 1.0).max(r.x as f64);
        let bottom = (r.y as f64 + r.height as f64 - 1.0).max(r.y as f64);
        self.x = (self.x + dx).clamp(r.x as f64, right);
        self.y = (self.y + dy).clamp(r.y as f64, bottom);
        let (x, y) = r.to_local(self.x, self.y);

        if dx != 0.0 || dy != 0.0 {
            out.push_back(PointerUpdate::CursorMove { x, y });
        }
        if left != self.left_down {
            self.left_down = left;
            out.push_back(if left {
                PointerUpdate::CursorDown { x, y }
            } else {
                PointerUpdate::CursorUp { x, y }
            });
        }
    }
}

pub struct MiceBackend {
    device: File,
    tracker: MotionTracker,
    pending: VecDeque<PointerUpdate>,
}

impl MiceBackend {
    pub fn new(region: ScreenRect) -> LoopcastResult<Self> {
        if region.is_empty() {
            return Err(LoopcastError::capture("pointer region has zero area"));
        }
        let device = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(MICE_DEVICE)
            .map_err(|e| LoopcastError::capture(format!("Failed to open {MICE_DEVICE}: {e}")))?;

        Ok(Self {
            device,
            tracker: MotionTracker::centred_in(region),
            pending: VecDeque::new(),
        })
    }

    /// Drain every packet the device has buffered.
    fn read_available(&mut self) -> LoopcastResult<()> {
        let mut packet = [0u8; PACKET_LEN];
        loop {
            match self.device.read(&mut packet) {
                Ok(PACKET_LEN) => self.tracker.apply(packet, &mut self.pending),
                Ok(_) => return Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => {
                    return Err(LoopcastError::capture(format!(
                        "Failed reading {MICE_DEVICE}: {e}"
                    )))
                }
            }
        }
    }
}

impl PointerBackend for MiceBackend {
    fn poll(&mut self) -> LoopcastResult<Option<PointerUpdate>> {
        if self.pending.is_empty() {
            self.read_available()?;
        }
        Ok(self.pending.pop_front())
    }

    fn name(&self) -> &str {
        "mice"
    }
}

/// Why the device could not be opened, in terms an operator can act on.
pub(crate) fn device_diagnostic() -> String {
    // SAFETY: geteuid/getegid have no preconditions and cannot fail.
    let (uid, gid) = unsafe { (libc::geteuid(), libc::getegid()) };
    match std::fs::metadata(MICE_DEVICE) {
        Ok(meta) => format!(
            "{MICE_DEVICE} is mode {:o} owned by {}:{}, process runs as {uid}:{gid}; add the user to the 'input' group",
            meta.mode() & 0o777,
            meta.uid(),
            meta.gid()
        ),
        Err(e) => format!("{MICE_DEVICE} unavailable ({e})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(tracker: &mut MotionTracker, packets: &[[u8; 3]]) -> Vec<PointerUpdate> {
        let mut out = VecDeque::new();
        for packet in packets {
            tracker.apply(*packet, &mut out);
        }
        out.into()
    }

    #[test]
    fn motion_starts_centred_and_is_region_relative() {
        let mut tracker = MotionTracker::centred_in(ScreenRect::new(100, 50, 200, 100));
        // dx = +10, dy = +5 (upwards).
        let updates = drain(&mut tracker, &[[0x08, 10, 5]]);
        assert_eq!(updates, vec![PointerUpdate::CursorMove { x: 110.0, y: 45.0 }]);
    }

    #[test]
    fn motion_is_clamped_to_region() {
        let mut tracker = MotionTracker::centred_in(ScreenRect::new(0, 0, 40, 40));
        // dx = -128 twice, dy = -128 (downwards) twice.
        let updates = drain(&mut tracker, &[[0x08, 0x80, 0x80], [0x08, 0x80, 0x80]]);
        assert_eq!(updates.last(), Some(&PointerUpdate::CursorMove { x: 0.0, y: 39.0 }));
    }

    #[test]
    fn left_button_edges_become_down_and_up() {
        let mut tracker = MotionTracker::centred_in(ScreenRect::new(0, 0, 100, 100));
        let updates = drain(&mut tracker, &[[0x09, 0, 0], [0x09, 0, 0], [0x08, 0, 0]]);
        assert_eq!(
            updates,
            vec![
                PointerUpdate::CursorDown { x: 50.0, y: 50.0 },
                PointerUpdate::CursorUp { x: 50.0, y: 50.0 },
            ]
        );
    }
}
