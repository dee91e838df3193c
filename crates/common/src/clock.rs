//! Frame pacing for the compositor draw loop.
//!
//! Frame sources deliver at their own cadence (a browser tab may push
//! 60 frames a second while the clip is encoded at 10). The pacer decides
//! which of those frames reach the encoder.

use std::time::{Duration, Instant};

/// Monotonic time since a draw loop began.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    began: Instant,
}

impl SessionClock {
    pub fn begin() -> Self {
        Self {
            began: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.began.elapsed()
    }
}

/// Admits frames on a fixed grid of `1/fps` slots.
///
/// Slots are anchored to the first admitted frame, so jitter in delivery
/// does not accumulate into drift. A source that stalls for several slots
/// resumes on the next slot boundary instead of bursting to catch up.
#[derive(Debug)]
pub struct FramePacer {
    slot: Duration,
    next_due: Option<Duration>,
}

impl FramePacer {
    pub fn new(fps: u32) -> Self {
        Self {
            slot: Duration::from_secs(1) / fps.max(1),
            next_due: None,
        }
    }

    pub fn slot(&self) -> Duration {
        self.slot
    }

    /// Whether a frame arriving at `at` should be encoded.
    pub fn admit(&mut self, at: Duration) -> bool {
        let due = match self.next_due {
            None => at,
            Some(due) if at >= due => due,
            Some(_) => return false,
        };
        let behind = (at - due).as_nanos() / self.slot.as_nanos().max(1);
        self.next_due = Some(due + self.slot * (behind as u32 + 1));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn first_frame_is_always_admitted() {
        let mut pacer = FramePacer::new(10);
        assert!(pacer.admit(ms(37)));
        assert!(!pacer.admit(ms(100)));
        assert!(pacer.admit(ms(137)));
    }

    #[test]
    fn sixty_hz_source_is_thinned_to_ten() {
        let mut pacer = FramePacer::new(10);
        let admitted = (0..60u64)
            .filter(|i| pacer.admit(Duration::from_micros(i * 16_667)))
            .count();
        assert_eq!(admitted, 10);
    }

    #[test]
    fn stalled_source_does_not_burst() {
        let mut pacer = FramePacer::new(10);
        assert!(pacer.admit(ms(0)));
        assert!(pacer.admit(ms(450)));
        // Next slot is 500ms, not 200ms.
        assert!(!pacer.admit(ms(460)));
        assert!(pacer.admit(ms(500)));
    }

    #[test]
    fn zero_fps_paces_at_one_per_second() {
        assert_eq!(FramePacer::new(0).slot(), Duration::from_secs(1));
    }

    #[test]
    fn session_clock_is_monotonic() {
        let clock = SessionClock::begin();
        let a = clock.elapsed();
        assert!(clock.elapsed() >= a);
    }
}
