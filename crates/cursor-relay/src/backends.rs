//! Pointer backend implementations.
//!
//! Each backend provides a different way to learn where the pointer is.

#[cfg(target_os = "linux")]
mod mice;

#[cfg(target_os = "linux")]
pub use mice::MiceBackend;

use std::collections::VecDeque;

use async_trait::async_trait;
use loopcast_common::error::LoopcastResult;
use loopcast_model::cursor::PointerUpdate;
use loopcast_platform_core::ScreenRect;
use tokio::sync::mpsc;

use crate::PointerBackend;

/// Backend fed by another execution context over a channel.
///
/// Used when the capture target reports its own pointer events (the
/// injected page script case) and by tests.
pub struct ChannelBackend {
    rx: mpsc::UnboundedReceiver<PointerUpdate>,
    closed: bool,
}

impl ChannelBackend {
    pub fn new() -> (mpsc::UnboundedSender<PointerUpdate>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx, closed: false })
    }
}

#[async_trait]
impl PointerBackend for ChannelBackend {
    fn poll(&mut self) -> LoopcastResult<Option<PointerUpdate>> {
        match self.rx.try_recv() {
            Ok(update) => Ok(Some(update)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                self.closed = true;
                Ok(None)
            }
        }
    }

    fn name(&self) -> &str {
        "channel"
    }

    fn is_exhausted(&self) -> bool {
        self.closed
    }

    async fn recv(&mut self) -> LoopcastResult<Option<PointerUpdate>> {
        let update = self.rx.recv().await;
        self.closed = update.is_none();
        Ok(update)
    }
}

/// Stub backend for testing: replays scripted updates, then runs dry.
pub struct StubBackend {
    updates: VecDeque<PointerUpdate>,
}

impl StubBackend {
    /// Create a stub backend with pre-loaded updates.
    pub fn new(updates: Vec<PointerUpdate>) -> Self {
        Self {
            updates: updates.into(),
        }
    }

    /// Create an empty stub that never produces updates.
    pub fn empty() -> Self {
        Self {
            updates: VecDeque::new(),
        }
    }
}

impl PointerBackend for StubBackend {
    fn poll(&mut self) -> LoopcastResult<Option<PointerUpdate>> {
        Ok(self.updates.pop_front())
    }

    fn name(&self) -> &str {
        "stub"
    }

    fn is_exhausted(&self) -> bool {
        self.updates.is_empty()
    }
}

/// Detect the best available pointer backend for a capture `region`.
///
/// Falls back to an empty stub, in which case the compositor draws no
/// cursor.
pub fn detect_best_backend(region: ScreenRect) -> Box<dyn PointerBackend> {
    #[cfg(target_os = "linux")]
    {
        match MiceBackend::new(region) {
            Ok(backend) => {
                tracing::info!("Using /dev/input/mice pointer backend");
                return Box::new(backend);
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    details = %mice::device_diagnostic(),
                    "Failed to open pointer device"
                );
            }
        }
    }
    #[cfg(not(target_os = "linux"))]
    let _ = region;

    tracing::warn!("Using stub pointer backend, no cursor will be drawn");
    Box::new(StubBackend::empty())
}
