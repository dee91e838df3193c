//! loopcast Cursor Relay
//!
//! Samples pointer position and primary-button edges inside the capture
//! target and forwards them to the compositor. Uses a pluggable backend
//! architecture:
//!
//! - **Mice:** `/dev/input/mice` relative motion (Linux, needs `input` group)
//! - **Channel:** updates pushed by another context (e.g. an injected page script)
//! - **Stub:** scripted updates for tests
//!
//! Only the most recent sample is kept. The compositor reads it through a
//! [`CursorFeed`] whenever it draws and never waits for a new one.

pub mod backends;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use loopcast_common::error::LoopcastResult;
use loopcast_model::cursor::{CursorSample, PointerUpdate};
use tokio::sync::{watch, Notify};

/// Idle wait between polls of a device backend with nothing pending.
const IDLE_POLL: Duration = Duration::from_millis(1);

/// Trait for pointer sampling backends.
#[async_trait]
pub trait PointerBackend: Send {
    /// Poll for the next pointer update. Returns `None` if none is pending.
    fn poll(&mut self) -> LoopcastResult<Option<PointerUpdate>>;

    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Whether the backend has run dry for good (scripted/closed sources).
    fn is_exhausted(&self) -> bool {
        false
    }

    /// Wait for the next update. `None` means the backend is exhausted.
    ///
    /// Must be cancel-safe. The default polls on a short idle timer;
    /// sources that can be awaited directly override it.
    async fn recv(&mut self) -> LoopcastResult<Option<PointerUpdate>> {
        loop {
            match self.poll()? {
                Some(update) => return Ok(Some(update)),
                None if self.is_exhausted() => return Ok(None),
                None => tokio::time::sleep(IDLE_POLL).await,
            }
        }
    }
}

/// Shared stop request for a [`CursorRelay`].
#[derive(Debug, Default)]
pub struct RelayStop {
    requested: AtomicBool,
    notify: Notify,
}

impl RelayStop {
    /// Ask the relay to stop; wakes it if it is waiting for input.
    pub fn stop(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    async fn stopped(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

/// Writing half of the latest-sample slot.
pub type CursorSink = watch::Sender<Option<CursorSample>>;

/// Reading half of the latest-sample slot.
#[derive(Debug, Clone)]
pub struct CursorFeed {
    rx: watch::Receiver<Option<CursorSample>>,
}

impl CursorFeed {
    /// The freshest sample, if any has arrived yet. Never blocks.
    pub fn latest(&self) -> Option<CursorSample> {
        *self.rx.borrow()
    }
}

/// Create an empty latest-sample slot.
pub fn cursor_channel() -> (CursorSink, CursorFeed) {
    let (tx, rx) = watch::channel(None);
    (tx, CursorFeed { rx })
}

/// Pumps a backend into a [`CursorSink`] until stopped.
pub struct CursorRelay {
    backend: Box<dyn PointerBackend>,
    sink: CursorSink,
    last: Option<CursorSample>,
    stop: Arc<RelayStop>,
    updates_forwarded: u64,
}

impl CursorRelay {
    pub fn new(backend: Box<dyn PointerBackend>, sink: CursorSink) -> Self {
        Self {
            backend,
            sink,
            last: None,
            stop: Arc::new(RelayStop::default()),
            updates_forwarded: 0,
        }
    }

    /// Run the relay loop until a stop is requested, the backend is
    /// exhausted, or every feed has been dropped.
    pub async fn run(&mut self) -> LoopcastResult<u64> {
        tracing::info!(backend = %self.backend.name(), "Cursor relay started");

        let stop = self.stop.clone();
        while !stop.is_stopped() {
            let next = tokio::select! {
                _ = stop.stopped() => break,
                _ = self.sink.closed() => break,
                next = self.backend.recv() => next,
            };
            match next {
                Ok(Some(update)) => self.forward(update),
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Pointer backend error");
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }

        tracing::info!(updates = self.updates_forwarded, "Cursor relay stopped");
        Ok(self.updates_forwarded)
    }

    fn forward(&mut self, update: PointerUpdate) {
        let sample = CursorSample::apply(self.last.as_ref(), update);
        self.last = Some(sample);
        self.sink.send_replace(Some(sample));
        self.updates_forwarded += 1;
    }

    /// Request a stop.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Stop handle for external coordination.
    pub fn stop_handle(&self) -> Arc<RelayStop> {
        self.stop.clone()
    }

    /// Number of updates forwarded so far.
    pub fn updates_forwarded(&self) -> u64 {
        self.updates_forwarded
    }
}

#[cfg(test)]
mod tests {
    use super::backends::{ChannelBackend, StubBackend};
    use super::*;

    #[tokio::test]
    async fn feed_holds_only_the_latest_sample() {
        let (sink, feed) = cursor_channel();
        assert!(feed.latest().is_none());

        let backend = StubBackend::new(vec![
            PointerUpdate::CursorMove { x: 1.0, y: 1.0 },
            PointerUpdate::CursorDown { x: 2.0, y: 2.0 },
            PointerUpdate::CursorMove { x: 30.0, y: 40.0 },
        ]);
        let mut relay = CursorRelay::new(Box::new(backend), sink);
        let forwarded = relay.run().await.unwrap();
        assert_eq!(forwarded, 3);

        let latest = feed.latest().unwrap();
        assert_eq!((latest.x, latest.y), (30.0, 40.0));
        assert!(latest.button_down);
    }

    #[tokio::test]
    async fn stop_ends_a_live_backend() {
        let (sink, feed) = cursor_channel();
        let (tx, backend) = ChannelBackend::new();
        let mut relay = CursorRelay::new(Box::new(backend), sink);
        let stop = relay.stop_handle();
        let handle = tokio::spawn(async move { relay.run().await });

        tx.send(PointerUpdate::CursorMove { x: 5.0, y: 6.0 }).unwrap();
        for _ in 0..200 {
            if feed.latest().is_some() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(5)).await;
        }
        assert_eq!(feed.latest().map(|s| (s.x, s.y)), Some((5.0, 6.0)));

        stop.stop();
        let forwarded = handle.await.unwrap().unwrap();
        assert_eq!(forwarded, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn channel_relay_forwards_late_updates_and_exits_on_disconnect() {
        let (sink, feed) = cursor_channel();
        let (tx, backend) = ChannelBackend::new();
        let mut relay = CursorRelay::new(Box::new(backend), sink);
        let handle = tokio::spawn(async move { relay.run().await });

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(feed.latest().is_none());

        tx.send(PointerUpdate::CursorDown { x: 7.0, y: 8.0 }).unwrap();
        drop(tx);
        assert_eq!(handle.await.unwrap().unwrap(), 1);
        let latest = feed.latest().unwrap();
        assert_eq!((latest.x, latest.y), (7.0, 8.0));
        assert!(latest.button_down);
    }

    #[tokio::test]
    async fn stop_wakes_an_idle_channel_relay() {
        let (sink, _feed) = cursor_channel();
        let (_tx, backend) = ChannelBackend::new();
        let mut relay = CursorRelay::new(Box::new(backend), sink);
        let stop = relay.stop_handle();
        let handle = tokio::spawn(async move { relay.run().await });

        tokio::task::yield_now().await;
        stop.stop();
        let forwarded = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("relay ignored the stop request")
            .unwrap()
            .unwrap();
        assert_eq!(forwarded, 0);
    }

    #[tokio::test]
    async fn relay_exits_when_every_feed_is_dropped() {
        let (sink, feed) = cursor_channel();
        drop(feed);
        let (_tx, backend) = ChannelBackend::new();
        let mut relay = CursorRelay::new(Box::new(backend), sink);
        assert_eq!(relay.run().await.unwrap(), 0);
    }
}
