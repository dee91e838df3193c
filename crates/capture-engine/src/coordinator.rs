//! Session Coordinator: the recording state machine.
//!
//! The coordinator runs as a single task that owns the [`Session`]. Every
//! other context talks to it through a [`CoordinatorHandle`]; requests
//! that need an answer carry a oneshot reply channel. Background work
//! (the compositor, the upload/convert/deliver pipeline) reports back
//! through an internal channel, so all state changes happen in
//! [`Coordinator::handle`].
//!
//! Only one capture is ever live. A start request while `Recording` is
//! an implicit stop followed by refocusing the monitor surface; a start
//! request while the previous clip is still being processed is refused.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use loopcast_common::config::AppConfig;
use loopcast_common::error::{LoopcastError, LoopcastResult};
use loopcast_cursor_relay::{cursor_channel, CursorRelay, RelayStop};
use loopcast_job_client::{convert_and_deliver, ClipProgress, ClipUpload, JobApi};
use loopcast_model::job::{ConversionParams, QualityTier};
use loopcast_model::session::{Session, SessionState, StatusNotification};
use loopcast_model::target::{CaptureTarget, SurfaceId, SurfaceRef, TargetPolicy};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::compositor::{Clip, Compositor};
use crate::host::{AcquiredStream, CaptureHost, RecordingIndicator};

/// Tunables of one coordinator instance.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub policy: TargetPolicy,
    pub conversion: ConversionParams,
    pub capture_fps: u32,
    pub delivery_dir: PathBuf,
    pub poll_interval: Duration,
}

impl CoordinatorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let defaults = ConversionParams::default();
        Self {
            policy: TargetPolicy::new(
                config.target.privileged_schemes.clone(),
                config.target.excluded_apps.clone(),
            ),
            conversion: ConversionParams {
                fps: if config.recording.fps > 0 {
                    config.recording.fps
                } else {
                    defaults.fps
                },
                width: if config.recording.width > 0 {
                    config.recording.width
                } else {
                    defaults.width
                },
                quality: QualityTier::from_name(&config.recording.quality),
            },
            capture_fps: config.recording.capture_fps.max(1),
            delivery_dir: config.client.delivery_dir.clone(),
            poll_interval: Duration::from_millis(config.client.poll_interval_ms.max(1)),
        }
    }
}

/// Answer to a start request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new recording is live.
    Started { session_id: String },
    /// A recording was already live; it is now stopping.
    StoppedPrevious,
}

enum Request {
    Start(oneshot::Sender<LoopcastResult<StartOutcome>>),
    Stop(oneshot::Sender<LoopcastResult<()>>),
    SurfaceActivated(SurfaceRef),
    SurfaceClosed(SurfaceId),
    MonitorOpened(SurfaceId),
    MonitorClosed,
    Snapshot(oneshot::Sender<Session>),
    Shutdown,
}

enum Internal {
    CaptureFinished {
        session_id: String,
        result: LoopcastResult<Clip>,
    },
    Progress {
        session_id: String,
        progress: ClipProgress,
    },
    Delivered {
        session_id: String,
        result: LoopcastResult<PathBuf>,
    },
}

enum Event {
    Request(Request),
    Internal(Internal),
}

/// Cloneable address of a running coordinator.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Request>,
}

impl CoordinatorHandle {
    pub async fn start(&self) -> LoopcastResult<StartOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Start(reply)).await?;
        rx.await.map_err(|_| gone())?
    }

    pub async fn stop(&self) -> LoopcastResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Stop(reply)).await?;
        rx.await.map_err(|_| gone())?
    }

    pub async fn surface_activated(&self, surface: SurfaceRef) -> LoopcastResult<()> {
        self.send(Request::SurfaceActivated(surface)).await
    }

    pub async fn surface_closed(&self, surface: SurfaceId) -> LoopcastResult<()> {
        self.send(Request::SurfaceClosed(surface)).await
    }

    pub async fn monitor_opened(&self, surface: SurfaceId) -> LoopcastResult<()> {
        self.send(Request::MonitorOpened(surface)).await
    }

    pub async fn monitor_closed(&self) -> LoopcastResult<()> {
        self.send(Request::MonitorClosed).await
    }

    /// Current session, as the coordinator sees it.
    pub async fn snapshot(&self) -> LoopcastResult<Session> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Snapshot(reply)).await?;
        rx.await.map_err(|_| gone())
    }

    /// Stop any live capture and end the coordinator task.
    pub async fn shutdown(&self) -> LoopcastResult<()> {
        self.send(Request::Shutdown).await
    }

    async fn send(&self, request: Request) -> LoopcastResult<()> {
        self.tx.send(request).await.map_err(|_| gone())
    }
}

fn gone() -> LoopcastError {
    LoopcastError::Other(anyhow::anyhow!("coordinator has shut down"))
}

struct LiveCapture {
    relay_stop: Arc<RelayStop>,
}

/// The coordinator task's state.
pub struct Coordinator {
    host: Arc<dyn CaptureHost>,
    jobs: Arc<dyn JobApi>,
    indicator: Arc<dyn RecordingIndicator>,
    settings: CoordinatorSettings,

    session: Session,
    monitor: Option<SurfaceId>,
    active: Option<SurfaceRef>,
    capture: Option<LiveCapture>,
    processing: Option<JoinHandle<()>>,

    state_tx: watch::Sender<SessionState>,
    notifications: mpsc::UnboundedSender<StatusNotification>,
    requests: mpsc::Receiver<Request>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
}

impl Coordinator {
    /// Spawn a coordinator task.
    ///
    /// Returns its handle and the stream of status notifications meant
    /// for the monitor surface. The task ends when every handle is
    /// dropped or [`CoordinatorHandle::shutdown`] is called.
    pub fn spawn(
        host: Arc<dyn CaptureHost>,
        jobs: Arc<dyn JobApi>,
        indicator: Arc<dyn RecordingIndicator>,
        settings: CoordinatorSettings,
    ) -> (CoordinatorHandle, mpsc::UnboundedReceiver<StatusNotification>) {
        let (tx, requests) = mpsc::channel(32);
        let (notifications, notification_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(SessionState::Idle);

        let coordinator = Self {
            host,
            jobs,
            indicator,
            settings,
            session: Session::new(String::new(), None),
            monitor: None,
            active: None,
            capture: None,
            processing: None,
            state_tx,
            notifications,
            requests,
            internal_tx,
            internal_rx,
        };
        tokio::spawn(coordinator.run());
        (CoordinatorHandle { tx }, notification_rx)
    }

    async fn run(mut self) {
        tracing::info!("Coordinator started");
        loop {
            let event = tokio::select! {
                request = self.requests.recv() => match request {
                    Some(request) => Event::Request(request),
                    None => break,
                },
                Some(internal) = self.internal_rx.recv() => Event::Internal(internal),
            };
            if !self.handle(event).await {
                break;
            }
        }
        self.release();
        tracing::info!("Coordinator stopped");
    }

    /// Single dispatch point. Returns false when the coordinator should exit.
    async fn handle(&mut self, event: Event) -> bool {
        match event {
            Event::Request(Request::Start(reply)) => {
                let outcome = self.on_start().await;
                let _ = reply.send(outcome);
            }
            Event::Request(Request::Stop(reply)) => {
                let _ = reply.send(self.on_stop());
            }
            Event::Request(Request::SurfaceActivated(surface)) => self.on_surface_activated(surface),
            Event::Request(Request::SurfaceClosed(id)) => self.on_surface_closed(id),
            Event::Request(Request::MonitorOpened(id)) => {
                tracing::debug!(monitor = %id, "Monitor surface opened");
                self.monitor = Some(id);
                self.session.monitor_surface = Some(id);
            }
            Event::Request(Request::MonitorClosed) => {
                self.monitor = None;
                self.session.monitor_surface = None;
                if self.session.state == SessionState::Recording {
                    let _ = self.begin_stop("Monitor surface was closed");
                }
            }
            Event::Request(Request::Snapshot(reply)) => {
                let _ = reply.send(self.session.clone());
            }
            Event::Request(Request::Shutdown) => return false,
            Event::Internal(Internal::CaptureFinished { session_id, result }) => {
                if self.is_current(&session_id) {
                    self.on_capture_finished(result);
                }
            }
            Event::Internal(Internal::Progress {
                session_id,
                progress,
            }) => {
                if self.is_current(&session_id) {
                    self.on_progress(progress);
                }
            }
            Event::Internal(Internal::Delivered { session_id, result }) => {
                if self.is_current(&session_id) {
                    self.on_delivered(result);
                }
            }
        }
        true
    }

    fn is_current(&self, session_id: &str) -> bool {
        let current = !self.session.id.is_empty() && self.session.id == session_id;
        if !current {
            tracing::debug!(session_id, "Dropping event from a finished session");
        }
        current
    }

    async fn on_start(&mut self) -> LoopcastResult<StartOutcome> {
        match self.session.state {
            SessionState::Idle => self
                .begin_recording()
                .await
                .map(|session_id| StartOutcome::Started { session_id }),
            SessionState::Recording => {
                self.begin_stop("Recording stopped")?;
                if let Some(monitor) = self.monitor {
                    if let Err(e) = self.host.focus_surface(monitor).await {
                        tracing::warn!(error = %e, "Failed to refocus monitor surface");
                    }
                }
                Ok(StartOutcome::StoppedPrevious)
            }
            _ => {
                let from = self.session.state.clone();
                self.notify(
                    StatusNotification::new(self.session_id(), from.clone())
                        .with_message("Busy: the previous recording is still being processed"),
                );
                tracing::info!(state = %from, "Start refused while busy");
                Err(LoopcastError::InvalidTransition {
                    from: from.to_string(),
                    to: SessionState::AwaitingTarget.to_string(),
                })
            }
        }
    }

    fn on_stop(&mut self) -> LoopcastResult<()> {
        if self.session.state == SessionState::Recording {
            return self.begin_stop("Recording stopped");
        }
        self.notify(
            StatusNotification::new(self.session_id(), self.session.state.clone())
                .with_message("No active recording"),
        );
        Err(LoopcastError::InvalidTransition {
            from: self.session.state.to_string(),
            to: SessionState::Stopping.to_string(),
        })
    }

    async fn begin_recording(&mut self) -> LoopcastResult<String> {
        let surface = match self.active.clone() {
            Some(surface) => Some(surface),
            None => self.host.active_surface().await?,
        };
        let Some(surface) = surface else {
            return Err(self.reject("No active surface to record"));
        };

        let target = CaptureTarget::evaluate(surface, self.monitor, &self.settings.policy);
        if let Some(reason) = target.rejection_reason(self.monitor) {
            return Err(self.reject(&reason));
        }

        let session_id = uuid::Uuid::new_v4().simple().to_string();
        self.session = Session::new(session_id.clone(), self.monitor);
        self.session.capture_target = Some(target.clone());
        self.transition(SessionState::AwaitingTarget)?;

        match self.host.acquire(&target.surface).await {
            Ok(stream) => {
                self.session.started_at = Some(chrono::Utc::now());
                self.transition(SessionState::Recording)?;
                self.launch(stream);
                tracing::info!(
                    session_id = %session_id,
                    target = %target.surface.id,
                    "Recording started"
                );
                Ok(session_id)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Refuse a start without leaving `Idle`.
    fn reject(&mut self, reason: &str) -> LoopcastError {
        tracing::info!(reason, "Start rejected");
        self.notify(StatusNotification::new(None, SessionState::Idle).with_message(reason));
        LoopcastError::target_unavailable(reason)
    }

    /// Start the cursor relay and the compositor for an acquired stream.
    fn launch(&mut self, stream: AcquiredStream) {
        let AcquiredStream {
            frames,
            pointer,
            pointer_space,
        } = stream;

        let (sink, feed) = cursor_channel();
        let mut relay = CursorRelay::new(pointer, sink);
        let relay_stop = relay.stop_handle();
        tokio::spawn(async move {
            if let Err(e) = relay.run().await {
                tracing::warn!(error = %e, "Cursor relay failed");
            }
        });

        let compositor = Compositor::new(
            frames,
            feed,
            pointer_space,
            self.state_tx.subscribe(),
            self.settings.capture_fps,
        );
        let host = self.host.clone();
        let events = self.internal_tx.clone();
        let session_id = self.session.id.clone();
        tokio::spawn(async move {
            let result = compositor.run(host.as_ref()).await;
            let _ = events.send(Internal::CaptureFinished { session_id, result });
        });

        self.capture = Some(LiveCapture { relay_stop });
    }

    fn begin_stop(&mut self, message: &str) -> LoopcastResult<()> {
        self.transition_with(SessionState::Stopping, |n| n.with_message(message))?;
        if let Some(capture) = &self.capture {
            capture.relay_stop.stop();
        }
        Ok(())
    }

    fn on_surface_activated(&mut self, surface: SurfaceRef) {
        let target = CaptureTarget::evaluate(surface.clone(), self.monitor, &self.settings.policy);
        tracing::debug!(surface = %surface.id, recordable = target.recordable, "Surface activated");
        self.active = Some(surface);
        if self.session.state == SessionState::Idle {
            self.indicator.set_ready(target.recordable);
        }
    }

    fn on_surface_closed(&mut self, id: SurfaceId) {
        if self.active.as_ref().is_some_and(|s| s.id == id) {
            self.active = None;
        }
        let is_target = self
            .session
            .capture_target
            .as_ref()
            .is_some_and(|t| t.surface.id == id);
        if is_target && self.session.state == SessionState::Recording {
            tracing::info!(surface = %id, "Capture target closed while recording");
            let _ = self.begin_stop("Capture target was closed");
        }
    }

    fn on_capture_finished(&mut self, result: LoopcastResult<Clip>) {
        if let Some(capture) = self.capture.take() {
            capture.relay_stop.stop();
        }
        if self.session.state == SessionState::Recording
            && self.begin_stop("Capture target was lost").is_err()
        {
            return;
        }
        if self.session.state != SessionState::Stopping {
            return;
        }

        let clip = match result {
            Ok(clip) => clip,
            Err(e) => return self.fail(&e),
        };
        if self.transition(SessionState::Uploading).is_err() {
            return;
        }

        let label = self
            .session
            .capture_target
            .as_ref()
            .map(|t| t.surface.site_label())
            .unwrap_or_else(|| loopcast_model::filename::FALLBACK_LABEL.to_string());
        let jobs = self.jobs.clone();
        let events = self.internal_tx.clone();
        let session_id = self.session.id.clone();
        let params = self.settings.conversion;
        let delivery_dir = self.settings.delivery_dir.clone();
        let poll_interval = self.settings.poll_interval;

        tracing::info!(
            session_id = %session_id,
            bytes = clip.bytes.len(),
            frames = clip.frames,
            "Uploading clip"
        );
        self.processing = Some(tokio::spawn(async move {
            let progress_events = events.clone();
            let progress_session = session_id.clone();
            let result = convert_and_deliver(
                jobs.as_ref(),
                ClipUpload::webm(clip.bytes),
                params,
                &label,
                &delivery_dir,
                poll_interval,
                move |progress| {
                    let _ = progress_events.send(Internal::Progress {
                        session_id: progress_session.clone(),
                        progress,
                    });
                },
            )
            .await;
            let _ = events.send(Internal::Delivered { session_id, result });
        }));
    }

    fn on_progress(&mut self, progress: ClipProgress) {
        match progress {
            ClipProgress::Uploading => {}
            ClipProgress::Accepted => {
                if self.session.state == SessionState::Uploading {
                    let _ = self.transition_with(SessionState::Converting, |n| n.with_progress(0));
                }
            }
            ClipProgress::Converting(percent) => {
                if self.session.state == SessionState::Converting {
                    self.notify(
                        StatusNotification::new(self.session_id(), SessionState::Converting)
                            .with_progress(percent),
                    );
                }
            }
        }
    }

    fn on_delivered(&mut self, result: LoopcastResult<PathBuf>) {
        self.processing = None;
        match result {
            Ok(path) => {
                let message = format!("Saved to {}", path.display());
                if self
                    .transition_with(SessionState::Done, |n| {
                        n.with_progress(100).with_artifact(path).with_message(message)
                    })
                    .is_ok()
                {
                    self.return_to_idle();
                }
            }
            Err(e) => self.fail(&e),
        }
    }

    /// Release everything, record the failure, and go back to `Idle`.
    fn fail(&mut self, error: &LoopcastError) {
        tracing::error!(session_id = %self.session.id, error = %error, "Recording failed");
        self.release();
        let reason = error.to_string();
        if self
            .transition_with(SessionState::Error(reason.clone()), |n| n.with_message(reason))
            .is_ok()
        {
            self.return_to_idle();
        }
    }

    /// Stop the relay and the post-processing task.
    ///
    /// The compositor stops its own tracks once the state leaves
    /// `Recording` or the state channel closes.
    fn release(&mut self) {
        if let Some(capture) = self.capture.take() {
            capture.relay_stop.stop();
        }
        if let Some(processing) = self.processing.take() {
            processing.abort();
        }
    }

    fn return_to_idle(&mut self) {
        if self.transition(SessionState::Idle).is_ok() {
            self.session = Session::new(String::new(), self.monitor);
            if let Some(active) = &self.active {
                let target = CaptureTarget::evaluate(active.clone(), self.monitor, &self.settings.policy);
                self.indicator.set_ready(target.recordable);
            }
        }
    }

    fn transition(&mut self, next: SessionState) -> LoopcastResult<()> {
        self.transition_with(next, |n| n)
    }

    /// Move to `next` if the transition table allows it, then notify the
    /// monitor surface and the indicator.
    fn transition_with(
        &mut self,
        next: SessionState,
        decorate: impl FnOnce(StatusNotification) -> StatusNotification,
    ) -> LoopcastResult<()> {
        let from = self.session.state.clone();
        if !from.can_transition_to(&next) {
            tracing::warn!(from = %from, to = %next, "Invalid session transition rejected");
            return Err(LoopcastError::InvalidTransition {
                from: from.to_string(),
                to: next.to_string(),
            });
        }

        tracing::info!(session_id = %self.session.id, from = %from, to = %next, "Session transition");
        self.session.state = next.clone();
        self.state_tx.send_replace(next.clone());
        match next {
            SessionState::Recording => self.indicator.set_recording(true),
            SessionState::Idle => self.indicator.set_recording(false),
            _ => {}
        }
        self.notify(decorate(StatusNotification::new(self.session_id(), next)));
        Ok(())
    }

    fn notify(&self, notification: StatusNotification) {
        if self.notifications.send(notification).is_err() {
            tracing::trace!("No monitor surface listening");
        }
    }

    fn session_id(&self) -> Option<String> {
        (!self.session.id.is_empty()).then(|| self.session.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeHost, FakeIndicator, FakeSourceScript, InstantJobApi, FAKE_ARTIFACT};
    use loopcast_model::cursor::PointerUpdate;
    use proptest::prelude::*;

    struct Rig {
        handle: CoordinatorHandle,
        notes: mpsc::UnboundedReceiver<StatusNotification>,
        host: Arc<FakeHost>,
        jobs: Arc<InstantJobApi>,
        indicator: Arc<FakeIndicator>,
        delivery_dir: PathBuf,
    }

    fn settings(name: &str) -> CoordinatorSettings {
        let delivery_dir = std::env::temp_dir().join(format!(
            "loopcast-coord-{name}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&delivery_dir);
        CoordinatorSettings {
            policy: TargetPolicy::new(vec!["chrome://".into(), "about:".into()], Vec::new()),
            conversion: ConversionParams::default(),
            capture_fps: 1000,
            delivery_dir,
            poll_interval: Duration::from_millis(1),
        }
    }

    fn rig_with(name: &str, host: FakeHost, jobs: InstantJobApi) -> Rig {
        let host = Arc::new(host);
        let jobs = Arc::new(jobs);
        let indicator = Arc::new(FakeIndicator::default());
        let settings = settings(name);
        let delivery_dir = settings.delivery_dir.clone();
        let (handle, notes) =
            Coordinator::spawn(host.clone(), jobs.clone(), indicator.clone(), settings);
        Rig {
            handle,
            notes,
            host,
            jobs,
            indicator,
            delivery_dir,
        }
    }

    fn endless() -> FakeHost {
        FakeHost::new(FakeSourceScript::Endless {
            width: 32,
            height: 24,
        })
    }

    /// Collect notifications until one satisfies `done`.
    async fn until(
        notes: &mut mpsc::UnboundedReceiver<StatusNotification>,
        done: impl Fn(&StatusNotification) -> bool,
    ) -> Vec<StatusNotification> {
        let mut seen = Vec::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while let Ok(Some(note)) = tokio::time::timeout_at(deadline, notes.recv()).await {
            let finished = done(&note);
            seen.push(note);
            if finished {
                return seen;
            }
        }
        panic!("condition never met; saw {seen:?}");
    }

    fn states(notes: &[StatusNotification]) -> Vec<&'static str> {
        notes.iter().map(|n| n.state.label()).collect()
    }

    async fn wait_for_frames(host: &FakeHost) {
        for _ in 0..1000 {
            if !host.encoded_frames().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("no frames composited");
    }

    #[tokio::test]
    async fn full_recording_is_delivered_and_returns_to_idle() {
        let mut rig = rig_with("happy", endless(), InstantJobApi::new());
        rig.handle
            .surface_activated(SurfaceRef::url(1, "https://www.example.com/page"))
            .await
            .unwrap();

        let outcome = rig.handle.start().await.unwrap();
        assert!(matches!(outcome, StartOutcome::Started { .. }));
        wait_for_frames(&rig.host).await;
        rig.handle.stop().await.unwrap();

        let notes = until(&mut rig.notes, |n| n.state == SessionState::Idle).await;
        assert_eq!(
            states(&notes),
            vec![
                "awaiting_target",
                "recording",
                "stopping",
                "uploading",
                "converting",
                "converting",
                "done",
                "idle"
            ]
        );
        let done = notes
            .iter()
            .find(|n| n.state == SessionState::Done)
            .unwrap();
        let artifact = done.artifact.clone().unwrap();
        assert!(artifact.starts_with(&rig.delivery_dir));
        let name = artifact.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("example_"), "{name}");
        assert_eq!(std::fs::read(&artifact).unwrap(), FAKE_ARTIFACT);

        assert_eq!(rig.jobs.uploads(), vec![ConversionParams::default()]);
        assert_eq!(rig.host.live_streams(), 0);
        assert_eq!(rig.indicator.recording_calls(), vec![true, false]);
        let session = rig.handle.snapshot().await.unwrap();
        assert_eq!(session.state, SessionState::Idle);
        assert!(session.capture_target.is_none());
    }

    #[tokio::test]
    async fn start_on_monitor_surface_is_rejected() {
        let mut rig = rig_with("monitor", endless(), InstantJobApi::new());
        rig.handle.monitor_opened(SurfaceId(7)).await.unwrap();
        rig.handle
            .surface_activated(SurfaceRef::url(7, "https://loopcast.local/popup"))
            .await
            .unwrap();

        let err = rig.handle.start().await.unwrap_err();
        assert!(matches!(err, LoopcastError::TargetUnavailable { .. }));
        let note = rig.notes.recv().await.unwrap();
        assert_eq!(note.state, SessionState::Idle);
        assert_eq!(
            note.message.as_deref(),
            Some("The control surface cannot record itself")
        );
        assert_eq!(rig.host.acquisitions(), 0);
        assert_eq!(rig.indicator.ready_calls(), vec![false]);
        assert_eq!(
            rig.handle.snapshot().await.unwrap().state,
            SessionState::Idle
        );
    }

    #[tokio::test]
    async fn privileged_pages_are_rejected_and_host_fallback_is_used() {
        let rig = rig_with("privileged", endless(), InstantJobApi::new());
        rig.host
            .set_active(Some(SurfaceRef::url(3, "chrome://settings")));
        let err = rig.handle.start().await.unwrap_err();
        assert!(err.to_string().contains("chrome://settings"), "{err}");
        assert_eq!(rig.host.acquisitions(), 0);

        let rig = rig_with("no-surface", endless(), InstantJobApi::new());
        let err = rig.handle.start().await.unwrap_err();
        assert!(matches!(err, LoopcastError::TargetUnavailable { .. }));
    }

    #[tokio::test]
    async fn stop_without_recording_is_refused() {
        let mut rig = rig_with("idle-stop", endless(), InstantJobApi::new());
        let err = rig.handle.stop().await.unwrap_err();
        assert!(matches!(err, LoopcastError::InvalidTransition { .. }));
        let note = rig.notes.recv().await.unwrap();
        assert_eq!(note.message.as_deref(), Some("No active recording"));
        assert_eq!(note.state, SessionState::Idle);
    }

    #[tokio::test]
    async fn second_start_stops_and_refocuses_monitor() {
        let mut rig = rig_with("toggle", endless(), InstantJobApi::new());
        rig.handle.monitor_opened(SurfaceId(99)).await.unwrap();
        rig.handle
            .surface_activated(SurfaceRef::url(1, "https://example.com"))
            .await
            .unwrap();

        rig.handle.start().await.unwrap();
        wait_for_frames(&rig.host).await;
        assert_eq!(
            rig.handle.start().await.unwrap(),
            StartOutcome::StoppedPrevious
        );
        assert_eq!(rig.host.focused(), vec![SurfaceId(99)]);

        until(&mut rig.notes, |n| n.state == SessionState::Idle).await;
        assert_eq!(rig.host.acquisitions(), 1);
        assert_eq!(rig.host.max_live_streams(), 1);
    }

    #[tokio::test]
    async fn closing_the_target_forces_a_stop() {
        let mut rig = rig_with("closed", endless(), InstantJobApi::new());
        rig.handle
            .surface_activated(SurfaceRef::url(4, "https://example.com"))
            .await
            .unwrap();
        rig.handle.start().await.unwrap();
        wait_for_frames(&rig.host).await;

        rig.handle.surface_closed(SurfaceId(4)).await.unwrap();
        let notes = until(&mut rig.notes, |n| n.state == SessionState::Idle).await;
        let stopping = notes
            .iter()
            .find(|n| n.state == SessionState::Stopping)
            .unwrap();
        assert_eq!(stopping.message.as_deref(), Some("Capture target was closed"));
        assert!(notes.iter().any(|n| n.state == SessionState::Done));
        assert_eq!(rig.host.live_streams(), 0);
    }

    #[tokio::test]
    async fn closing_the_monitor_forces_a_stop() {
        let mut rig = rig_with("monitor-closed", endless(), InstantJobApi::new());
        rig.handle.monitor_opened(SurfaceId(50)).await.unwrap();
        rig.handle
            .surface_activated(SurfaceRef::url(4, "https://example.com"))
            .await
            .unwrap();
        rig.handle.start().await.unwrap();
        wait_for_frames(&rig.host).await;

        rig.handle.monitor_closed().await.unwrap();
        let notes = until(&mut rig.notes, |n| n.state == SessionState::Idle).await;
        assert!(notes
            .iter()
            .any(|n| n.message.as_deref() == Some("Monitor surface was closed")));
    }

    #[tokio::test]
    async fn lost_stream_stops_with_buffered_frames() {
        let host = FakeHost::new(FakeSourceScript::Frames {
            count: 3,
            width: 16,
            height: 16,
        });
        let mut rig = rig_with("lost", host, InstantJobApi::new());
        rig.handle
            .surface_activated(SurfaceRef::url(4, "https://example.com"))
            .await
            .unwrap();
        rig.handle.start().await.unwrap();

        let notes = until(&mut rig.notes, |n| n.state == SessionState::Idle).await;
        assert!(notes
            .iter()
            .any(|n| n.message.as_deref() == Some("Capture target was lost")));
        assert!(notes.iter().any(|n| n.state == SessionState::Done));
    }

    #[tokio::test]
    async fn acquisition_failure_resets_to_idle() {
        let host = FakeHost::new(FakeSourceScript::FailAcquire("permission denied".into()));
        let mut rig = rig_with("acquire", host, InstantJobApi::new());
        rig.handle
            .surface_activated(SurfaceRef::url(4, "https://example.com"))
            .await
            .unwrap();
        let err = rig.handle.start().await.unwrap_err();
        assert!(matches!(err, LoopcastError::CaptureAcquisition { .. }));

        let notes = until(&mut rig.notes, |n| n.state == SessionState::Idle).await;
        assert_eq!(states(&notes), vec!["awaiting_target", "error", "idle"]);
    }

    #[tokio::test]
    async fn zero_frame_capture_is_an_error_not_an_artifact() {
        let host = FakeHost::new(FakeSourceScript::Frames {
            count: 0,
            width: 16,
            height: 16,
        });
        let mut rig = rig_with("empty", host, InstantJobApi::new());
        rig.handle
            .surface_activated(SurfaceRef::url(4, "https://example.com"))
            .await
            .unwrap();
        rig.handle.start().await.unwrap();

        let notes = until(&mut rig.notes, |n| n.state == SessionState::Idle).await;
        let error = notes
            .iter()
            .find(|n| n.state.label() == "error")
            .unwrap();
        assert!(error.message.as_deref().unwrap_or("").contains("Encode failed"));
        assert!(rig.jobs.uploads().is_empty());
    }

    #[tokio::test]
    async fn upload_failure_leaves_coordinator_ready() {
        let mut rig = rig_with("upload", endless(), InstantJobApi::failing_upload("connection refused"));
        rig.handle
            .surface_activated(SurfaceRef::url(4, "https://example.com"))
            .await
            .unwrap();
        rig.handle.start().await.unwrap();
        wait_for_frames(&rig.host).await;
        rig.handle.stop().await.unwrap();

        let notes = until(&mut rig.notes, |n| n.state == SessionState::Idle).await;
        assert!(notes.iter().any(|n| n.state.label() == "error"));

        // A fresh start is accepted.
        assert!(matches!(
            rig.handle.start().await.unwrap(),
            StartOutcome::Started { .. }
        ));
        rig.handle.stop().await.unwrap();
        until(&mut rig.notes, |n| n.state == SessionState::Idle).await;
    }

    #[tokio::test]
    async fn conversion_failure_cleans_up_the_job() {
        let mut rig = rig_with(
            "convert",
            endless(),
            InstantJobApi::failing_conversion("Invalid data found"),
        );
        rig.handle
            .surface_activated(SurfaceRef::url(4, "https://example.com"))
            .await
            .unwrap();
        rig.handle.start().await.unwrap();
        wait_for_frames(&rig.host).await;
        rig.handle.stop().await.unwrap();

        let notes = until(&mut rig.notes, |n| n.state == SessionState::Idle).await;
        let error = notes
            .iter()
            .find(|n| n.state.label() == "error")
            .unwrap();
        assert!(error
            .message
            .as_deref()
            .unwrap_or("")
            .contains("Invalid data found"));
        assert_eq!(rig.jobs.deleted(), vec!["job-1".to_string()]);
    }

    #[tokio::test]
    async fn start_while_processing_is_refused() {
        let mut rig = rig_with("busy", endless(), InstantJobApi::new());
        rig.handle
            .surface_activated(SurfaceRef::url(4, "https://example.com"))
            .await
            .unwrap();
        rig.handle.start().await.unwrap();
        wait_for_frames(&rig.host).await;
        rig.handle.stop().await.unwrap();

        // Stopping is entered synchronously with the stop reply.
        let err = rig.handle.start().await.unwrap_err();
        assert!(matches!(err, LoopcastError::InvalidTransition { .. }));
        until(&mut rig.notes, |n| n.state == SessionState::Idle).await;
        assert_eq!(rig.host.acquisitions(), 1);
    }

    #[tokio::test]
    async fn cursor_updates_reach_composited_frames() {
        let host = endless().with_pointer(vec![
            PointerUpdate::CursorMove { x: 2.0, y: 2.0 },
            PointerUpdate::CursorDown { x: 4.0, y: 3.0 },
        ]);
        let mut rig = rig_with("cursor", host, InstantJobApi::new());
        rig.handle
            .surface_activated(SurfaceRef::url(4, "https://example.com"))
            .await
            .unwrap();
        rig.handle.start().await.unwrap();

        let mut drawn = false;
        for _ in 0..1000 {
            drawn = rig
                .host
                .encoded_frames()
                .iter()
                .any(|f| *f.get_pixel(4, 3) != crate::testing::FAKE_BACKGROUND);
            if drawn {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert!(drawn, "cursor never drawn at the latest sample");
        rig.handle.stop().await.unwrap();
        until(&mut rig.notes, |n| n.state == SessionState::Idle).await;
    }

    #[derive(Debug, Clone)]
    enum Op {
        Start,
        Stop,
        Pause(u64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => Just(Op::Start),
            2 => Just(Op::Stop),
            2 => (0u64..4).prop_map(Op::Pause),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn at_most_one_capture_is_ever_live(ops in prop::collection::vec(op(), 1..12)) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let (max_live, live) = runtime.block_on(async move {
                let mut rig = rig_with("single-flight", endless(), InstantJobApi::new());
                rig.handle
                    .surface_activated(SurfaceRef::url(1, "https://example.com"))
                    .await
                    .unwrap();
                for op in ops {
                    match op {
                        Op::Start => { let _ = rig.handle.start().await; }
                        Op::Stop => { let _ = rig.handle.stop().await; }
                        Op::Pause(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
                    }
                    let session = rig.handle.snapshot().await.unwrap();
                    if session.state == SessionState::Recording {
                        assert!(rig.host.live_streams() <= 1);
                    }
                }

                // Drain to idle.
                loop {
                    let state = rig.handle.snapshot().await.unwrap().state;
                    match state {
                        SessionState::Idle => break,
                        SessionState::Recording => { let _ = rig.handle.stop().await; }
                        _ => {}
                    }
                    tokio::select! {
                        _ = rig.notes.recv() => {}
                        _ = tokio::time::sleep(Duration::from_millis(5)) => {}
                    }
                }
                for _ in 0..200 {
                    if rig.host.live_streams() == 0 {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
                (rig.host.max_live_streams(), rig.host.live_streams())
            });
            prop_assert!(max_live <= 1);
            prop_assert_eq!(live, 0);
        }
    }
}
