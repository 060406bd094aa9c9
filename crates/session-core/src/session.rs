//! Device session state and command handlers.
//!
//! All handlers execute on the worker thread, so device mutation itself
//! is single-threaded. The session lock guards the state reads exposed
//! to caller threads and the handoff points where handles enter or
//! leave the session; device calls that can take time (close, open)
//! happen outside it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::time::Duration;

use camhub_common::clock::RecordingClock;
use camhub_common::config::HubConfig;
use camhub_common::error::CamhubResult;

use crate::command::Command;
use crate::device::{DeviceHandle, DeviceTransport};
use crate::frame::{Compositor, PreviewTarget, TargetId};
use crate::listener::ListenerRegistry;
use crate::peripheral::{MediaIndex, ShutterSound};
use crate::recording::{EncoderEvents, EncoderInput, EncoderKind, MuxerHandle, RecordingPipeline};

/// Where the recording sub-state currently is.
///
/// Transitions happen under the session lock, driven by commands on the
/// worker thread and by encoder callbacks on pipeline threads:
/// `Idle -> Starting` in `handle_start_recording`, `Starting -> Active`
/// on the video encoder's prepared callback, `-> Stopping` once the
/// muxer stop is requested, and `Stopping -> Idle` when the stopped
/// callback lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecordingPhase {
    Idle,
    Starting,
    Active,
    Stopping,
}

impl RecordingPhase {
    /// Whether callers should see this as "recording".
    pub(crate) fn is_recording(self) -> bool {
        matches!(self, RecordingPhase::Starting | RecordingPhase::Active)
    }
}

/// Session state guarded by the session lock.
pub(crate) struct SessionState {
    /// Open device handle; present iff the device is open.
    pub device: Option<Box<dyn DeviceHandle>>,

    /// Identifier of the render target preview streams into.
    pub preview_target: Option<TargetId>,

    /// Active muxer; taken out when a stop is requested.
    pub muxer: Option<Box<dyn MuxerHandle>>,

    pub recording: RecordingPhase,

    /// Render target registered for the video encoder's input surface.
    /// Must be unregistered before the recording teardown completes.
    pub encoder_target: Option<TargetId>,

    /// Clock backing the recording-elapsed query.
    pub recording_clock: Option<RecordingClock>,

    /// Once true, no new recording may start.
    pub shutting_down: bool,

    /// A deferred shutdown is owed once the recording teardown
    /// acknowledges.
    pub shutdown_pending: bool,

    /// Bumped by `handle_stop_preview`; `disconnect()` waits for the
    /// value it read to change.
    pub preview_stop_epoch: u64,

    /// The worker loop has exited.
    pub terminated: bool,
}

impl SessionState {
    fn new() -> Self {
        Self {
            device: None,
            preview_target: None,
            muxer: None,
            recording: RecordingPhase::Idle,
            encoder_target: None,
            recording_clock: None,
            shutting_down: false,
            shutdown_pending: false,
            preview_stop_epoch: 0,
            terminated: false,
        }
    }
}

/// Encoder render targets get identifiers from a range caller-chosen
/// surface ids do not use.
const ENCODER_TARGET_BASE: TargetId = 1 << 32;

/// State and collaborators shared between the facade, the worker, and
/// encoder callbacks.
pub(crate) struct SessionShared {
    pub state: Mutex<SessionState>,

    /// Signaled by `handle_stop_preview`; `disconnect()` waits on it.
    pub preview_ack: Condvar,

    /// Signaled when the worker loop exits.
    pub lifecycle: Condvar,

    pub listeners: ListenerRegistry,
    pub compositor: Arc<dyn Compositor>,
    pub media_index: Arc<dyn MediaIndex>,
    pub shutter: Arc<dyn ShutterSound>,
    pub config: HubConfig,

    queue: Sender<Command>,
    next_encoder_target: AtomicU64,
}

impl SessionShared {
    pub(crate) fn new(
        config: HubConfig,
        compositor: Arc<dyn Compositor>,
        media_index: Arc<dyn MediaIndex>,
        shutter: Arc<dyn ShutterSound>,
        queue: Sender<Command>,
    ) -> Self {
        Self {
            state: Mutex::new(SessionState::new()),
            preview_ack: Condvar::new(),
            lifecycle: Condvar::new(),
            listeners: ListenerRegistry::new(),
            compositor,
            media_index,
            shutter,
            config,
            queue,
            next_encoder_target: AtomicU64::new(ENCODER_TARGET_BASE),
        }
    }

    /// Take the session lock, recovering from poisoning: the state is
    /// plain data and stays usable after a panicking holder.
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Enqueue a command; silently dropped once the worker is gone.
    pub(crate) fn post(&self, command: Command) {
        if self.queue.send(command).is_err() {
            tracing::debug!("Command dropped; worker already terminated");
        }
    }

    fn alloc_encoder_target(&self) -> TargetId {
        self.next_encoder_target.fetch_add(1, Ordering::Relaxed)
    }
}

/// What the worker loop does after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Exit,
}

/// Owns the device-facing collaborators and executes commands.
pub(crate) struct DeviceSession {
    shared: Arc<SessionShared>,
    transport: Box<dyn DeviceTransport>,
    pipeline: Arc<dyn RecordingPipeline>,
}

impl DeviceSession {
    pub(crate) fn new(
        shared: Arc<SessionShared>,
        transport: Box<dyn DeviceTransport>,
        pipeline: Arc<dyn RecordingPipeline>,
    ) -> Self {
        Self {
            shared,
            transport,
            pipeline,
        }
    }

    pub(crate) fn dispatch(&mut self, command: Command) -> Flow {
        tracing::trace!(?command, "dispatch");
        match command {
            Command::Open => self.handle_open(),
            Command::Close => self.handle_close(),
            Command::StartPreview(target) => self.handle_start_preview(target),
            Command::StopPreview => self.handle_stop_preview(),
            Command::CaptureStill => self.handle_capture_still(),
            Command::StartRecording => self.handle_start_recording(),
            Command::StopRecording => self.handle_stop_recording(),
            Command::MediaReady(path) => self.handle_media_ready(path),
            Command::Shutdown => return self.handle_shutdown(),
        }
        Flow::Continue
    }

    /// Idempotently closes any stale handle, opens the device, then
    /// broadcasts the connected event.
    fn handle_open(&mut self) {
        tracing::debug!("handle_open");
        self.handle_close();
        match self.transport.open() {
            Ok(handle) => {
                {
                    let mut state = self.shared.lock_state();
                    state.device = Some(handle);
                }
                self.shared.listeners.broadcast_connected();
            }
            Err(e) => {
                // The session stays closed; callers observe the failure
                // through is_connected() remaining false.
                tracing::error!(error = %e, "Failed to open device");
            }
        }
    }

    /// Stops recording, closes the device, and broadcasts disconnected —
    /// only if a device had actually been open.
    fn handle_close(&mut self) {
        tracing::debug!("handle_close");
        self.handle_stop_recording();
        let device = {
            let mut state = self.shared.lock_state();
            state.preview_target = None;
            state.device.take()
        };
        if let Some(mut device) = device {
            device.stop_streaming();
            device.close();
            self.shared.listeners.broadcast_disconnected();
        }
    }

    /// No-op when the device is not open.
    fn handle_start_preview(&mut self, target: PreviewTarget) {
        tracing::debug!(target_id = target.id, "handle_start_preview");
        let mut state = self.shared.lock_state();
        let Some(device) = state.device.as_mut() else {
            return;
        };
        if let Err(e) = device.attach_target(Arc::clone(&target.sink)) {
            tracing::error!(error = %e, "Failed to attach preview target");
            return;
        }
        if let Err(e) = device.start_streaming() {
            tracing::error!(error = %e, "Failed to start streaming");
            return;
        }
        state.preview_target = Some(target.id);
    }

    /// Stops streaming when a device is open, and unconditionally wakes
    /// any thread blocked in `disconnect()` so it can never hang.
    fn handle_stop_preview(&mut self) {
        tracing::debug!("handle_stop_preview");
        let mut state = self.shared.lock_state();
        if let Some(device) = state.device.as_mut() {
            device.stop_streaming();
        }
        if let Some(id) = state.preview_target.take() {
            tracing::debug!(target_id = id, "Preview target detached");
        }
        state.preview_stop_epoch += 1;
        self.shared.preview_ack.notify_all();
    }

    /// Plays shutter feedback. Still-frame capture is not implemented;
    /// this command is a pass-through stub beyond the click.
    fn handle_capture_still(&mut self) {
        tracing::debug!("handle_capture_still");
        self.shared.shutter.play(&self.shared.config.shutter);
    }

    /// No-op when the device is not open, a recording already exists, or
    /// the session is shutting down. Otherwise builds a muxer, attaches
    /// the encoders, and starts them; the video encoder's prepared
    /// callback later registers its input surface as a recordable
    /// render target.
    fn handle_start_recording(&mut self) {
        tracing::debug!("handle_start_recording");
        {
            let state = self.shared.lock_state();
            if state.device.is_none()
                || state.recording != RecordingPhase::Idle
                || state.shutting_down
            {
                return;
            }
        }

        let events: Arc<dyn EncoderEvents> = Arc::new(EncoderBridge {
            shared: Arc::downgrade(&self.shared),
        });
        let hint = self.shared.config.recording.container_ext.clone();
        let mut muxer = match self.pipeline.create_muxer(&hint, events) {
            Ok(muxer) => muxer,
            Err(e) => {
                // No synchronous error crosses the command boundary; the
                // caller observes is_recording() staying false.
                tracing::error!(error = %e, "Failed to create muxer");
                return;
            }
        };

        if let Err(e) = self.attach_encoders(muxer.as_mut()) {
            tracing::error!(error = %e, "Failed to attach encoders");
            return;
        }

        // The phase moves to Starting before prepare(), so encoder
        // callbacks arriving from pipeline threads always find the
        // recording they belong to.
        {
            let mut state = self.shared.lock_state();
            state.recording = RecordingPhase::Starting;
            state.recording_clock = Some(RecordingClock::start());
        }

        let started = muxer.prepare().and_then(|()| muxer.start());
        match started {
            Ok(()) => {
                self.shared.lock_state().muxer = Some(muxer);
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to start recording");
                let encoder_target = {
                    let mut state = self.shared.lock_state();
                    state.recording = RecordingPhase::Idle;
                    state.recording_clock = None;
                    state.encoder_target.take()
                };
                // A prepared callback may already have registered the
                // encoder surface; take it back out of the fan-out.
                if let Some(id) = encoder_target {
                    self.shared.compositor.remove_target(id);
                }
            }
        }
    }

    fn attach_encoders(&self, muxer: &mut dyn MuxerHandle) -> CamhubResult<()> {
        muxer.attach_encoder(EncoderKind::Video)?;
        if self.shared.config.recording.capture_audio {
            muxer.attach_encoder(EncoderKind::Audio)?;
        }
        Ok(())
    }

    /// Requests an asynchronous muxer stop; completion arrives through
    /// the encoder-stopped callback. Never blocks the worker.
    fn handle_stop_recording(&mut self) {
        let muxer = {
            let mut state = self.shared.lock_state();
            let muxer = state.muxer.take();
            if muxer.is_some() {
                state.recording = RecordingPhase::Stopping;
            }
            muxer
        };
        if let Some(muxer) = muxer {
            tracing::debug!("handle_stop_recording");
            muxer.stop();
        }
    }

    /// Best-effort storage-index notification.
    fn handle_media_ready(&mut self, path: PathBuf) {
        tracing::debug!(path = %path.display(), "handle_media_ready");
        if let Err(e) = self.shared.media_index.notify_new_media(&path) {
            tracing::warn!(error = %e, "Failed to index new media");
        }
    }

    /// Full teardown. Exits the loop unless a recording teardown is
    /// still in flight; then the pending flag defers the exit to the
    /// encoder-stopped callback, which re-posts Shutdown.
    fn handle_shutdown(&mut self) -> Flow {
        tracing::debug!("handle_shutdown");
        self.shared.lock_state().shutting_down = true;
        self.handle_close();
        self.transport.release();

        let mut state = self.shared.lock_state();
        if state.recording != RecordingPhase::Idle {
            state.shutdown_pending = true;
            tracing::debug!(
                phase = ?state.recording,
                "Deferring shutdown until recording teardown completes"
            );
            return Flow::Continue;
        }
        state.shutdown_pending = false;
        Flow::Exit
    }
}

/// Routes encoder callbacks back into session state.
///
/// Holds only a weak reference: after the session is gone the upgrade
/// fails and the callback is dropped, never touching freed state.
pub(crate) struct EncoderBridge {
    pub(crate) shared: Weak<SessionShared>,
}

impl EncoderEvents for EncoderBridge {
    fn on_prepared(&self, kind: EncoderKind, input: Option<EncoderInput>) {
        if kind != EncoderKind::Video {
            return;
        }
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let Some(input) = input else {
            tracing::warn!("Video encoder prepared without an input surface");
            return;
        };

        let id = shared.alloc_encoder_target();
        {
            let mut state = shared.lock_state();
            if state.recording != RecordingPhase::Starting {
                tracing::warn!(
                    phase = ?state.recording,
                    "Dropping encoder-prepared callback outside recording start"
                );
                return;
            }
            state.recording = RecordingPhase::Active;
            state.encoder_target = Some(id);
        }
        // Recorded video is a derived consumer of the same composited
        // frame stream as live preview: the encoder input joins the
        // fan-out as a recordable target.
        shared
            .compositor
            .add_target(id, input.sink, true, input.listener);
        tracing::debug!(target_id = id, "Encoder surface registered");
    }

    fn on_stopped(&self, kind: EncoderKind, output: Option<PathBuf>) {
        if kind != EncoderKind::Video {
            return;
        }
        let Some(shared) = self.shared.upgrade() else {
            return;
        };

        let (encoder_target, resume_shutdown) = {
            let mut state = shared.lock_state();
            state.recording = RecordingPhase::Idle;
            state.recording_clock = None;
            state.muxer = None;
            let resume = state.shutdown_pending;
            state.shutdown_pending = false;
            (state.encoder_target.take(), resume)
        };

        if let Some(id) = encoder_target {
            shared.compositor.remove_target(id);
        }
        if let Some(path) = output {
            schedule_media_ready(&shared, path);
        }
        if resume_shutdown {
            tracing::debug!("Recording teardown complete; resuming shutdown");
            shared.post(Command::Shutdown);
        }
    }
}

/// Delivers the media-ready command after the configured delay without
/// blocking the worker.
fn schedule_media_ready(shared: &Arc<SessionShared>, path: PathBuf) {
    let delay = Duration::from_millis(shared.config.recording.media_ready_delay_ms);
    let queue_shared = Arc::downgrade(shared);
    let spawned = std::thread::Builder::new()
        .name("media-ready-timer".into())
        .spawn(move || {
            std::thread::sleep(delay);
            if let Some(shared) = queue_shared.upgrade() {
                shared.post(Command::MediaReady(path));
            }
        });
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "Failed to schedule media-ready notification");
    }
}
