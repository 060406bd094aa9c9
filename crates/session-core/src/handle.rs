//! The public session facade.

use std::sync::Arc;
use std::time::Duration;

use crate::command::Command;
use crate::frame::{FrameListener, FrameSink, TargetId};
use crate::listener::ConnectionListener;
use crate::session::SessionShared;

/// How long `disconnect()` waits for the worker to acknowledge that
/// preview has stopped.
const PREVIEW_STOP_TIMEOUT: Duration = Duration::from_secs(3);

/// Cloneable handle to one camera session.
///
/// All device work is forwarded to the session's worker thread; the
/// handle itself is cheap to clone and safe to use from any thread.
/// Callers observe failures through the state queries (`is_connected`,
/// `is_recording`) rather than through errors crossing the command
/// boundary.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<SessionShared>,
}

impl SessionHandle {
    pub(crate) fn new(shared: Arc<SessionShared>) -> Self {
        Self { shared }
    }

    /// Open the device and start preview — or, when the device is
    /// already open, just re-broadcast the connected event so a
    /// not-yet-notified listener catches up.
    pub fn connect(&self) {
        tracing::debug!("connect");
        if !self.is_connected() {
            self.shared.post(Command::Open);
            self.shared
                .post(Command::StartPreview(self.shared.compositor.preview_target()));
        } else {
            self.shared.listeners.broadcast_connected();
        }
    }

    /// Join an already-open session without re-opening the device.
    pub fn connect_secondary(&self) {
        tracing::debug!("connect_secondary");
        if self.is_connected() {
            self.shared.listeners.broadcast_connected();
        }
    }

    /// Stop recording and preview, wait until the worker has
    /// acknowledged the preview stop (bounded), then close the device.
    ///
    /// The wait exists so the render target is never released while a
    /// frame delivery is still in flight; this call therefore takes a
    /// moment to execute.
    pub fn disconnect(&self) {
        tracing::debug!("disconnect");
        self.stop_recording();
        let epoch = {
            let state = self.shared.lock_state();
            if state.terminated {
                return;
            }
            state.preview_stop_epoch
        };
        self.shared.post(Command::StopPreview);

        let guard = self.shared.lock_state();
        let (guard, wait) = self
            .shared
            .preview_ack
            .wait_timeout_while(guard, PREVIEW_STOP_TIMEOUT, |s| {
                s.preview_stop_epoch == epoch && !s.terminated
            })
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if wait.timed_out() {
            tracing::warn!("Timed out waiting for preview-stop acknowledgment");
        }
        drop(guard);

        self.shared.post(Command::Close);
    }

    /// Whether the device is currently open. False once the session has
    /// been torn down.
    pub fn is_connected(&self) -> bool {
        let state = self.shared.lock_state();
        !state.terminated && state.device.is_some()
    }

    /// Whether a recording is starting or active. False once the
    /// session has been torn down.
    pub fn is_recording(&self) -> bool {
        let state = self.shared.lock_state();
        !state.terminated && state.recording.is_recording()
    }

    /// Seconds since the current recording started, or 0.0 when no
    /// recording is in progress.
    pub fn recording_elapsed_secs(&self) -> f64 {
        let state = self.shared.lock_state();
        state
            .recording_clock
            .as_ref()
            .map(|clock| clock.elapsed_secs())
            .unwrap_or(0.0)
    }

    /// Register a render target with the compositor. The compositor is
    /// independently thread-safe, so this is not queued.
    pub fn add_render_target(
        &self,
        id: TargetId,
        sink: Arc<dyn FrameSink>,
        recordable: bool,
        listener: Option<Arc<dyn FrameListener>>,
    ) {
        tracing::debug!(id, recordable, "add_render_target");
        self.shared.compositor.add_target(id, sink, recordable, listener);
    }

    /// Remove a render target from the compositor.
    pub fn remove_render_target(&self, id: TargetId) {
        tracing::debug!(id, "remove_render_target");
        self.shared.compositor.remove_target(id);
    }

    /// Fire-and-forget still capture (shutter feedback only).
    pub fn capture_still(&self) {
        self.shared.post(Command::CaptureStill);
    }

    /// Start recording unless one is already starting or active.
    pub fn start_recording(&self) {
        if !self.is_recording() {
            self.shared.post(Command::StartRecording);
        }
    }

    /// Stop the active recording; a no-op when none is running.
    pub fn stop_recording(&self) {
        if self.is_recording() {
            self.shared.post(Command::StopRecording);
        }
    }

    /// Register a connection listener.
    pub fn register_listener(&self, listener: Arc<dyn ConnectionListener>) {
        self.shared.listeners.register(listener);
    }

    /// Unregister one registration. Returns true when the registry is
    /// now empty — the caller's cue to consider releasing the session.
    pub fn unregister_listener(&self, listener: &Arc<dyn ConnectionListener>) -> bool {
        self.shared.listeners.unregister(listener)
    }

    /// Disconnect, drop all listeners, release the compositor, and ask
    /// the worker to shut down. Safe to call more than once; a second
    /// call finds the device already gone and performs no device work.
    pub fn release(&self) {
        tracing::debug!("release");
        self.disconnect();
        self.shared.listeners.clear();
        self.shared.compositor.release();
        self.shared.post(Command::Shutdown);
    }

    /// Block until the worker loop has exited, up to `timeout`.
    /// Returns true if the worker terminated.
    pub fn wait_for_shutdown(&self, timeout: Duration) -> bool {
        let guard = self.shared.lock_state();
        let (guard, _) = self
            .shared
            .lifecycle
            .wait_timeout_while(guard, timeout, |s| !s.terminated)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.terminated
    }
}
