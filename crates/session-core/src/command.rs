//! Commands consumed by the session worker.

use std::fmt;
use std::path::PathBuf;

use crate::frame::PreviewTarget;

/// A discrete, queued request to mutate session state.
///
/// Commands are immutable once enqueued and consumed exactly once, in
/// FIFO order, by the worker thread.
pub(crate) enum Command {
    /// Open the device and broadcast the connected event.
    Open,
    /// Close the device, stopping any recording first.
    Close,
    /// Attach the target and start streaming.
    StartPreview(PreviewTarget),
    /// Stop streaming and wake disconnect waiters.
    StopPreview,
    /// Play shutter feedback; still capture itself is a stub.
    CaptureStill,
    /// Start a new recording if none is active.
    StartRecording,
    /// Request an asynchronous stop of the active recording.
    StopRecording,
    /// Tell the storage index about a finished file.
    MediaReady(PathBuf),
    /// Tear everything down and exit the worker loop.
    Shutdown,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Open => f.write_str("Open"),
            Command::Close => f.write_str("Close"),
            Command::StartPreview(target) => {
                f.debug_tuple("StartPreview").field(&target.id).finish()
            }
            Command::StopPreview => f.write_str("StopPreview"),
            Command::CaptureStill => f.write_str("CaptureStill"),
            Command::StartRecording => f.write_str("StartRecording"),
            Command::StopRecording => f.write_str("StopRecording"),
            Command::MediaReady(path) => f.debug_tuple("MediaReady").field(path).finish(),
            Command::Shutdown => f.write_str("Shutdown"),
        }
    }
}
