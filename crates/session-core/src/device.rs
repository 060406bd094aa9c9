//! Device transport contract.

use std::sync::Arc;

use camhub_common::error::CamhubResult;

use crate::frame::FrameSink;

/// Control connection to one physical camera.
///
/// The session's worker thread owns the transport exclusively. `open`
/// produces the streaming handle; `release` tears down the control
/// resources when the session shuts down.
pub trait DeviceTransport: Send {
    /// Open the device. Synchronous and fallible, never partial: on
    /// error no handle exists and the device stays closed.
    fn open(&mut self) -> CamhubResult<Box<dyn DeviceHandle>>;

    /// Close control resources. Idempotent.
    fn release(&mut self);
}

/// An open device streaming frames into an attached target.
pub trait DeviceHandle: Send {
    /// Attach the render target frames are delivered to.
    fn attach_target(&mut self, sink: Arc<dyn FrameSink>) -> CamhubResult<()>;

    /// Start streaming into the attached target.
    fn start_streaming(&mut self) -> CamhubResult<()>;

    /// Stop streaming. Safe to call when not streaming.
    fn stop_streaming(&mut self);

    /// Tear the device down.
    fn close(self: Box<Self>);
}
