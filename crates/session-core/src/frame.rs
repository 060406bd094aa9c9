//! Frame types and the render-target fan-out contract.

use std::sync::Arc;

use bytes::Bytes;

/// Identifier for a render target registered with the compositor.
pub type TargetId = u64;

/// A single decoded frame moving through the fan-out.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw pixel payload; shared, cheap to clone.
    pub data: Bytes,

    /// Frame width in pixels.
    pub width: u32,

    /// Frame height in pixels.
    pub height: u32,

    /// Capture timestamp in nanoseconds since stream start.
    pub timestamp_ns: u64,
}

/// A sink frames are submitted into: a render surface, an encoder input.
pub trait FrameSink: Send + Sync {
    fn submit(&self, frame: &Frame);
}

/// Notified after a frame has been delivered to a target, for consumers
/// that schedule work on frame arrival.
pub trait FrameListener: Send + Sync {
    fn on_frame_available(&self);
}

/// The compositor's input surface plus the identifier the session keeps
/// as its non-owning preview association.
#[derive(Clone)]
pub struct PreviewTarget {
    pub id: TargetId,
    pub sink: Arc<dyn FrameSink>,
}

/// Render-target fan-out the streamed frames are delivered through.
///
/// Implementations are independently thread-safe; the session calls in
/// from any thread without holding its own lock.
pub trait Compositor: Send + Sync {
    /// Register a render target. `recordable` tags targets that consume
    /// frames for encoding rather than display.
    fn add_target(
        &self,
        id: TargetId,
        sink: Arc<dyn FrameSink>,
        recordable: bool,
        listener: Option<Arc<dyn FrameListener>>,
    );

    /// Remove a previously registered target. Unknown ids are ignored.
    fn remove_target(&self, id: TargetId);

    /// The input target the device streams into.
    fn preview_target(&self) -> PreviewTarget;

    /// Drop all targets and stop accepting frames. Idempotent.
    fn release(&self);
}
