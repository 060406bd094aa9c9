//! Recording pipeline contract: muxer plus encoders with asynchronous
//! stop completion.

use std::path::PathBuf;
use std::sync::Arc;

use camhub_common::error::CamhubResult;

use crate::frame::{FrameListener, FrameSink};

/// Encoder flavors a muxer can host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderKind {
    Video,
    Audio,
}

/// Input surface handed back by a prepared video encoder.
pub struct EncoderInput {
    /// Sink the compositor fans frames into.
    pub sink: Arc<dyn FrameSink>,

    /// Optional per-frame nudge for encoders that schedule an encode
    /// pass on frame arrival.
    pub listener: Option<Arc<dyn FrameListener>>,
}

/// Callbacks the pipeline delivers from its own threads.
pub trait EncoderEvents: Send + Sync {
    /// An encoder finished preparing. For the video encoder, `input` is
    /// the surface the session registers with the compositor as a
    /// recordable render target.
    fn on_prepared(&self, kind: EncoderKind, input: Option<EncoderInput>);

    /// An encoder finished tearing down. `output` carries the final
    /// output path when one was written.
    fn on_stopped(&self, kind: EncoderKind, output: Option<PathBuf>);
}

/// Factory for muxers.
pub trait RecordingPipeline: Send + Sync {
    /// Create a muxer writing a container chosen from `output_hint` (an
    /// extension such as ".mp4"; ".m4a" records audio only). Fails with
    /// a recording error if the output cannot be created.
    fn create_muxer(
        &self,
        output_hint: &str,
        events: Arc<dyn EncoderEvents>,
    ) -> CamhubResult<Box<dyn MuxerHandle>>;
}

/// A muxer combining encoder output into one file.
pub trait MuxerHandle: Send {
    /// Attach an encoder of the given kind.
    fn attach_encoder(&mut self, kind: EncoderKind) -> CamhubResult<()>;

    /// Prepare all attached encoders. `EncoderEvents::on_prepared` fires
    /// per encoder once it is ready.
    fn prepare(&mut self) -> CamhubResult<()>;

    /// Start writing.
    fn start(&mut self) -> CamhubResult<()>;

    /// Request an asynchronous stop. Completion is reported through
    /// `EncoderEvents::on_stopped`; callers must not block waiting.
    fn stop(self: Box<Self>);
}
