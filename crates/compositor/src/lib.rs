//! CamHub Frame Compositor
//!
//! Fans every frame the camera produces out to a dynamic set of render
//! targets: preview surfaces, recording encoder inputs, remote frame
//! observers. The compositor is independently thread-safe; the session
//! core calls in from any thread without holding its own lock.
//!
//! ```text
//! device ──► input sink ──► [target, target, target, ...]
//!                                │
//!                                └─► frame listeners (per target)
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use camhub_session::frame::{Compositor, Frame, FrameListener, FrameSink, PreviewTarget, TargetId};

/// Identifier of the compositor's own input target.
pub const PREVIEW_TARGET_ID: TargetId = 0;

struct Target {
    sink: Arc<dyn FrameSink>,
    recordable: bool,
    listener: Option<Arc<dyn FrameListener>>,
}

#[derive(Default)]
struct Inner {
    /// Insertion-ordered so delivery order is stable across a pass.
    targets: Vec<(TargetId, Target)>,
    released: bool,
    frames_in: u64,
}

/// Thread-safe render-target fan-out.
pub struct FrameCompositor {
    inner: Arc<Mutex<Inner>>,
}

impl FrameCompositor {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    fn lock(inner: &Arc<Mutex<Inner>>) -> MutexGuard<'_, Inner> {
        match inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Number of frames accepted so far.
    pub fn frames_in(&self) -> u64 {
        Self::lock(&self.inner).frames_in
    }

    /// Number of currently registered targets.
    pub fn target_count(&self) -> usize {
        Self::lock(&self.inner).targets.len()
    }

    /// Whether any registered target is tagged recordable.
    pub fn has_recordable_target(&self) -> bool {
        Self::lock(&self.inner)
            .targets
            .iter()
            .any(|(_, target)| target.recordable)
    }
}

impl Default for FrameCompositor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compositor for FrameCompositor {
    fn add_target(
        &self,
        id: TargetId,
        sink: Arc<dyn FrameSink>,
        recordable: bool,
        listener: Option<Arc<dyn FrameListener>>,
    ) {
        let mut inner = Self::lock(&self.inner);
        if inner.released {
            tracing::warn!(id, "Ignoring target registration on released compositor");
            return;
        }
        // Re-registering an id replaces the previous target.
        inner.targets.retain(|(tid, _)| *tid != id);
        inner.targets.push((
            id,
            Target {
                sink,
                recordable,
                listener,
            },
        ));
        tracing::debug!(id, recordable, "Render target added");
    }

    fn remove_target(&self, id: TargetId) {
        let mut inner = Self::lock(&self.inner);
        let before = inner.targets.len();
        inner.targets.retain(|(tid, _)| *tid != id);
        if inner.targets.len() != before {
            tracing::debug!(id, "Render target removed");
        }
    }

    fn preview_target(&self) -> PreviewTarget {
        PreviewTarget {
            id: PREVIEW_TARGET_ID,
            sink: Arc::new(InputSink {
                inner: Arc::clone(&self.inner),
            }),
        }
    }

    fn release(&self) {
        let mut inner = Self::lock(&self.inner);
        inner.released = true;
        inner.targets.clear();
        tracing::debug!("Compositor released");
    }
}

/// The compositor's input surface: frames submitted here fan out to
/// every registered target.
struct InputSink {
    inner: Arc<Mutex<Inner>>,
}

impl FrameSink for InputSink {
    fn submit(&self, frame: &Frame) {
        // Snapshot the targets under the lock and deliver outside it, so
        // a slow consumer cannot block add/remove from other threads.
        let mut sinks: Vec<Arc<dyn FrameSink>> = Vec::new();
        let mut listeners: Vec<Arc<dyn FrameListener>> = Vec::new();
        {
            let mut inner = FrameCompositor::lock(&self.inner);
            if inner.released {
                return;
            }
            inner.frames_in += 1;
            for (_, target) in &inner.targets {
                sinks.push(Arc::clone(&target.sink));
                if let Some(listener) = &target.listener {
                    listeners.push(Arc::clone(listener));
                }
            }
        }
        for sink in &sinks {
            sink.submit(frame);
        }
        for listener in &listeners {
            listener.on_frame_available();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        frames: AtomicUsize,
    }

    impl CountingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                frames: AtomicUsize::new(0),
            })
        }

        fn count(&self) -> usize {
            self.frames.load(Ordering::SeqCst)
        }
    }

    impl FrameSink for CountingSink {
        fn submit(&self, _frame: &Frame) {
            self.frames.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct CountingFrameListener {
        nudges: AtomicUsize,
    }

    impl FrameListener for CountingFrameListener {
        fn on_frame_available(&self) {
            self.nudges.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn frame() -> Frame {
        Frame {
            data: Bytes::from_static(&[0u8; 16]),
            width: 4,
            height: 4,
            timestamp_ns: 0,
        }
    }

    #[test]
    fn frames_fan_out_to_all_targets() {
        let compositor = FrameCompositor::new();
        let first = CountingSink::new();
        let second = CountingSink::new();
        compositor.add_target(1, Arc::clone(&first) as Arc<dyn FrameSink>, false, None);
        compositor.add_target(2, Arc::clone(&second) as Arc<dyn FrameSink>, true, None);

        let input = compositor.preview_target();
        input.sink.submit(&frame());
        input.sink.submit(&frame());

        assert_eq!(first.count(), 2);
        assert_eq!(second.count(), 2);
        assert_eq!(compositor.frames_in(), 2);
        assert!(compositor.has_recordable_target());
    }

    #[test]
    fn removed_target_stops_receiving() {
        let compositor = FrameCompositor::new();
        let sink = CountingSink::new();
        compositor.add_target(7, Arc::clone(&sink) as Arc<dyn FrameSink>, false, None);

        let input = compositor.preview_target();
        input.sink.submit(&frame());
        compositor.remove_target(7);
        input.sink.submit(&frame());

        assert_eq!(sink.count(), 1);
        assert_eq!(compositor.target_count(), 0);
    }

    #[test]
    fn reregistering_an_id_replaces_the_target() {
        let compositor = FrameCompositor::new();
        let old = CountingSink::new();
        let new = CountingSink::new();
        compositor.add_target(3, Arc::clone(&old) as Arc<dyn FrameSink>, false, None);
        compositor.add_target(3, Arc::clone(&new) as Arc<dyn FrameSink>, false, None);

        compositor.preview_target().sink.submit(&frame());

        assert_eq!(old.count(), 0);
        assert_eq!(new.count(), 1);
        assert_eq!(compositor.target_count(), 1);
    }

    #[test]
    fn frame_listeners_are_nudged_per_frame() {
        let compositor = FrameCompositor::new();
        let sink = CountingSink::new();
        let listener = Arc::new(CountingFrameListener {
            nudges: AtomicUsize::new(0),
        });
        compositor.add_target(
            1,
            Arc::clone(&sink) as Arc<dyn FrameSink>,
            true,
            Some(Arc::clone(&listener) as Arc<dyn FrameListener>),
        );

        let input = compositor.preview_target();
        input.sink.submit(&frame());
        input.sink.submit(&frame());

        assert_eq!(listener.nudges.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn release_drops_targets_and_rejects_new_work() {
        let compositor = FrameCompositor::new();
        let sink = CountingSink::new();
        compositor.add_target(1, Arc::clone(&sink) as Arc<dyn FrameSink>, false, None);
        let input = compositor.preview_target();

        compositor.release();
        compositor.release();

        input.sink.submit(&frame());
        assert_eq!(sink.count(), 0);
        assert_eq!(compositor.frames_in(), 0);

        compositor.add_target(2, Arc::clone(&sink) as Arc<dyn FrameSink>, false, None);
        assert_eq!(compositor.target_count(), 0);
    }
}
