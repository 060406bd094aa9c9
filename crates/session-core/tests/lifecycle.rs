//! End-to-end lifecycle tests against the synthetic collaborators.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use camhub_common::config::HubConfig;
use camhub_common::error::CamhubResult;
use camhub_session::frame::{Compositor, Frame, FrameSink, PreviewTarget, TargetId};
use camhub_session::listener::ConnectionListener;
use camhub_session::peripheral::{MediaIndex, SilentShutter};
use camhub_session::synthetic::{
    CountingListener, PipelineStats, SyntheticPipeline, SyntheticTransport, TransportStats,
};
use camhub_session::{spawn_session, SessionHandle, SessionParts};

const SETTLE: Duration = Duration::from_secs(2);

static DIR_SEQ: AtomicUsize = AtomicUsize::new(0);

fn test_dir() -> PathBuf {
    std::env::temp_dir().join(format!(
        "camhub-lifecycle-{}-{}",
        std::process::id(),
        DIR_SEQ.fetch_add(1, Ordering::SeqCst)
    ))
}

/// Poll until `pred` holds or `timeout` elapses.
fn wait_until(timeout: Duration, pred: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if pred() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    pred()
}

struct NullSink;

impl FrameSink for NullSink {
    fn submit(&self, _frame: &Frame) {}
}

/// Compositor that records registrations instead of fanning out frames.
#[derive(Default)]
struct ProbeCompositor {
    targets: Mutex<Vec<(TargetId, bool)>>,
    released: AtomicBool,
}

impl ProbeCompositor {
    fn recordable_count(&self) -> usize {
        self.targets
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, recordable)| *recordable)
            .count()
    }
}

impl Compositor for ProbeCompositor {
    fn add_target(
        &self,
        id: TargetId,
        _sink: Arc<dyn FrameSink>,
        recordable: bool,
        _listener: Option<Arc<dyn camhub_session::frame::FrameListener>>,
    ) {
        self.targets.lock().unwrap().push((id, recordable));
    }

    fn remove_target(&self, id: TargetId) {
        self.targets.lock().unwrap().retain(|(tid, _)| *tid != id);
    }

    fn preview_target(&self) -> PreviewTarget {
        PreviewTarget {
            id: 0,
            sink: Arc::new(NullSink),
        }
    }

    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
        self.targets.lock().unwrap().clear();
    }
}

/// Media index that records every notified path.
#[derive(Default)]
struct RecordingMediaIndex {
    paths: Mutex<Vec<PathBuf>>,
}

impl RecordingMediaIndex {
    fn count(&self) -> usize {
        self.paths.lock().unwrap().len()
    }

    fn first(&self) -> Option<PathBuf> {
        self.paths.lock().unwrap().first().cloned()
    }
}

impl MediaIndex for RecordingMediaIndex {
    fn notify_new_media(&self, path: &Path) -> CamhubResult<()> {
        self.paths.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }
}

struct Fixture {
    handle: SessionHandle,
    transport: Arc<TransportStats>,
    pipeline: Arc<PipelineStats>,
    compositor: Arc<ProbeCompositor>,
    media: Arc<RecordingMediaIndex>,
}

fn fixture() -> Fixture {
    fixture_with(SyntheticTransport::new(30))
}

fn fixture_with(transport: SyntheticTransport) -> Fixture {
    let out_dir = test_dir();
    std::fs::create_dir_all(&out_dir).unwrap();

    let transport_stats = transport.stats();
    let pipeline = SyntheticPipeline::new(&out_dir);
    let pipeline_stats = pipeline.stats();
    let compositor = Arc::new(ProbeCompositor::default());
    let media = Arc::new(RecordingMediaIndex::default());

    let mut config = HubConfig::default();
    config.recording.media_ready_delay_ms = 50;

    let handle = spawn_session(
        config,
        SessionParts {
            transport: Box::new(transport),
            pipeline: Arc::new(pipeline),
            compositor: Arc::clone(&compositor) as Arc<dyn Compositor>,
            media_index: Arc::clone(&media) as Arc<dyn MediaIndex>,
            shutter: Arc::new(SilentShutter),
        },
    )
    .expect("spawn session");

    Fixture {
        handle,
        transport: transport_stats,
        pipeline: pipeline_stats,
        compositor,
        media,
    }
}

#[test]
fn connect_then_disconnect_settles_to_closed() {
    let f = fixture();
    f.handle.connect();
    assert!(wait_until(SETTLE, || f.handle.is_connected()));

    f.handle.disconnect();
    assert!(wait_until(SETTLE, || !f.handle.is_connected()));

    assert_eq!(f.transport.opens.load(Ordering::SeqCst), 1);
    assert_eq!(f.transport.closes.load(Ordering::SeqCst), 1);
}

#[test]
fn disconnect_without_device_returns_promptly() {
    let f = fixture();
    let started = Instant::now();
    f.handle.disconnect();
    // The preview-stop acknowledgment is unconditional, so the bounded
    // wait must come back well before its timeout.
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!f.handle.is_connected());
}

#[test]
fn repeated_connect_notifies_listener_at_most_once() {
    let f = fixture();
    let counts = Arc::new(CountingListener::default());
    f.handle
        .register_listener(Arc::clone(&counts) as Arc<dyn ConnectionListener>);

    f.handle.connect();
    assert!(wait_until(SETTLE, || f.handle.is_connected()));
    f.handle.connect();
    f.handle.connect_secondary();

    assert!(wait_until(SETTLE, || counts.connected.load(Ordering::SeqCst) >= 1));
    assert_eq!(counts.connected.load(Ordering::SeqCst), 1);
    assert_eq!(f.transport.opens.load(Ordering::SeqCst), 1);
}

#[test]
fn start_recording_twice_creates_one_muxer() {
    let f = fixture();
    f.handle.connect();
    assert!(wait_until(SETTLE, || f.handle.is_connected()));

    f.handle.start_recording();
    f.handle.start_recording();
    assert!(wait_until(SETTLE, || f.handle.is_recording()));

    // Give the queue time to drain the possible duplicate command.
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(f.pipeline.muxers_created.load(Ordering::SeqCst), 1);
}

#[test]
fn stop_recording_when_idle_is_a_noop() {
    let f = fixture();
    f.handle.connect();
    assert!(wait_until(SETTLE, || f.handle.is_connected()));

    f.handle.stop_recording();
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(f.pipeline.stops_requested.load(Ordering::SeqCst), 0);
    assert_eq!(f.media.count(), 0);
}

#[test]
fn recording_registers_encoder_target_and_reports_media() {
    let f = fixture();
    f.handle.connect();
    assert!(wait_until(SETTLE, || f.handle.is_connected()));

    f.handle.start_recording();
    assert!(wait_until(SETTLE, || f.compositor.recordable_count() == 1));
    assert!(f.handle.is_recording());

    f.handle.stop_recording();
    assert!(wait_until(SETTLE, || f.compositor.recordable_count() == 0));
    assert!(wait_until(SETTLE, || f.media.count() == 1));

    let path = f.media.first().unwrap();
    assert!(path.exists());
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("mp4"));
    assert_eq!(f.pipeline.stops_requested.load(Ordering::SeqCst), 1);
}

#[test]
fn recording_elapsed_tracks_the_active_recording() {
    let f = fixture();
    f.handle.connect();
    assert!(wait_until(SETTLE, || f.handle.is_connected()));
    assert_eq!(f.handle.recording_elapsed_secs(), 0.0);

    f.handle.start_recording();
    assert!(wait_until(SETTLE, || f.handle.is_recording()));
    std::thread::sleep(Duration::from_millis(30));
    assert!(f.handle.recording_elapsed_secs() > 0.0);

    f.handle.stop_recording();
    assert!(wait_until(SETTLE, || f.handle.recording_elapsed_secs() == 0.0));
}

#[test]
fn unregister_last_listener_reports_registry_empty() {
    let f = fixture();
    let first: Arc<dyn ConnectionListener> = Arc::new(CountingListener::default());
    let second: Arc<dyn ConnectionListener> = Arc::new(CountingListener::default());
    f.handle.register_listener(Arc::clone(&first));
    f.handle.register_listener(Arc::clone(&second));

    assert!(!f.handle.unregister_listener(&first));
    assert!(f.handle.unregister_listener(&second));
}

#[test]
fn release_twice_is_safe_and_performs_no_extra_device_work() {
    let f = fixture();
    f.handle.connect();
    assert!(wait_until(SETTLE, || f.handle.is_connected()));

    f.handle.release();
    assert!(f.handle.wait_for_shutdown(SETTLE));
    let opens = f.transport.opens.load(Ordering::SeqCst);
    let closes = f.transport.closes.load(Ordering::SeqCst);
    assert_eq!(opens, 1);
    assert_eq!(closes, 1);
    assert_eq!(f.transport.releases.load(Ordering::SeqCst), 1);
    assert!(f.compositor.released.load(Ordering::SeqCst));

    f.handle.release();
    assert_eq!(f.transport.opens.load(Ordering::SeqCst), opens);
    assert_eq!(f.transport.closes.load(Ordering::SeqCst), closes);
    assert!(!f.handle.is_connected());
}

#[test]
fn release_during_recording_defers_worker_exit_until_teardown() {
    let f = fixture();
    f.handle.connect();
    assert!(wait_until(SETTLE, || f.handle.is_connected()));
    f.handle.start_recording();
    assert!(wait_until(SETTLE, || f.handle.is_recording()));

    f.handle.release();
    assert!(f.handle.wait_for_shutdown(SETTLE));
    assert_eq!(f.pipeline.stops_requested.load(Ordering::SeqCst), 1);
    assert!(!f.handle.is_recording());
}

#[test]
fn failing_listener_is_isolated_and_retried_on_next_broadcast() {
    let f = fixture();
    let flaky = Arc::new(CountingListener::default());
    flaky.fail_next.store(true, Ordering::SeqCst);
    let healthy = Arc::new(CountingListener::default());
    f.handle
        .register_listener(Arc::clone(&flaky) as Arc<dyn ConnectionListener>);
    f.handle
        .register_listener(Arc::clone(&healthy) as Arc<dyn ConnectionListener>);

    f.handle.connect();
    assert!(wait_until(SETTLE, || healthy.connected.load(Ordering::SeqCst) == 1));
    assert_eq!(flaky.connected.load(Ordering::SeqCst), 0);

    // The flaky listener's cookie was not marked connected, so the
    // catch-up broadcast attempts delivery again.
    f.handle.connect();
    assert!(wait_until(SETTLE, || flaky.connected.load(Ordering::SeqCst) == 1));
    assert_eq!(healthy.connected.load(Ordering::SeqCst), 1);
}

#[test]
fn open_failure_leaves_session_closed() {
    let f = fixture_with(SyntheticTransport::failing());
    f.handle.connect();
    std::thread::sleep(Duration::from_millis(100));
    assert!(!f.handle.is_connected());

    // Teardown still works against the never-opened device.
    f.handle.disconnect();
    assert!(!f.handle.is_connected());
}

mod parity {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(12))]

        /// For any connect/disconnect sequence the settled connection
        /// state equals the last operation, and at most one device
        /// handle ever exists at a time.
        #[test]
        fn connect_disconnect_parity(ops in prop::collection::vec(any::<bool>(), 0..6)) {
            let f = fixture();
            let mut expect_connected = false;
            for connect in ops {
                if connect {
                    f.handle.connect();
                    expect_connected = true;
                } else {
                    f.handle.disconnect();
                    expect_connected = false;
                }
                prop_assert!(wait_until(SETTLE, || f.handle.is_connected() == expect_connected));
            }

            prop_assert_eq!(f.handle.is_connected(), expect_connected);
            prop_assert!(f.transport.peak_open.load(Ordering::SeqCst) <= 1);
            let opens = f.transport.opens.load(Ordering::SeqCst);
            let closes = f.transport.closes.load(Ordering::SeqCst);
            prop_assert_eq!(opens - closes, usize::from(expect_connected));

            f.handle.release();
            prop_assert!(f.handle.wait_for_shutdown(SETTLE));
        }
    }
}
