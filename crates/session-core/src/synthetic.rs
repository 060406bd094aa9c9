//! Synthetic collaborators for tests and demos.
//!
//! Deterministic in-process stand-ins for the device and the recording
//! pipeline: the camera streams generated frames from its own thread,
//! and the pipeline reports encoder lifecycle events the way a real
//! muxer would, including the asynchronous stop completion.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use bytes::Bytes;
use camhub_common::error::{CamhubError, CamhubResult};

use crate::device::{DeviceHandle, DeviceTransport};
use crate::frame::{Frame, FrameSink};
use crate::listener::ConnectionListener;
use crate::recording::{EncoderEvents, EncoderInput, EncoderKind, MuxerHandle, RecordingPipeline};

/// Frame geometry for the synthetic camera.
const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;

/// Counters shared with tests to observe transport activity.
#[derive(Debug, Default)]
pub struct TransportStats {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub releases: AtomicUsize,
    /// Handles open right now; `peak_open` records the high-water mark.
    pub open_now: AtomicUsize,
    pub peak_open: AtomicUsize,
}

/// A camera that generates frames instead of talking to hardware.
pub struct SyntheticTransport {
    fps: u32,
    stats: Arc<TransportStats>,
    fail_open: bool,
}

impl SyntheticTransport {
    pub fn new(fps: u32) -> Self {
        Self {
            fps,
            stats: Arc::default(),
            fail_open: false,
        }
    }

    /// A transport whose open always fails, for error-path tests.
    pub fn failing() -> Self {
        Self {
            fps: 30,
            stats: Arc::default(),
            fail_open: true,
        }
    }

    pub fn stats(&self) -> Arc<TransportStats> {
        Arc::clone(&self.stats)
    }
}

impl DeviceTransport for SyntheticTransport {
    fn open(&mut self) -> CamhubResult<Box<dyn DeviceHandle>> {
        if self.fail_open {
            return Err(CamhubError::device("synthetic open failure"));
        }
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        let now = self.stats.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak_open.fetch_max(now, Ordering::SeqCst);
        Ok(Box::new(SyntheticCamera {
            fps: self.fps,
            target: None,
            streamer: None,
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::clone(&self.stats),
        }))
    }

    fn release(&mut self) {
        self.stats.releases.fetch_add(1, Ordering::SeqCst);
    }
}

struct SyntheticCamera {
    fps: u32,
    target: Option<Arc<dyn FrameSink>>,
    streamer: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
    stats: Arc<TransportStats>,
}

impl DeviceHandle for SyntheticCamera {
    fn attach_target(&mut self, sink: Arc<dyn FrameSink>) -> CamhubResult<()> {
        self.target = Some(sink);
        Ok(())
    }

    fn start_streaming(&mut self) -> CamhubResult<()> {
        let Some(sink) = self.target.clone() else {
            return Err(CamhubError::device("no target attached"));
        };
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let running = Arc::clone(&self.running);
        let interval = Duration::from_micros(1_000_000 / u64::from(self.fps.max(1)));
        let streamer = std::thread::Builder::new()
            .name("synthetic-camera".into())
            .spawn(move || {
                let start = Instant::now();
                let mut shade = 0u8;
                while running.load(Ordering::SeqCst) {
                    let frame = Frame {
                        data: Bytes::from(vec![shade; (WIDTH * HEIGHT) as usize]),
                        width: WIDTH,
                        height: HEIGHT,
                        timestamp_ns: start.elapsed().as_nanos() as u64,
                    };
                    sink.submit(&frame);
                    shade = shade.wrapping_add(1);
                    std::thread::sleep(interval);
                }
            })
            .map_err(|e| CamhubError::device(format!("failed to spawn streamer: {e}")))?;
        self.streamer = Some(streamer);
        Ok(())
    }

    fn stop_streaming(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(streamer) = self.streamer.take() {
            let _ = streamer.join();
        }
    }

    fn close(mut self: Box<Self>) {
        self.stop_streaming();
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        self.stats.open_now.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Counters shared with tests to observe pipeline activity.
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub muxers_created: AtomicUsize,
    pub stops_requested: AtomicUsize,
}

/// Recording pipeline that simulates encoder lifecycle events.
pub struct SyntheticPipeline {
    output_dir: PathBuf,
    stats: Arc<PipelineStats>,
    counter: AtomicUsize,
}

impl SyntheticPipeline {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            stats: Arc::default(),
            counter: AtomicUsize::new(0),
        }
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }
}

impl RecordingPipeline for SyntheticPipeline {
    fn create_muxer(
        &self,
        output_hint: &str,
        events: Arc<dyn EncoderEvents>,
    ) -> CamhubResult<Box<dyn MuxerHandle>> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let ext = output_hint.trim_start_matches('.');
        let output = self.output_dir.join(format!("capture-{n}.{ext}"));
        self.stats.muxers_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SyntheticMuxer {
            output,
            events,
            encoders: Vec::new(),
            frames: Arc::new(AtomicUsize::new(0)),
            stats: Arc::clone(&self.stats),
        }))
    }
}

/// Encoder input sink that counts submitted frames.
struct CountingSink {
    frames: Arc<AtomicUsize>,
}

impl FrameSink for CountingSink {
    fn submit(&self, _frame: &Frame) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }
}

struct SyntheticMuxer {
    output: PathBuf,
    events: Arc<dyn EncoderEvents>,
    encoders: Vec<EncoderKind>,
    frames: Arc<AtomicUsize>,
    stats: Arc<PipelineStats>,
}

impl MuxerHandle for SyntheticMuxer {
    fn attach_encoder(&mut self, kind: EncoderKind) -> CamhubResult<()> {
        if self.encoders.contains(&kind) {
            return Err(CamhubError::recording("encoder already attached"));
        }
        self.encoders.push(kind);
        Ok(())
    }

    fn prepare(&mut self) -> CamhubResult<()> {
        Ok(())
    }

    fn start(&mut self) -> CamhubResult<()> {
        // Prepared events arrive from a pipeline thread, the way a real
        // encoder delivers them.
        let events = Arc::clone(&self.events);
        let encoders = self.encoders.clone();
        let frames = Arc::clone(&self.frames);
        std::thread::Builder::new()
            .name("synthetic-encoder".into())
            .spawn(move || {
                for kind in encoders {
                    let input = (kind == EncoderKind::Video).then(|| EncoderInput {
                        sink: Arc::new(CountingSink {
                            frames: Arc::clone(&frames),
                        }) as Arc<dyn FrameSink>,
                        listener: None,
                    });
                    events.on_prepared(kind, input);
                }
            })
            .map_err(|e| CamhubError::recording(format!("failed to spawn encoder thread: {e}")))?;
        Ok(())
    }

    fn stop(self: Box<Self>) {
        let SyntheticMuxer {
            output,
            events,
            encoders,
            frames,
            stats,
        } = *self;
        stats.stops_requested.fetch_add(1, Ordering::SeqCst);
        let spawned = std::thread::Builder::new()
            .name("synthetic-muxer-stop".into())
            .spawn(move || {
                let body = format!("frames={}\n", frames.load(Ordering::SeqCst));
                let written = std::fs::write(&output, body);
                if let Err(e) = &written {
                    tracing::warn!(error = %e, "Failed to write synthetic capture file");
                }
                for kind in encoders {
                    let path = written.is_ok().then(|| output.clone());
                    events.on_stopped(kind, path);
                }
            });
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "Failed to spawn muxer stop thread");
        }
    }
}

/// Listener that counts deliveries and can be told to fail once.
#[derive(Debug, Default)]
pub struct CountingListener {
    pub connected: AtomicUsize,
    pub disconnected: AtomicUsize,
    pub fail_next: AtomicBool,
}

impl ConnectionListener for CountingListener {
    fn on_connected(&self) -> CamhubResult<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(CamhubError::listener("listener endpoint gone"));
        }
        self.connected.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_disconnected(&self) -> CamhubResult<()> {
        self.disconnected.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
