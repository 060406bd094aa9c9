//! Record a clip through the full session lifecycle.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use camhub_common::config::HubConfig;
use camhub_compositor::FrameCompositor;
use camhub_session::frame::Compositor;
use camhub_session::peripheral::{LoggingMediaIndex, SilentShutter};
use camhub_session::synthetic::{SyntheticPipeline, SyntheticTransport};
use camhub_session::{spawn_session, SessionParts};

pub async fn run(output: PathBuf, duration: u64, fps: u32, no_audio: bool) -> anyhow::Result<()> {
    println!("Recording from synthetic camera");
    println!("  Output: {}", output.display());
    println!("  FPS: {fps}");
    println!("  Audio: {}", !no_audio);
    println!();

    std::fs::create_dir_all(&output)?;

    let mut config = HubConfig::default();
    config.recording.capture_audio = !no_audio;
    let media_ready_delay = Duration::from_millis(config.recording.media_ready_delay_ms);

    let compositor = Arc::new(FrameCompositor::new());
    let pipeline = Arc::new(SyntheticPipeline::new(&output));
    let pipeline_stats = pipeline.stats();

    let handle = spawn_session(
        config,
        SessionParts {
            transport: Box::new(SyntheticTransport::new(fps)),
            pipeline,
            compositor: Arc::clone(&compositor) as Arc<dyn Compositor>,
            media_index: Arc::new(LoggingMediaIndex),
            shutter: Arc::new(SilentShutter),
        },
    )?;

    handle.register_listener(Arc::new(super::PrintingListener));

    handle.connect();
    if !super::wait_until(Duration::from_secs(2), || handle.is_connected()).await {
        anyhow::bail!("camera failed to connect");
    }

    handle.start_recording();
    if !super::wait_until(Duration::from_secs(2), || handle.is_recording()).await {
        anyhow::bail!("recording failed to start");
    }

    if duration == 0 {
        println!("Recording; press Ctrl+C to stop...");
        tokio::signal::ctrl_c().await?;
        println!();
    } else {
        tokio::time::sleep(Duration::from_secs(duration)).await;
    }

    println!("Recorded {:.1}s", handle.recording_elapsed_secs());
    handle.stop_recording();

    // Let the asynchronous teardown and the deferred media-ready
    // notification land before tearing the session down.
    super::wait_until(Duration::from_secs(2), || !handle.is_recording()).await;
    tokio::time::sleep(media_ready_delay + Duration::from_millis(200)).await;

    handle.release();
    if !handle.wait_for_shutdown(Duration::from_secs(5)) {
        tracing::warn!("Worker did not shut down in time");
    }

    println!(
        "Done; {} frames composited, {} recording stop(s) completed",
        compositor.frames_in(),
        pipeline_stats
            .stops_requested
            .load(std::sync::atomic::Ordering::SeqCst)
    );
    Ok(())
}
