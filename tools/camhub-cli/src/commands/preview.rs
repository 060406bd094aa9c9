//! Stream preview frames and report delivery statistics.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use camhub_common::config::HubConfig;
use camhub_compositor::FrameCompositor;
use camhub_session::frame::{Compositor, Frame, FrameSink};
use camhub_session::peripheral::{LoggingMediaIndex, SilentShutter};
use camhub_session::synthetic::{SyntheticPipeline, SyntheticTransport};
use camhub_session::{spawn_session, SessionParts};

struct CountingSurface {
    frames: AtomicUsize,
}

impl FrameSink for CountingSurface {
    fn submit(&self, _frame: &Frame) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }
}

pub async fn run(duration: u64, fps: u32) -> anyhow::Result<()> {
    let compositor = Arc::new(FrameCompositor::new());
    let handle = spawn_session(
        HubConfig::default(),
        SessionParts {
            transport: Box::new(SyntheticTransport::new(fps)),
            pipeline: Arc::new(SyntheticPipeline::new(std::env::temp_dir())),
            compositor: Arc::clone(&compositor) as Arc<dyn Compositor>,
            media_index: Arc::new(LoggingMediaIndex),
            shutter: Arc::new(SilentShutter),
        },
    )?;

    handle.register_listener(Arc::new(super::PrintingListener));
    let surface = Arc::new(CountingSurface {
        frames: AtomicUsize::new(0),
    });
    handle.add_render_target(1, Arc::clone(&surface) as Arc<dyn FrameSink>, false, None);

    handle.connect();
    if !super::wait_until(Duration::from_secs(2), || handle.is_connected()).await {
        anyhow::bail!("camera failed to connect");
    }

    if duration == 0 {
        println!("Previewing at {fps} fps; press Ctrl+C to stop...");
        tokio::signal::ctrl_c().await?;
        println!();
    } else {
        println!("Previewing at {fps} fps for {duration}s...");
        tokio::time::sleep(Duration::from_secs(duration)).await;
    }

    handle.remove_render_target(1);
    handle.release();
    handle.wait_for_shutdown(Duration::from_secs(5));

    println!(
        "Delivered {} frames to the preview surface ({} composited)",
        surface.frames.load(Ordering::Relaxed),
        compositor.frames_in()
    );
    Ok(())
}
