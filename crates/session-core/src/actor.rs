//! The command actor: worker thread, startup handshake, FIFO loop.

use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};

use camhub_common::config::HubConfig;
use camhub_common::error::{CamhubError, CamhubResult};

use crate::device::DeviceTransport;
use crate::frame::Compositor;
use crate::handle::SessionHandle;
use crate::peripheral::{MediaIndex, ShutterSound};
use crate::recording::RecordingPipeline;
use crate::session::{DeviceSession, Flow, SessionShared};

/// Slot the worker publishes its handle through during startup.
struct Startup {
    slot: Mutex<Option<SessionHandle>>,
    ready: Condvar,
}

/// Collaborators a session is spawned around.
pub struct SessionParts {
    pub transport: Box<dyn DeviceTransport>,
    pub pipeline: Arc<dyn RecordingPipeline>,
    pub compositor: Arc<dyn Compositor>,
    pub media_index: Arc<dyn MediaIndex>,
    pub shutter: Arc<dyn ShutterSound>,
}

/// Spawn the worker thread for one camera session and return its handle.
///
/// Blocks until the worker has published the handle. The wait loops on
/// the slot under the same lock the worker publishes through, so the
/// handshake is race-free even when the worker finishes initialization
/// before the spawner starts waiting.
pub fn spawn_session(config: HubConfig, parts: SessionParts) -> CamhubResult<SessionHandle> {
    let (queue, commands) = mpsc::channel();
    let startup = Arc::new(Startup {
        slot: Mutex::new(None),
        ready: Condvar::new(),
    });
    let startup_worker = Arc::clone(&startup);

    std::thread::Builder::new()
        .name("camera-worker".into())
        .spawn(move || {
            let shared = Arc::new(SessionShared::new(
                config,
                parts.compositor,
                parts.media_index,
                parts.shutter,
                queue,
            ));

            {
                let mut slot = match startup_worker.slot.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                *slot = Some(SessionHandle::new(Arc::clone(&shared)));
                startup_worker.ready.notify_all();
            }

            let mut session =
                DeviceSession::new(Arc::clone(&shared), parts.transport, parts.pipeline);
            tracing::debug!("Worker loop started");
            while let Ok(command) = commands.recv() {
                if session.dispatch(command) == Flow::Exit {
                    break;
                }
            }

            shared.lock_state().terminated = true;
            shared.lifecycle.notify_all();
            // Wake any disconnect() still parked on the preview ack.
            shared.preview_ack.notify_all();
            tracing::debug!("Worker loop finished");
        })
        .map_err(|e| CamhubError::session(format!("Failed to spawn worker thread: {e}")))?;

    let mut slot = match startup.slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    loop {
        if let Some(handle) = slot.take() {
            return Ok(handle);
        }
        slot = startup
            .ready
            .wait(slot)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
    }
}
