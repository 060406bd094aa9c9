//! Peripheral collaborators: shutter feedback and storage indexing.

use std::path::Path;

use camhub_common::config::ShutterConfig;
use camhub_common::error::CamhubResult;

/// Plays the shutter click for still-capture feedback.
pub trait ShutterSound: Send + Sync {
    fn play(&self, config: &ShutterConfig);
}

/// Tells the platform media library about a newly finished file.
///
/// Best effort: failures are logged by the caller and discarded.
pub trait MediaIndex: Send + Sync {
    fn notify_new_media(&self, path: &Path) -> CamhubResult<()>;
}

/// Shutter that stays silent, for headless embedders.
#[derive(Debug, Default)]
pub struct SilentShutter;

impl ShutterSound for SilentShutter {
    fn play(&self, _config: &ShutterConfig) {}
}

/// Media index that only logs the path.
#[derive(Debug, Default)]
pub struct LoggingMediaIndex;

impl MediaIndex for LoggingMediaIndex {
    fn notify_new_media(&self, path: &Path) -> CamhubResult<()> {
        tracing::info!(path = %path.display(), "New media available");
        Ok(())
    }
}
