//! CLI subcommands.

pub mod preview;
pub mod record;

use std::time::Duration;

use camhub_common::error::CamhubResult;
use camhub_session::listener::ConnectionListener;

/// Listener that prints connection transitions to the console.
pub struct PrintingListener;

impl ConnectionListener for PrintingListener {
    fn on_connected(&self) -> CamhubResult<()> {
        println!("[event] camera connected");
        Ok(())
    }

    fn on_disconnected(&self) -> CamhubResult<()> {
        println!("[event] camera disconnected");
        Ok(())
    }
}

/// Poll until `pred` holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, pred: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if pred() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    pred()
}
