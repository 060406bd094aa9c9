//! Error types shared across CamHub crates.

/// Top-level error type for CamHub operations.
#[derive(Debug, thiserror::Error)]
pub enum CamhubError {
    #[error("Device error: {message}")]
    Device { message: String },

    #[error("Recording error: {message}")]
    Recording { message: String },

    #[error("Listener error: {message}")]
    Listener { message: String },

    #[error("Session error: {message}")]
    Session { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using CamhubError.
pub type CamhubResult<T> = Result<T, CamhubError>;

impl CamhubError {
    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device {
            message: msg.into(),
        }
    }

    pub fn recording(msg: impl Into<String>) -> Self {
        Self::Recording {
            message: msg.into(),
        }
    }

    pub fn listener(msg: impl Into<String>) -> Self {
        Self::Listener {
            message: msg.into(),
        }
    }

    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }
}
