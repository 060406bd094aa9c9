//! CamHub Session Core
//!
//! Multiplexes one physical camera to multiple concurrent consumers —
//! preview surfaces, a recording pipeline, remote listeners — behind a
//! single-threaded command actor. Device open/close, preview start/stop,
//! and recording start/stop never race with each other or with teardown.
//!
//! # Architecture
//!
//! ```text
//! callers ──► SessionHandle ──► command queue ──► worker thread
//!                 │                                    │
//!                 │ lock-guarded reads                 ▼
//!                 └──────────────► DeviceSession state machine
//!                                        │
//!                                        ├─► DeviceTransport (open/stream/close)
//!                                        ├─► RecordingPipeline (muxer + encoders)
//!                                        ├─► Compositor (render-target fan-out)
//!                                        └─► ListenerRegistry.broadcast
//! ```
//!
//! All device-state mutation happens on the worker thread. Caller threads
//! only enqueue commands or take fast reads under the session lock.

pub mod actor;
pub mod device;
pub mod frame;
pub mod handle;
pub mod listener;
pub mod peripheral;
pub mod recording;
pub mod synthetic;

mod command;
mod session;

pub use actor::{spawn_session, SessionParts};
pub use handle::SessionHandle;
