//! Vidcap Capture Engine
//!
//! Drives a camera device through open → preview → record → close while
//! keeping the camera handle, the capture session, and the encoder
//! consistent under asynchronous hardware callbacks.
//!
//! # Architecture
//!
//! ```text
//!  control lane                      worker lane (one tokio task)
//! ┌──────────────┐  Command   ┌──────────────────────────────────────┐
//! │ VideoCapture │──────────► │          SessionController           │
//! │              │            │  ┌──────────────┐ ┌────────────────┐ │
//! │ PreviewSurface            │  │ CameraHandle │ │ CaptureSession │ │
//! │              │◄────────── │  └──────────────┘ └────────────────┘ │
//! └──────────────┘ Notification  ┌────────────────────────────────┐  │
//!                             │  │ RecordingController (encoder)  │  │
//!        CameraBackend ─────► │  └────────────────────────────────┘  │
//!        (CameraEvent)        └──────────────────────────────────────┘
//! ```
//!
//! Commands and hardware callbacks share the lane's queue, so every state
//! transition runs on one task in arrival order.

pub mod backend;
pub mod capture;
pub mod controller;
pub mod event;
pub mod recorder;
pub mod request;
pub mod session;
pub mod sink;
pub mod worker;

pub use backend::{CameraBackend, CameraInfo, CameraSelector, SessionId};
pub use capture::{CaptureConfig, VideoCapture};
pub use controller::{ControllerState, SessionController};
pub use event::{CameraEvent, Command, Generation, Notification};
pub use recorder::{RecordingController, RecordingState, RecordingSummary};
pub use session::{CaptureMode, CaptureSession};
pub use sink::{CaptureSink, PreviewSurface, SinkKind, Surface};
