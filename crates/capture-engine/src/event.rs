//! Messages flowing through the worker lane.
//!
//! Hardware callbacks arrive as [`CameraEvent`]s, control-lane requests as
//! [`Command`]s, and outcomes leave the lane as [`Notification`]s.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use vidcap_common::error::VidcapError;
use vidcap_geometry::DisplayRotation;

use crate::backend::{CameraHandle, CameraSelector, SessionId};
use crate::recorder::RecordingSummary;
use crate::session::CaptureMode;
use crate::sink::{CaptureSink, SinkKind};

/// Monotonic token attached to every open and session request.
///
/// Callbacks carrying a generation other than the one the controller is
/// currently waiting on are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Generation(u64);

impl Generation {
    pub const ZERO: Generation = Generation(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Hardware callback delivered on the worker lane.
#[derive(Debug)]
pub enum CameraEvent {
    /// The device finished opening.
    Opened {
        generation: Generation,
        handle: CameraHandle,
    },
    /// The device went away. Terminal for the handle.
    Disconnected { generation: Generation },
    /// The device reported an error. Terminal for the handle.
    Error { generation: Generation, code: i32 },
    /// A session finished configuring and can stream.
    SessionConfigured {
        generation: Generation,
        session: SessionId,
    },
    /// A session could not be configured.
    SessionConfigureFailed {
        generation: Generation,
        session: SessionId,
    },
    /// A session finished closing.
    SessionClosed {
        generation: Generation,
        session: SessionId,
    },
}

impl CameraEvent {
    pub fn generation(&self) -> Generation {
        match self {
            Self::Opened { generation, .. }
            | Self::Disconnected { generation }
            | Self::Error { generation, .. }
            | Self::SessionConfigured { generation, .. }
            | Self::SessionConfigureFailed { generation, .. }
            | Self::SessionClosed { generation, .. } => *generation,
        }
    }
}

/// Request issued from the control lane.
#[derive(Debug, Clone)]
pub enum Command {
    OpenCamera { selector: CameraSelector },
    /// Start a session targeting exactly `sinks`.
    StartSession {
        mode: CaptureMode,
        sinks: Vec<CaptureSink>,
    },
    /// The preview surface became available: open the camera if it is
    /// closed, or restart preview if the session targets an old surface.
    SurfaceReady { selector: CameraSelector },
    /// Start a preview-only session with the current preview surface.
    StartPreview,
    /// Configure the recorder and switch to a record session.
    StartRecording { rotation: DisplayRotation },
    /// Finalize the recording and fall back to preview.
    StopRecording,
    CloseSession,
    CloseCamera,
}

/// Outcome reported back to the control lane.
#[derive(Debug)]
pub enum Notification {
    CameraOpened {
        camera_id: String,
        generation: Generation,
    },
    OpenFailed {
        error: VidcapError,
    },
    SessionActive {
        mode: CaptureMode,
        session: SessionId,
        sinks: Vec<SinkKind>,
    },
    SessionConfigureFailed {
        mode: CaptureMode,
        error: VidcapError,
    },
    RecordingStarted {
        path: PathBuf,
    },
    RecordingStopped(RecordingSummary),
    RecordingFailed {
        error: VidcapError,
    },
    /// The device was lost; a fresh open is required.
    DeviceLost {
        error: VidcapError,
    },
    /// A command was rejected by the controller.
    CommandFailed {
        command: &'static str,
        error: VidcapError,
    },
    CameraClosed,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenCamera { .. } => "open_camera",
            Self::StartSession { .. } => "start_session",
            Self::SurfaceReady { .. } => "surface_ready",
            Self::StartPreview => "start_preview",
            Self::StartRecording { .. } => "start_recording",
            Self::StopRecording => "stop_recording",
            Self::CloseSession => "close_session",
            Self::CloseCamera => "close_camera",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generations_are_monotonic() {
        let g = Generation::ZERO.next().next();
        assert_eq!(g.value(), 2);
        assert!(g > Generation::ZERO);
        assert_eq!(g.to_string(), "g2");
    }
}
