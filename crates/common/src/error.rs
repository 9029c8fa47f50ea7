//! Error types shared across Vidcap crates.

/// Top-level error type for Vidcap operations.
#[derive(Debug, thiserror::Error)]
pub enum VidcapError {
    #[error("Camera {camera_id} is busy")]
    DeviceBusy { camera_id: String },

    #[error("Access to camera {camera_id} denied")]
    AccessDenied { camera_id: String },

    #[error("No camera matches selector '{selector}'")]
    CameraNotFound { selector: String },

    #[error("Capture session configuration failed: {message}")]
    SessionConfigureFailed { message: String },

    #[error("Camera device error (code {code})")]
    DeviceError { code: i32 },

    #[error("Camera device disconnected")]
    DeviceDisconnected,

    #[error("Recorder not prepared: {message}")]
    NotPrepared { message: String },

    #[error("Invalid orientation: {message}")]
    InvalidOrientation { message: String },

    #[error("Invalid geometry: {message}")]
    InvalidGeometry { message: String },

    #[error("Surface for {sink} sink is not ready")]
    SurfaceNotReady { sink: String },

    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    #[error("Hardware error: {message}")]
    Hardware { message: String },

    #[error("Encoder error: {message}")]
    Encoder { message: String },

    #[error("Worker lane error: {message}")]
    Worker { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using VidcapError.
pub type VidcapResult<T> = Result<T, VidcapError>;

impl VidcapError {
    pub fn session_configure_failed(msg: impl Into<String>) -> Self {
        Self::SessionConfigureFailed {
            message: msg.into(),
        }
    }

    pub fn not_prepared(msg: impl Into<String>) -> Self {
        Self::NotPrepared {
            message: msg.into(),
        }
    }

    pub fn invalid_orientation(msg: impl Into<String>) -> Self {
        Self::InvalidOrientation {
            message: msg.into(),
        }
    }

    pub fn invalid_geometry(msg: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            message: msg.into(),
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState {
            message: msg.into(),
        }
    }

    pub fn hardware(msg: impl Into<String>) -> Self {
        Self::Hardware {
            message: msg.into(),
        }
    }

    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::Encoder {
            message: msg.into(),
        }
    }

    pub fn worker(msg: impl Into<String>) -> Self {
        Self::Worker {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Errors after which the current camera handle is unusable and a
    /// fresh open is required.
    pub fn is_fatal_for_device(&self) -> bool {
        matches!(self, Self::DeviceError { .. } | Self::DeviceDisconnected)
    }

    /// Errors the caller may recover from by retrying the same operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SessionConfigureFailed { .. }
                | Self::NotPrepared { .. }
                | Self::DeviceBusy { .. }
                | Self::AccessDenied { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_errors_are_fatal_but_configure_failures_are_not() {
        assert!(VidcapError::DeviceDisconnected.is_fatal_for_device());
        assert!(VidcapError::DeviceError { code: 3 }.is_fatal_for_device());

        let err = VidcapError::session_configure_failed("surface rejected");
        assert!(!err.is_fatal_for_device());
        assert!(err.is_recoverable());
    }

    #[test]
    fn messages_carry_context() {
        let err = VidcapError::DeviceBusy {
            camera_id: "0".to_string(),
        };
        assert_eq!(err.to_string(), "Camera 0 is busy");
        assert!(VidcapError::not_prepared("no storage")
            .to_string()
            .contains("no storage"));
    }
}
