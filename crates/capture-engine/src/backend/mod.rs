//! Camera hardware abstraction.
//!
//! The capture engine only consumes this interface. Every method returns
//! immediately; outcomes of `open` and `create_capture_session` arrive
//! later as [`CameraEvent`](crate::event::CameraEvent)s posted through the
//! supplied [`EventSender`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use vidcap_common::error::{VidcapError, VidcapResult};

use crate::event::Generation;
use crate::request::CaptureRequestSpec;
use crate::sink::CaptureSink;
use crate::worker::EventSender;

pub mod virtual_device;

pub use virtual_device::{HalCommand, VirtualCameraBackend};

/// Which way a camera faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraFacing {
    Back,
    Front,
    External,
}

/// Static description of a camera device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraInfo {
    /// Device identifier used to open the camera.
    pub id: String,
    pub facing: CameraFacing,
    /// Sensor mounting angle in degrees.
    pub sensor_orientation_degrees: u32,
}

/// Picks a camera from the device list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraSelector {
    Back,
    Front,
    Id(String),
}

impl CameraSelector {
    /// First device matching this selector.
    pub fn resolve(&self, devices: &[CameraInfo]) -> VidcapResult<CameraInfo> {
        devices
            .iter()
            .find(|info| match self {
                Self::Back => info.facing == CameraFacing::Back,
                Self::Front => info.facing == CameraFacing::Front,
                Self::Id(id) => &info.id == id,
            })
            .cloned()
            .ok_or_else(|| VidcapError::CameraNotFound {
                selector: self.to_string(),
            })
    }
}

impl fmt::Display for CameraSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Back => f.write_str("back"),
            Self::Front => f.write_str("front"),
            Self::Id(id) => f.write_str(id),
        }
    }
}

impl FromStr for CameraSelector {
    type Err = VidcapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err(VidcapError::config("camera selector is empty")),
            "back" => Ok(Self::Back),
            "front" => Ok(Self::Front),
            id => Ok(Self::Id(id.to_string())),
        }
    }
}

/// Exclusive ownership of one opened camera device.
///
/// Not `Clone`: the controller holds the only instance and gives it back
/// to the backend on close.
#[derive(Debug, PartialEq, Eq)]
pub struct CameraHandle {
    camera_id: String,
    raw: u64,
}

impl CameraHandle {
    /// Backends mint handles when a device finishes opening.
    pub fn new(camera_id: impl Into<String>, raw: u64) -> Self {
        Self {
            camera_id: camera_id.into(),
            raw,
        }
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn raw(&self) -> u64 {
        self.raw
    }
}

/// Backend identifier of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Abstract interface to the camera subsystem.
pub trait CameraBackend: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Enumerate camera devices.
    fn list_devices(&self) -> VidcapResult<Vec<CameraInfo>>;

    /// Request the device be opened. Synchronous failures are
    /// `AccessDenied` or `DeviceBusy`; success is reported later with
    /// `CameraEvent::Opened` carrying `generation`.
    fn open(&self, camera_id: &str, generation: Generation, events: EventSender)
        -> VidcapResult<()>;

    /// Request a session streaming into exactly `sinks`. Returns the id the
    /// eventual `SessionConfigured`/`SessionConfigureFailed` will carry.
    fn create_capture_session(
        &self,
        device: &CameraHandle,
        sinks: &[CaptureSink],
        generation: Generation,
        events: EventSender,
    ) -> VidcapResult<SessionId>;

    /// Start re-issuing `request` continuously on `session`.
    fn set_repeating_request(
        &self,
        session: SessionId,
        request: &CaptureRequestSpec,
    ) -> VidcapResult<()>;

    fn stop_repeating(&self, session: SessionId) -> VidcapResult<()>;

    fn abort_captures(&self, session: SessionId) -> VidcapResult<()>;

    fn close_session(&self, session: SessionId) -> VidcapResult<()>;

    /// Release the device. Consumes the handle.
    fn close_device(&self, device: CameraHandle) -> VidcapResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devices() -> Vec<CameraInfo> {
        vec![
            CameraInfo {
                id: "0".to_string(),
                facing: CameraFacing::Back,
                sensor_orientation_degrees: 90,
            },
            CameraInfo {
                id: "1".to_string(),
                facing: CameraFacing::Front,
                sensor_orientation_degrees: 270,
            },
        ]
    }

    #[test]
    fn selector_resolves_by_facing_and_id() {
        assert_eq!(CameraSelector::Back.resolve(&devices()).unwrap().id, "0");
        assert_eq!(CameraSelector::Front.resolve(&devices()).unwrap().id, "1");
        assert_eq!(
            CameraSelector::Id("1".to_string())
                .resolve(&devices())
                .unwrap()
                .sensor_orientation_degrees,
            270
        );
    }

    #[test]
    fn unmatched_selector_is_camera_not_found() {
        let err = CameraSelector::Id("7".to_string())
            .resolve(&devices())
            .unwrap_err();
        assert!(matches!(err, VidcapError::CameraNotFound { selector } if selector == "7"));
    }

    #[test]
    fn selector_parses_from_config_strings() {
        assert_eq!("back".parse::<CameraSelector>().unwrap(), CameraSelector::Back);
        assert_eq!(
            "usb-2".parse::<CameraSelector>().unwrap(),
            CameraSelector::Id("usb-2".to_string())
        );
        assert!("  ".parse::<CameraSelector>().is_err());
    }
}
