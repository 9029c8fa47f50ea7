//! Orientation hint resolution.
//!
//! A camera sensor is mounted in one of two conventions (90° or 270°
//! relative to the device's natural orientation). Combined with the
//! current display rotation this yields the rotation a player must apply
//! to recorded video.

use serde::{Deserialize, Serialize};
use vidcap_common::error::{VidcapError, VidcapResult};

/// Current display rotation in quarter turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisplayRotation {
    Rotation0,
    Rotation90,
    Rotation180,
    Rotation270,
}

impl DisplayRotation {
    pub const ALL: [DisplayRotation; 4] = [
        DisplayRotation::Rotation0,
        DisplayRotation::Rotation90,
        DisplayRotation::Rotation180,
        DisplayRotation::Rotation270,
    ];

    /// Parse a quarter-turn index (0..=3).
    pub fn from_quarter_turns(turns: u32) -> VidcapResult<Self> {
        match turns {
            0 => Ok(Self::Rotation0),
            1 => Ok(Self::Rotation90),
            2 => Ok(Self::Rotation180),
            3 => Ok(Self::Rotation270),
            other => Err(VidcapError::invalid_orientation(format!(
                "display rotation index {other} is not a quarter turn (0..=3)"
            ))),
        }
    }

    /// Parse a rotation expressed in degrees (0, 90, 180 or 270).
    pub fn from_degrees(degrees: u32) -> VidcapResult<Self> {
        match degrees {
            0 => Ok(Self::Rotation0),
            90 => Ok(Self::Rotation90),
            180 => Ok(Self::Rotation180),
            270 => Ok(Self::Rotation270),
            other => Err(VidcapError::invalid_orientation(format!(
                "display rotation {other}° is not a multiple of 90° in 0..360"
            ))),
        }
    }

    pub fn quarter_turns(&self) -> u32 {
        match self {
            Self::Rotation0 => 0,
            Self::Rotation90 => 1,
            Self::Rotation180 => 2,
            Self::Rotation270 => 3,
        }
    }

    pub fn degrees(&self) -> u32 {
        self.quarter_turns() * 90
    }

    /// Whether the display is turned sideways relative to its natural
    /// orientation.
    pub fn is_sideways(&self) -> bool {
        matches!(self, Self::Rotation90 | Self::Rotation270)
    }
}

/// How the camera sensor is mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorOrientation {
    /// Sensor rotated 90° (typical back camera).
    Default,
    /// Sensor rotated 270° (typical front camera).
    Inverse,
}

impl SensorOrientation {
    pub const DEFAULT_DEGREES: u32 = 90;
    pub const INVERSE_DEGREES: u32 = 270;

    /// Parse the mounting angle reported by the camera.
    pub fn from_degrees(degrees: u32) -> VidcapResult<Self> {
        match degrees {
            Self::DEFAULT_DEGREES => Ok(Self::Default),
            Self::INVERSE_DEGREES => Ok(Self::Inverse),
            other => Err(VidcapError::invalid_orientation(format!(
                "sensor orientation {other}° is neither {}° nor {}°",
                Self::DEFAULT_DEGREES,
                Self::INVERSE_DEGREES
            ))),
        }
    }

    pub fn degrees(&self) -> u32 {
        match self {
            Self::Default => Self::DEFAULT_DEGREES,
            Self::Inverse => Self::INVERSE_DEGREES,
        }
    }

    /// The other mounting convention.
    pub fn flipped(&self) -> Self {
        match self {
            Self::Default => Self::Inverse,
            Self::Inverse => Self::Default,
        }
    }
}

// Indexed by DisplayRotation::quarter_turns().
const DEFAULT_HINTS: [u32; 4] = [90, 0, 270, 180];
const INVERSE_HINTS: [u32; 4] = [270, 180, 90, 0];

/// Rotation hint (degrees) to embed in recorded output.
pub fn orientation_hint(sensor: SensorOrientation, rotation: DisplayRotation) -> u32 {
    let table = match sensor {
        SensorOrientation::Default => &DEFAULT_HINTS,
        SensorOrientation::Inverse => &INVERSE_HINTS,
    };
    table[rotation.quarter_turns() as usize]
}

/// Raw-value variant of [`orientation_hint`] for callers holding the
/// numbers reported by hardware. Unknown values are rejected.
pub fn orientation_hint_from_raw(sensor_degrees: u32, rotation_turns: u32) -> VidcapResult<u32> {
    let sensor = SensorOrientation::from_degrees(sensor_degrees)?;
    let rotation = DisplayRotation::from_quarter_turns(rotation_turns)?;
    Ok(orientation_hint(sensor, rotation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn back_camera_portrait_needs_quarter_turn() {
        assert_eq!(
            orientation_hint(SensorOrientation::Default, DisplayRotation::Rotation0),
            90
        );
        assert_eq!(
            orientation_hint(SensorOrientation::Default, DisplayRotation::Rotation90),
            0
        );
        assert_eq!(
            orientation_hint(SensorOrientation::Inverse, DisplayRotation::Rotation0),
            270
        );
        assert_eq!(
            orientation_hint(SensorOrientation::Inverse, DisplayRotation::Rotation270),
            0
        );
    }

    #[test]
    fn unknown_sensor_mounting_is_rejected() {
        assert!(matches!(
            SensorOrientation::from_degrees(180),
            Err(VidcapError::InvalidOrientation { .. })
        ));
        assert!(matches!(
            orientation_hint_from_raw(0, 1),
            Err(VidcapError::InvalidOrientation { .. })
        ));
    }

    #[test]
    fn rotation_index_out_of_range_is_rejected() {
        assert!(DisplayRotation::from_quarter_turns(4).is_err());
        assert!(DisplayRotation::from_degrees(45).is_err());
        assert_eq!(
            DisplayRotation::from_degrees(270).unwrap(),
            DisplayRotation::Rotation270
        );
    }

    fn any_sensor() -> impl Strategy<Value = SensorOrientation> {
        prop_oneof![
            Just(SensorOrientation::Default),
            Just(SensorOrientation::Inverse)
        ]
    }

    fn any_rotation() -> impl Strategy<Value = DisplayRotation> {
        (0u32..4).prop_map(|t| DisplayRotation::from_quarter_turns(t).unwrap())
    }

    proptest! {
        #[test]
        fn hint_is_always_a_quarter_turn(sensor in any_sensor(), rotation in any_rotation()) {
            let hint = orientation_hint(sensor, rotation);
            prop_assert!([0, 90, 180, 270].contains(&hint));
        }

        #[test]
        fn flipping_mounting_shifts_hint_by_half_turn(sensor in any_sensor(), rotation in any_rotation()) {
            let hint = orientation_hint(sensor, rotation);
            let flipped = orientation_hint(sensor.flipped(), rotation);
            prop_assert_eq!((hint + 180) % 360, flipped);
        }

        #[test]
        fn raw_values_outside_tables_never_default(sensor in 0u32..360, turns in 0u32..8) {
            let valid = (sensor == 90 || sensor == 270) && turns < 4;
            prop_assert_eq!(orientation_hint_from_raw(sensor, turns).is_ok(), valid);
        }
    }
}
