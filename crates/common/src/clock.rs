//! Recording clock and output naming.
//!
//! A recording is anchored to a monotonic epoch captured when the encoder
//! starts. Output files are named after the wall-clock millisecond at
//! which they were configured.

use std::time::Instant;

/// A recording clock that provides monotonic timestamps relative to
/// the moment recording started.
#[derive(Debug, Clone)]
pub struct RecordingClock {
    /// The instant recording started.
    epoch: Instant,

    /// Wall-clock time at epoch (RFC 3339 string).
    epoch_wall: String,
}

impl RecordingClock {
    /// Create a new recording clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Get seconds elapsed since recording start.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Wall-clock time at recording start.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }
}

/// File name for a new recording: `<unix-millis>.<extension>`.
pub fn output_file_name(extension: &str) -> String {
    format!("{}.{}", chrono::Utc::now().timestamp_millis(), extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_elapsed() {
        let clock = RecordingClock::start();
        assert!(clock.elapsed_secs() < 1.0);
        assert!(!clock.epoch_wall().is_empty());
    }

    #[test]
    fn output_names_are_millisecond_stamps() {
        let name = output_file_name("mp4");
        let (stem, ext) = name.split_once('.').unwrap();
        assert_eq!(ext, "mp4");
        assert!(stem.parse::<i64>().unwrap() > 1_500_000_000_000);
    }
}
