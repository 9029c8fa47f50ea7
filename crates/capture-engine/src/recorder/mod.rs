//! Recording lifecycle.
//!
//! The encoder is an external device fed through an input surface. The
//! [`RecordingController`] owns its prepare/start/stop/release cycle:
//!
//! ```text
//!   configure()        start(active session)
//! Idle ─────────► Prepared ─────────────────► Recording
//!  ▲                 │                            │
//!  └──── stop() ─────┴────────── stop() ──────────┘
//! ```
//!
//! `stop()` re-arms the encoder for the next `configure()`; `release()`
//! tears it down entirely.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use vidcap_common::clock::{output_file_name, RecordingClock};
use vidcap_common::config::{AudioCodec, ContainerFormat, RecorderDefaults, VideoCodec};
use vidcap_common::error::{VidcapError, VidcapResult};
use vidcap_geometry::{orientation_hint, DisplayRotation, SensorOrientation, Size};

use crate::session::ActiveSession;
use crate::sink::{SinkKind, Surface};

#[cfg(feature = "gst")]
pub mod gst;
pub mod virtual_encoder;

pub use virtual_encoder::{EncoderCall, VirtualEncoderBackend};

/// Whether the encoder sink can accept frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    Idle,
    Prepared,
    Recording,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioSource {
    Mic,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoSource {
    /// Frames arrive through the encoder's input surface.
    Surface,
}

/// Everything the encoder needs to prepare one recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderSettings {
    pub output_path: PathBuf,
    pub audio_source: AudioSource,
    pub video_source: VideoSource,
    pub container: ContainerFormat,
    pub video_codec: VideoCodec,
    pub audio_codec: AudioCodec,
    /// Bits per second.
    pub video_bitrate: u32,
    pub frame_rate: u32,
    pub video_size: Size,
    /// Rotation in degrees players apply on playback.
    pub orientation_hint: u32,
}

/// A finished recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingSummary {
    pub path: PathBuf,
    pub duration_secs: f64,
    pub started_at: String,
    pub orientation_hint: u32,
}

/// External encoder device.
pub trait Encoder: Send {
    /// Apply settings and allocate the input surface.
    fn prepare(&mut self, settings: &EncoderSettings) -> VidcapResult<Surface>;

    /// Begin consuming frames.
    fn start(&mut self) -> VidcapResult<()>;

    /// Stop consuming frames and finalize the output container.
    fn stop(&mut self) -> VidcapResult<()>;

    /// Return to the unconfigured state, keeping the device.
    fn reset(&mut self);

    /// Free the device and its surface.
    fn release(&mut self);
}

/// Creates encoder devices.
pub trait EncoderBackend: Send + Sync {
    fn name(&self) -> &str;

    fn create_encoder(&self) -> VidcapResult<Box<dyn Encoder>>;
}

/// Supplies writable output paths.
pub trait StorageProvider: Send + Sync {
    /// A fresh path for a new recording, or `None` when no writable
    /// storage is available.
    fn output_path(&self, extension: &str) -> Option<PathBuf>;
}

/// Writes recordings as `<unix-millis>.<ext>` inside one directory.
#[derive(Debug, Clone)]
pub struct DirectoryStorage {
    dir: PathBuf,
}

impl DirectoryStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl StorageProvider for DirectoryStorage {
    fn output_path(&self, extension: &str) -> Option<PathBuf> {
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            tracing::warn!(dir = %self.dir.display(), error = %e, "Output directory unavailable");
            return None;
        }
        // Permission bits miss ACLs and read-only mounts; create a file.
        if let Err(e) = tempfile::tempfile_in(&self.dir) {
            tracing::warn!(dir = %self.dir.display(), error = %e, "Output directory is not writable");
            return None;
        }
        Some(self.dir.join(output_file_name(extension)))
    }
}

/// Owns the encoder's lifecycle and its readiness.
pub struct RecordingController {
    encoders: Arc<dyn EncoderBackend>,
    storage: Arc<dyn StorageProvider>,
    defaults: RecorderDefaults,
    encoder: Option<Box<dyn Encoder>>,
    state: RecordingState,
    surface: Option<Surface>,
    settings: Option<EncoderSettings>,
    clock: Option<RecordingClock>,
}

impl RecordingController {
    pub fn new(
        encoders: Arc<dyn EncoderBackend>,
        storage: Arc<dyn StorageProvider>,
        defaults: RecorderDefaults,
    ) -> Self {
        Self {
            encoders,
            storage,
            defaults,
            encoder: None,
            state: RecordingState::Idle,
            surface: None,
            settings: None,
            clock: None,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    /// Settings of the current (or last) configuration.
    pub fn settings(&self) -> Option<&EncoderSettings> {
        self.settings.as_ref()
    }

    /// (Re)initialize the encoder for a new recording.
    ///
    /// On any failure the state stays `Idle` and no recorder sink is
    /// offered.
    pub fn configure(
        &mut self,
        sensor_orientation_degrees: u32,
        rotation: DisplayRotation,
    ) -> VidcapResult<()> {
        match self.state {
            RecordingState::Recording => {
                return Err(VidcapError::invalid_state(
                    "cannot reconfigure the encoder while recording",
                ))
            }
            RecordingState::Prepared => self.disarm(),
            RecordingState::Idle => {}
        }

        let sensor = SensorOrientation::from_degrees(sensor_orientation_degrees)?;
        let hint = orientation_hint(sensor, rotation);

        let output_path = self
            .storage
            .output_path(self.defaults.container.extension())
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| {
                tracing::warn!("No writable output path; recorder stays idle");
                VidcapError::not_prepared("no writable output path")
            })?;

        let settings = EncoderSettings {
            output_path,
            audio_source: if self.defaults.capture_audio {
                AudioSource::Mic
            } else {
                AudioSource::None
            },
            video_source: VideoSource::Surface,
            container: self.defaults.container,
            video_codec: self.defaults.video_codec,
            audio_codec: self.defaults.audio_codec,
            video_bitrate: self.defaults.video_bitrate,
            frame_rate: self.defaults.frame_rate,
            video_size: Size::new(self.defaults.width, self.defaults.height),
            orientation_hint: hint,
        };

        let encoder = match self.encoder.take() {
            Some(encoder) => encoder,
            None => self.encoders.create_encoder()?,
        };
        let encoder = self.encoder.insert(encoder);

        match encoder.prepare(&settings) {
            Ok(surface) => {
                tracing::info!(
                    path = %settings.output_path.display(),
                    orientation_hint = hint,
                    "Encoder prepared"
                );
                self.surface = Some(surface);
                self.settings = Some(settings);
                self.state = RecordingState::Prepared;
                Ok(())
            }
            Err(e) => {
                encoder.reset();
                tracing::warn!(error = %e, "Encoder prepare failed");
                Err(VidcapError::not_prepared(format!("encoder prepare failed: {e}")))
            }
        }
    }

    /// Input surface for the recorder sink, only while `Prepared`.
    pub fn sink_surface(&self) -> Option<Surface> {
        match self.state {
            RecordingState::Prepared => self.surface,
            _ => None,
        }
    }

    /// Begin encoding. Requires an active session that targets this
    /// recorder's surface; otherwise a `NotPrepared` no-op.
    pub fn start(&mut self, session: ActiveSession<'_>) -> VidcapResult<PathBuf> {
        if self.state != RecordingState::Prepared {
            tracing::debug!(state = ?self.state, "Recorder start ignored");
            return Err(VidcapError::not_prepared("recorder was not configured"));
        }
        if !session.targets_kind(SinkKind::Recorder) {
            return Err(VidcapError::not_prepared(format!(
                "{} does not target the recorder sink",
                session.id()
            )));
        }
        let (Some(encoder), Some(settings)) = (self.encoder.as_mut(), self.settings.as_ref())
        else {
            return Err(VidcapError::not_prepared("encoder missing"));
        };

        if let Err(e) = encoder.start() {
            encoder.reset();
            self.state = RecordingState::Idle;
            self.surface = None;
            return Err(e);
        }

        let clock = RecordingClock::start();
        tracing::info!(
            session = %session.id(),
            path = %settings.output_path.display(),
            epoch_wall = %clock.epoch_wall(),
            "Recording started"
        );
        self.clock = Some(clock);
        self.state = RecordingState::Recording;
        Ok(settings.output_path.clone())
    }

    /// Return to `Idle`, finalizing output if recording. Returns the
    /// finished recording, if there was one.
    pub fn stop(&mut self) -> Option<RecordingSummary> {
        let summary = match self.state {
            RecordingState::Idle => return None,
            RecordingState::Prepared => None,
            RecordingState::Recording => {
                if let Some(encoder) = self.encoder.as_mut() {
                    if let Err(e) = encoder.stop() {
                        tracing::warn!(error = %e, "Encoder failed to finalize output");
                    }
                }
                let clock = self.clock.take();
                self.settings.as_ref().map(|settings| RecordingSummary {
                    path: settings.output_path.clone(),
                    duration_secs: clock.as_ref().map(|c| c.elapsed_secs()).unwrap_or(0.0),
                    started_at: clock
                        .as_ref()
                        .map(|c| c.epoch_wall().to_string())
                        .unwrap_or_default(),
                    orientation_hint: settings.orientation_hint,
                })
            }
        };
        self.disarm();
        if let Some(ref summary) = summary {
            tracing::info!(
                path = %summary.path.display(),
                duration_secs = summary.duration_secs,
                "Recording stopped"
            );
        }
        summary
    }

    /// Tear down the encoder and its surface.
    pub fn release(&mut self) {
        if let Some(mut encoder) = self.encoder.take() {
            encoder.release();
            tracing::debug!("Encoder released");
        }
        self.state = RecordingState::Idle;
        self.surface = None;
        self.clock = None;
    }

    fn disarm(&mut self) {
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.reset();
        }
        self.state = RecordingState::Idle;
        self.surface = None;
        self.clock = None;
    }
}
