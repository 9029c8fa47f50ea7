//! Top-level capture lifecycle.
//!
//! [`VideoCapture`] is the control lane's view of the engine. It owns the
//! preview surface and, while active, one worker lane. Every operation
//! enqueues a command and returns; outcomes arrive on the notification
//! channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use vidcap_common::config::{AppConfig, RecorderDefaults};
use vidcap_common::error::{VidcapError, VidcapResult};
use vidcap_geometry::{preview_transform, DisplayRotation, Matrix, Size};

use crate::backend::{CameraBackend, CameraSelector};
use crate::controller::{ControllerParts, SessionController};
use crate::event::{Command, Notification};
use crate::recorder::{EncoderBackend, RecordingController, StorageProvider};
use crate::session::CaptureMode;
use crate::sink::{CaptureSink, PreviewSurface};
use crate::worker::WorkerLane;

/// Runtime settings for [`VideoCapture`].
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub camera: CameraSelector,
    /// Preview buffer size the camera renders into.
    pub preview_size: Size,
    pub preview_on_open: bool,
    /// How long `deactivate` waits for the lane to drain.
    pub drain_timeout: Duration,
    pub recorder: RecorderDefaults,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            camera: CameraSelector::Back,
            preview_size: Size::new(960, 720),
            preview_on_open: true,
            drain_timeout: Duration::from_millis(2000),
            recorder: RecorderDefaults::default(),
        }
    }
}

impl CaptureConfig {
    pub fn from_app_config(config: &AppConfig) -> VidcapResult<Self> {
        config.validate()?;
        Ok(Self {
            camera: config.capture.camera.parse()?,
            preview_size: Size::new(config.capture.preview_width, config.capture.preview_height),
            preview_on_open: config.capture.preview_on_open,
            drain_timeout: Duration::from_millis(config.capture.worker_drain_timeout_ms),
            recorder: config.recorder.clone(),
        })
    }
}

pub struct VideoCapture {
    backend: Arc<dyn CameraBackend>,
    encoders: Arc<dyn EncoderBackend>,
    storage: Arc<dyn StorageProvider>,
    preview: Arc<PreviewSurface>,
    config: CaptureConfig,
    notify_tx: mpsc::UnboundedSender<Notification>,
    notify_rx: Option<mpsc::UnboundedReceiver<Notification>>,
    lane: Option<WorkerLane>,
    lanes_spawned: u64,
}

impl VideoCapture {
    pub fn new(
        backend: Arc<dyn CameraBackend>,
        encoders: Arc<dyn EncoderBackend>,
        storage: Arc<dyn StorageProvider>,
        config: CaptureConfig,
    ) -> Self {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            encoders,
            storage,
            preview: Arc::new(PreviewSurface::new(config.preview_size)),
            config,
            notify_tx,
            notify_rx: Some(notify_rx),
            lane: None,
            lanes_spawned: 0,
        }
    }

    /// The notification stream. Can be taken once.
    pub fn take_notifications(&mut self) -> Option<mpsc::UnboundedReceiver<Notification>> {
        self.notify_rx.take()
    }

    pub fn preview(&self) -> &Arc<PreviewSurface> {
        &self.preview
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.lane.is_some()
    }

    /// Start a fresh worker lane and, if the preview is ready, open the
    /// camera. Must be called within a tokio runtime.
    pub fn activate(&mut self) -> VidcapResult<()> {
        if self.lane.is_some() {
            tracing::debug!("Capture already active");
            return Ok(());
        }

        self.lanes_spawned += 1;
        let parts = ControllerParts {
            backend: self.backend.clone(),
            preview: self.preview.clone(),
            recorder: RecordingController::new(
                self.encoders.clone(),
                self.storage.clone(),
                self.config.recorder.clone(),
            ),
            notifications: self.notify_tx.clone(),
            preview_on_open: self.config.preview_on_open,
        };
        self.lane = Some(WorkerLane::spawn(self.lanes_spawned, move |events| {
            SessionController::new(parts, events)
        }));
        tracing::info!(
            lane = self.lanes_spawned,
            backend = self.backend.name(),
            encoder = self.encoders.name(),
            "Capture activated"
        );

        if self.preview.is_available() {
            self.open_camera()?;
        }
        Ok(())
    }

    /// Close the camera, then drain and join the lane within the
    /// configured timeout.
    pub async fn deactivate(&mut self) -> VidcapResult<()> {
        let Some(lane) = self.lane.take() else {
            return Ok(());
        };

        lane.send(Command::CloseCamera)?;
        let result = lane.shutdown(self.config.drain_timeout).await;
        tracing::info!(ok = result.is_ok(), "Capture deactivated");
        result
    }

    /// Request the configured camera be opened.
    pub fn open_camera(&mut self) -> VidcapResult<()> {
        self.send(Command::OpenCamera {
            selector: self.config.camera.clone(),
        })
    }

    /// The preview view created its surface. While active, the camera is
    /// opened if closed (including after a lost device) and preview moves
    /// onto the new surface. Returns the display transform.
    pub fn surface_available(
        &self,
        view: Size,
        rotation: DisplayRotation,
    ) -> VidcapResult<Matrix> {
        self.preview.set_available(view);
        if self.lane.is_some() {
            self.send(Command::SurfaceReady {
                selector: self.config.camera.clone(),
            })?;
        }
        preview_transform(view, self.preview.buffer_size(), rotation)
    }

    /// The preview view changed size or the display rotated.
    pub fn surface_size_changed(
        &self,
        view: Size,
        rotation: DisplayRotation,
    ) -> VidcapResult<Matrix> {
        self.preview.set_view_size(view);
        preview_transform(view, self.preview.buffer_size(), rotation)
    }

    pub fn surface_destroyed(&self) {
        self.preview.set_unavailable();
    }

    pub fn start_preview(&self) -> VidcapResult<()> {
        self.send(Command::StartPreview)
    }

    pub fn start_recording(&self, rotation: DisplayRotation) -> VidcapResult<()> {
        self.send(Command::StartRecording { rotation })
    }

    pub fn stop_recording(&self) -> VidcapResult<()> {
        self.send(Command::StopRecording)
    }

    pub fn start_session(&self, mode: CaptureMode, sinks: Vec<CaptureSink>) -> VidcapResult<()> {
        self.send(Command::StartSession { mode, sinks })
    }

    pub fn close_session(&self) -> VidcapResult<()> {
        self.send(Command::CloseSession)
    }

    pub fn send(&self, command: Command) -> VidcapResult<()> {
        match &self.lane {
            Some(lane) => lane.send(command),
            None => Err(VidcapError::invalid_state(format!(
                "cannot {}: capture is not active",
                command.name()
            ))),
        }
    }
}

impl Drop for VideoCapture {
    fn drop(&mut self) {
        if let Some(lane) = self.lane.take() {
            tracing::warn!(lane = lane.id(), "Capture dropped while active; stopping lane");
            lane.request_stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_follows_app_config() {
        let mut app = AppConfig::default();
        app.capture.camera = "front".to_string();
        app.capture.worker_drain_timeout_ms = 500;

        let config = CaptureConfig::from_app_config(&app).unwrap();
        assert_eq!(config.camera, CameraSelector::Front);
        assert_eq!(config.drain_timeout, Duration::from_millis(500));
        assert_eq!(config.preview_size, Size::new(960, 720));
    }

    #[test]
    fn commands_need_an_active_capture() {
        let capture = VideoCapture::new(
            Arc::new(crate::backend::VirtualCameraBackend::new()),
            Arc::new(crate::recorder::VirtualEncoderBackend::new()),
            Arc::new(crate::recorder::DirectoryStorage::new(std::env::temp_dir())),
            CaptureConfig::default(),
        );
        assert!(matches!(
            capture.start_preview(),
            Err(VidcapError::InvalidState { .. })
        ));
    }
}
