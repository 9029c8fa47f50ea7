//! Device session controller.
//!
//! Owns the camera handle and the one capture session that may exist on
//! it. Lives on the worker lane: every method runs there, in order, and
//! nothing outside the lane can reach the handle or the session.
//!
//! ```text
//! Closed ─open─► Opening ─opened─► Opened ─start_session─► SessionConfiguring
//!    ▲              │                 ▲                        │      ▲
//!    │        error/disconnected      └──configure failed──────┤      │ mode switch
//!    │              │                                          ▼      │
//!    └──────────────┴─────────── error/disconnected ◄──── SessionActive
//! ```
//!
//! A mode switch always issues the old session's stop/abort/close before
//! the new session's creation request. Every open and session request
//! carries a fresh [`Generation`]; callbacks for anything but the current
//! one are discarded.

use std::sync::Arc;

use tokio::sync::mpsc;
use vidcap_common::error::{VidcapError, VidcapResult};
use vidcap_geometry::DisplayRotation;

use crate::backend::{CameraBackend, CameraHandle, CameraInfo, CameraSelector, SessionId};
use crate::event::{CameraEvent, Command, Generation, Notification};
use crate::recorder::{RecordingController, RecordingState};
use crate::request::{CaptureRequestSpec, ControlMode};
use crate::session::{CaptureMode, CaptureSession};
use crate::sink::{CaptureSink, SinkKind, SurfaceProvider};
use crate::worker::EventSender;

/// Externally visible controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Closed,
    Opening,
    Opened,
    SessionConfiguring,
    SessionActive,
}

#[derive(Debug)]
enum DeviceSlot {
    Closed,
    Opening {
        generation: Generation,
        camera: CameraInfo,
    },
    Opened {
        generation: Generation,
        camera: CameraInfo,
        handle: CameraHandle,
    },
}

/// Collaborators a controller is built from.
pub struct ControllerParts {
    pub backend: Arc<dyn CameraBackend>,
    pub preview: Arc<dyn SurfaceProvider>,
    pub recorder: RecordingController,
    pub notifications: mpsc::UnboundedSender<Notification>,
    /// Start a preview session as soon as the camera opens.
    pub preview_on_open: bool,
}

pub struct SessionController {
    backend: Arc<dyn CameraBackend>,
    events: EventSender,
    notifications: mpsc::UnboundedSender<Notification>,
    preview: Arc<dyn SurfaceProvider>,
    recorder: RecordingController,
    preview_on_open: bool,
    generation: Generation,
    device: DeviceSlot,
    session: Option<CaptureSession>,
}

impl SessionController {
    pub fn new(parts: ControllerParts, events: EventSender) -> Self {
        Self {
            backend: parts.backend,
            events,
            notifications: parts.notifications,
            preview: parts.preview,
            recorder: parts.recorder,
            preview_on_open: parts.preview_on_open,
            generation: Generation::ZERO,
            device: DeviceSlot::Closed,
            session: None,
        }
    }

    pub fn state(&self) -> ControllerState {
        match (&self.device, &self.session) {
            (DeviceSlot::Closed, _) => ControllerState::Closed,
            (DeviceSlot::Opening { .. }, _) => ControllerState::Opening,
            (DeviceSlot::Opened { .. }, None) => ControllerState::Opened,
            (DeviceSlot::Opened { .. }, Some(s)) if s.active().is_some() => {
                ControllerState::SessionActive
            }
            (DeviceSlot::Opened { .. }, Some(_)) => ControllerState::SessionConfiguring,
        }
    }

    /// Most recently issued generation.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn session(&self) -> Option<&CaptureSession> {
        self.session.as_ref()
    }

    pub fn camera(&self) -> Option<&CameraInfo> {
        match &self.device {
            DeviceSlot::Closed => None,
            DeviceSlot::Opening { camera, .. } | DeviceSlot::Opened { camera, .. } => Some(camera),
        }
    }

    pub fn recording_state(&self) -> RecordingState {
        self.recorder.state()
    }

    /// Dispatch a control-lane command. Failures become notifications.
    pub fn handle_command(&mut self, command: Command) {
        let name = command.name();
        tracing::debug!(command = name, "Handling command");
        let result = match command {
            Command::OpenCamera { selector } => self
                .open_camera(&selector)
                .map_err(|error| Notification::OpenFailed { error }),
            Command::StartSession { mode, sinks } => self
                .start_session(mode, sinks)
                .map(|_| ())
                .map_err(|error| Notification::CommandFailed { command: name, error }),
            Command::SurfaceReady { selector } => {
                let opening = matches!(self.device, DeviceSlot::Closed);
                self.surface_ready(&selector).map_err(|error| {
                    if opening {
                        Notification::OpenFailed { error }
                    } else {
                        Notification::CommandFailed { command: name, error }
                    }
                })
            }
            Command::StartPreview => self
                .start_preview()
                .map_err(|error| Notification::CommandFailed { command: name, error }),
            Command::StartRecording { rotation } => self
                .start_recording(rotation)
                .map_err(|error| Notification::RecordingFailed { error }),
            Command::StopRecording => self
                .stop_recording()
                .map_err(|error| Notification::CommandFailed { command: name, error }),
            Command::CloseSession => {
                self.close_session();
                Ok(())
            }
            Command::CloseCamera => {
                self.close_camera();
                Ok(())
            }
        };
        if let Err(notification) = result {
            tracing::debug!(command = name, ?notification, "Command rejected");
            self.notify(notification);
        }
    }

    /// Dispatch a hardware callback.
    pub fn handle_event(&mut self, event: CameraEvent) {
        match event {
            CameraEvent::Opened { generation, handle } => self.on_opened(generation, handle),
            CameraEvent::Disconnected { generation } => {
                self.on_device_lost(generation, VidcapError::DeviceDisconnected)
            }
            CameraEvent::Error { generation, code } => {
                self.on_device_lost(generation, VidcapError::DeviceError { code })
            }
            CameraEvent::SessionConfigured {
                generation,
                session,
            } => self.on_session_configured(generation, session),
            CameraEvent::SessionConfigureFailed {
                generation,
                session,
            } => self.on_session_configure_failed(generation, session),
            CameraEvent::SessionClosed {
                generation,
                session,
            } => {
                tracing::debug!(%generation, %session, "Session closed by hardware");
            }
        }
    }

    /// Ask the hardware to open the camera picked by `selector`. The
    /// handle arrives later with `CameraEvent::Opened`.
    pub fn open_camera(&mut self, selector: &CameraSelector) -> VidcapResult<()> {
        if !matches!(self.device, DeviceSlot::Closed) {
            return Err(VidcapError::invalid_state("camera is already open or opening"));
        }

        let devices = self.backend.list_devices()?;
        let camera = selector.resolve(&devices)?;
        let generation = self.next_generation();

        if let Err(e) = self.backend.open(&camera.id, generation, self.events.clone()) {
            tracing::warn!(camera_id = %camera.id, error = %e, "Camera open refused");
            return Err(e);
        }

        tracing::info!(
            camera_id = %camera.id,
            %generation,
            backend = self.backend.name(),
            "Opening camera"
        );
        self.device = DeviceSlot::Opening { generation, camera };
        Ok(())
    }

    /// Replace the current session with one targeting exactly `sinks`.
    ///
    /// The old session (active or still configuring) is closed first; its
    /// close requests are issued before the creation request.
    pub fn start_session(
        &mut self,
        mode: CaptureMode,
        sinks: Vec<CaptureSink>,
    ) -> VidcapResult<SessionId> {
        if !matches!(self.device, DeviceSlot::Opened { .. }) {
            return Err(VidcapError::invalid_state("camera is not open"));
        }
        let request = CaptureRequestSpec::builder(mode.template())
            .control_mode(ControlMode::Auto)
            .targets(sinks)
            .build()?;

        self.close_session();
        self.settle_recorder(&request);

        let generation = self.next_generation();
        let DeviceSlot::Opened { handle, .. } = &self.device else {
            return Err(VidcapError::invalid_state("camera is not open"));
        };
        let id = self.backend.create_capture_session(
            handle,
            request.targets(),
            generation,
            self.events.clone(),
        )?;

        tracing::info!(
            %mode,
            session = %id,
            %generation,
            sinks = ?request.target_kinds(),
            "Requested capture session"
        );
        self.session = Some(CaptureSession::configuring(id, generation, mode, request));
        Ok(id)
    }

    /// Return the recorder to `Idle` unless `request` feeds its prepared
    /// surface. A running recording is finalized, since no session will
    /// target it once the old one is closed.
    fn settle_recorder(&mut self, request: &CaptureRequestSpec) {
        let keeps_recorder = self.recorder.sink_surface().is_some_and(|surface| {
            request
                .targets()
                .iter()
                .any(|sink| sink.kind == SinkKind::Recorder && sink.surface == surface)
        });
        if keeps_recorder || self.recorder.state() == RecordingState::Idle {
            return;
        }
        tracing::info!(state = ?self.recorder.state(), "New session drops the recorder sink");
        if let Some(summary) = self.recorder.stop() {
            self.notify(Notification::RecordingStopped(summary));
        }
    }

    /// Open the camera, or restart preview on a recreated surface.
    pub fn surface_ready(&mut self, selector: &CameraSelector) -> VidcapResult<()> {
        if matches!(self.device, DeviceSlot::Closed) {
            return self.open_camera(selector);
        }
        if !matches!(self.device, DeviceSlot::Opened { .. }) {
            // Still waiting for the handle.
            return Ok(());
        }
        let Some(surface) = self.preview.surface() else {
            return Ok(());
        };
        let stale = self.session.as_ref().map_or(true, |session| {
            !session
                .request()
                .targets()
                .iter()
                .any(|sink| sink.kind == SinkKind::Preview && sink.surface == surface)
        });
        if !stale {
            return Ok(());
        }
        if self.recorder.state() == RecordingState::Recording {
            tracing::info!("Preview surface recreated while recording; preview resumes on stop");
            return Ok(());
        }
        self.start_preview()
    }

    /// Start a preview-only session.
    pub fn start_preview(&mut self) -> VidcapResult<()> {
        let sinks = self.resolve_sinks(CaptureMode::Preview)?;
        self.start_session(CaptureMode::Preview, sinks).map(|_| ())
    }

    /// Configure the recorder and switch to a record session.
    ///
    /// A recorder that cannot be prepared is reported, and the session
    /// restarts with the preview sink only.
    pub fn start_recording(&mut self, rotation: DisplayRotation) -> VidcapResult<()> {
        let DeviceSlot::Opened { camera, .. } = &self.device else {
            return Err(VidcapError::invalid_state("camera is not open"));
        };
        if self.recorder.state() == RecordingState::Recording {
            return Err(VidcapError::invalid_state("already recording"));
        }
        let sensor = camera.sensor_orientation_degrees;

        if let Err(error) = self.recorder.configure(sensor, rotation) {
            tracing::warn!(%error, "Recorder not prepared; recording falls back to preview");
            self.notify(Notification::RecordingFailed { error });
        }

        let sinks = self.resolve_sinks(CaptureMode::Record)?;
        self.start_session(CaptureMode::Record, sinks).map(|_| ())
    }

    /// Finalize the recording and go back to preview.
    pub fn stop_recording(&mut self) -> VidcapResult<()> {
        if self.recorder.state() == RecordingState::Idle {
            return Err(VidcapError::invalid_state("not recording"));
        }
        self.close_session();
        if let Some(summary) = self.recorder.stop() {
            self.notify(Notification::RecordingStopped(summary));
        }
        self.start_preview()
    }

    fn resolve_sinks(&self, mode: CaptureMode) -> VidcapResult<Vec<CaptureSink>> {
        let preview = self.preview.surface().ok_or_else(|| VidcapError::SurfaceNotReady {
            sink: SinkKind::Preview.to_string(),
        })?;
        let mut sinks = vec![CaptureSink::preview(preview)];

        if mode == CaptureMode::Record {
            match self.recorder.sink_surface() {
                Some(surface) => sinks.push(CaptureSink::recorder(surface)),
                None => tracing::info!("Recorder sink unavailable; record session is preview-only"),
            }
        }
        Ok(sinks)
    }

    fn on_opened(&mut self, generation: Generation, handle: CameraHandle) {
        let camera = match std::mem::replace(&mut self.device, DeviceSlot::Closed) {
            DeviceSlot::Opening {
                generation: expected,
                camera,
            } if expected == generation => camera,
            other => {
                self.device = other;
                tracing::debug!(%generation, camera_id = handle.camera_id(), "Releasing stale camera handle");
                if let Err(e) = self.backend.close_device(handle) {
                    tracing::warn!(error = %e, "Failed to release stale camera handle");
                }
                return;
            }
        };

        tracing::info!(camera_id = %camera.id, %generation, "Camera opened");
        self.notify(Notification::CameraOpened {
            camera_id: camera.id.clone(),
            generation,
        });
        self.device = DeviceSlot::Opened {
            generation,
            camera,
            handle,
        };

        if self.preview_on_open {
            if let Err(error) = self.start_preview() {
                tracing::warn!(%error, "Preview did not start after open");
                self.notify(Notification::CommandFailed {
                    command: "start_preview",
                    error,
                });
            }
        }
    }

    fn on_device_lost(&mut self, generation: Generation, error: VidcapError) {
        let current = match &self.device {
            DeviceSlot::Opening { generation: g, .. } | DeviceSlot::Opened { generation: g, .. } => {
                *g
            }
            DeviceSlot::Closed => {
                tracing::debug!(%generation, %error, "Ignoring device callback while closed");
                return;
            }
        };
        if current != generation {
            tracing::debug!(%generation, %current, %error, "Ignoring stale device callback");
            return;
        }

        tracing::error!(%generation, %error, "Camera device lost");

        // The handle is dead: drop the session without issuing requests.
        if let Some(mut session) = self.session.take() {
            session.mark_closed();
        }
        if let Some(summary) = self.recorder.stop() {
            self.notify(Notification::RecordingStopped(summary));
        }
        let was_opening = matches!(self.device, DeviceSlot::Opening { .. });
        if let DeviceSlot::Opened { handle, .. } =
            std::mem::replace(&mut self.device, DeviceSlot::Closed)
        {
            if let Err(e) = self.backend.close_device(handle) {
                tracing::warn!(error = %e, "Failed to release lost camera handle");
            }
        }
        self.next_generation();

        if was_opening {
            self.notify(Notification::OpenFailed { error });
        } else {
            self.notify(Notification::DeviceLost { error });
        }
    }

    fn on_session_configured(&mut self, generation: Generation, id: SessionId) {
        let Some(session) = self
            .session
            .as_mut()
            .filter(|s| s.matches(generation, id) && s.active().is_none())
        else {
            tracing::debug!(%generation, session = %id, "Ignoring stale session configured callback");
            return;
        };

        session.mark_active();
        let mode = session.mode();
        tracing::info!(%mode, session = %id, %generation, "Capture session configured");

        if let Err(error) = self.backend.set_repeating_request(id, session.request()) {
            tracing::warn!(%error, session = %id, "Repeating request rejected");
            self.close_session();
            if mode == CaptureMode::Record {
                self.recorder.stop();
            }
            self.notify(Notification::SessionConfigureFailed { mode, error });
            return;
        }

        let sinks = session.request().target_kinds();
        self.notify(Notification::SessionActive {
            mode,
            session: id,
            sinks,
        });

        if mode == CaptureMode::Record {
            // A preview-only fallback has nothing to start.
            let Some(active) = self
                .session
                .as_ref()
                .and_then(|s| s.active())
                .filter(|active| active.targets_kind(SinkKind::Recorder))
            else {
                return;
            };
            match self.recorder.start(active) {
                Ok(path) => self.notify(Notification::RecordingStarted { path }),
                Err(error) => {
                    tracing::warn!(%error, "Recording failed to start");
                    self.notify(Notification::RecordingFailed { error });
                }
            }
        }
    }

    fn on_session_configure_failed(&mut self, generation: Generation, id: SessionId) {
        if !self
            .session
            .as_ref()
            .is_some_and(|s| s.matches(generation, id) && s.active().is_none())
        {
            tracing::debug!(%generation, session = %id, "Ignoring stale configure failure");
            return;
        }
        let Some(mut session) = self.session.take() else {
            return;
        };
        session.mark_closed();
        let mode = session.mode();
        tracing::warn!(%mode, session = %id, %generation, "Capture session configuration failed");

        if mode == CaptureMode::Record {
            // Re-arm so the next attempt starts from a clean configure().
            self.recorder.stop();
        }
        self.notify(Notification::SessionConfigureFailed {
            mode,
            error: VidcapError::session_configure_failed(format!(
                "{mode} session {id} was rejected by the camera"
            )),
        });
    }

    /// Stop streaming and release the current session. No-op without one.
    pub fn close_session(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        let id = session.id();
        let was_active = session.active().is_some();
        session.mark_closing();

        if was_active {
            if let Err(e) = self.backend.stop_repeating(id) {
                tracing::warn!(session = %id, error = %e, "stop_repeating failed");
            }
            if let Err(e) = self.backend.abort_captures(id) {
                tracing::warn!(session = %id, error = %e, "abort_captures failed");
            }
        }
        if let Err(e) = self.backend.close_session(id) {
            tracing::warn!(session = %id, error = %e, "close_session failed");
        }
        session.mark_closed();
        tracing::debug!(session = %id, "Capture session closed");
    }

    /// Close the session, finalize and release the recorder, then release
    /// the camera. Afterwards no hardware resources are held.
    pub fn close_camera(&mut self) {
        self.close_session();

        if let Some(summary) = self.recorder.stop() {
            self.notify(Notification::RecordingStopped(summary));
        }
        self.recorder.release();

        match std::mem::replace(&mut self.device, DeviceSlot::Closed) {
            DeviceSlot::Closed => return,
            DeviceSlot::Opening { camera, .. } => {
                tracing::info!(camera_id = %camera.id, "Open abandoned; late handle will be released");
            }
            DeviceSlot::Opened { camera, handle, .. } => {
                if let Err(e) = self.backend.close_device(handle) {
                    tracing::warn!(camera_id = %camera.id, error = %e, "close_device failed");
                }
                tracing::info!(camera_id = %camera.id, "Camera closed");
            }
        }
        // Supersede anything still in flight.
        self.next_generation();
        self.notify(Notification::CameraClosed);
    }

    fn next_generation(&mut self) -> Generation {
        self.generation = self.generation.next();
        self.generation
    }

    fn notify(&self, notification: Notification) {
        if self.notifications.send(notification).is_err() {
            tracing::trace!("Notification receiver dropped");
        }
    }
}
