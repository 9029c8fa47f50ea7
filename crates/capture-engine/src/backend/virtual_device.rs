//! In-process camera backend.
//!
//! Records every hardware request in order and answers with callbacks on
//! the caller's worker lane. In automatic mode opens and session
//! configurations complete immediately; in manual mode they stay pending
//! until the test (or simulation) completes or fails them, which makes
//! races like "closed while still configuring" reproducible.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use vidcap_common::error::{VidcapError, VidcapResult};

use super::{CameraBackend, CameraFacing, CameraHandle, CameraInfo, SessionId};
use crate::event::{CameraEvent, Generation};
use crate::request::{CaptureRequestSpec, CaptureTemplate};
use crate::sink::{CaptureSink, SinkKind};
use crate::worker::EventSender;

/// One hardware request observed by the virtual backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HalCommand {
    Open {
        camera_id: String,
        generation: Generation,
    },
    CreateSession {
        session: SessionId,
        sinks: Vec<SinkKind>,
        generation: Generation,
    },
    SetRepeating {
        session: SessionId,
        template: CaptureTemplate,
        targets: Vec<SinkKind>,
    },
    StopRepeating {
        session: SessionId,
    },
    AbortCaptures {
        session: SessionId,
    },
    CloseSession {
        session: SessionId,
    },
    CloseDevice {
        camera_id: String,
    },
}

/// How the next `open` is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFailure {
    Busy,
    Denied,
}

struct PendingOpen {
    camera_id: String,
    generation: Generation,
    events: EventSender,
}

struct PendingSession {
    id: SessionId,
    generation: Generation,
    events: EventSender,
}

struct LiveSession {
    camera_id: String,
    generation: Generation,
    events: EventSender,
}

struct OpenDevice {
    camera_id: String,
    generation: Generation,
    events: EventSender,
}

struct VirtualState {
    devices: Vec<CameraInfo>,
    auto_complete: bool,
    commands: Vec<HalCommand>,
    next_raw: u64,
    next_session: u64,
    claimed: HashSet<String>,
    opened: Vec<OpenDevice>,
    pending_opens: Vec<PendingOpen>,
    pending_sessions: Vec<PendingSession>,
    live_sessions: HashMap<SessionId, LiveSession>,
    peak_live_sessions: usize,
    fail_next_open: Option<OpenFailure>,
    fail_configure: bool,
    fail_repeating: bool,
}

impl VirtualState {
    fn deliver_open(&mut self, pending: PendingOpen) {
        self.next_raw += 1;
        let handle = CameraHandle::new(pending.camera_id.clone(), self.next_raw);
        let delivered = pending.events.send(CameraEvent::Opened {
            generation: pending.generation,
            handle,
        });
        if delivered {
            self.opened.push(OpenDevice {
                camera_id: pending.camera_id,
                generation: pending.generation,
                events: pending.events,
            });
        } else {
            // Nobody is left to close the handle.
            self.claimed.remove(&pending.camera_id);
        }
    }

    fn deliver_session(&mut self, pending: PendingSession, configured: bool) {
        let event = if configured {
            CameraEvent::SessionConfigured {
                generation: pending.generation,
                session: pending.id,
            }
        } else {
            CameraEvent::SessionConfigureFailed {
                generation: pending.generation,
                session: pending.id,
            }
        };
        pending.events.send(event);
    }
}

/// Scriptable [`CameraBackend`] with two default devices: a back camera
/// `"0"` mounted at 90° and a front camera `"1"` mounted at 270°.
#[derive(Clone)]
pub struct VirtualCameraBackend {
    state: Arc<Mutex<VirtualState>>,
}

impl Default for VirtualCameraBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualCameraBackend {
    /// Backend whose opens and sessions complete immediately.
    pub fn new() -> Self {
        Self::with_mode(true)
    }

    /// Backend whose opens and sessions wait for an explicit completion.
    pub fn manual() -> Self {
        Self::with_mode(false)
    }

    fn with_mode(auto_complete: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(VirtualState {
                devices: default_devices(),
                auto_complete,
                commands: Vec::new(),
                next_raw: 0,
                next_session: 0,
                claimed: HashSet::new(),
                opened: Vec::new(),
                pending_opens: Vec::new(),
                pending_sessions: Vec::new(),
                live_sessions: HashMap::new(),
                peak_live_sessions: 0,
                fail_next_open: None,
                fail_configure: false,
                fail_repeating: false,
            })),
        }
    }

    pub fn with_devices(self, devices: Vec<CameraInfo>) -> Self {
        self.state.lock().devices = devices;
        self
    }

    pub fn fail_next_open(&self, failure: OpenFailure) {
        self.state.lock().fail_next_open = Some(failure);
    }

    /// Make sessions created from now on fail to configure (automatic
    /// mode only).
    pub fn set_fail_configure(&self, fail: bool) {
        self.state.lock().fail_configure = fail;
    }

    pub fn set_fail_repeating(&self, fail: bool) {
        self.state.lock().fail_repeating = fail;
    }

    /// Deliver every pending open. Returns how many were delivered.
    pub fn complete_pending_opens(&self) -> usize {
        let mut state = self.state.lock();
        let pending = std::mem::take(&mut state.pending_opens);
        let count = pending.len();
        for open in pending {
            state.deliver_open(open);
        }
        count
    }

    /// Report every pending session as configured.
    pub fn complete_pending_sessions(&self) -> usize {
        self.finish_pending_sessions(true)
    }

    /// Report every pending session as failed.
    pub fn fail_pending_sessions(&self) -> usize {
        self.finish_pending_sessions(false)
    }

    fn finish_pending_sessions(&self, configured: bool) -> usize {
        let mut state = self.state.lock();
        let pending = std::mem::take(&mut state.pending_sessions);
        let count = pending.len();
        for session in pending {
            if !configured {
                state.live_sessions.remove(&session.id);
            }
            state.deliver_session(session, configured);
        }
        count
    }

    /// Report every opened device as disconnected.
    pub fn disconnect(&self) -> usize {
        let state = self.state.lock();
        for device in &state.opened {
            device.events.send(CameraEvent::Disconnected {
                generation: device.generation,
            });
        }
        state.opened.len()
    }

    /// Report an error on every opened device.
    pub fn raise_error(&self, code: i32) -> usize {
        let state = self.state.lock();
        for device in &state.opened {
            device.events.send(CameraEvent::Error {
                generation: device.generation,
                code,
            });
        }
        state.opened.len()
    }

    pub fn commands(&self) -> Vec<HalCommand> {
        self.state.lock().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.state.lock().commands.clear();
    }

    /// Sessions created and not yet closed.
    pub fn live_session_count(&self) -> usize {
        self.state.lock().live_sessions.len()
    }

    /// Highest number of simultaneously live sessions seen so far.
    pub fn peak_live_sessions(&self) -> usize {
        self.state.lock().peak_live_sessions
    }

    /// Devices opened (or opening) and not yet closed.
    pub fn open_device_count(&self) -> usize {
        self.state.lock().claimed.len()
    }

    pub fn pending_open_count(&self) -> usize {
        self.state.lock().pending_opens.len()
    }

    pub fn pending_session_count(&self) -> usize {
        self.state.lock().pending_sessions.len()
    }
}

impl CameraBackend for VirtualCameraBackend {
    fn name(&self) -> &str {
        "virtual"
    }

    fn list_devices(&self) -> VidcapResult<Vec<CameraInfo>> {
        Ok(self.state.lock().devices.clone())
    }

    fn open(&self, camera_id: &str, generation: Generation, events: EventSender) -> VidcapResult<()> {
        let mut state = self.state.lock();
        state.commands.push(HalCommand::Open {
            camera_id: camera_id.to_string(),
            generation,
        });

        match state.fail_next_open.take() {
            Some(OpenFailure::Busy) => {
                return Err(VidcapError::DeviceBusy {
                    camera_id: camera_id.to_string(),
                })
            }
            Some(OpenFailure::Denied) => {
                return Err(VidcapError::AccessDenied {
                    camera_id: camera_id.to_string(),
                })
            }
            None => {}
        }
        if !state.devices.iter().any(|d| d.id == camera_id) {
            return Err(VidcapError::CameraNotFound {
                selector: camera_id.to_string(),
            });
        }
        if !state.claimed.insert(camera_id.to_string()) {
            return Err(VidcapError::DeviceBusy {
                camera_id: camera_id.to_string(),
            });
        }

        let pending = PendingOpen {
            camera_id: camera_id.to_string(),
            generation,
            events,
        };
        if state.auto_complete {
            state.deliver_open(pending);
        } else {
            state.pending_opens.push(pending);
        }
        Ok(())
    }

    fn create_capture_session(
        &self,
        device: &CameraHandle,
        sinks: &[CaptureSink],
        generation: Generation,
        events: EventSender,
    ) -> VidcapResult<SessionId> {
        let mut state = self.state.lock();
        if !state.claimed.contains(device.camera_id()) {
            return Err(VidcapError::hardware(format!(
                "camera {} is not open",
                device.camera_id()
            )));
        }

        state.next_session += 1;
        let id = SessionId(state.next_session);
        state.commands.push(HalCommand::CreateSession {
            session: id,
            sinks: sinks.iter().map(|s| s.kind).collect(),
            generation,
        });
        state.live_sessions.insert(
            id,
            LiveSession {
                camera_id: device.camera_id().to_string(),
                generation,
                events: events.clone(),
            },
        );
        state.peak_live_sessions = state.peak_live_sessions.max(state.live_sessions.len());

        let pending = PendingSession {
            id,
            generation,
            events,
        };
        if state.auto_complete {
            let configured = !state.fail_configure;
            if !configured {
                state.live_sessions.remove(&id);
            }
            state.deliver_session(pending, configured);
        } else {
            state.pending_sessions.push(pending);
        }
        Ok(id)
    }

    fn set_repeating_request(&self, session: SessionId, request: &CaptureRequestSpec) -> VidcapResult<()> {
        let mut state = self.state.lock();
        state.commands.push(HalCommand::SetRepeating {
            session,
            template: request.template(),
            targets: request.target_kinds(),
        });
        if state.fail_repeating {
            return Err(VidcapError::hardware("repeating request rejected"));
        }
        if !state.live_sessions.contains_key(&session) {
            return Err(VidcapError::hardware(format!("{session} is not live")));
        }
        Ok(())
    }

    fn stop_repeating(&self, session: SessionId) -> VidcapResult<()> {
        self.state.lock().commands.push(HalCommand::StopRepeating { session });
        Ok(())
    }

    fn abort_captures(&self, session: SessionId) -> VidcapResult<()> {
        self.state.lock().commands.push(HalCommand::AbortCaptures { session });
        Ok(())
    }

    fn close_session(&self, session: SessionId) -> VidcapResult<()> {
        let mut state = self.state.lock();
        state.commands.push(HalCommand::CloseSession { session });
        if let Some(live) = state.live_sessions.remove(&session) {
            live.events.send(CameraEvent::SessionClosed {
                generation: live.generation,
                session,
            });
        }
        Ok(())
    }

    fn close_device(&self, device: CameraHandle) -> VidcapResult<()> {
        let mut state = self.state.lock();
        let camera_id = device.camera_id().to_string();
        state.commands.push(HalCommand::CloseDevice {
            camera_id: camera_id.clone(),
        });
        state.claimed.remove(&camera_id);
        state.opened.retain(|d| d.camera_id != camera_id);
        state.live_sessions.retain(|_, s| s.camera_id != camera_id);
        Ok(())
    }
}

fn default_devices() -> Vec<CameraInfo> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::test_support::detached_sender;

    #[test]
    fn second_open_of_same_camera_is_busy() {
        let backend = VirtualCameraBackend::manual();
        let (events, _lane) = detached_sender();
        backend.open("0", Generation::new(1), events.clone()).unwrap();

        assert!(matches!(
            backend.open("0", Generation::new(2), events),
            Err(VidcapError::DeviceBusy { .. })
        ));
        assert_eq!(backend.open_device_count(), 1);
    }

    #[test]
    fn open_delivered_to_closed_lane_frees_device() {
        let backend = VirtualCameraBackend::manual();
        let (events, lane) = detached_sender();
        backend.open("1", Generation::new(1), events).unwrap();
        drop(lane);

        assert_eq!(backend.complete_pending_opens(), 1);
        assert_eq!(backend.open_device_count(), 0);
    }

    #[test]
    fn auto_mode_answers_on_the_lane() {
        let backend = VirtualCameraBackend::new();
        let (events, mut lane) = detached_sender();
        backend.open("0", Generation::new(1), events.clone()).unwrap();

        let handle = match lane.drain().pop() {
            Some(CameraEvent::Opened { handle, .. }) => handle,
            other => panic!("expected Opened, got {other:?}"),
        };
        let surface = crate::sink::Surface::new(vidcap_geometry::Size::new(960, 720));
        let id = backend
            .create_capture_session(
                &handle,
                &[CaptureSink::preview(surface)],
                Generation::new(2),
                events,
            )
            .unwrap();

        assert!(matches!(
            lane.drain().as_slice(),
            [CameraEvent::SessionConfigured { session, .. }] if *session == id
        ));
        assert_eq!(backend.live_session_count(), 1);

        backend.close_device(handle).unwrap();
        assert_eq!(backend.live_session_count(), 0);
        assert_eq!(backend.open_device_count(), 0);
    }

    #[test]
    fn command_log_serializes_as_tagged_json() {
        let command = HalCommand::CloseSession {
            session: SessionId(3),
        };
        let json = serde_json::to_value(&command).unwrap();
        assert_eq!(json["op"], "close_session");
        assert_eq!(json["session"], 3);
    }
}
