//! Capture session lifecycle.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::backend::SessionId;
use crate::event::Generation;
use crate::request::{CaptureRequestSpec, CaptureTemplate};
use crate::sink::SinkKind;

/// What a session is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Preview sink only.
    Preview,
    /// Preview plus the encoder sink.
    Record,
}

impl CaptureMode {
    pub fn template(&self) -> CaptureTemplate {
        match self {
            Self::Preview => CaptureTemplate::Preview,
            Self::Record => CaptureTemplate::Record,
        }
    }
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preview => f.write_str("preview"),
            Self::Record => f.write_str("record"),
        }
    }
}

/// State of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    /// Creation request issued, waiting for the hardware.
    Configuring,
    /// Configured, repeating request running.
    Active,
    /// Close issued.
    Closing,
    Closed,
}

/// One negotiated pipeline from the camera to a fixed set of sinks.
#[derive(Debug)]
pub struct CaptureSession {
    id: SessionId,
    generation: Generation,
    mode: CaptureMode,
    request: CaptureRequestSpec,
    phase: SessionPhase,
}

impl CaptureSession {
    pub(crate) fn configuring(
        id: SessionId,
        generation: Generation,
        mode: CaptureMode,
        request: CaptureRequestSpec,
    ) -> Self {
        Self {
            id,
            generation,
            mode,
            request,
            phase: SessionPhase::Configuring,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn request(&self) -> &CaptureRequestSpec {
        &self.request
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Whether a callback for `(generation, id)` belongs to this session.
    pub fn matches(&self, generation: Generation, id: SessionId) -> bool {
        self.generation == generation && self.id == id
    }

    pub(crate) fn mark_active(&mut self) {
        self.phase = SessionPhase::Active;
    }

    pub(crate) fn mark_closing(&mut self) {
        self.phase = SessionPhase::Closing;
    }

    pub(crate) fn mark_closed(&mut self) {
        self.phase = SessionPhase::Closed;
    }

    /// Proof that this session is active, or `None` while it is still
    /// configuring or already closing.
    pub fn active(&self) -> Option<ActiveSession<'_>> {
        (self.phase == SessionPhase::Active).then_some(ActiveSession { session: self })
    }
}

/// Borrowed witness of a session in the [`SessionPhase::Active`] phase.
///
/// Only obtainable through [`CaptureSession::active`]; operations that may
/// only run once frames are flowing take one as a parameter.
#[derive(Debug, Clone, Copy)]
pub struct ActiveSession<'a> {
    session: &'a CaptureSession,
}

impl<'a> ActiveSession<'a> {
    pub fn id(&self) -> SessionId {
        self.session.id
    }

    pub fn mode(&self) -> CaptureMode {
        self.session.mode
    }

    pub fn targets_kind(&self, kind: SinkKind) -> bool {
        self.session.request.targets_kind(kind)
    }

    pub fn request(&self) -> &'a CaptureRequestSpec {
        &self.session.request
    }
}
