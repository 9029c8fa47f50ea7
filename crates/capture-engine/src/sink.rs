//! Capture sinks and the surfaces behind them.
//!
//! A sink names a destination for camera frames. It never owns the
//! surface; the provider (preview view or encoder) does, and must keep it
//! alive for as long as any session targets it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use vidcap_geometry::Size;

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a drawable surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SurfaceId(u64);

impl SurfaceId {
    /// Allocate a process-unique id.
    pub fn next() -> Self {
        Self(NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// A drawable surface with a fixed buffer size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Surface {
    pub id: SurfaceId,
    pub buffer_size: Size,
}

impl Surface {
    pub fn new(buffer_size: Size) -> Self {
        Self {
            id: SurfaceId::next(),
            buffer_size,
        }
    }
}

/// Role of a sink in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    Preview,
    Recorder,
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preview => f.write_str("preview"),
            Self::Recorder => f.write_str("recorder"),
        }
    }
}

/// One output target attachable to a capture request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureSink {
    pub kind: SinkKind,
    pub surface: Surface,
}

impl CaptureSink {
    pub fn preview(surface: Surface) -> Self {
        Self {
            kind: SinkKind::Preview,
            surface,
        }
    }

    pub fn recorder(surface: Surface) -> Self {
        Self {
            kind: SinkKind::Recorder,
            surface,
        }
    }
}

/// Supplies a ready-to-use surface on demand, or `None` while the surface
/// is not ready.
pub trait SurfaceProvider: Send + Sync {
    fn surface(&self) -> Option<Surface>;
}

#[derive(Debug, Default)]
struct PreviewState {
    surface: Option<Surface>,
    view_size: Option<Size>,
}

/// On-screen preview target.
///
/// Becomes available when the view reports its surface and stays so until
/// the view destroys it. The buffer size is fixed; the view size only
/// feeds the display transform.
#[derive(Debug)]
pub struct PreviewSurface {
    buffer_size: Size,
    state: Mutex<PreviewState>,
}

impl PreviewSurface {
    pub fn new(buffer_size: Size) -> Self {
        Self {
            buffer_size,
            state: Mutex::new(PreviewState::default()),
        }
    }

    pub fn buffer_size(&self) -> Size {
        self.buffer_size
    }

    /// The view created its surface. Keeps the existing surface if one
    /// is already live.
    pub fn set_available(&self, view_size: Size) -> Surface {
        let mut state = self.state.lock();
        state.view_size = Some(view_size);
        *state
            .surface
            .get_or_insert_with(|| Surface::new(self.buffer_size))
    }

    pub fn set_view_size(&self, view_size: Size) {
        self.state.lock().view_size = Some(view_size);
    }

    /// The view destroyed its surface.
    pub fn set_unavailable(&self) {
        let mut state = self.state.lock();
        state.surface = None;
        state.view_size = None;
    }

    pub fn is_available(&self) -> bool {
        self.state.lock().surface.is_some()
    }

    pub fn view_size(&self) -> Option<Size> {
        self.state.lock().view_size
    }
}

impl SurfaceProvider for PreviewSurface {
    fn surface(&self) -> Option<Surface> {
        self.state.lock().surface
    }
}
