//! The worker lane.
//!
//! A single tokio task fed by an unbounded channel. Control-lane commands
//! and hardware callbacks share the queue, so they are handled strictly in
//! arrival order and never concurrently. Senders never block.
//!
//! Each activation gets a fresh lane. Events posted to a lane that has
//! shut down are dropped, so callbacks from a previous activation can
//! never reach a new camera handle.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use vidcap_common::error::{VidcapError, VidcapResult};

use crate::controller::SessionController;
use crate::event::{CameraEvent, Command};

tokio::task_local! {
    static ON_WORKER_LANE: u64;
}

#[derive(Debug)]
enum LaneMessage {
    Command(Command),
    Event(CameraEvent),
    Shutdown,
}

/// Handle backends use to post callbacks onto the lane.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<LaneMessage>,
}

impl EventSender {
    /// Post a callback. Returns `false` if the lane has shut down.
    pub fn send(&self, event: CameraEvent) -> bool {
        match self.tx.send(LaneMessage::Event(event)) {
            Ok(()) => true,
            Err(mpsc::error::SendError(msg)) => {
                tracing::debug!(?msg, "Dropping callback for a closed worker lane");
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A running worker lane.
pub struct WorkerLane {
    id: u64,
    tx: mpsc::UnboundedSender<LaneMessage>,
    task: JoinHandle<()>,
}

impl WorkerLane {
    /// Spawn a lane. `build` receives the lane's event sender and returns
    /// the controller that will own all camera state on the lane.
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn<F>(id: u64, build: F) -> Self
    where
        F: FnOnce(EventSender) -> SessionController,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = build(EventSender { tx: tx.clone() });
        let task = tokio::spawn(ON_WORKER_LANE.scope(id, run(id, controller, rx)));
        tracing::debug!(lane = id, "Worker lane started");
        Self { id, tx, task }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Enqueue a command and return immediately.
    pub fn send(&self, command: Command) -> VidcapResult<()> {
        self.tx
            .send(LaneMessage::Command(command))
            .map_err(|_| VidcapError::worker(format!("worker lane {} has stopped", self.id)))
    }

    /// Handle for posting callbacks (useful to backends created after the
    /// lane).
    pub fn event_sender(&self) -> EventSender {
        EventSender {
            tx: self.tx.clone(),
        }
    }

    /// Ask the lane to stop after what is queued, without waiting.
    pub fn request_stop(&self) {
        let _ = self.tx.send(LaneMessage::Shutdown);
    }

    /// Let the lane finish everything queued so far, close the camera, and
    /// join it, waiting at most `timeout`. On timeout the task is aborted.
    ///
    /// Refuses to run from inside a lane callback, which would wait on
    /// itself.
    pub async fn shutdown(self, timeout: Duration) -> VidcapResult<()> {
        if ON_WORKER_LANE.try_with(|_| ()).is_ok() {
            return Err(VidcapError::worker(
                "worker lane cannot be shut down from a lane callback",
            ));
        }

        // Already-exited lanes are fine; the join below reports how.
        let _ = self.tx.send(LaneMessage::Shutdown);

        let mut task = self.task;
        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(())) => {
                tracing::debug!(lane = self.id, "Worker lane drained");
                Ok(())
            }
            Ok(Err(e)) => Err(VidcapError::worker(format!(
                "worker lane {} failed: {e}",
                self.id
            ))),
            Err(_) => {
                task.abort();
                tracing::warn!(
                    lane = self.id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Worker lane did not drain in time; aborted"
                );
                Err(VidcapError::worker(format!(
                    "worker lane {} did not drain within {timeout:?}",
                    self.id
                )))
            }
        }
    }
}

async fn run(
    id: u64,
    mut controller: SessionController,
    mut rx: mpsc::UnboundedReceiver<LaneMessage>,
) {
    while let Some(message) = rx.recv().await {
        match message {
            LaneMessage::Command(command) => controller.handle_command(command),
            LaneMessage::Event(event) => controller.handle_event(event),
            LaneMessage::Shutdown => break,
        }
    }

    // Stop accepting callbacks before releasing hardware.
    rx.close();
    controller.close_camera();

    // Everything still queued is stale now; this only releases late handles.
    while let Ok(message) = rx.try_recv() {
        match message {
            LaneMessage::Event(event) => controller.handle_event(event),
            LaneMessage::Command(command) => {
                tracing::debug!(lane = id, command = command.name(), "Dropping command after shutdown")
            }
            LaneMessage::Shutdown => {}
        }
    }
    tracing::debug!(lane = id, "Worker lane stopped");
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Callback queue for driving a controller without a lane.
    pub(crate) struct LaneEvents {
        rx: mpsc::UnboundedReceiver<LaneMessage>,
    }

    impl LaneEvents {
        pub(crate) fn drain(&mut self) -> Vec<CameraEvent> {
            let mut events = Vec::new();
            while let Ok(message) = self.rx.try_recv() {
                if let LaneMessage::Event(event) = message {
                    events.push(event);
                }
            }
            events
        }
    }

    pub(crate) fn detached_sender() -> (EventSender, LaneEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventSender { tx }, LaneEvents { rx })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::backend::VirtualCameraBackend;
    use crate::controller::ControllerParts;
    use crate::recorder::{DirectoryStorage, RecordingController, VirtualEncoderBackend};
    use crate::sink::PreviewSurface;
    use vidcap_common::config::RecorderDefaults;
    use vidcap_geometry::Size;

    fn spawn_lane(backend: VirtualCameraBackend) -> WorkerLane {
        let (notifications, _rx) = mpsc::unbounded_channel();
        let recorder = RecordingController::new(
            Arc::new(VirtualEncoderBackend::new()),
            Arc::new(DirectoryStorage::new(std::env::temp_dir().join("vidcap-worker-tests"))),
            RecorderDefaults::default(),
        );
        let parts = ControllerParts {
            backend: Arc::new(backend),
            preview: Arc::new(PreviewSurface::new(Size::new(960, 720))),
            recorder,
            notifications,
            preview_on_open: false,
        };
        WorkerLane::spawn(1, move |events| SessionController::new(parts, events))
    }

    #[tokio::test]
    async fn shutdown_drains_queue_and_closes_camera() {
        let backend = VirtualCameraBackend::new();
        let lane = spawn_lane(backend.clone());
        lane.send(Command::OpenCamera {
            selector: crate::backend::CameraSelector::Back,
        })
        .unwrap();

        lane.shutdown(Duration::from_secs(2)).await.unwrap();
        assert_eq!(backend.open_device_count(), 0);
    }

    #[tokio::test]
    async fn events_after_shutdown_are_dropped() {
        let lane = spawn_lane(VirtualCameraBackend::new());
        let events = lane.event_sender();
        lane.shutdown(Duration::from_secs(2)).await.unwrap();

        assert!(events.is_closed());
        assert!(!events.send(CameraEvent::Disconnected {
            generation: crate::event::Generation::new(1),
        }));
    }

    #[tokio::test]
    async fn shutdown_from_inside_the_lane_is_refused() {
        let lane = spawn_lane(VirtualCameraBackend::new());
        let inner = spawn_lane(VirtualCameraBackend::new());

        let result = ON_WORKER_LANE
            .scope(lane.id(), inner.shutdown(Duration::from_secs(1)))
            .await;
        assert!(matches!(result, Err(VidcapError::Worker { .. })));

        lane.shutdown(Duration::from_secs(2)).await.unwrap();
    }
}
